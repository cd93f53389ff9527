use doc_vector_api::{ApiServer, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    tracing::info!("Starting document vector API server");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        "Configuration loaded; server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let server = ApiServer::new(config).await?;
    server.run().await?;

    Ok(())
}
