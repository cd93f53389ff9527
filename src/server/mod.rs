/// Request gateway module
///
/// Routes the HTTP surface, extracts rate-limit principals, enforces
/// per-principal limits, caches RAG responses and gates operations on
/// the availability of the backing services.

pub mod auth;
pub mod rate_limit;


use crate::autotag::AutoTagger;
use crate::cache::LruTtlCache;
use crate::config::Config;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::{ApiError, ApiResult};
use crate::metadata::{HttpDocumentStore, MetadataStore};
use crate::search::RetrievalService;
use crate::types::{
    RagSearchRequest, RagSearchResponse, SaveDocumentRequest, ScrollSearchRequest,
};
use crate::vector_store::{QdrantHttpStore, VectorStore};
use crate::vectorize::{VectorizationService, VectorizeOptions};
use auth::{principal_for, JwtService, UserRegistry};
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rate_limit::RateLimiter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Startup availability of the backing services. Operations that need
/// an unavailable service return 503 without attempting it.
#[derive(Debug, Clone, Copy)]
pub struct ServiceReadiness {
    pub vector_store: bool,
    pub metadata_store: bool,
}

impl ServiceReadiness {
    pub fn all_ready() -> Self {
        ServiceReadiness {
            vector_store: true,
            metadata_store: true,
        }
    }
}

/// Shared application state
pub struct AppState {
    config: Config,
    vectorizer: VectorizationService,
    retrieval: RetrievalService,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    metadata_store: Arc<dyn MetadataStore>,
    users: UserRegistry,
    jwt: JwtService,
    rate_limiter: RateLimiter,
    rag_cache: LruTtlCache<u64, RagSearchResponse>,
    readiness: ServiceReadiness,
}

impl AppState {
    /// Wire the services from their backing implementations. Tests pass
    /// in-memory stores here; `ApiServer::new` passes the HTTP clients.
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        metadata_store: Arc<dyn MetadataStore>,
        tag_cache_store: Arc<dyn MetadataStore>,
        users_store: Arc<dyn MetadataStore>,
        readiness: ServiceReadiness,
    ) -> Self {
        let auto_tagger = Arc::new(AutoTagger::new(
            embedder.clone(),
            tag_cache_store,
            config.metadata.autotag_cache_ttl_hours,
        ));

        let vectorizer = VectorizationService::new(
            embedder.clone(),
            vector_store.clone(),
            metadata_store.clone(),
            auto_tagger,
            config.vector.dimension,
            Duration::from_secs(config.server.vectorize_timeout_secs),
        );

        let retrieval = RetrievalService::new(
            embedder.clone(),
            vector_store.clone(),
            metadata_store.clone(),
            Duration::from_secs(config.server.rag_timeout_secs),
        );

        let rag_cache = LruTtlCache::new(
            config.rag_cache.max_entries,
            Duration::from_secs(config.rag_cache.ttl_secs),
        );

        AppState {
            jwt: JwtService::new(&config.auth),
            users: UserRegistry::new(users_store),
            rate_limiter: RateLimiter::new(config.server.rate_limit_per_minute),
            vectorizer,
            retrieval,
            embedder,
            vector_store,
            metadata_store,
            rag_cache,
            readiness,
            config,
        }
    }
}

/// Build the gateway router over the given state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/save", post(save_handler))
        .route("/query", post(query_handler))
        .route("/search", post(search_handler))
        .route("/rag_search", post(rag_search_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/register", post(register_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Main API server
pub struct ApiServer {
    app: Router,
    addr: String,
}

impl ApiServer {
    /// Wire the production backends and probe their availability
    pub async fn new(config: Config) -> ApiResult<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
            &config.embedding,
            config.vector.dimension,
            Duration::from_secs_f64(config.vector.min_interval_seconds),
        ));
        let vector_store: Arc<dyn VectorStore> = Arc::new(QdrantHttpStore::new(&config.vector));
        let metadata_store: Arc<dyn MetadataStore> = Arc::new(HttpDocumentStore::new(
            &config.metadata,
            &config.metadata.collection,
        ));
        let tag_cache_store: Arc<dyn MetadataStore> = Arc::new(HttpDocumentStore::new(
            &config.metadata,
            &config.metadata.autotag_cache_collection,
        ));
        let users_store: Arc<dyn MetadataStore> = Arc::new(HttpDocumentStore::new(
            &config.metadata,
            &config.metadata.users_collection,
        ));

        let mut readiness = ServiceReadiness {
            vector_store: vector_store.health_check().await,
            metadata_store: metadata_store.health_check().await,
        };

        if readiness.vector_store {
            if let Err(e) = vector_store.ensure_collection().await {
                warn!("Collection initialization failed: {}", e);
                readiness.vector_store = false;
            }
        } else {
            warn!("Similarity engine unavailable at startup");
        }
        if !readiness.metadata_store {
            warn!("Document store unavailable at startup");
        }

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let state = Arc::new(AppState::new(
            config,
            embedder,
            vector_store,
            metadata_store,
            tag_cache_store,
            users_store,
            readiness,
        ));

        Ok(ApiServer {
            app: router(state),
            addr,
        })
    }

    /// Run the server
    pub async fn run(self) -> ApiResult<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| ApiError::Config(format!("Failed to bind to {}: {}", self.addr, e)))?;

        info!("Server listening on {}", self.addr);

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// Login form body
#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Issued token response
#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
}

/// Registration body
#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    #[serde(default)]
    full_name: String,
}

/// Map an error to its wire response
fn error_response(err: &ApiError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({"status": "failed", "error": err.client_message()});
    (status, Json(body)).into_response()
}

/// HTTP status for an error string of the form "<kind>: <message>"
fn status_for_error_string(error: &str) -> StatusCode {
    let kind = error.split(':').next().unwrap_or("");
    let code = match kind {
        "InvalidInput" => 400,
        "Unauthorized" => 401,
        "Forbidden" => 403,
        "NotFound" => 404,
        "VersionConflict" => 409,
        "MetadataInvalid" => 422,
        "TooManyRequests" => 429,
        "EmbeddingUnavailable" | "VectorStoreUnavailable" | "MetadataStoreUnavailable" => 503,
        "Timeout" => 504,
        _ => 500,
    };
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Extract the principal and take a rate-limit token
fn admit(
    state: &AppState,
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Result<String, ApiError> {
    let remote_ip = connect_info
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let principal = principal_for(headers, &remote_ip);

    if !state.rate_limiter.check(&principal) {
        return Err(ApiError::TooManyRequests);
    }

    Ok(principal)
}

fn require_vector_store(state: &AppState) -> Result<(), ApiError> {
    if !state.readiness.vector_store {
        return Err(ApiError::VectorStoreUnavailable(
            "service not ready".to_string(),
        ));
    }
    Ok(())
}

fn require_metadata_store(state: &AppState) -> Result<(), ApiError> {
    if !state.readiness.metadata_store {
        return Err(ApiError::MetadataStoreUnavailable(
            "service not ready".to_string(),
        ));
    }
    Ok(())
}

/// Deterministic cache key over the full query shape and the principal
fn rag_cache_key(endpoint: &str, request: &RagSearchRequest, principal: &str) -> u64 {
    let canonical = json!({
        "endpoint": endpoint,
        "query": &request.query_text,
        "k": request.k,
        "score_min": request.score_min,
        "filters": &request.filters,
        "tags": &request.tags,
        "path_query": &request.path_query,
        "tag": &request.tag,
        "principal": principal,
    });
    farmhash::hash64(canonical.to_string().as_bytes())
}

async fn save_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<SaveDocumentRequest>,
) -> Response {
    if let Err(e) = admit(&state, &headers, connect_info.as_ref()) {
        return error_response(&e);
    }
    if let Err(e) = require_vector_store(&state) {
        return error_response(&e);
    }
    if request.update_metadata {
        if let Err(e) = require_metadata_store(&state) {
            return error_response(&e);
        }
    }

    let options = VectorizeOptions {
        tag: request.tag.clone(),
        update_metadata: request.update_metadata,
        auto_tag: request.auto_tag,
    };

    let outcome = state
        .vectorizer
        .vectorize(&request.doc_id, &request.content, request.metadata, &options)
        .await;

    let status = match &outcome.error {
        None => StatusCode::OK,
        Some(error) => status_for_error_string(error),
    };
    (status, Json(outcome)).into_response()
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RagSearchRequest>,
) -> Response {
    if let Err(e) = admit(&state, &headers, connect_info.as_ref()) {
        return error_response(&e);
    }
    if let Err(e) = require_vector_store(&state) {
        return error_response(&e);
    }

    let response = state.retrieval.rag_search(&request).await;
    rag_response(response)
}

async fn rag_search_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RagSearchRequest>,
) -> Response {
    let principal = match admit(&state, &headers, connect_info.as_ref()) {
        Ok(principal) => principal,
        Err(e) => return error_response(&e),
    };
    if let Err(e) = require_vector_store(&state) {
        return error_response(&e);
    }

    let cache_enabled = state.config.rag_cache.enabled;
    let key = rag_cache_key("rag_search", &request, &principal);

    if cache_enabled {
        if let Some(cached) = state.rag_cache.get(&key) {
            return rag_response(cached);
        }
    }

    let response = state.retrieval.rag_search(&request).await;

    // Only successful responses are worth replaying; timeouts and
    // failures must retry the real pipeline.
    if cache_enabled && response.status == "success" {
        state.rag_cache.put(key, response.clone());
    }

    rag_response(response)
}

fn rag_response(response: RagSearchResponse) -> Response {
    let status = match &response.error {
        None => StatusCode::OK,
        Some(error) => status_for_error_string(error),
    };
    (status, Json(response)).into_response()
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<ScrollSearchRequest>,
) -> Response {
    if let Err(e) = admit(&state, &headers, connect_info.as_ref()) {
        return error_response(&e);
    }
    if let Err(e) = require_vector_store(&state) {
        return error_response(&e);
    }

    match state.retrieval.scroll_search(&request).await {
        Ok(points) => {
            let count = points.len();
            (
                StatusCode::OK,
                Json(json!({"status": "success", "results": points, "count": count})),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    axum::Form(request): axum::Form<LoginRequest>,
) -> Response {
    if let Err(e) = admit(&state, &headers, connect_info.as_ref()) {
        return error_response(&e);
    }
    if let Err(e) = require_metadata_store(&state) {
        return error_response(&e);
    }

    let user = match state
        .users
        .authenticate(&request.username, &request.password)
        .await
    {
        Ok(user) => user,
        Err(e) => return error_response(&e),
    };

    match state.jwt.issue(&user.user_id, Some(user.email)) {
        Ok(access_token) => (
            StatusCode::OK,
            Json(TokenResponse {
                access_token,
                token_type: "bearer".to_string(),
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Response {
    if let Err(e) = admit(&state, &headers, connect_info.as_ref()) {
        return error_response(&e);
    }
    if let Err(e) = require_metadata_store(&state) {
        return error_response(&e);
    }

    match state
        .users
        .register(&request.email, &request.password, &request.full_name)
        .await
    {
        Ok(user) => (
            StatusCode::OK,
            Json(json!({"user_id": user.user_id, "email": user.email})),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let (embedder_ok, vector_ok, metadata_ok) = tokio::join!(
        state.embedder.health_check(),
        state.vector_store.health_check(),
        state.metadata_store.health_check(),
    );

    let label = |ok: bool| if ok { "ok" } else { "unavailable" };
    let status = if embedder_ok && vector_ok && metadata_ok {
        "healthy"
    } else {
        "degraded"
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "services": {
                "vector_store": label(vector_ok),
                "metadata_store": label(metadata_ok),
                "embedder": label(embedder_ok),
            }
        })),
    )
        .into_response()
}
