use crate::error::{ApiError, ApiResult};
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Similarity engine configuration
    pub vector: VectorConfig,
    /// Document store configuration
    pub metadata: MetadataConfig,
    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// RAG response cache configuration
    pub rag_cache: RagCacheConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Per-principal rate limit (requests per minute)
    pub rate_limit_per_minute: u64,
    /// Per-document vectorization deadline in seconds
    pub vectorize_timeout_secs: u64,
    /// RAG search deadline in seconds
    pub rag_timeout_secs: u64,
}

/// Similarity engine configuration
#[derive(Debug, Clone)]
pub struct VectorConfig {
    /// Engine base URL
    pub url: String,
    /// Engine API key (optional for local deployments)
    pub api_key: Option<String>,
    /// Collection name
    pub collection: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Batch size for bulk upserts
    pub batch_size: usize,
    /// Baseline minimum interval between paced upstream calls, seconds
    pub min_interval_seconds: f64,
}

/// Document store configuration
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// Document store base URL
    pub backend_url: String,
    /// Project identifier woven into document paths
    pub project_id: String,
    /// Database identifier woven into document paths
    pub database_id: String,
    /// Collection holding document metadata records
    pub collection: String,
    /// Collection holding user registry records
    pub users_collection: String,
    /// Collection holding cached auto-tag results
    pub autotag_cache_collection: String,
    /// Auto-tag cache TTL in hours
    pub autotag_cache_ttl_hours: u64,
}

/// Embedding provider configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Provider base URL
    pub provider_url: String,
    /// Provider API key
    pub api_key: String,
    /// Embedding model name
    pub model: String,
    /// Chat model used for tag generation
    pub tag_model: String,
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: String,
    /// JWT algorithm name (HS256 only)
    pub jwt_alg: String,
    /// Access token lifetime in minutes
    pub jwt_ttl_minutes: i64,
}

/// RAG response cache configuration
#[derive(Debug, Clone)]
pub struct RagCacheConfig {
    /// Whether the gateway caches RAG responses
    pub enabled: bool,
    /// Entry TTL in seconds
    pub ttl_secs: u64,
    /// Maximum number of cached responses
    pub max_entries: usize,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: &str) -> ApiResult<T>
where
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .parse()
        .map_err(|e| ApiError::Config(format!("Invalid {}: {}", key, e)))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        // Load .env file if it exists
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("Could not load .env file: {}", e);
        }

        let config = Config {
            server: ServerConfig {
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port: env_parse("SERVER_PORT", "8080")?,
                rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", "100")?,
                vectorize_timeout_secs: env_parse("VECTORIZE_TIMEOUT_SECONDS", "30")?,
                rag_timeout_secs: env_parse("RAG_TIMEOUT_SECONDS", "3")?,
            },
            vector: VectorConfig {
                url: env_or("VECTOR_BACKEND_URL", "http://localhost:6333"),
                api_key: env::var("VECTOR_BACKEND_API_KEY").ok(),
                collection: env_or("VECTOR_COLLECTION", "agent_data_vectors"),
                dimension: env_parse("VECTOR_DIMENSION", "1536")?,
                batch_size: env_parse("VECTOR_BATCH_SIZE", "100")?,
                min_interval_seconds: env_parse("VECTOR_MIN_INTERVAL_SECONDS", "0.35")?,
            },
            metadata: MetadataConfig {
                backend_url: env_or("METADATA_BACKEND_URL", "https://firestore.googleapis.com"),
                project_id: env_or("METADATA_PROJECT_ID", ""),
                database_id: env_or("METADATA_DATABASE_ID", "(default)"),
                collection: env_or("METADATA_COLLECTION", "document_metadata"),
                users_collection: env_or("USERS_COLLECTION", "users"),
                autotag_cache_collection: env_or("AUTOTAG_CACHE_COLLECTION", "auto_tag_cache"),
                autotag_cache_ttl_hours: env_parse("AUTOTAG_CACHE_TTL_HOURS", "24")?,
            },
            embedding: EmbeddingConfig {
                provider_url: env_or("EMBED_PROVIDER_URL", "https://api.openai.com/v1"),
                api_key: env_or("EMBED_PROVIDER_KEY", ""),
                model: env_or("EMBED_MODEL", "text-embedding-ada-002"),
                tag_model: env_or("EMBED_TAG_MODEL", "gpt-3.5-turbo"),
            },
            auth: AuthConfig {
                jwt_secret: env_or("JWT_SECRET", ""),
                jwt_alg: env_or("JWT_ALG", "HS256"),
                jwt_ttl_minutes: env_parse("JWT_TTL_MINUTES", "30")?,
            },
            rag_cache: RagCacheConfig {
                enabled: env_parse("RAG_CACHE_ENABLED", "true")?,
                ttl_secs: env_parse("RAG_CACHE_TTL_SECONDS", "3600")?,
                max_entries: env_parse("RAG_CACHE_MAX", "1000")?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.server.port == 0 {
            return Err(ApiError::Config("Server port cannot be 0".to_string()));
        }

        if self.vector.dimension == 0 {
            return Err(ApiError::Config(
                "Vector dimension must be greater than 0".to_string(),
            ));
        }

        if !self.vector.url.starts_with("http://") && !self.vector.url.starts_with("https://") {
            return Err(ApiError::Config(
                "VECTOR_BACKEND_URL must be an http(s) URL".to_string(),
            ));
        }

        if !self.metadata.backend_url.starts_with("http://")
            && !self.metadata.backend_url.starts_with("https://")
        {
            return Err(ApiError::Config(
                "METADATA_BACKEND_URL must be an http(s) URL".to_string(),
            ));
        }

        if self.vector.min_interval_seconds < 0.0 {
            return Err(ApiError::Config(
                "VECTOR_MIN_INTERVAL_SECONDS cannot be negative".to_string(),
            ));
        }

        if self.auth.jwt_secret.is_empty() {
            return Err(ApiError::Config("JWT_SECRET cannot be empty".to_string()));
        }

        if self.auth.jwt_alg != "HS256" {
            return Err(ApiError::Config(format!(
                "Unsupported JWT_ALG: {}",
                self.auth.jwt_alg
            )));
        }

        if self.rag_cache.max_entries == 0 {
            return Err(ApiError::Config(
                "RAG_CACHE_MAX must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                rate_limit_per_minute: 100,
                vectorize_timeout_secs: 30,
                rag_timeout_secs: 3,
            },
            vector: VectorConfig {
                url: "http://localhost:6333".to_string(),
                api_key: None,
                collection: "agent_data_vectors".to_string(),
                dimension: 1536,
                batch_size: 100,
                min_interval_seconds: 0.35,
            },
            metadata: MetadataConfig {
                backend_url: "https://firestore.googleapis.com".to_string(),
                project_id: "".to_string(),
                database_id: "(default)".to_string(),
                collection: "document_metadata".to_string(),
                users_collection: "users".to_string(),
                autotag_cache_collection: "auto_tag_cache".to_string(),
                autotag_cache_ttl_hours: 24,
            },
            embedding: EmbeddingConfig {
                provider_url: "https://api.openai.com/v1".to_string(),
                api_key: "".to_string(),
                model: "text-embedding-ada-002".to_string(),
                tag_model: "gpt-3.5-turbo".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: "".to_string(),
                jwt_alg: "HS256".to_string(),
                jwt_ttl_minutes: 30,
            },
            rag_cache: RagCacheConfig {
                enabled: true,
                ttl_secs: 3600,
                max_entries: 1000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.auth.jwt_secret = "test-secret".to_string();
        config
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();

        // Should fail with an empty JWT secret
        assert!(config.validate().is_err());

        // Should pass once the secret is set
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_dimension() {
        let mut config = valid_config();
        config.vector.dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_bad_urls() {
        let mut config = valid_config();
        config.vector.url = "localhost:6333".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.metadata.backend_url = "ftp://docs".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_unsupported_alg() {
        let mut config = valid_config();
        config.auth.jwt_alg = "RS256".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.vector.collection, "agent_data_vectors");
        assert_eq!(config.vector.dimension, 1536);
        assert_eq!(config.vector.batch_size, 100);
        assert_eq!(config.metadata.collection, "document_metadata");
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
        assert_eq!(config.rag_cache.ttl_secs, 3600);
        assert_eq!(config.rag_cache.max_entries, 1000);
        assert_eq!(config.metadata.autotag_cache_ttl_hours, 24);
    }
}
