use crate::config::AuthConfig;
use crate::error::{ApiError, ApiResult};
use crate::metadata::MetadataStore;
use crate::types::JsonMap;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// JWT claims carried by access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User email
    pub email: Option<String>,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
}

/// HS256 token issuance and verification
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtService {
    pub fn new(config: &AuthConfig) -> Self {
        JwtService {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            ttl: Duration::minutes(config.jwt_ttl_minutes),
        }
    }

    /// Issue an access token for a user
    pub fn issue(&self, user_id: &str, email: Option<String>) -> ApiResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding).map_err(|e| {
            warn!("Failed to encode JWT token: {}", e);
            ApiError::Internal(format!("token creation failed: {}", e))
        })
    }

    /// Verify a token's signature and expiry
    pub fn verify(&self, token: &str) -> ApiResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token verification failed: {}", e);
                ApiError::Unauthorized("invalid or expired token".to_string())
            })
    }
}

/// Rate-limit principal for a request: the JWT subject when a bearer
/// token is present and decodes, otherwise the caller's IP. Parse
/// errors always fall through to the IP principal; this never rejects a
/// request.
pub fn principal_for(headers: &HeaderMap, remote_ip: &str) -> String {
    let bearer = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if let Some(token) = bearer {
        if let Some(sub) = subject_from_raw_token(token) {
            return format!("user:{}", sub);
        }
    }

    format!("ip:{}", remote_ip)
}

/// Best-effort read of `sub` from a JWT payload without verifying the
/// signature; rate limiting only needs a stable identity.
fn subject_from_raw_token(token: &str) -> Option<String> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&payload).ok()?;
    claims.get("sub")?.as_str().map(String::from)
}

/// User registry backed by the document store's users collection,
/// keyed by email
pub struct UserRegistry {
    store: Arc<dyn MetadataStore>,
}

/// A registered user
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: String,
    pub email: String,
}

impl UserRegistry {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        UserRegistry { store }
    }

    /// Register a new user with an argon2 password hash
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> ApiResult<User> {
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::InvalidInput("invalid email address".to_string()));
        }
        if password.len() < 8 {
            return Err(ApiError::InvalidInput(
                "password must be at least 8 characters".to_string(),
            ));
        }

        if self.store.exists(email).await? {
            return Err(ApiError::InvalidInput(format!(
                "email already registered: {}",
                email
            )));
        }

        let user_id = Uuid::new_v4().to_string();
        let mut record = JsonMap::new();
        record.insert("doc_id".to_string(), json!(email));
        record.insert("user_id".to_string(), json!(user_id));
        record.insert("email".to_string(), json!(email));
        record.insert("full_name".to_string(), json!(full_name));
        record.insert("password_hash".to_string(), json!(hash_password(password)?));
        record.insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));

        self.store.set(email, record).await?;
        info!("Registered user {}", user_id);

        Ok(User {
            user_id,
            email: email.to_string(),
        })
    }

    /// Verify credentials and return the user
    pub async fn authenticate(&self, email: &str, password: &str) -> ApiResult<User> {
        let record = self
            .store
            .get(email)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("invalid username or password".to_string()))?;

        let hash = record
            .get("password_hash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::Internal("user record missing password hash".to_string()))?;

        if !verify_password(password, hash) {
            return Err(ApiError::Unauthorized(
                "invalid username or password".to_string(),
            ));
        }

        Ok(User {
            user_id: record
                .get("user_id")
                .and_then(|v| v.as_str())
                .unwrap_or(email)
                .to_string(),
            email: email.to_string(),
        })
    }
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
