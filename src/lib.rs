pub mod autotag;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod metadata;
pub mod retry;
pub mod search;
pub mod server;
pub mod types;
pub mod vector_store;
pub mod vectorize;

#[cfg(test)]
pub mod test_support;

pub use autotag::AutoTagger;
pub use cache::LruTtlCache;
pub use config::Config;
pub use error::{ApiError, ApiResult, ErrorClass};
pub use search::RetrievalService;
pub use server::ApiServer;
pub use types::*;
pub use vectorize::{VectorizationService, VectorizeOptions};
