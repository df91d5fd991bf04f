//! Storage backends for the shared to-do list.
//!
//! All backends implement the same [`TodoStore`] trait and are selected at
//! startup via `STORE_BACKEND`:
//!
//! - `json` (default): local JSON file, ephemeral on most hosts
//! - `gist`: JSON snapshot persisted to a private GitHub Gist
//! - `redis`: Upstash Redis over its REST interface, with secondary
//!   indexes by status, tag and recency

pub mod gist;
pub mod json_file;
pub mod redis;
pub mod snapshot;

pub use gist::GistStore;
pub use json_file::JsonFileStore;
pub use redis::RedisStore;

use crate::config::Config;
use crate::models::{Item, ItemStatus, ListFilter};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Storage error with optional HTTP status code from REST-backed stores
#[derive(Debug, Clone)]
pub struct StoreError {
    pub message: String,
    pub status_code: Option<u16>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        StoreError {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        StoreError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "[HTTP {}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for StoreError {}

impl From<String> for StoreError {
    fn from(s: String) -> Self {
        StoreError::new(s)
    }
}

impl From<&str> for StoreError {
    fn from(s: &str) -> Self {
        StoreError::new(s)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for the shared list. Handlers receive an
/// `Arc<dyn TodoStore>` rather than touching process-wide state.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Add one item. Tags and due date are extracted from the text.
    async fn create(&self, text: &str, added_by: i64) -> StoreResult<Item>;

    /// List items. Snapshot backends return insertion order; the Redis
    /// backend returns newest-first by update time.
    async fn list(&self, filter: &ListFilter) -> StoreResult<Vec<Item>>;

    /// Set the status of an item. Returns false when the id does not exist.
    async fn update_status(&self, id: i64, status: ItemStatus) -> StoreResult<bool>;

    /// Remove an item. Returns false when the id does not exist.
    async fn delete(&self, id: i64) -> StoreResult<bool>;

    /// Remove everything; returns how many items were removed.
    async fn clear(&self) -> StoreResult<usize>;

    /// Remove done items only; returns how many were removed.
    async fn clear_done(&self) -> StoreResult<usize>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Storage backend selector, from the `STORE_BACKEND` env var
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Json,
    Gist,
    Redis,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Json => "json",
            StoreBackend::Gist => "gist",
            StoreBackend::Redis => "redis",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" | "file" => Some(StoreBackend::Json),
            "gist" => Some(StoreBackend::Gist),
            "redis" | "upstash" => Some(StoreBackend::Redis),
            _ => None,
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Create the store selected by the configuration.
pub async fn create_store(config: &Config) -> StoreResult<Arc<dyn TodoStore>> {
    log::info!("Initializing {} store", config.store_backend);

    match config.store_backend {
        StoreBackend::Json => Ok(Arc::new(JsonFileStore::open(&config.data_path))),
        StoreBackend::Gist => {
            let store = GistStore::load(config).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Redis => {
            let url = config
                .redis_rest_url
                .as_deref()
                .ok_or_else(|| StoreError::new("UPSTASH_REDIS_REST_URL must be set for the redis backend"))?;
            let token = config
                .redis_rest_token
                .as_deref()
                .ok_or_else(|| StoreError::new("UPSTASH_REDIS_REST_TOKEN must be set for the redis backend"))?;
            Ok(Arc::new(RedisStore::new(url, token)))
        }
    }
}
