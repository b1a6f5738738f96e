//! Durable storage for refresh tokens.
//!
//! Only refresh tokens and the time they were issued are persisted. Access
//! tokens live in memory and are re-derived after a restart.

pub mod elasticsearch;

pub use self::elasticsearch::ElasticsearchStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("document store returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid document store response: {0}")]
    Response(String),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// One stored document, keyed by the subject the token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenDocument {
    pub id: String,
    pub refresh_token: String,
    pub issued_at: Option<OffsetDateTime>,
}

/// Partial document written on upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Up to `size` documents from `index`.
    async fn search(&self, index: &str, size: usize)
        -> Result<Vec<RefreshTokenDocument>, StoreError>;

    /// Create or update document `id` in `index`.
    async fn upsert(
        &self,
        index: &str,
        id: &str,
        record: &RefreshTokenRecord,
    ) -> Result<(), StoreError>;
}
