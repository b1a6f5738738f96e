//! Per-user provider tokens.
//!
//! The in-memory map is the source of truth at request time. Refresh tokens
//! are also written to a document store so a restart does not force every
//! user through the consent screen again. Access tokens are never persisted.
//!
//! Two requests for the same user may refresh concurrently. Both exchanges
//! hit the provider and the last writer wins; there is no per-user lock.

use std::{collections::HashMap, sync::Arc};

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::error::AuthError;
use crate::{
    oauth::{OAuthToken, TokenExchange},
    storage::{DocumentStore, RefreshTokenRecord},
};

pub const DEFAULT_INDEX: &str = "app-sessions";

/// Upper bound of documents loaded by [`TokenStore::init`].
pub const INIT_LOAD_LIMIT: usize = 1000;

pub struct TokenStore {
    exchange: Arc<dyn TokenExchange>,
    store: Option<Arc<dyn DocumentStore>>,
    index: String,
    tokens: RwLock<HashMap<String, OAuthToken>>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("index", &self.index)
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Without a document store the tokens only live in memory.
    pub fn new(
        exchange: Arc<dyn TokenExchange>,
        store: Option<Arc<dyn DocumentStore>>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            exchange,
            store,
            index: index.into(),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn exchange(&self) -> &Arc<dyn TokenExchange> {
        &self.exchange
    }

    /// Load stored refresh tokens. A missing index or an unreachable store
    /// leaves the cache empty; it is never fatal.
    ///
    /// Returns the number of tokens loaded.
    #[instrument(skip(self), fields(index = %self.index))]
    pub async fn init(&self) -> usize {
        let Some(store) = &self.store else {
            info!("No document store configured, tokens are kept in memory only");
            return 0;
        };

        let documents = match store.search(&self.index, INIT_LOAD_LIMIT).await {
            Ok(documents) => documents,
            Err(err) => {
                warn!("Failed to load stored refresh tokens, starting empty: {err}");
                return 0;
            }
        };

        let mut tokens = self.tokens.write().await;
        let mut loaded = 0;
        for document in documents {
            if document.refresh_token.is_empty() {
                continue;
            }
            tokens.insert(
                document.id,
                OAuthToken::from_refresh_token(document.refresh_token),
            );
            loaded += 1;
        }

        info!("Loaded {} stored refresh tokens", loaded);
        loaded
    }

    /// Cache `token` for `subject_id` and persist its refresh token.
    ///
    /// # Errors
    ///
    /// * [`AuthError::EmptyRefreshToken`] when the token carries no refresh
    ///   token. Nothing is changed in that case.
    /// * [`AuthError::Storage`] when the persistent write fails. The in-memory
    ///   entry has already been replaced and stays.
    #[instrument(skip(self, token))]
    pub async fn set(&self, subject_id: &str, token: OAuthToken) -> Result<(), AuthError> {
        if token.refresh_token.is_empty() {
            return Err(AuthError::EmptyRefreshToken);
        }

        let record = RefreshTokenRecord {
            refresh_token: token.refresh_token.clone(),
            issued_at: OffsetDateTime::now_utc(),
        };

        self.tokens
            .write()
            .await
            .insert(subject_id.to_string(), token);

        if let Some(store) = &self.store {
            store.upsert(&self.index, subject_id, &record).await?;
            debug!("refresh token persisted");
        }

        Ok(())
    }

    /// A usable access token for `subject_id`, refreshed if needed.
    ///
    /// # Errors
    ///
    /// * [`AuthError::Unauthorized`] when there is no refresh token for the
    ///   subject. No exchange is attempted.
    /// * [`AuthError::Upstream`] when the refresh exchange fails.
    /// * [`AuthError::Storage`] when a rotated refresh token cannot be persisted.
    #[instrument(skip(self))]
    pub async fn get(&self, subject_id: &str) -> Result<OAuthToken, AuthError> {
        let cached = self.tokens.read().await.get(subject_id).cloned();
        let cached = match cached {
            Some(token) if !token.refresh_token.is_empty() => token,
            _ => return Err(AuthError::Unauthorized),
        };

        if cached.is_valid() {
            return Ok(cached);
        }

        let fresh = self.exchange.refresh(&cached.refresh_token).await?;

        if fresh.refresh_token != cached.refresh_token && !fresh.refresh_token.is_empty() {
            info!("provider rotated the refresh token");
            self.set(subject_id, fresh.clone()).await?;
        } else if fresh.access_token != cached.access_token {
            let mut tokens = self.tokens.write().await;
            let entry = tokens
                .entry(subject_id.to_string())
                .or_insert_with(|| cached.clone());
            entry.access_token.clone_from(&fresh.access_token);
            entry.token_type.clone_from(&fresh.token_type);
            entry.expiry = fresh.expiry;
        }

        Ok(OAuthToken {
            refresh_token: if fresh.refresh_token.is_empty() {
                cached.refresh_token
            } else {
                fresh.refresh_token
            },
            ..fresh
        })
    }

    /// True when the subject has granted offline access.
    pub async fn has_refresh_token(&self, subject_id: &str) -> bool {
        self.tokens
            .read()
            .await
            .get(subject_id)
            .is_some_and(|token| !token.refresh_token.is_empty())
    }
}
