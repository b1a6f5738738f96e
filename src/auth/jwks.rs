//! Provider signing keys, refreshed in the background.

use anyhow::{anyhow, Context, Result};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use parking_lot::RwLock;
use reqwest::Client;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::APP_USER_AGENT;

pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// The current provider key set. Readers get a snapshot and never wait on a
/// fetch; a refresh swaps the whole set at once.
#[derive(Debug)]
pub struct KeySet {
    url: String,
    client: Client,
    keys: RwLock<Arc<JwkSet>>,
}

impl KeySet {
    /// Static key set that is never refreshed from the network.
    #[must_use]
    pub fn from_jwks(jwks: JwkSet) -> Self {
        Self {
            url: String::new(),
            client: Client::new(),
            keys: RwLock::new(Arc::new(jwks)),
        }
    }

    /// Fetch the key set from `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the first fetch fails.
    pub async fn fetch(url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;

        let jwks = download(&client, url).await?;
        info!(keys = jwks.keys.len(), "Loaded signing keys from {}", url);

        Ok(Self {
            url: url.to_string(),
            client,
            keys: RwLock::new(Arc::new(jwks)),
        })
    }

    #[must_use]
    pub fn current(&self) -> Arc<JwkSet> {
        self.keys.read().clone()
    }

    #[must_use]
    pub fn find(&self, kid: &str) -> Option<Jwk> {
        self.keys.read().find(kid).cloned()
    }

    /// Download the key set again and swap it in. On failure the previous
    /// keys stay in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails or the set has no keys.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn refresh(&self) -> Result<()> {
        if self.url.is_empty() {
            return Ok(());
        }

        let jwks = download(&self.client, &self.url).await?;
        if jwks.keys.is_empty() {
            return Err(anyhow!("key set from {} is empty", self.url));
        }

        debug!(keys = jwks.keys.len(), "signing keys refreshed");
        *self.keys.write() = Arc::new(jwks);

        Ok(())
    }

    /// Refresh the keys every `every` until the process exits.
    pub fn spawn_refresh(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let keys = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately, keys are already loaded
            interval.tick().await;

            loop {
                interval.tick().await;
                if let Err(err) = keys.refresh().await {
                    warn!("Failed to refresh signing keys, keeping previous set: {err:#}");
                }
            }
        })
    }
}

async fn download(client: &Client, url: &str) -> Result<JwkSet> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch signing keys from {url}"))?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to fetch signing keys from {url}: {}",
            response.status()
        ));
    }

    response
        .json::<JwkSet>()
        .await
        .context("Failed to parse signing keys")
}
