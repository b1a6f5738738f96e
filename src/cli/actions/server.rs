use crate::{
    auth::{jwks::KeySet, AuthState, IdentityVerifier, SecureCookies, TokenStore},
    oauth::GoogleOAuth,
    storage::{elasticsearch::ElasticsearchStore, DocumentStore},
    tessera::{self, FrontendConfig},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub struct Args {
    pub port: u16,
    pub encryption_keys: Vec<SecretString>,
    pub admin_secret: Option<SecretString>,
    pub google_client_id: String,
    pub google_client_secret: SecretString,
    pub google_jwks_url: String,
    pub jwks_refresh_seconds: u64,
    pub elasticsearch_url: String,
    pub elasticsearch_api_key: Option<SecretString>,
    pub sessions_index: String,
    pub apm_server_url: String,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("encryption_keys", &self.encryption_keys.len())
            .field("admin_secret", &self.admin_secret.as_ref().map(|_| "***"))
            .field("google_client_id", &self.google_client_id)
            .field("google_client_secret", &"***")
            .field("google_jwks_url", &self.google_jwks_url)
            .field("jwks_refresh_seconds", &self.jwks_refresh_seconds)
            .field("elasticsearch_url", &self.elasticsearch_url)
            .field(
                "elasticsearch_api_key",
                &self.elasticsearch_api_key.as_ref().map(|_| "***"),
            )
            .field("sessions_index", &self.sessions_index)
            .field("apm_server_url", &self.apm_server_url)
            .finish()
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if a cookie key is invalid, the signing keys cannot be
/// fetched, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let cookies = SecureCookies::new(
        &args
            .encryption_keys
            .iter()
            .map(ExposeSecret::expose_secret)
            .collect::<Vec<_>>(),
    )
    .context("Invalid cookie encryption key")?;
    if cookies.is_insecure() {
        warn!("No encryption keys configured, cookies are neither signed nor encrypted");
    }

    let keys = Arc::new(
        KeySet::fetch(&args.google_jwks_url)
            .await
            .context("Could not fetch Google signing keys")?,
    );
    keys.spawn_refresh(Duration::from_secs(args.jwks_refresh_seconds));

    let verifier = IdentityVerifier::new(keys, args.google_client_id.clone());

    let exchange = Arc::new(
        GoogleOAuth::new(args.google_client_id.clone(), args.google_client_secret)
            .context("Could not build Google OAuth client")?,
    );

    let store: Option<Arc<dyn DocumentStore>> = match args.elasticsearch_api_key {
        Some(api_key) => Some(Arc::new(
            ElasticsearchStore::new(&args.elasticsearch_url, api_key)
                .context("Invalid Elasticsearch URL")?,
        )),
        None => {
            info!("No Elasticsearch API key, refresh tokens are not persisted");
            None
        }
    };

    let tokens = TokenStore::new(exchange, store, args.sessions_index);
    tokens.init().await;

    if args.admin_secret.is_none() {
        warn!("No admin secret configured, /api/admin is closed");
    }

    let auth = Arc::new(AuthState::new(cookies, verifier, tokens, args.admin_secret));
    let frontend = Arc::new(FrontendConfig {
        apm_server_url: args.apm_server_url,
        google_client_id: args.google_client_id,
    });

    tessera::new(args.port, auth, frontend).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("encryption_keys", args.encryption_keys.len().to_string()),
        ("admin_secret_set", args.admin_secret.is_some().to_string()),
        ("google_client_id", args.google_client_id.clone()),
        ("google_jwks_url", args.google_jwks_url.clone()),
        ("jwks_refresh_seconds", args.jwks_refresh_seconds.to_string()),
        ("elasticsearch_url", args.elasticsearch_url.clone()),
        (
            "elasticsearch_api_key_set",
            args.elasticsearch_api_key.is_some().to_string(),
        ),
        ("sessions_index", args.sessions_index.clone()),
        ("apm_server_url", args.apm_server_url.clone()),
    ];
    log_entries("Startup configuration", &entries);
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\n{title}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
