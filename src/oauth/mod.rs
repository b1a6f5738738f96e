//! OAuth 2.0 token exchange with the identity provider.

use async_trait::async_trait;
use axum::http::{header::HOST, HeaderMap};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, instrument};
use url::Url;

use crate::APP_USER_AGENT;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_SCOPES: [&str; 3] = ["openid", "email", "profile"];

/// Access tokens this close to expiry are treated as expired.
pub const EXPIRY_DELTA: Duration = Duration::seconds(10);

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token endpoint returned {0}")]
    Status(u16),
    #[error("token endpoint error: {0}")]
    Provider(String),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    /// Empty when the provider did not grant offline access.
    pub refresh_token: String,
    pub token_type: String,
    pub expiry: Option<OffsetDateTime>,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .field("has_refresh_token", &!self.refresh_token.is_empty())
            .finish_non_exhaustive()
    }
}

impl OAuthToken {
    /// Token known only by its refresh token, as loaded from storage.
    #[must_use]
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: refresh_token.into(),
            token_type: String::new(),
            expiry: None,
        }
    }

    /// True when the access token can be used as is.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(OffsetDateTime::now_utc())
    }

    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        self.expiry.map_or(true, |expiry| expiry - EXPIRY_DELTA > now)
    }
}

/// Capability to turn an authorization code or a refresh token into tokens.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_code(&self, code: &str, redirect_url: &str)
        -> Result<OAuthToken, OAuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken, OAuthError>;

    /// URL of the provider consent page for this `state`.
    fn consent_url(&self, state: &str, redirect_url: &str) -> Result<String, OAuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    client: Client,
    client_id: String,
    client_secret: SecretString,
    auth_url: String,
    token_url: String,
}

impl GoogleOAuth {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(client_id: impl Into<String>, client_secret: SecretString) -> Result<Self, OAuthError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(StdDuration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            client_id: client_id.into(),
            client_secret,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, OAuthError> {
        let response = self.client.post(&self.token_url).form(form).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<TokenResponse>().await?),
            status => {
                let body = response.text().await.unwrap_or_default();
                match serde_json::from_str::<TokenErrorResponse>(&body) {
                    Ok(err) => Err(OAuthError::Provider(match err.error_description {
                        Some(description) => format!("{}: {description}", err.error),
                        None => err.error,
                    })),
                    Err(_) => Err(OAuthError::Status(status.as_u16())),
                }
            }
        }
    }
}

fn into_token(response: TokenResponse, previous_refresh_token: &str) -> OAuthToken {
    let expiry = response
        .expires_in
        .filter(|seconds| *seconds > 0)
        .map(|seconds| OffsetDateTime::now_utc() + Duration::seconds(seconds));

    OAuthToken {
        access_token: response.access_token,
        refresh_token: response
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| previous_refresh_token.to_string()),
        token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
        expiry,
    }
}

#[async_trait]
impl TokenExchange for GoogleOAuth {
    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        redirect_url: &str,
    ) -> Result<OAuthToken, OAuthError> {
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_url),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
            ])
            .await?;

        debug!("authorization code exchanged");
        Ok(into_token(response, ""))
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken, OAuthError> {
        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
            ])
            .await?;

        debug!("access token refreshed");
        Ok(into_token(response, refresh_token))
    }

    /// URL of the consent page. Offline access with a forced consent prompt
    /// makes the provider hand out a refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization endpoint is not a valid URL.
    fn consent_url(&self, state: &str, redirect_url: &str) -> Result<String, OAuthError> {
        let url = Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_url),
                ("response_type", "code"),
                ("scope", GOOGLE_SCOPES.join(" ").as_str()),
                ("state", state),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )?;
        Ok(url.to_string())
    }
}

/// Absolute callback URL for `path`, built from the request's host as seen by
/// the browser (`X-Forwarded-Host`/`X-Forwarded-Proto` win over `Host`).
#[must_use]
pub fn redirect_url_for(headers: &HeaderMap, path: &str) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
    };

    let host = header("x-forwarded-host")
        .or_else(|| header(HOST.as_str()))
        .unwrap_or("localhost");
    let scheme = header("x-forwarded-proto").unwrap_or("http");

    format!("{scheme}://{host}{path}")
}
