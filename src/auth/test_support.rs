use anyhow::Result;
use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use secrecy::SecretString;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use super::{identity::tests::verifier, tokens::DEFAULT_INDEX, AuthState, SecureCookies, TokenStore};
use crate::oauth::{OAuthError, OAuthToken, TokenExchange};

pub(crate) const ADMIN_SECRET: &str = "s3cret";

pub(crate) fn cookie_key() -> String {
    Base64::encode_string(&[11u8; 64])
}

/// Exchange that counts refreshes and answers from a queue.
#[derive(Default)]
pub(crate) struct FakeExchange {
    calls: AtomicUsize,
    responses: Mutex<Vec<Result<OAuthToken, OAuthError>>>,
}

impl FakeExchange {
    pub(crate) fn answering(responses: Vec<Result<OAuthToken, OAuthError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            responses: Mutex::new(responses),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<OAuthToken, OAuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| OAuthError::Provider("poisoned".to_string()))?;
        if responses.is_empty() {
            return Err(OAuthError::Status(500));
        }
        responses.remove(0)
    }
}

#[async_trait]
impl TokenExchange for FakeExchange {
    async fn exchange_code(&self, code: &str, _: &str) -> Result<OAuthToken, OAuthError> {
        if code.is_empty() {
            return Err(OAuthError::Provider("invalid_grant".to_string()));
        }
        self.next()
    }

    async fn refresh(&self, _: &str) -> Result<OAuthToken, OAuthError> {
        self.next()
    }

    fn consent_url(&self, state: &str, redirect_url: &str) -> Result<String, OAuthError> {
        Ok(format!(
            "https://consent.example.com/?state={state}&redirect_uri={redirect_url}"
        ))
    }
}

/// Auth state with sealed cookies, the test signing key set and an
/// in-memory token store.
pub(crate) fn auth_state(exchange: Arc<FakeExchange>) -> Result<Arc<AuthState>> {
    Ok(Arc::new(AuthState::new(
        SecureCookies::new(&[cookie_key()])?,
        verifier()?,
        TokenStore::new(exchange, None, DEFAULT_INDEX),
        Some(SecretString::from(ADMIN_SECRET)),
    )))
}
