//! Sessions, OAuth state, identity verification and provider tokens.

pub mod cookies;
pub mod error;
pub mod identity;
pub mod jwks;
pub mod middleware;
pub mod state;
pub mod tokens;

pub use self::{
    cookies::{CookieError, SecureCookies},
    error::{AuthError, ErrorKind},
    identity::{Identity, IdentityVerifier},
    jwks::KeySet,
    middleware::{require_admin, require_identity, CREDENTIALS_COOKIE},
    tokens::TokenStore,
};

use axum_extra::extract::cookie::CookieJar;
use secrecy::SecretString;

/// Shared authentication state handed to handlers and middleware.
#[derive(Debug)]
pub struct AuthState {
    cookies: SecureCookies,
    verifier: IdentityVerifier,
    tokens: TokenStore,
    admin_secret: Option<SecretString>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        cookies: SecureCookies,
        verifier: IdentityVerifier,
        tokens: TokenStore,
        admin_secret: Option<SecretString>,
    ) -> Self {
        Self {
            cookies,
            verifier,
            tokens,
            admin_secret,
        }
    }

    #[must_use]
    pub fn cookies(&self) -> &SecureCookies {
        &self.cookies
    }

    #[must_use]
    pub fn verifier(&self) -> &IdentityVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    #[must_use]
    pub fn admin_secret(&self) -> Option<&SecretString> {
        self.admin_secret.as_ref()
    }

    /// Open the `credentials` cookie and verify the identity token inside.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie is missing, cannot be opened, or holds
    /// a token that does not verify.
    pub fn identity_from_cookies(&self, jar: &CookieJar) -> Result<Identity, AuthError> {
        let cookie = jar
            .get(CREDENTIALS_COOKIE)
            .ok_or_else(|| AuthError::MissingCookie(CREDENTIALS_COOKIE.to_string()))?;
        let token = self.cookies.decode(cookie.value())?;
        self.verifier.parse(&token)
    }
}

#[cfg(test)]
pub(crate) mod test_support;
