use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::cookies::CookieError;
use crate::{oauth::OAuthError, storage::StoreError};

/// Coarse classification used for logging and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Malformed,
    Forgery,
    Unauthorized,
    Upstream,
    Storage,
    Internal,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cookie {0} not present")]
    MissingCookie(String),
    #[error(transparent)]
    Cookie(#[from] CookieError),
    #[error("state does not match")]
    StateMismatch,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("token signed with unknown key")]
    UnknownKey,
    #[error("token audience does not match")]
    InvalidAudience,
    #[error("invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("claim {0} missing or not a string")]
    MissingClaim(&'static str),
    #[error("invalid Authorization header")]
    InvalidAuthorizationHeader,
    #[error("missing query parameter {0}")]
    MissingParameter(&'static str),
    #[error("unauthorized")]
    Unauthorized,
    #[error("refresh token is empty")]
    EmptyRefreshToken,
    #[error(transparent)]
    Upstream(#[from] OAuthError),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCookie(_)
            | Self::InvalidState(_)
            | Self::MissingClaim(_)
            | Self::InvalidAuthorizationHeader
            | Self::MissingParameter(_) => ErrorKind::Malformed,
            Self::Cookie(err) => match err {
                CookieError::InvalidMac => ErrorKind::Forgery,
                CookieError::Encrypt | CookieError::KeyEncoding | CookieError::KeyLength(_) => {
                    ErrorKind::Internal
                }
                _ => ErrorKind::Malformed,
            },
            Self::Token(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::Base64(_)
                | jsonwebtoken::errors::ErrorKind::Json(_)
                | jsonwebtoken::errors::ErrorKind::Utf8(_)
                | jsonwebtoken::errors::ErrorKind::ExpiredSignature
                | jsonwebtoken::errors::ErrorKind::ImmatureSignature
                | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_) => ErrorKind::Malformed,
                _ => ErrorKind::Forgery,
            },
            Self::StateMismatch
            | Self::UnsupportedAlgorithm(_)
            | Self::UnknownKey
            | Self::InvalidAudience => ErrorKind::Forgery,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Storage(_) => ErrorKind::Storage,
            Self::EmptyRefreshToken | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Malformed | ErrorKind::Forgery | ErrorKind::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self.kind() {
            ErrorKind::Forgery => warn!(error = %self, "possible forgery"),
            ErrorKind::Malformed | ErrorKind::Unauthorized => debug!(error = %self, "rejected"),
            ErrorKind::Upstream => error!(error = %self, "upstream failure"),
            ErrorKind::Storage => warn!(error = %self, "storage failure"),
            ErrorKind::Internal => error!(error = %self, "internal error"),
        }

        (self.status(), self.to_string()).into_response()
    }
}
