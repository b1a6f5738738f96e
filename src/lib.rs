//! # Tessera (session and OAuth token gateway)
//!
//! `tessera` signs users in with Google, keeps their identity in a sealed
//! cookie and holds their Google OAuth tokens so the frontend can call Google
//! APIs on their behalf.
//!
//! ## Sessions
//!
//! The identity token issued by Google is sealed (AES-256-GCM plus an
//! HMAC-SHA256 tag) into the `credentials` cookie. Every request re-opens the
//! cookie and verifies the token against Google's current signing keys, so no
//! session table exists server side.
//!
//! ## Offline access
//!
//! Refresh tokens are cached in memory and persisted to Elasticsearch. Access
//! tokens are refreshed lazily when the frontend asks for one.

pub mod auth;
pub mod cli;
pub mod oauth;
pub mod storage;
pub mod tessera;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
