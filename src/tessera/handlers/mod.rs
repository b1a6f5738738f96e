pub mod authenticate;
pub use self::authenticate::authenticate;

pub mod config;
pub use self::config::config;

pub mod health;
pub use self::health::health;

pub mod oauth;
pub use self::oauth::{google_callback, google_token};

pub mod user;
pub use self::user::user;

/// Cookie carrying the OAuth state between `/api/authenticate` and the callback.
pub const GOOGLE_STATE_COOKIE: &str = "google_state";

/// OAuth redirect target, also the path the state cookie is scoped to.
pub const GOOGLE_CALLBACK_PATH: &str = "/api/oauth/google";

/// Only same-origin absolute paths are followed after the OAuth callback.
///
/// Browsers drop tabs and newlines from `Location`, so `/\t/host` would
/// become `//host`. Any control or whitespace character is refused.
pub(crate) fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(|c| c.is_control() || c.is_whitespace())
}
