//! OAuth `state` parameter handling.
//!
//! The state is a random nonce plus optional caller metadata, JSON encoded and
//! base64url'd. The same string travels twice: in the redirect URL and sealed
//! in a cookie. On the callback both copies must be identical.

use axum::http::Uri;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64ct::{Base64, Base64Url, Encoding};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use subtle::ConstantTimeEq;

use super::{cookies::SecureCookies, error::AuthError};

pub const STATE_QUERY_PARAM: &str = "state";

const NONCE_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    nonce: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    data: HashMap<String, String>,
}

/// Create a new state value and the cookie that binds it to this browser.
///
/// The cookie is `Secure` and `HttpOnly`, scoped to `cookie_path`, and has no
/// explicit expiry.
///
/// # Errors
///
/// Returns an error if randomness is unavailable or the cookie cannot be sealed.
pub fn generate_oauth_state(
    cookies: &SecureCookies,
    cookie_name: &str,
    cookie_path: &str,
    metadata: HashMap<String, String>,
) -> Result<(String, Cookie<'static>), AuthError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|err| AuthError::Internal(format!("failed to generate nonce: {err}")))?;

    let record = StateRecord {
        nonce: Base64::encode_string(&nonce),
        data: metadata,
    };
    let json = serde_json::to_vec(&record)
        .map_err(|err| AuthError::Internal(format!("failed to encode state: {err}")))?;
    let state = Base64Url::encode_string(&json);

    let sealed = cookies.encode(&state)?;
    let cookie = Cookie::build((cookie_name.to_owned(), sealed))
        .path(cookie_path.to_owned())
        .secure(true)
        .http_only(true)
        .build();

    Ok((state, cookie))
}

/// Check the `state` query parameter of `uri` against the state cookie and
/// return the metadata attached when the state was generated.
///
/// # Errors
///
/// * [`AuthError::MissingCookie`] or a cookie error when the cookie is absent
///   or cannot be opened.
/// * [`AuthError::StateMismatch`] when both values are present but differ.
pub fn validate_oauth_state(
    cookies: &SecureCookies,
    uri: &Uri,
    jar: &CookieJar,
    cookie_name: &str,
) -> Result<HashMap<String, String>, AuthError> {
    let query_state = query_param(uri, STATE_QUERY_PARAM).unwrap_or_default();

    let cookie = jar
        .get(cookie_name)
        .ok_or_else(|| AuthError::MissingCookie(cookie_name.to_owned()))?;
    let cookie_state = cookies.decode(cookie.value())?;

    if !bool::from(query_state.as_bytes().ct_eq(cookie_state.as_bytes())) {
        return Err(AuthError::StateMismatch);
    }

    let json = Base64Url::decode_vec(&cookie_state)
        .map_err(|err| AuthError::InvalidState(err.to_string()))?;
    let record: StateRecord =
        serde_json::from_slice(&json).map_err(|err| AuthError::InvalidState(err.to_string()))?;

    Ok(record.data)
}

/// First value of `name` in the query string of `uri`.
pub(crate) fn query_param(uri: &Uri, name: &str) -> Option<String> {
    uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    })
}
