use axum::{
    extract::Extension,
    http::{
        header::{HeaderValue, LOCATION},
        HeaderMap, StatusCode, Uri,
    },
    response::{IntoResponse, Json, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{is_local_path, GOOGLE_CALLBACK_PATH, GOOGLE_STATE_COOKIE};
use crate::{
    auth::{
        state::{query_param, validate_oauth_state},
        AuthError, AuthState, Identity,
    },
    oauth::redirect_url_for,
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    /// RFC 3339, absent when the provider did not say.
    pub expiry: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/oauth/google",
    params(
        ("code" = String, Query, description = "Authorization code"),
        ("state" = String, Query, description = "State returned by /api/authenticate")
    ),
    responses(
        (status = 307, description = "Offline access stored, redirect to the app"),
        (status = 401, description = "Not signed in, or the state does not match", body = String),
        (status = 502, description = "Code exchange failed", body = String)
    ),
    tag = "oauth"
)]
pub async fn google_callback(
    Extension(auth): Extension<Arc<AuthState>>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    uri: Uri,
    jar: CookieJar,
) -> Result<Response, AuthError> {
    let metadata = validate_oauth_state(auth.cookies(), &uri, &jar, GOOGLE_STATE_COOKIE)?;

    let code = query_param(&uri, "code")
        .filter(|code| !code.is_empty())
        .ok_or(AuthError::MissingParameter("code"))?;

    let redirect_url = redirect_url_for(&headers, GOOGLE_CALLBACK_PATH);
    let token = auth
        .tokens()
        .exchange()
        .exchange_code(&code, &redirect_url)
        .await?;

    auth.tokens().set(&identity.subject_id, token).await?;
    info!(user.id = %identity.subject_id, "Google offline access granted");

    let jar = jar.remove(Cookie::build(GOOGLE_STATE_COOKIE).path(GOOGLE_CALLBACK_PATH));

    Ok((
        StatusCode::TEMPORARY_REDIRECT,
        jar,
        [(LOCATION, redirect_target(&metadata))],
    )
        .into_response())
}

/// `Location` for the post-consent redirect, `/` unless the stored target is
/// a local path that is also a valid header value.
fn redirect_target(metadata: &HashMap<String, String>) -> HeaderValue {
    metadata
        .get("redirect")
        .filter(|path| is_local_path(path))
        .and_then(|path| match HeaderValue::try_from(path.as_str()) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("redirect target dropped: {err}");
                None
            }
        })
        .unwrap_or_else(|| HeaderValue::from_static("/"))
}

#[utoipa::path(
    get,
    path = "/api/oauth/google/token",
    responses(
        (status = 200, description = "Current Google access token", body = AccessToken),
        (status = 401, description = "Offline access was never granted", body = String),
        (status = 502, description = "Token refresh failed", body = String)
    ),
    tag = "oauth"
)]
pub async fn google_token(
    Extension(auth): Extension<Arc<AuthState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<AccessToken>, AuthError> {
    let token = auth.tokens().get(&identity.subject_id).await?;

    Ok(Json(AccessToken {
        access_token: token.access_token,
        token_type: token.token_type,
        expiry: token.expiry.and_then(|expiry| expiry.format(&Rfc3339).ok()),
    }))
}
