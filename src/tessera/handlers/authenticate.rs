use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, Uri},
    response::Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use utoipa::ToSchema;

use super::{is_local_path, GOOGLE_CALLBACK_PATH, GOOGLE_STATE_COOKIE};
use crate::{
    auth::{
        state::{generate_oauth_state, query_param},
        AuthError, AuthState, Identity, CREDENTIALS_COOKIE,
    },
    oauth::redirect_url_for,
};

/// Lifetime of the `credentials` cookie.
pub const CREDENTIALS_TTL: Duration = Duration::days(7);

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct Profile {
    pub name: String,
    pub id: String,
    pub email: String,
    pub picture: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct AuthenticateResponse {
    pub profile: Profile,
    /// Whether offline access to Google was granted.
    pub google_authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_oauth_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_consent_url: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorizationHeader)?;
    let mut fields = value.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some("Bearer"), Some(token), None) => Ok(Some(token.to_string())),
        _ => Err(AuthError::InvalidAuthorizationHeader),
    }
}

fn credentials_cookie(value: String) -> Cookie<'static> {
    Cookie::build((CREDENTIALS_COOKIE, value))
        .secure(true)
        .http_only(true)
        .expires(OffsetDateTime::now_utc() + CREDENTIALS_TTL)
        .build()
}

#[utoipa::path(
    get,
    path = "/api/authenticate",
    params(
        ("redirect" = Option<String>, Query, description = "Local path to return to after Google consent")
    ),
    responses(
        (status = 200, description = "Caller identity", body = AuthenticateResponse),
        (status = 401, description = "Missing or invalid credentials", body = String)
    ),
    tag = "auth"
)]
// Signs in with a Bearer identity token, or re-reads the credentials cookie.
pub async fn authenticate(
    Extension(auth): Extension<Arc<AuthState>>,
    headers: HeaderMap,
    uri: Uri,
    mut jar: CookieJar,
) -> Result<(CookieJar, Json<AuthenticateResponse>), AuthError> {
    let identity: Identity = match bearer_token(&headers)? {
        Some(token) => {
            let identity = auth.verifier().parse(&token)?;
            let sealed = auth.cookies().encode(&token)?;
            jar = jar.add(credentials_cookie(sealed));
            debug!(user.id = %identity.subject_id, "credentials cookie issued");
            identity
        }
        None => auth.identity_from_cookies(&jar)?,
    };

    let google_authorized = auth.tokens().has_refresh_token(&identity.subject_id).await;

    let mut response = AuthenticateResponse {
        profile: Profile {
            name: identity.display_name.clone().unwrap_or_default(),
            id: identity.subject_id.clone(),
            email: identity.email.clone(),
            picture: identity.picture_url.clone().unwrap_or_default(),
        },
        google_authorized,
        ..AuthenticateResponse::default()
    };

    if !google_authorized {
        let mut metadata = HashMap::new();
        if let Some(redirect) = query_param(&uri, "redirect").filter(|r| is_local_path(r)) {
            metadata.insert("redirect".to_string(), redirect);
        }

        let (state, cookie) = generate_oauth_state(
            auth.cookies(),
            GOOGLE_STATE_COOKIE,
            GOOGLE_CALLBACK_PATH,
            metadata,
        )?;
        jar = jar.add(cookie);

        let redirect_url = redirect_url_for(&headers, GOOGLE_CALLBACK_PATH);
        response.google_consent_url = match auth.tokens().exchange().consent_url(&state, &redirect_url)
        {
            Ok(url) => Some(url),
            Err(err) => {
                warn!("Failed to build consent URL: {err}");
                None
            }
        };
        response.google_oauth_state = Some(state);
    }

    Ok((jar, Json(response)))
}
