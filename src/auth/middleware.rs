use axum::{
    extract::{Extension, Request},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        HeaderMap, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn, Span};

use super::{error::ErrorKind, AuthState};

/// Cookie holding the sealed identity token.
pub const CREDENTIALS_COOKIE: &str = "credentials";

const BASIC_REALM: &str = r#"Basic realm="restricted", charset="UTF-8""#;

/// Reject requests without a valid `credentials` cookie. On success the
/// verified [`Identity`](super::Identity) is added to the request extensions.
pub async fn require_identity(
    Extension(auth): Extension<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = match auth.identity_from_cookies(&jar) {
        Ok(identity) => identity,
        Err(err) => {
            if err.kind() == ErrorKind::Forgery {
                warn!(error = %err, "rejected session cookie");
            } else {
                debug!(error = %err, "rejected session cookie");
            }
            return (StatusCode::UNAUTHORIZED, err.to_string()).into_response();
        }
    };

    let span = Span::current();
    span.record("user.id", identity.subject_id.as_str());
    span.record("user.email", identity.email.as_str());

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// HTTP Basic guard for operator endpoints. Only the password is checked.
pub async fn require_admin(
    Extension(auth): Extension<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    if admin_authorized(request.headers(), auth.admin_secret()) {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, BASIC_REALM)],
        "Unauthorized",
    )
        .into_response()
}

fn admin_authorized(headers: &HeaderMap, secret: Option<&SecretString>) -> bool {
    let Some(secret) = secret.map(ExposeSecret::expose_secret) else {
        return false;
    };
    // an empty secret must never match an empty password
    if secret.is_empty() {
        return false;
    }

    basic_password(headers)
        .is_some_and(|password| bool::from(password.as_bytes().ct_eq(secret.as_bytes())))
}

fn basic_password(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = Base64::decode_vec(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (_, password) = credentials.split_once(':')?;

    Some(password.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        identity::tests::{google_claims, sign},
        test_support::{auth_state, FakeExchange, ADMIN_SECRET},
        Identity, SecureCookies, TokenStore,
    };
    use anyhow::Result;
    use axum::{body::Body, middleware, routing::get, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn whoami(Extension(identity): Extension<Identity>) -> String {
        identity.email
    }

    fn app(auth: Arc<AuthState>) -> Router {
        Router::new()
            .route("/me", get(whoami))
            .route_layer(middleware::from_fn(require_identity))
            .merge(
                Router::new()
                    .route("/admin", get(|| async { "ok" }))
                    .route_layer(middleware::from_fn(require_admin)),
            )
            .layer(Extension(auth))
    }

    fn basic(user: &str, password: &str) -> String {
        format!(
            "Basic {}",
            Base64::encode_string(format!("{user}:{password}").as_bytes())
        )
    }

    async fn body_text(response: Response) -> Result<String> {
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    #[tokio::test]
    async fn valid_cookie_reaches_handler() -> Result<()> {
        let auth = auth_state(FakeExchange::answering(vec![]))?;
        let token = sign(&google_claims("1234", "ada@example.com"))?;
        let sealed = auth.cookies().encode(&token)?;

        let response = app(auth)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/me")
                    .header("cookie", format!("{CREDENTIALS_COOKIE}={sealed}"))
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await?, "ada@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn missing_cookie_is_unauthorized() -> Result<()> {
        let auth = auth_state(FakeExchange::answering(vec![]))?;

        let response = app(auth)
            .oneshot(axum::http::Request::builder().uri("/me").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await?.contains("credentials"));
        Ok(())
    }

    #[tokio::test]
    async fn cookie_sealed_with_other_key_is_unauthorized() -> Result<()> {
        let auth = auth_state(FakeExchange::answering(vec![]))?;
        let token = sign(&google_claims("1234", "ada@example.com"))?;
        let other = SecureCookies::new(&[Base64::encode_string(&[1u8; 32])])?;
        let sealed = other.encode(&token)?;

        let response = app(auth)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/me")
                    .header("cookie", format!("{CREDENTIALS_COOKIE}={sealed}"))
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn unverifiable_token_is_unauthorized() -> Result<()> {
        let auth = auth_state(FakeExchange::answering(vec![]))?;
        let mut claims = google_claims("1234", "ada@example.com");
        claims["aud"] = serde_json::json!("another-client");
        let sealed = auth.cookies().encode(&sign(&claims)?)?;

        let response = app(auth)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/me")
                    .header("cookie", format!("{CREDENTIALS_COOKIE}={sealed}"))
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await?, "token audience does not match");
        Ok(())
    }

    #[tokio::test]
    async fn admin_requires_shared_secret() -> Result<()> {
        let auth = auth_state(FakeExchange::answering(vec![]))?;

        let ok = app(auth.clone())
            .oneshot(
                axum::http::Request::builder()
                    .uri("/admin")
                    .header(AUTHORIZATION, basic("anyone", ADMIN_SECRET))
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(ok.status(), StatusCode::OK);

        let wrong = app(auth.clone())
            .oneshot(
                axum::http::Request::builder()
                    .uri("/admin")
                    .header(AUTHORIZATION, basic("admin", "guess"))
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            wrong.headers().get(WWW_AUTHENTICATE).map(|v| v.as_bytes()),
            Some(BASIC_REALM.as_bytes())
        );

        let missing = app(auth)
            .oneshot(axum::http::Request::builder().uri("/admin").body(Body::empty())?)
            .await?;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[test]
    fn empty_or_absent_secret_never_matches() -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, basic("admin", "").parse()?);

        assert!(!admin_authorized(&headers, None));
        assert!(!admin_authorized(&headers, Some(&SecretString::from(""))));
        assert!(admin_authorized(
            &{
                let mut h = HeaderMap::new();
                h.insert(AUTHORIZATION, basic("admin", "pw").parse()?);
                h
            },
            Some(&SecretString::from("pw"))
        ));
        Ok(())
    }

    #[test]
    fn malformed_basic_header_is_ignored() -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc".parse()?);
        assert!(basic_password(&headers).is_none());

        headers.insert(AUTHORIZATION, "Basic !!!".parse()?);
        assert!(basic_password(&headers).is_none());

        headers.insert(AUTHORIZATION, basic("user", "pa:ss").parse()?);
        assert_eq!(basic_password(&headers).as_deref(), Some("pa:ss"));
        Ok(())
    }

    #[tokio::test]
    async fn admin_guard_without_secret_rejects_everything() -> Result<()> {
        let base = auth_state(FakeExchange::answering(vec![]))?;
        let auth = Arc::new(AuthState::new(
            SecureCookies::insecure(),
            base.verifier().clone(),
            TokenStore::new(FakeExchange::answering(vec![]), None, "idx"),
            None,
        ));

        let response = app(auth)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/admin")
                    .header(AUTHORIZATION, basic("admin", ""))
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
