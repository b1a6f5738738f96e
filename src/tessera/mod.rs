pub mod handlers;
pub mod openapi;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{field::Empty, info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{require_admin, require_identity, AuthState};

use self::openapi::ApiDoc;

/// Values the frontend reads from `/api/config`.
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub apm_server_url: String,
    pub google_client_id: String,
}

/// Build the application router.
pub fn router(auth: Arc<AuthState>, frontend: Arc<FrontendConfig>) -> Router {
    let authenticated = Router::new()
        .route("/api/oauth/google", get(handlers::google_callback))
        .route("/api/oauth/google/token", get(handlers::google_token))
        .route("/api/user", get(handlers::user))
        .route_layer(middleware::from_fn(require_identity));

    let admin = Router::new()
        .route("/api/admin/health", get(handlers::health))
        .route_layer(middleware::from_fn(require_admin));

    Router::new()
        .route("/api/config", get(handlers::config))
        .route("/api/authenticate", get(handlers::authenticate))
        .merge(authenticated)
        .merge(admin)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(auth))
                .layer(Extension(frontend)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, auth: Arc<AuthState>, frontend: Arc<FrontendConfig>) -> Result<()> {
    let app = router(auth, frontend);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id,
        user.id = Empty,
        user.email = Empty,
    )
}
