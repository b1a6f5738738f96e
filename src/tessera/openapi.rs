use utoipa::OpenApi;

use super::handlers::{authenticate, config, health, oauth, user};

#[derive(OpenApi)]
#[openapi(
    paths(
        config::config,
        authenticate::authenticate,
        oauth::google_callback,
        oauth::google_token,
        user::user,
        health::health,
    ),
    components(schemas(
        config::ConfigResponse,
        config::ApmConfig,
        config::GoogleConfig,
        authenticate::AuthenticateResponse,
        authenticate::Profile,
        oauth::AccessToken,
        user::User,
        health::Health,
    )),
    tags(
        (name = "config", description = "Frontend configuration"),
        (name = "auth", description = "Sign-in and session cookie"),
        (name = "oauth", description = "Google offline access"),
        (name = "user", description = "Signed-in user"),
        (name = "admin", description = "Operator endpoints"),
    )
)]
pub struct ApiDoc;
