use axum::{extract::Extension, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{oauth::GOOGLE_SCOPES, tessera::FrontendConfig};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApmConfig {
    pub server_url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GoogleConfig {
    pub client_id: String,
    pub oauth_scope: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ConfigResponse {
    pub apm: ApmConfig,
    pub google: GoogleConfig,
}

#[utoipa::path(
    get,
    path = "/api/config",
    responses(
        (status = 200, description = "Frontend configuration", body = ConfigResponse)
    ),
    tag = "config"
)]
pub async fn config(Extension(frontend): Extension<Arc<FrontendConfig>>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        apm: ApmConfig {
            server_url: frontend.apm_server_url.clone(),
        },
        google: GoogleConfig {
            client_id: frontend.google_client_id.clone(),
            oauth_scope: GOOGLE_SCOPES.join(" "),
        },
    })
}
