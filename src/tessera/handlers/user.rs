use axum::{extract::Extension, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Identity;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct User {
    pub name: String,
    pub email: String,
    pub picture: String,
    pub user_id: String,
}

#[utoipa::path(
    get,
    path = "/api/user",
    responses(
        (status = 200, description = "Signed-in user", body = User),
        (status = 401, description = "Missing or invalid credentials cookie", body = String)
    ),
    tag = "user"
)]
pub async fn user(Extension(identity): Extension<Identity>) -> Json<User> {
    Json(User {
        name: identity.display_name.unwrap_or_default(),
        email: identity.email,
        picture: identity.picture_url.unwrap_or_default(),
        user_id: identity.subject_id,
    })
}
