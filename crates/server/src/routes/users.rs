use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::{models::User, users},
    error::{AppError, Result},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:id/color", put(update_color))
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateColorRequest {
    pub color: String,
    #[serde(default = "super::schedules::default_source")]
    pub source: String,
}

async fn list_users(State(state): State<AppState>) -> Result<Json<UserListResponse>> {
    let users = users::list(&state.db.pool).await?;
    Ok(Json(UserListResponse { users }))
}

async fn update_color(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateColorRequest>,
) -> Result<Json<User>> {
    if body.color.trim().is_empty() {
        return Err(AppError::Validation("Color is required".to_string()));
    }

    let user = users::update_color(&state.db.pool, id, &body.color)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    state.bus.emit_user_color_change(id, &body.source);

    Ok(Json(user))
}
