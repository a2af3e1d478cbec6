use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::{
    db::{models::User, users},
    error::{AppError, Result},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
}

// Deliberately thin: one shared house password plus a roommate name. The
// schedule data has no security boundary beyond "you live here".
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    if body.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    if body.password != state.config.house_password {
        return Err(AppError::Unauthorized(
            "Invalid name or password".to_string(),
        ));
    }

    let user = users::find_by_name(&state.db.pool, &body.name)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid name or password".to_string()))?;

    Ok(Json(LoginResponse { user }))
}
