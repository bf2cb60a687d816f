use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::password::verify_password_blocking;
use crate::errors::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;
use crate::users::repository::find_user_by_email;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// POST /api/login
///
/// Unknown email and wrong password both return `InvalidCredentials`.
pub async fn handle_login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let email = request.email.trim().to_lowercase();

    let Some(user) = find_user_by_email(&state.db, &email).await? else {
        warn!("Login attempt for unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password_blocking(request.password, user.hashed_password.clone()).await? {
        warn!("Login attempt with wrong password for user {}", user.id);
        return Err(AppError::InvalidCredentials);
    }

    if !user.is_active {
        return Err(AppError::Forbidden);
    }

    let access_token = state.tokens.issue(user.id, &user.email)?;
    info!("Issued access token for user {}", user.id);

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
