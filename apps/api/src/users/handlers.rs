//! Axum route handlers for account registration and self-service.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::info;

use crate::auth::password::hash_password_blocking;
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::ApiJson;
use crate::models::user::UserProfile;
use crate::state::AppState;
use crate::users::repository::{create_user, update_profile, NewUser, ProfileChanges};
use crate::users::{normalize_email, validate_full_name, validate_password};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// POST /api/register
pub async fn handle_register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    let email = normalize_email(&request.email)?;
    let full_name = validate_full_name(&request.full_name)?;
    validate_password(&request.password)?;

    let hashed_password = hash_password_blocking(request.password).await?;

    let user = create_user(
        &state.db,
        NewUser {
            full_name,
            email: &email,
            hashed_password: &hashed_password,
            credits: state.config.signup_credits,
        },
    )
    .await?;

    info!("Registered user {} with {} credits", user.id, user.credits);
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /api/me
pub async fn handle_get_me(AuthUser(user): AuthUser) -> Json<UserProfile> {
    Json(user.into())
}

/// PATCH /api/me
pub async fn handle_update_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let mut changes = ProfileChanges::default();

    if let Some(full_name) = request.full_name.as_deref() {
        changes.full_name = Some(validate_full_name(full_name)?.to_string());
    }
    if let Some(email) = request.email.as_deref() {
        changes.email = Some(normalize_email(email)?);
    }
    if let Some(password) = request.password {
        validate_password(&password)?;
        changes.hashed_password = Some(hash_password_blocking(password).await?);
    }

    let updated = update_profile(&state.db, user.id, changes).await?;
    info!("Updated profile for user {}", updated.id);
    Ok(Json(updated.into()))
}
