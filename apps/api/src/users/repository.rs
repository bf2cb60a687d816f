use sqlx::PgPool;
use uuid::Uuid;

use crate::db::is_unique_violation;
use crate::errors::AppError;
use crate::models::user::User;

pub struct NewUser<'a> {
    pub full_name: &'a str,
    pub email: &'a str,
    pub hashed_password: &'a str,
    pub credits: i32,
}

/// Field changes for `PATCH /api/me`. `None` leaves the column untouched.
#[derive(Default)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
}

pub async fn find_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Inserts a new account. A duplicate email surfaces as `AppError::DuplicateEmail`
/// whether it is caught by the pre-check or by the unique index.
pub async fn create_user(pool: &PgPool, new_user: NewUser<'_>) -> Result<User, AppError> {
    if find_user_by_email(pool, new_user.email).await?.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, full_name, email, hashed_password, is_active, credits)
        VALUES ($1, $2, $3, $4, TRUE, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new_user.full_name)
    .bind(new_user.email)
    .bind(new_user.hashed_password)
    .bind(new_user.credits)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::DuplicateEmail
        } else {
            AppError::Database(e)
        }
    })
}

/// Applies profile changes. Never touches `credits`; that column belongs to the ledger.
pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    changes: ProfileChanges,
) -> Result<User, AppError> {
    if let Some(email) = changes.email.as_deref() {
        let taken: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE email = $1 AND id <> $2")
                .bind(email)
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        if taken.is_some() {
            return Err(AppError::DuplicateEmail);
        }
    }

    sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            full_name = COALESCE($2, full_name),
            email = COALESCE($3, email),
            hashed_password = COALESCE($4, hashed_password)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(changes.full_name)
    .bind(changes.email)
    .bind(changes.hashed_password)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::DuplicateEmail
        } else {
            AppError::Database(e)
        }
    })?
    .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
}
