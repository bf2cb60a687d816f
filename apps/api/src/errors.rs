use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown email and wrong password share this variant so callers cannot
    /// tell which one was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Course generation timed out after {0}s")]
    GenerationTimeout(u64),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Invalid course structure: {0}")]
    InvalidCourseStructure(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidCredentials => (
                StatusCode::NOT_FOUND,
                "INVALID_CREDENTIALS",
                "Invalid credentials".to_string(),
            ),
            AppError::DuplicateEmail => (
                StatusCode::BAD_REQUEST,
                "DUPLICATE_EMAIL",
                "Email already registered".to_string(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Access denied".to_string(),
            ),
            AppError::InsufficientCredits => (
                StatusCode::BAD_REQUEST,
                "INSUFFICIENT_CREDITS",
                "Insufficient credits to generate a course".to_string(),
            ),
            AppError::GenerationTimeout(secs) => (
                StatusCode::GATEWAY_TIMEOUT,
                "GENERATION_TIMEOUT",
                format!(
                    "Course generation did not finish within {secs} seconds; \
                    your credit was restored"
                ),
            ),
            AppError::MalformedResponse(_) => (
                StatusCode::BAD_GATEWAY,
                "MALFORMED_RESPONSE",
                "The AI returned a response that could not be read; your credit was restored"
                    .to_string(),
            ),
            AppError::InvalidCourseStructure(msg) => (
                StatusCode::BAD_GATEWAY,
                "INVALID_COURSE_STRUCTURE",
                format!("The AI returned an incomplete course ({msg}); your credit was restored"),
            ),
            AppError::PersistenceFailure(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_FAILURE",
                "The course could not be saved".to_string(),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests. Please try again later.".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Llm(_) => (
                StatusCode::BAD_GATEWAY,
                "LLM_ERROR",
                "An AI processing error occurred; your credit was restored".to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Undecodable or incomplete request bodies.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Path segments that do not parse, such as a malformed course id.
impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_credentials_is_not_found() {
        let response = AppError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_internal_details_are_not_exposed() {
        let err = AppError::Internal(anyhow::anyhow!("connection string postgres://secret"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        let message = body["error"]["message"].as_str().unwrap();
        assert!(!message.contains("secret"));
    }

    #[tokio::test]
    async fn test_model_failures_hide_raw_output() {
        let response = AppError::MalformedResponse("raw model text".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "MALFORMED_RESPONSE");
        assert!(!body["error"]["message"].as_str().unwrap().contains("raw model text"));
    }

    #[tokio::test]
    async fn test_rate_limited_status() {
        let response = AppError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
