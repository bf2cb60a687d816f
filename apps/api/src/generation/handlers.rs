//! Axum route handlers for the Course API.

use axum::{extract::State, Json};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{ApiJson, ApiPath};
use crate::generation::generator::GenerateCourseRequest;
use crate::models::course::{CourseRow, CourseSummary};
use crate::state::AppState;

/// POST /api/generate-course
///
/// Spends one credit and returns the stored course. Every failure after the
/// credit is reserved gives it back (see `CourseGenerator::generate`).
pub async fn handle_generate_course(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<GenerateCourseRequest>,
) -> Result<Json<CourseRow>, AppError> {
    if request.topic.trim().is_empty() {
        return Err(AppError::Validation("topic cannot be empty".to_string()));
    }

    let course = state.generator.generate_detached(user.id, request).await?;
    Ok(Json(course))
}

/// GET /api/my-courses
pub async fn handle_list_courses(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<CourseSummary>>, AppError> {
    let courses = state.courses.list_courses(user.id).await?;
    Ok(Json(courses))
}

/// GET /api/courses/:id
///
/// Owner only. Someone else's course is reported as not found.
pub async fn handle_get_course(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(course_id): ApiPath<Uuid>,
) -> Result<Json<CourseRow>, AppError> {
    let course = state
        .courses
        .find_course(course_id, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course {course_id} not found")))?;

    Ok(Json(course))
}
