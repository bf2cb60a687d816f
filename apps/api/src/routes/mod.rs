pub mod health;

use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::handlers as auth_handlers;
use crate::generation::handlers as course_handlers;
use crate::rate_limit::middleware::{enforce_rate_limit, RateLimitContext};
use crate::state::AppState;
use crate::users::handlers as user_handlers;

pub fn build_router(state: AppState) -> Router {
    let rate_limit = RateLimitContext::from_ref(&state);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/", get(health::root_handler))
        // Accounts
        .route("/api/register", post(user_handlers::handle_register))
        .route("/api/login", post(auth_handlers::handle_login))
        .route(
            "/api/me",
            get(user_handlers::handle_get_me).patch(user_handlers::handle_update_me),
        )
        // Courses
        .route(
            "/api/generate-course",
            post(course_handlers::handle_generate_course),
        )
        .route("/api/my-courses", get(course_handlers::handle_list_courses))
        .route("/api/courses/:id", get(course_handlers::handle_get_course))
        .layer(middleware::from_fn_with_state(rate_limit, enforce_rate_limit))
        .with_state(state)
}
