use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::TokenKeys;
use crate::config::Config;
use crate::generation::generator::CourseGenerator;
use crate::generation::store::CourseStore;
use crate::rate_limit::RateLimiter;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub tokens: TokenKeys,
    /// One limiter per process, built in `main`.
    pub rate_limiter: Arc<RateLimiter>,
    pub generator: Arc<CourseGenerator>,
    /// Read side of course storage; the generator owns the write side.
    pub courses: Arc<dyn CourseStore>,
}
