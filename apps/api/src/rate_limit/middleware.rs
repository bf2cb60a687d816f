use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRef, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::auth::{bearer_token, TokenKeys};
use crate::errors::AppError;
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::state::AppState;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// What the rate-limit layer needs from application state.
#[derive(Clone)]
pub struct RateLimitContext {
    pub limiter: Arc<RateLimiter>,
    pub tokens: TokenKeys,
}

impl FromRef<AppState> for RateLimitContext {
    fn from_ref(state: &AppState) -> Self {
        Self {
            limiter: Arc::clone(&state.rate_limiter),
            tokens: state.tokens.clone(),
        }
    }
}

/// Picks the key a request is counted under:
/// `user_<id>` for a valid bearer token, `auth_<ip>` for login/register, `<ip>` otherwise.
pub fn client_identity(tokens: &TokenKeys, request: &Request) -> String {
    if let Some(claims) = bearer_token(request.headers())
        .ok()
        .and_then(|token| tokens.verify(token).ok())
    {
        return format!("user_{}", claims.uid);
    }

    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let path = request.uri().path();
    if path.ends_with("/login") || path.ends_with("/register") {
        format!("auth_{ip}")
    } else {
        ip
    }
}

/// Axum middleware: rejects with 429 once an identity exceeds its window,
/// and stamps the quota headers on every response.
pub async fn enforce_rate_limit(
    State(ctx): State<RateLimitContext>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(&ctx.tokens, &request);
    let decision = ctx.limiter.check(&identity);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!("Rate limit exceeded for {identity}");
        AppError::RateLimited.into_response()
    };

    apply_headers(&mut response, decision);
    response
}

fn apply_headers(response: &mut Response, decision: RateDecision) {
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn context(limit: usize) -> RateLimitContext {
        RateLimitContext {
            limiter: Arc::new(RateLimiter::new(limit, Duration::from_secs(60))),
            tokens: TokenKeys::new("test-secret", Duration::from_secs(600)),
        }
    }

    fn app(ctx: RateLimitContext) -> Router {
        Router::new()
            .route("/api/ping", get(|| async { "pong" }))
            .route("/api/login", get(|| async { "login" }))
            .layer(axum::middleware::from_fn_with_state(ctx, enforce_rate_limit))
    }

    async fn send(app: &Router, path: &str, ip: [u8; 4]) -> Response {
        app.clone()
            .oneshot(request(path, ip, None))
            .await
            .unwrap()
    }

    fn request(path: &str, ip: [u8; 4], token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let mut request = builder.body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
        request
    }

    #[tokio::test]
    async fn test_rejects_after_limit_with_headers() {
        let app = app(context(2));

        let first = send(&app, "/api/ping", [10, 0, 0, 1]).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-ratelimit-limit"], "2");
        assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

        let second = send(&app, "/api/ping", [10, 0, 0, 1]).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

        let third = send(&app, "/api/ping", [10, 0, 0, 1]).await;
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(third.headers()["x-ratelimit-limit"], "2");
        assert_eq!(third.headers()["x-ratelimit-remaining"], "0");
    }

    #[tokio::test]
    async fn test_auth_endpoints_count_separately_from_other_paths() {
        let app = app(context(1));

        let ping = send(&app, "/api/ping", [10, 0, 0, 2]).await;
        assert_eq!(ping.status(), StatusCode::OK);

        let login = send(&app, "/api/login", [10, 0, 0, 2]).await;
        assert_eq!(login.status(), StatusCode::OK);

        let again = send(&app, "/api/ping", [10, 0, 0, 2]).await;
        assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_identity_prefers_valid_token() {
        let ctx = context(1);
        let user_id = Uuid::new_v4();
        let token = ctx.tokens.issue(user_id, "ana@example.com").unwrap();

        let with_token = request("/api/me", [10, 0, 0, 3], Some(&token));
        assert_eq!(client_identity(&ctx.tokens, &with_token), format!("user_{user_id}"));

        let bad_token = request("/api/me", [10, 0, 0, 3], Some("forged"));
        assert_eq!(client_identity(&ctx.tokens, &bad_token), "10.0.0.3");

        let register = request("/api/register", [10, 0, 0, 3], None);
        assert_eq!(client_identity(&ctx.tokens, &register), "auth_10.0.0.3");
    }
}
