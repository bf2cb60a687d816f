mod auth;
mod config;
mod credits;
mod db;
mod errors;
mod extract;
mod generation;
mod llm_client;
mod models;
mod rate_limit;
mod routes;
mod state;
mod users;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::TokenKeys;
use crate::config::Config;
use crate::credits::PgCreditLedger;
use crate::db::create_pool;
use crate::generation::generator::CourseGenerator;
use crate::generation::store::PgCourseStore;
use crate::llm_client::LlmClient;
use crate::rate_limit::RateLimiter;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http=info",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Course API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.db_max_connections).await?;

    // Initialize LLM client
    let llm = LlmClient::new(config.gemini_api_key.clone(), config.generation_timeout)?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let courses = Arc::new(PgCourseStore::new(db.clone()));
    let generator = Arc::new(CourseGenerator::new(
        Arc::new(PgCreditLedger::new(db.clone())),
        courses.clone(),
        Arc::new(llm),
        config.generation_timeout,
    ));

    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max_requests,
        config.rate_limit_window,
    ));
    info!(
        "Rate limiter: {} requests per {}s",
        rate_limiter.limit(),
        rate_limiter.window().as_secs()
    );
    let purge_task = spawn_limiter_purge(Arc::clone(&rate_limiter));

    // Build app state
    let state = AppState {
        db: db.clone(),
        tokens: TokenKeys::new(&config.jwt_secret, config.jwt_ttl),
        config: config.clone(),
        rate_limiter,
        generator,
        courses,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    purge_task.abort();
    db.close().await;
    info!("Shutdown complete");

    Ok(())
}

/// Periodically drops idle identities so the limiter's map stays bounded.
fn spawn_limiter_purge(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = limiter.window().max(std::time::Duration::from_secs(1));
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = limiter.purge_idle();
            if purged > 0 {
                tracing::debug!(
                    "Rate limiter purged {purged} idle identities ({} still tracked)",
                    limiter.tracked_identities()
                );
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
