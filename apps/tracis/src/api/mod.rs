//! # Tracis HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `POST /commit` - Commit a change set against a version target
//! - `POST /query` - Execute a structural query
//! - `POST /export` - Export a version's state in canonical format
//! - `GET /changes` - Recent change descriptions (the change feed)
//! - `GET /status` - Get store status
//! - `GET /health` - Health check
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `TRACIS_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `TRACIS_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `TRACIS_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod feed;
mod handlers;
mod middleware;
mod types;

// Re-exports for external use
pub use auth::get_api_key_from_env;
pub use feed::{ChangeFeed, FeedNotifier};
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
// Re-export handlers and types for integration tests (via `tracis::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    changes_handler, commit_handler, export_handler, health_handler, query_handler,
    status_handler,
};
#[allow(unused_imports)]
pub use types::{
    ChangesResponse, CommitRequest, CommitResponse, ExportRequest, ExportResponse,
    HealthResponse, MatrixRowJson, QueryRequest, QueryResponse, ReachabilityJson, RecordJson,
    StatusResponse,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracis_core::{Engine, TracisError};

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the engine plus the change feed its notifier
/// writes into.
#[derive(Clone)]
pub struct AppState {
    /// The engine behind a read/write lock: queries share read access,
    /// commits take the write half.
    pub engine: Arc<RwLock<Engine>>,
    /// The in-process change feed served by `/changes`.
    pub feed: Arc<ChangeFeed>,
}

impl AppState {
    /// Create app state, wiring the feed in as the engine's notifier.
    #[must_use]
    pub fn new(mut engine: Engine) -> Self {
        let feed = Arc::new(ChangeFeed::new());
        engine.set_notifier(Box::new(FeedNotifier(Arc::clone(&feed))));
        Self {
            engine: Arc::new(RwLock::new(engine)),
            feed,
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `TRACIS_CORS_ORIGINS`:
/// - If "*": allows all origins (development mode - use with caution!)
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("TRACIS_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (TRACIS_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in TRACIS_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No TRACIS_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. CORS - handles preflight requests
/// 2. Tracing - logs all requests
/// 3. Rate Limiting - protects against DoS (if enabled)
/// 4. Authentication - validates API key (if configured)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set TRACIS_API_KEY environment variable to enable authentication."
        );
    }

    // Build base router with routes
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/commit", post(handlers::commit_handler))
        .route("/query", post(handlers::query_handler))
        .route("/export", post(handlers::export_handler))
        .route("/changes", get(handlers::changes_handler));

    // Apply authentication middleware (innermost - runs last on request)
    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    // Apply rate limiting middleware
    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    // Apply CORS, body limit, and tracing (outermost layers)
    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, engine: Engine) -> Result<(), TracisError> {
    let state = AppState::new(engine);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TracisError::Storage(format!("Bind failed: {}", e)))?;

    tracing::info!("Tracis HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| TracisError::Storage(format!("Server error: {}", e)))
}
