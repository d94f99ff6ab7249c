//! REST surface of the workflow engine.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use redress_database::MongoClient;
use redress_utils::{AppConfig, ServerConfig};

use crate::Services;

pub use error::ApiError;
pub use middleware::{token_digest, Principal};

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<AppConfig>,
    /// Present when the MongoDB backend is in use; probed by the detailed health check.
    pub mongo: Option<MongoClient>,
}

impl AppState {
    pub fn new(services: Services, config: AppConfig, mongo: Option<MongoClient>) -> Self {
        Self {
            services,
            config: Arc::new(config),
            mongo,
        }
    }
}

/// Requests still running after `timeout_seconds` get 408 Request Timeout.
fn request_timeout(server: &ServerConfig) -> TimeoutLayer {
    TimeoutLayer::new(Duration::from_secs(server.timeout_seconds.max(1)))
}

pub fn create_router(state: AppState) -> Router {
    let max_request_size = state.config.server.max_request_size;

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics_handler))
        .nest("/api/v1", routes::create_api_routes(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
                )
                .layer(request_timeout(&state.config.server))
                .layer(DefaultBodyLimit::max(max_request_size))
                .layer(axum::middleware::from_fn(middleware::request_id_middleware)),
        )
        .with_state(state)
}
