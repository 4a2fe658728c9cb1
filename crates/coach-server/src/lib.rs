//! coach-server - REST API server for the coaching engine.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use coach_server::{create_engine, create_server, load_config, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Arc::new(create_engine(load_config().unwrap()).unwrap());
//!     let app = create_server(AppState::new(engine));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod error;
pub mod factory;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use factory::{create_engine, load_config};
pub use state::AppState;

use axum::{middleware as axum_middleware, Router};
use tower_http::trace::TraceLayer;

/// Create the server with all routes and middleware.
pub fn create_server(state: AppState) -> Router {
    routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
