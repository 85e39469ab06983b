//! Campus Sync HTTP Service
//!
//! JSON-over-HTTP surface for the sync engine:
//! - `GET {ns}/sync/export`
//! - `POST {ns}/sync/import`
//! - `GET {ns}/health`

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use campussync_common::Result;

pub use auth::{Caller, Role, TokenTable};
pub use config::{ServerConfig, ServiceConfig, StoreConfig, TokenConfig};
pub use error::ApiError;
pub use state::AppState;

/// Build the router with every route mounted under `namespace`.
pub fn build_app(state: AppState, namespace: &str) -> Router {
    Router::new()
        .route(&format!("{}/health", namespace), get(routes::health))
        .route(&format!("{}/sync/export", namespace), get(routes::export))
        .route(&format!("{}/sync/import", namespace), post(routes::import))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the service until the listener fails.
///
/// # Errors
/// - Invalid configuration
/// - Store backend cannot be opened
/// - Address cannot be bound
pub async fn serve(config: ServiceConfig) -> Result<()> {
    config.validate()?;
    let state = AppState::from_config(&config)?;
    let app = build_app(state, &config.server.namespace);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!(
        "Listening on http://{}{}",
        listener.local_addr()?,
        config.server.namespace
    );
    axum::serve(listener, app).await?;

    Ok(())
}
