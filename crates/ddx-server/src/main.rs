//! # ddx-server: HTTP Service for the Direct-Dispatch Pass
//!
//! This binary exposes the direct-dispatch pass as a network service, so a
//! coordinator written in another language can annotate its finished plans
//! before dispatching them.
//!
//! ```text
//! Coordinator
//!   |
//!   | HTTP POST /annotate (catalog snapshot + planned statement, JSON)
//!   v
//! ddx-server (this binary)
//!   |
//!   +-> DirectDispatchPass::assign
//!   |
//!   | HTTP response (dispatch decision per slice root, JSON)
//!   v
//! Coordinator
//! ```
//!
//! ## Endpoints
//!
//! - `GET  /health`   - Health check
//! - `GET  /config`   - Active pass configuration
//! - `POST /annotate` - Compute dispatch annotations for a plan
//!
//! ## Configuration
//!
//! The server listens on `DDX_LISTEN_ADDR` (default `0.0.0.0:3000`). Logging is
//! controlled by the `RUST_LOG` environment variable (defaults to `ddx=debug`).

mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

fn app(state: Arc<state::AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/config", get(routes::get_config))
        .route("/annotate", post(routes::annotate))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ddx=debug".parse()?))
        .init();

    let state = Arc::new(state::AppState::new());

    let addr = std::env::var("DDX_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("ddx-server listening on http://{}", addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
