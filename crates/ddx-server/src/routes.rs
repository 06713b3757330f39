//! # HTTP Route Handlers
//!
//! ## Annotation Pipeline
//!
//! `POST /annotate` receives the catalog snapshot (distribution policies and
//! cluster size) together with the planned statement, runs the pass, and returns
//! the decision for every slice root.
//!
//! ## Error Handling
//!
//! - 400 Bad Request: malformed JSON (rejected by the `Json` extractor)
//! - 422 Unprocessable Entity: the plan is well-formed JSON but the pass rejects
//!   it (unrecognized node kind, dangling node id, missing range entry, too deep)

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use ddx_core::catalog::InMemoryCatalog;
use ddx_core::plan::PlannedStmt;
use ddx_core::{DirectDispatchPass, DispatchAnnotations};

use crate::state::AppState;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /config
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.clone())
}

/// Request body for `POST /annotate`.
#[derive(Deserialize)]
pub struct AnnotateRequest {
    pub catalog: InMemoryCatalog,
    pub plan: PlannedStmt,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateResponse {
    #[serde(flatten)]
    pub annotations: DispatchAnnotations,
    /// Human-readable decision per slice root, for logs and debugging UIs.
    pub summary: BTreeMap<String, String>,
}

/// POST /annotate
pub async fn annotate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnnotateRequest>,
) -> Result<Json<AnnotateResponse>, (StatusCode, String)> {
    let annotations = run_pass(&state, req)?;
    let summary = annotations
        .decisions
        .iter()
        .map(|(id, d)| (id.to_string(), d.to_string()))
        .collect();
    Ok(Json(AnnotateResponse {
        annotations,
        summary,
    }))
}

fn run_pass(state: &AppState, req: AnnotateRequest) -> Result<DispatchAnnotations, (StatusCode, String)> {
    let pass = DirectDispatchPass::new(
        Arc::new(req.catalog),
        state.oracle.clone(),
        state.hasher.clone(),
        state.config.clone(),
    );
    pass.assign(&req.plan).map_err(|e| {
        debug!("Rejected plan: {}", e);
        (StatusCode::UNPROCESSABLE_ENTITY, format!("Invalid plan: {}", e))
    })
}
