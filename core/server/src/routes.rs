//! Route handlers.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use campussync_sync::{ExportQuery, ExportResponse, ImportReport, SyncError};

use crate::auth::{Caller, Role};
use crate::error::ApiError;
use crate::state::AppState;

/// `GET {ns}/sync/export`
pub async fn export(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<ExportQuery>,
) -> Result<Json<ExportResponse>, ApiError> {
    caller.require(Role::Edit)?;
    let response = state.engine.export(&query).await?;
    Ok(Json(response))
}

/// `POST {ns}/sync/import`
///
/// Relation lists replace the stored set, so `"relations": {"linked_courses": []}`
/// unlinks every course from the item.
///
/// The body is parsed here rather than by `Json` so that malformed input
/// maps to `invalid_payload` instead of axum's own rejection.
pub async fn import(
    State(state): State<AppState>,
    caller: Caller,
    body: Bytes,
) -> Result<Json<ImportReport>, ApiError> {
    caller.require(Role::Edit)?;
    let payload: Value =
        serde_json::from_slice(&body).map_err(|_| ApiError::from(SyncError::InvalidPayload))?;

    info!("Import requested by '{}' ({} bytes)", caller.label, body.len());
    let report = state.engine.import_value(&payload).await?;
    Ok(Json(report))
}

/// `GET {ns}/health`
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
