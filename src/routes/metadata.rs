//! Metadata route handlers
//!
//! Cached schema snapshots with their activity split and table statistics.

use crate::erd::report::{categorize, table_stats, TableActivity, TableStatRow};
use crate::error::ApiResult;
use crate::models::SuccessResponse;
use crate::snapshot::SchemaSnapshot;
use crate::state::{AppState, SharedState};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub environment: String,
    pub snapshot: SchemaSnapshot,
    pub activity: TableActivity,
    pub stats: Vec<TableStatRow>,
}

fn describe(state: &AppState, environment: String, snapshot: Arc<SchemaSnapshot>) -> MetadataResponse {
    MetadataResponse {
        environment,
        activity: categorize(&state.activity_policy, &snapshot),
        stats: table_stats(&snapshot),
        snapshot: snapshot.as_ref().clone(),
    }
}

/// Cached snapshot, loaded on first use
pub async fn get_metadata(
    State(state): State<SharedState>,
    Path((environment, schema)): Path<(String, String)>,
) -> ApiResult<Json<SuccessResponse<MetadataResponse>>> {
    let (name, _) = state.connections.resolve_environment(&environment)?;
    let snapshot = state.snapshot(&name, &schema).await?;
    let response = describe(&state, name, snapshot);

    Ok(Json(SuccessResponse::with_data(
        format!(
            "{} tables in {} ({} active, {} unused).",
            response.snapshot.tables.len(),
            schema,
            response.activity.active.len(),
            response.activity.unused.len()
        ),
        response,
    )))
}

/// Drop the cached snapshot and load it again
pub async fn reload_metadata(
    State(state): State<SharedState>,
    Path((environment, schema)): Path<(String, String)>,
) -> ApiResult<Json<SuccessResponse<MetadataResponse>>> {
    let (name, _) = state.connections.resolve_environment(&environment)?;
    let snapshot = state.reload_snapshot(&name, &schema).await?;
    let response = describe(&state, name, snapshot);

    Ok(Json(SuccessResponse::with_data(
        format!("Reloaded metadata for {}.", schema),
        response,
    )))
}
