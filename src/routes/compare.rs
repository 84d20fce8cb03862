//! Environment compare route handler

use crate::error::{validation_error, ApiResult};
use crate::models::SuccessResponse;
use crate::snapshot::{CompareMetrics, DiffEngine, TableDiff};
use crate::state::SharedState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    #[validate(length(min = 1, message = "Left environment is required"))]
    pub left_environment: String,
    #[validate(length(min = 1, message = "Left schema is required"))]
    pub left_schema: String,
    #[validate(length(min = 1, message = "Right environment is required"))]
    pub right_environment: String,
    #[validate(length(min = 1, message = "Right schema is required"))]
    pub right_schema: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareSide {
    pub environment: String,
    pub schema: String,
    pub tables: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResponse {
    pub left: CompareSide,
    pub right: CompareSide,
    pub diff: TableDiff,
    pub metrics: CompareMetrics,
}

/// Diff two cached snapshots by table and column names
pub async fn compare(
    State(state): State<SharedState>,
    Json(payload): Json<CompareRequest>,
) -> ApiResult<Json<SuccessResponse<CompareResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let (left_env, _) = state.connections.resolve_environment(&payload.left_environment)?;
    let (right_env, _) = state.connections.resolve_environment(&payload.right_environment)?;
    let left = state.snapshot(&left_env, &payload.left_schema).await?;
    let right = state.snapshot(&right_env, &payload.right_schema).await?;

    // An empty snapshot may just be a failed load
    for (env, snap) in [(&left_env, &left), (&right_env, &right)] {
        if snap.is_empty() {
            warn!("Comparing against empty snapshot {}.{}", env, snap.schema);
        }
    }

    let diff = DiffEngine::diff(&left, &right);
    let metrics = diff.metrics();
    info!(
        "Compared {}.{} with {}.{}: match rate {}%",
        left_env, left.schema, right_env, right.schema, metrics.match_rate
    );

    Ok(Json(SuccessResponse::with_data(
        format!(
            "{} table(s) only in {}, {} only in {}, {} with column differences.",
            diff.only_in_a.len(),
            left_env,
            diff.only_in_b.len(),
            right_env,
            metrics.tables_with_differences
        ),
        CompareResponse {
            left: CompareSide {
                environment: left_env.clone(),
                schema: left.schema.clone(),
                tables: left.tables.len(),
            },
            right: CompareSide {
                environment: right_env.clone(),
                schema: right.schema.clone(),
                tables: right.tables.len(),
            },
            diff,
            metrics,
        },
    )))
}
