//! Query route handlers
//!
//! Ad-hoc SQL, CSV download, and column suggestions.

use crate::error::{validation_error, ApiResult};
use crate::models::SuccessResponse;
use crate::query::{QueryResult, QueryRunner, Suggestion, DEFAULT_LIMIT, MAX_LIMIT};
use crate::state::SharedState;
use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[validate(length(min = 1, message = "Environment is required"))]
    pub environment: String,

    #[validate(length(min = 1, message = "Schema is required"))]
    pub schema: String,

    #[validate(length(min = 1, message = "Query is required"))]
    pub sql: String,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 10000, message = "Limit must be between 1 and 10000"))]
    pub limit: u32,
}

async fn run(state: &SharedState, payload: &QueryRequest) -> ApiResult<QueryResult> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    let (name, _) = state.connections.resolve_environment(&payload.environment)?;
    let pool = state.connections.ensure_connected(&name).await?;
    QueryRunner::execute(&pool, &name, &payload.schema, &payload.sql, payload.limit.min(MAX_LIMIT)).await
}

/// Run a query and return rows as JSON
pub async fn execute(
    State(state): State<SharedState>,
    Json(payload): Json<QueryRequest>,
) -> ApiResult<Json<SuccessResponse<QueryResult>>> {
    let result = run(&state, &payload).await?;
    Ok(Json(SuccessResponse::with_data(
        format!(
            "Query returned {} rows in {}s.",
            result.row_count, result.execution_time
        ),
        result,
    )))
}

/// Run a query and download the rows as CSV
pub async fn execute_csv(
    State(state): State<SharedState>,
    Json(payload): Json<QueryRequest>,
) -> ApiResult<Response> {
    let result = run(&state, &payload).await?;
    let csv = result.to_csv()?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", result.csv_file_name()))
        .map_err(|e| validation_error(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    #[validate(length(min = 1, message = "Environment is required"))]
    pub environment: String,

    #[validate(length(min = 1, message = "Schema is required"))]
    pub schema: String,

    #[serde(default)]
    pub draft: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    #[serde(flatten)]
    pub suggestion: Suggestion,
    pub help: String,
}

/// Columns for a trailing `table.` in the draft, from the cached snapshot
pub async fn suggest(
    State(state): State<SharedState>,
    Json(payload): Json<SuggestRequest>,
) -> ApiResult<Json<SuccessResponse<SuggestResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let snapshot = state.snapshot(&payload.environment, &payload.schema).await?;
    let suggestion = QueryRunner::suggest(&snapshot, &payload.draft);
    let help = QueryRunner::help_text(&snapshot);

    Ok(Json(SuccessResponse::with_data(
        format!("{} suggestion(s).", suggestion.columns.len()),
        SuggestResponse { suggestion, help },
    )))
}
