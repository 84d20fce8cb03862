//! ERD route handlers
//!
//! Generation, export, and the exclusion list of the last generation.

use crate::erd::report::{ForeignKeyGroup, PrimaryKeyGroup, SizeReport};
use crate::erd::service::{self, ExportFormat, GraphSummary};
use crate::erd::{ExclusionRecord, Graph, GraphOptions};
use crate::error::{bad_request_error, not_found_error, validation_error, ApiResult};
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ErdRequest {
    #[validate(length(min = 1, message = "Environment is required"))]
    pub environment: String,

    #[validate(length(min = 1, message = "Select at least one schema"))]
    pub schemas: Vec<String>,

    pub options: Option<GraphOptions>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErdResponse {
    pub environment: String,
    pub schemas: Vec<String>,
    pub summary: GraphSummary,
    pub graph: Graph,
    pub dot: String,
    pub exclusions: Vec<ExclusionRecord>,
    pub primary_keys: Vec<PrimaryKeyGroup>,
    pub foreign_keys: Vec<ForeignKeyGroup>,
    pub sizes: SizeReport,
    /// Seconds
    pub elapsed: f64,
}

/// Generate a diagram for a schema selection
pub async fn generate(
    State(state): State<SharedState>,
    Json(payload): Json<ErdRequest>,
) -> ApiResult<Json<SuccessResponse<ErdResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let options = payload
        .options
        .unwrap_or_else(|| service::default_options(&state.settings.erd));
    let generation = service::generate(&state, &payload.environment, &payload.schemas, options).await?;
    let summary = generation.summary();

    let message = format!(
        "ERD generated: {} tables, {} relationships, {} excluded.",
        summary.tables, summary.edges, summary.excluded
    );
    let output = generation.output;
    Ok(Json(SuccessResponse::with_data(
        message,
        ErdResponse {
            environment: generation.environment,
            schemas: generation.schemas,
            summary,
            graph: output.graph,
            dot: output.dot,
            exclusions: output.excluded,
            primary_keys: output.primary_keys,
            foreign_keys: output.foreign_keys,
            sizes: generation.sizes,
            elapsed: generation.elapsed,
        },
    )))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[validate(length(min = 1, message = "Environment is required"))]
    pub environment: String,

    #[validate(length(min = 1, message = "Select at least one schema"))]
    pub schemas: Vec<String>,

    pub options: Option<GraphOptions>,

    #[serde(default)]
    pub format: ExportFormat,
}

/// Generate and download as DOT or PNG. A PNG request without Graphviz
/// gets the DOT source and an `x-export-fallback` header.
pub async fn export(
    State(state): State<SharedState>,
    Json(payload): Json<ExportRequest>,
) -> ApiResult<Response> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let options = payload
        .options
        .unwrap_or_else(|| service::default_options(&state.settings.erd));
    let generation = service::generate(&state, &payload.environment, &payload.schemas, options).await?;
    let export = service::export(&generation, payload.format, &state.settings.erd.dot_binary).await;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", export.file_name))
        .map_err(|e| validation_error(e.to_string()))?;
    let mut response = (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(export.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.bytes,
    )
        .into_response();

    if export.format != payload.format {
        response.headers_mut().insert(
            HeaderName::from_static("x-export-fallback"),
            HeaderValue::from_static("dot"),
        );
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct ExclusionQuery {
    pub environment: String,
    /// Comma-separated
    pub schemas: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionResponse {
    pub exclusions: Vec<ExclusionRecord>,
}

pub async fn exclusions(
    State(state): State<SharedState>,
    Query(query): Query<ExclusionQuery>,
) -> ApiResult<Json<SuccessResponse<ExclusionResponse>>> {
    let schemas: Vec<String> = query
        .schemas
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if schemas.is_empty() {
        return Err(bad_request_error("Query parameter `schemas` lists no schema"));
    }

    let exclusions = service::exclusions(&state, &query.environment, &schemas)
        .await?
        .ok_or_else(|| not_found_error("No ERD has been generated for this selection"))?;

    Ok(Json(SuccessResponse::with_data(
        format!("{} excluded table(s).", exclusions.len()),
        ExclusionResponse { exclusions },
    )))
}
