//! Code impact route handlers
//!
//! Reference search for a table or column, and the unused-objects scan,
//! over a local directory or a remote repository.

use crate::error::{validation_error, ApiResult};
use crate::impact::{
    load_corpus, Corpus, CorpusSource, ImpactError, ImpactResult, OrgScanSummary, PatternBattery, Scanner, Target,
    UnusedReport,
};
use crate::models::SuccessResponse;
use crate::state::{AppState, SharedState};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOptions {
    pub source: CorpusSource,
    /// Defaults to the configured extension list
    pub extensions: Option<Vec<String>>,
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactResponse<T: Serialize> {
    pub source: String,
    #[serde(flatten)]
    pub result: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrgScanSummary>,
}

async fn corpus_for(state: &AppState, options: &SourceOptions) -> Result<(Corpus, Option<OrgScanSummary>), ImpactError> {
    let extensions = options
        .extensions
        .clone()
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| state.settings.scanner.extensions.clone());
    let fetcher = state.repo_fetcher(options.token.clone());
    load_corpus(&options.source, &extensions, &fetcher).await
}

async fn reference_scan(state: &AppState, options: &SourceOptions, target: Target) -> ApiResult<ImpactResponse<ImpactResult>> {
    let battery = PatternBattery::for_target(&target).map_err(ImpactError::from)?;
    let (corpus, organization) = corpus_for(state, options).await?;
    let result = Scanner::scan(&corpus, &battery, &target.describe());
    Ok(ImpactResponse {
        source: options.source.describe(),
        result,
        organization,
    })
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TableImpactRequest {
    #[serde(flatten)]
    pub options: SourceOptions,

    #[validate(length(min = 1, message = "Table name is required"))]
    pub table: String,
}

pub async fn table_impact(
    State(state): State<SharedState>,
    Json(payload): Json<TableImpactRequest>,
) -> ApiResult<Json<SuccessResponse<ImpactResponse<ImpactResult>>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let target = Target::Table {
        table: payload.table.clone(),
    };
    let response = reference_scan(&state, &payload.options, target).await?;
    Ok(Json(SuccessResponse::with_data(
        format!(
            "Found {} references to {} in {} files.",
            response.result.total_references,
            payload.table,
            response.result.files.len()
        ),
        response,
    )))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ColumnImpactRequest {
    #[serde(flatten)]
    pub options: SourceOptions,

    #[validate(length(min = 1, message = "Table name is required"))]
    pub table: String,

    #[validate(length(min = 1, message = "Column name is required"))]
    pub column: String,
}

pub async fn column_impact(
    State(state): State<SharedState>,
    Json(payload): Json<ColumnImpactRequest>,
) -> ApiResult<Json<SuccessResponse<ImpactResponse<ImpactResult>>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let target = Target::Column {
        table: payload.table.clone(),
        column: payload.column.clone(),
    };
    let response = reference_scan(&state, &payload.options, target).await?;
    Ok(Json(SuccessResponse::with_data(
        format!(
            "Found {} references to {}.{} in {} files.",
            response.result.total_references,
            payload.table,
            payload.column,
            response.result.files.len()
        ),
        response,
    )))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UnusedRequest {
    #[serde(flatten)]
    pub options: SourceOptions,

    #[validate(length(min = 1, message = "Environment is required"))]
    pub environment: String,

    #[validate(length(min = 1, message = "Select at least one schema"))]
    pub schemas: Vec<String>,
}

/// Tables and columns of the selected schemas that never occur in the corpus.
/// Names are reported as `schema.table` and `schema.table.column`.
pub async fn unused_objects(
    State(state): State<SharedState>,
    Json(payload): Json<UnusedRequest>,
) -> ApiResult<Json<SuccessResponse<ImpactResponse<UnusedReport>>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let mut tables = Vec::new();
    let mut columns = Vec::new();
    for schema in &payload.schemas {
        let snapshot = state.snapshot(&payload.environment, schema).await?;
        for table in &snapshot.tables {
            tables.push(format!("{}.{}", schema, table));
            columns.extend(
                snapshot
                    .columns_of(table)
                    .iter()
                    .map(|c| format!("{}.{}.{}", schema, table, c)),
            );
        }
    }

    let (corpus, organization) = corpus_for(&state, &payload.options).await?;
    let report = Scanner::find_unused(&corpus, &tables, &columns);

    Ok(Json(SuccessResponse::with_data(
        format!(
            "{} of {} tables appear unused.",
            report.unused_tables.len(),
            report.total_tables
        ),
        ImpactResponse {
            source: payload.options.source.describe(),
            result: report,
            organization,
        },
    )))
}
