//! Connection management route handlers
//!
//! Credentials, per-environment connect/disconnect, and schema listings.

use crate::connection::ConnectionInfo;
use crate::error::{validation_error, ApiResult};
use crate::models::{MessageResponse, SuccessResponse};
use crate::snapshot::store::CacheStats;
use crate::snapshot::NameDiff;
use crate::state::SharedState;
use crate::tunnel::{AwsCredentials, ParsedExports};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

/// Pasted `export AWS_...=...` lines
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    #[validate(length(min = 1, message = "Credential text is required"))]
    pub exports: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsResponse {
    #[serde(flatten)]
    pub parsed: ParsedExports,
    pub stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
}

/// Parse credentials and keep them for later connects
pub async fn set_credentials(
    State(state): State<SharedState>,
    Json(payload): Json<CredentialsRequest>,
) -> ApiResult<Json<SuccessResponse<CredentialsResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let parsed = AwsCredentials::parse_exports(&payload.exports);
    let access_key = parsed.credentials.as_ref().map(AwsCredentials::masked_key);
    let stored = parsed.credentials.is_some();

    let message = if stored {
        *state.credentials.write().await = parsed.credentials.clone();
        info!("Stored AWS credentials ({} keys set)", parsed.keys_set.len());
        format!("Credentials stored ({} keys set).", parsed.keys_set.len())
    } else {
        format!("Credentials incomplete; missing {}.", parsed.missing.join(", "))
    };

    Ok(Json(SuccessResponse::with_data(
        message,
        CredentialsResponse {
            parsed,
            stored,
            access_key,
        },
    )))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[validate(length(min = 1, message = "Environment is required"))]
    pub environment: String,

    /// Export text used for this connect only
    pub credentials: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub connection: ConnectionInfo,
}

/// Open the tunnel and pool for an environment
pub async fn connect(
    State(state): State<SharedState>,
    Json(payload): Json<ConnectRequest>,
) -> ApiResult<Json<SuccessResponse<ConnectResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let explicit = match payload.credentials.as_deref() {
        Some(text) => {
            let parsed = AwsCredentials::parse_exports(text);
            match parsed.credentials {
                Some(creds) => Some(creds),
                None => {
                    return Err(validation_error(format!(
                        "Credentials incomplete; missing {}",
                        parsed.missing.join(", ")
                    )))
                }
            }
        }
        None => None,
    };
    let credentials = state.resolve_credentials(explicit).await;

    debug!("Connecting to environment {}", payload.environment);
    let connection = state.connections.connect(&payload.environment, credentials).await?;

    // A fresh connection may see a different catalog
    state.cache.invalidate_environment(&connection.environment).await;

    Ok(Json(SuccessResponse::with_data(
        format!(
            "Connected to {} ({} schemas).",
            connection.environment,
            connection.schemas.len()
        ),
        ConnectResponse { connection },
    )))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionListResponse {
    pub connections: Vec<ConnectionInfo>,
    pub environments: Vec<String>,
    pub cache: CacheStats,
}

/// Connected environments plus every configured name
pub async fn list_connections(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<ConnectionListResponse>>> {
    let connections = state.connections.list().await;
    Ok(Json(SuccessResponse::with_data(
        format!("{} active connection(s).", connections.len()),
        ConnectionListResponse {
            connections,
            environments: state.connections.environment_names(),
            cache: state.cache.stats().await,
        },
    )))
}

pub async fn disconnect(
    State(state): State<SharedState>,
    Path(environment): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let (name, _) = state.connections.resolve_environment(&environment)?;
    state.connections.disconnect(&name).await?;
    state.cache.invalidate_environment(&name).await;

    Ok(Json(MessageResponse::new(format!("Disconnected from {}.", name))))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaListResponse {
    pub environment: String,
    pub schemas: Vec<String>,
}

pub async fn list_schemas(
    State(state): State<SharedState>,
    Path(environment): Path<String>,
) -> ApiResult<Json<SuccessResponse<SchemaListResponse>>> {
    let (name, _) = state.connections.resolve_environment(&environment)?;
    let schemas = state.connections.schemas(&name).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("{} schema(s) in {}.", schemas.len(), name),
        SchemaListResponse {
            environment: name,
            schemas,
        },
    )))
}

#[derive(Debug, Deserialize)]
pub struct SchemaDiffQuery {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiffResponse {
    pub left: String,
    pub right: String,
    #[serde(flatten)]
    pub diff: NameDiff,
}

/// Schema names present in only one of two connected environments
pub async fn schema_diff(
    State(state): State<SharedState>,
    Query(query): Query<SchemaDiffQuery>,
) -> ApiResult<Json<SuccessResponse<SchemaDiffResponse>>> {
    let diff = state.connections.schema_diff(&query.left, &query.right).await?;
    Ok(Json(SuccessResponse::with_data(
        format!(
            "{} schema(s) only in {}, {} only in {}.",
            diff.only_in_a.len(),
            query.left,
            diff.only_in_b.len(),
            query.right
        ),
        SchemaDiffResponse {
            left: query.left,
            right: query.right,
            diff,
        },
    )))
}
