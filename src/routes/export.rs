//! Export route handlers
//!
//! Both endpoints run the same export; one wraps the script in JSON with the
//! summary and warnings, the other returns the script itself.

use crate::error::{validation_error, ApiResult, AppError};
use crate::export::{ExportOptions, ExportResult, ExportWarning, Exporter, RowId, ScriptGenerator};
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::extract::{Path, State};
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

const WARNINGS_HEADER: HeaderName = HeaderName::from_static("x-export-warnings");

/// Request to export one row and its dependencies
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[validate(length(min = 1, message = "Table name is required"))]
    pub table: String,

    /// Numeric or textual primary-key value
    pub id: RowId,

    /// Fail instead of warning when a dependency cannot be exported
    pub strict: Option<bool>,

    #[validate(range(min = 1, max = 4096, message = "maxDepth must be between 1 and 4096"))]
    pub max_depth: Option<usize>,

    #[validate(range(min = 1, message = "timeoutSecs must be positive"))]
    pub timeout_secs: Option<u64>,
}

impl ExportRequest {
    fn options(&self, defaults: &ExportOptions) -> ExportOptions {
        ExportOptions {
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            strict: self.strict.unwrap_or(defaults.strict),
            timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .or(defaults.timeout),
        }
    }
}

/// Export summary returned as JSON
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub records: usize,
    pub tables: BTreeMap<String, usize>,
    pub warnings: Vec<ExportWarning>,
    pub script: String,
}

async fn run_export(
    state: &SharedState,
    connection_id: Uuid,
    payload: &ExportRequest,
) -> Result<(ExportResult, String), AppError> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let pool = state.connections.get_pool(connection_id).await?;
    let exporter = Exporter::new(pool, payload.options(&state.export_defaults));
    let result = exporter.export(&payload.table, &payload.id).await?;
    let script = ScriptGenerator::new().render(&result.records);

    info!(
        "Exported {} = {} from {}: {} record(s), {} warning(s)",
        payload.table,
        payload.id,
        connection_id,
        result.len(),
        result.warnings.len()
    );
    Ok((result, script))
}

pub async fn export_json(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ExportRequest>,
) -> ApiResult<Json<SuccessResponse<ExportResponse>>> {
    let (result, script) = run_export(&state, id, &payload).await?;

    let response = ExportResponse {
        records: result.len(),
        tables: result.table_counts(),
        warnings: result.warnings,
        script,
    };

    Ok(Json(SuccessResponse::with_data(
        format!("Exported {} record(s) (including dependencies).", response.records),
        response,
    )))
}

pub async fn export_sql(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ExportRequest>,
) -> ApiResult<Response> {
    let (result, script) = run_export(&state, id, &payload).await?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/sql; charset=utf-8"),
            ),
            (WARNINGS_HEADER, HeaderValue::from(result.warnings.len())),
        ],
        script,
    )
        .into_response())
}
