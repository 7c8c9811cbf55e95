//! Log list, single-record fetch, and CSV export.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::filter::{self, PageSpec, RawLogQuery};
use crate::model::LogRecord;
use crate::query::{self, LogPage};

use super::AppState;

/// Hard cap on CSV export size.
const EXPORT_MAX_ROWS: u32 = 10_000;

/// GET /api/logs - filtered, searched, sorted, paginated log list
pub async fn list_logs(
    State(state): State<AppState>,
    Query(raw): Query<RawLogQuery>,
) -> Result<Json<LogPage>, AppError> {
    let compiled = filter::compile_list_query(&raw)?;
    let page = query::fetch_logs(
        state.store.as_ref(),
        &compiled.filter,
        &compiled.sort,
        &compiled.page,
    )
    .await?;
    Ok(Json(page))
}

/// GET /api/logs/:id - single record by id
pub async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LogRecord>, AppError> {
    // Parse the id by hand so a malformed one gets the same structured
    // error body as every other invalid input.
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::invalid_filter("id", format!("'{}' is not a record id", id)))?;
    match state.store.fetch_record(id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound(format!("log {} not found", id))),
    }
}

/// GET /api/logs/export - CSV export of the filtered set
pub async fn export_logs(
    State(state): State<AppState>,
    Query(raw): Query<RawLogQuery>,
) -> Result<Response, AppError> {
    let compiled = filter::compile_list_query(&raw)?;
    let page = PageSpec {
        page: 1,
        page_size: EXPORT_MAX_ROWS,
    };
    let snapshot = state
        .store
        .fetch_page(&compiled.filter, &compiled.sort, &page)
        .await?;

    let mut csv = String::from("id,timestamp,severity,source,message\n");
    for record in &snapshot.items {
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            record.id,
            record.timestamp.to_rfc3339(),
            record.severity,
            csv_field(&record.source),
            csv_field(&record.message),
        ));
    }

    let filename = format!(
        "logs_export_{}.csv",
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        csv,
    )
        .into_response())
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
