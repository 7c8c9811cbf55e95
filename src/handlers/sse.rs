//! Streaming (SSE) endpoints.
//!
//! Each accepts the analytics filter parameters plus an `interval`
//! (seconds, 1-60, default from config). Validation failures are returned
//! synchronously before a session is opened; once open, the session pushes
//! an event whenever its view changes. Clients are expected to reconnect
//! with a fixed delay on transport errors and to tolerate seeing the same
//! snapshot again after a reconnect.

use axum::extract::{Query, State};
use axum::response::IntoResponse;

use crate::error::AppError;
use crate::filter::{self, RawStatsQuery};
use crate::stream::StreamView;

use super::AppState;

/// GET /api/sse/logs/count - stream the matching-record count
pub async fn stream_logs_count(
    State(state): State<AppState>,
    Query(raw): Query<RawStatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = filter::compile_stats_filter(&raw)?;
    let interval = compile_interval(&state, &raw)?;
    Ok(state.sessions.open(StreamView::Count, filter, interval))
}

/// GET /api/sse/analytics/aggregated - stream aggregated stats
pub async fn stream_aggregated(
    State(state): State<AppState>,
    Query(raw): Query<RawStatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = filter::compile_stats_filter(&raw)?;
    let interval = compile_interval(&state, &raw)?;
    Ok(state.sessions.open(StreamView::Aggregated, filter, interval))
}

/// GET /api/sse/analytics/trend - stream the trend series
pub async fn stream_trend(
    State(state): State<AppState>,
    Query(raw): Query<RawStatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = filter::compile_stats_filter(&raw)?;
    let granularity = filter::compile_granularity(raw.granularity.as_deref())?;
    let interval = compile_interval(&state, &raw)?;
    Ok(state
        .sessions
        .open(StreamView::Trend(granularity), filter, interval))
}

/// GET /api/sse/analytics/distribution - stream the severity distribution
pub async fn stream_distribution(
    State(state): State<AppState>,
    Query(raw): Query<RawStatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = filter::compile_stats_filter(&raw)?;
    let interval = compile_interval(&state, &raw)?;
    Ok(state
        .sessions
        .open(StreamView::Distribution, filter, interval))
}

fn compile_interval(state: &AppState, raw: &RawStatsQuery) -> Result<u64, AppError> {
    filter::compile_interval(
        raw.interval.as_deref(),
        state.config.stream.default_interval_secs,
    )
}
