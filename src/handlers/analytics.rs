//! One-shot analytics endpoints. All three share the same filter
//! parameters; see the SSE module for the streaming variants.

use axum::extract::{Query, State};
use axum::Json;

use crate::analytics::{self, AggregatedStats, DistributionSet, TrendSeries};
use crate::error::AppError;
use crate::filter::{self, RawStatsQuery};

use super::AppState;

/// GET /api/analytics/aggregated - totals and breakdowns
pub async fn get_aggregated(
    State(state): State<AppState>,
    Query(raw): Query<RawStatsQuery>,
) -> Result<Json<AggregatedStats>, AppError> {
    let filter = filter::compile_stats_filter(&raw)?;
    let stats = analytics::aggregated(state.store.as_ref(), &filter).await?;
    Ok(Json(stats))
}

/// GET /api/analytics/trend - dense time-bucketed series
pub async fn get_trend(
    State(state): State<AppState>,
    Query(raw): Query<RawStatsQuery>,
) -> Result<Json<TrendSeries>, AppError> {
    let filter = filter::compile_stats_filter(&raw)?;
    let granularity = filter::compile_granularity(raw.granularity.as_deref())?;
    let series = analytics::trend(state.store.as_ref(), &filter, granularity).await?;
    Ok(Json(series))
}

/// GET /api/analytics/distribution - severity distribution
pub async fn get_distribution(
    State(state): State<AppState>,
    Query(raw): Query<RawStatsQuery>,
) -> Result<Json<DistributionSet>, AppError> {
    let filter = filter::compile_stats_filter(&raw)?;
    let set = analytics::distribution(state.store.as_ref(), &filter).await?;
    Ok(Json(set))
}
