//! Aggregation engine: derived views over the filtered record set.
//!
//! Three independent read-only computations share one `FilterSpec`
//! (pagination and sort do not apply here). Each is a single indexed
//! GROUP BY in the store, cheap enough to re-run on every stream tick.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::filter::{FilterSpec, Granularity};
use crate::model::Severity;
use crate::store::{LogStore, StoreError};

/// Default trend window when the filter has no time range.
const DEFAULT_HOUR_WINDOW: i64 = 24; // hours
const DEFAULT_DAY_WINDOW: i64 = 30; // days

/// Matching total plus breakdowns. All five severity keys are always
/// present (zero-filled); only sources that actually occur appear.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedStats {
    pub total_logs: u64,
    pub by_severity: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

/// Dense time series: buckets are contiguous and evenly spaced, and empty
/// buckets appear with count 0 (downstream charting assumes density).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub data_points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionItem {
    pub label: String,
    pub count: u64,
}

/// Per-severity counts in canonical severity order, zero severities
/// omitted (unlike `AggregatedStats`, which always emits all five).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSet {
    pub items: Vec<DistributionItem>,
}

pub async fn aggregated(
    store: &dyn LogStore,
    filter: &FilterSpec,
) -> Result<AggregatedStats, StoreError> {
    let counts = store.aggregate(filter).await?;

    let mut by_severity: BTreeMap<String, u64> = Severity::ALL
        .iter()
        .map(|severity| (severity.label().to_string(), 0))
        .collect();
    // Total is the sum of the severity counts from the same snapshot, so
    // sum(by_severity) == total holds by construction.
    let mut total_logs = 0;
    for (severity, count) in &counts.by_severity {
        total_logs += count;
        by_severity.insert(severity.label().to_string(), *count);
    }

    let by_source: BTreeMap<String, u64> = counts.by_source.into_iter().collect();

    Ok(AggregatedStats {
        total_logs,
        by_severity,
        by_source,
    })
}

pub async fn trend(
    store: &dyn LogStore,
    filter: &FilterSpec,
    granularity: Granularity,
) -> Result<TrendSeries, StoreError> {
    let (start, end) = effective_range(filter, granularity, Utc::now());

    let mut scoped = filter.clone();
    scoped.start = Some(start);
    scoped.end = Some(end);

    let sparse: HashMap<i64, u64> = store
        .bucket_counts(&scoped, granularity)
        .await?
        .into_iter()
        .map(|(ts, count)| (ts.timestamp_millis(), count))
        .collect();

    let width = granularity.width_ms();
    let end_ms = end.timestamp_millis();
    let mut bucket = granularity.truncate_ms(start.timestamp_millis());
    let mut data_points = Vec::new();
    while bucket < end_ms {
        if let Some(timestamp) = DateTime::from_timestamp_millis(bucket) {
            data_points.push(TrendPoint {
                timestamp,
                count: sparse.get(&bucket).copied().unwrap_or(0),
            });
        }
        bucket += width;
    }

    Ok(TrendSeries { data_points })
}

pub async fn distribution(
    store: &dyn LogStore,
    filter: &FilterSpec,
) -> Result<DistributionSet, StoreError> {
    let counts = store.aggregate(filter).await?;
    let by_severity: HashMap<Severity, u64> = counts.by_severity.into_iter().collect();

    let items = Severity::ALL
        .iter()
        .filter_map(|severity| {
            by_severity.get(severity).map(|count| DistributionItem {
                label: severity.label().to_string(),
                count: *count,
            })
        })
        .filter(|item| item.count > 0)
        .collect();

    Ok(DistributionSet { items })
}

/// Resolve the half-open `[start, end)` range the trend series covers.
/// Missing bounds default to a recent window ending now.
fn effective_range(
    filter: &FilterSpec,
    granularity: Granularity,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = filter.end.unwrap_or(now);
    let start = filter.start.unwrap_or_else(|| end - default_span(granularity));
    (start, end)
}

fn default_span(granularity: Granularity) -> Duration {
    match granularity {
        Granularity::Hour => Duration::hours(DEFAULT_HOUR_WINDOW),
        Granularity::Day => Duration::days(DEFAULT_DAY_WINDOW),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_effective_range_prefers_filter_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let filter = FilterSpec {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(effective_range(&filter, Granularity::Hour, now), (start, end));
    }

    #[test]
    fn test_effective_range_defaults_to_recent_window() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 15, 30, 0).unwrap();
        let (start, end) = effective_range(&FilterSpec::default(), Granularity::Hour, now);
        assert_eq!(end, now);
        assert_eq!(end - start, Duration::hours(24));

        let (start, end) = effective_range(&FilterSpec::default(), Granularity::Day, now);
        assert_eq!(end - start, Duration::days(30));
        assert_eq!(end, now);
    }

    #[test]
    fn test_open_ended_start_keeps_explicit_end() {
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let filter = FilterSpec {
            end: Some(end),
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let (start, got_end) = effective_range(&filter, Granularity::Hour, now);
        assert_eq!(got_end, end);
        assert_eq!(end - start, Duration::hours(24));
    }
}
