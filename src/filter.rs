//! Filter compilation.
//!
//! Turns raw string query parameters into typed, validated descriptors.
//! This module is pure: it never touches storage, so malformed input is
//! rejected before any read happens.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::model::Severity;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MIN_INTERVAL_SECS: u64 = 1;
pub const MAX_INTERVAL_SECS: u64 = 60;

/// Raw query parameters for the log list endpoint. Everything arrives as
/// strings; `compile_list_query` does all validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLogQuery {
    pub severity: Option<String>,
    pub source: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

/// Raw query parameters shared by the analytics and SSE endpoints.
/// `search` is deliberately absent: it applies to the list endpoint only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStatsQuery {
    pub severity: Option<String>,
    pub source: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub granularity: Option<String>,
    pub interval: Option<String>,
}

/// Validated record constraints. Absent fields mean "no constraint".
/// The time range is half-open: `start <= timestamp < end`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub severity: Option<Severity>,
    pub source: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Timestamp,
    Severity,
    Source,
}

impl SortField {
    /// Column the field sorts on. Severity is stored as its canonical rank,
    /// so ordering by the column already follows the canonical ordering.
    pub fn column(self) -> &'static str {
        match self {
            SortField::Timestamp => "timestamp",
            SortField::Severity => "severity",
            SortField::Source => "source",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::Timestamp,
            order: SortOrder::Desc,
        }
    }
}

/// Validated pagination request. `page_size` above `MAX_PAGE_SIZE` is
/// clamped, not rejected; the effective size is echoed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageSpec {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageSpec {
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }
}

/// Fixed bucket width for trend series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    pub fn width_ms(self) -> i64 {
        match self {
            Granularity::Hour => 3_600_000,
            Granularity::Day => 86_400_000,
        }
    }

    /// Align an epoch-millisecond timestamp down to its bucket start.
    pub fn truncate_ms(self, ts: i64) -> i64 {
        ts - ts.rem_euclid(self.width_ms())
    }
}

/// Fully compiled list request.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filter: FilterSpec,
    pub sort: SortSpec,
    pub page: PageSpec,
}

/// Compile the list endpoint's raw parameters.
pub fn compile_list_query(raw: &RawLogQuery) -> Result<ListQuery, AppError> {
    let mut filter = compile_filter(
        raw.severity.as_deref(),
        raw.source.as_deref(),
        raw.start_date.as_deref(),
        raw.end_date.as_deref(),
    )?;
    filter.search = non_empty(raw.search.as_deref());

    let sort = compile_sort(raw.sort_by.as_deref(), raw.sort_order.as_deref())?;
    let page = compile_page(raw.page.as_deref(), raw.page_size.as_deref())?;

    Ok(ListQuery { filter, sort, page })
}

/// Compile the analytics/SSE filter (no search, sort, or pagination).
pub fn compile_stats_filter(raw: &RawStatsQuery) -> Result<FilterSpec, AppError> {
    compile_filter(
        raw.severity.as_deref(),
        raw.source.as_deref(),
        raw.start_date.as_deref(),
        raw.end_date.as_deref(),
    )
}

fn compile_filter(
    severity: Option<&str>,
    source: Option<&str>,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<FilterSpec, AppError> {
    let severity = match non_empty(severity) {
        Some(value) => Some(Severity::parse(&value).ok_or_else(|| {
            AppError::invalid_filter(
                "severity",
                format!(
                    "'{}' is not a severity; expected one of DEBUG, INFO, WARNING, ERROR, CRITICAL",
                    value
                ),
            )
        })?),
        None => None,
    };

    let start = match non_empty(start_date) {
        Some(value) => Some(parse_datetime("start_date", &value)?),
        None => None,
    };
    let end = match non_empty(end_date) {
        Some(value) => Some(parse_datetime("end_date", &value)?),
        None => None,
    };

    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::invalid_filter(
                "end_date",
                "end_date must not be before start_date",
            ));
        }
    }

    Ok(FilterSpec {
        severity,
        source: non_empty(source),
        start,
        end,
        search: None,
    })
}

fn compile_sort(sort_by: Option<&str>, sort_order: Option<&str>) -> Result<SortSpec, AppError> {
    let field = match non_empty(sort_by).as_deref() {
        None | Some("timestamp") => SortField::Timestamp,
        Some("severity") => SortField::Severity,
        Some("source") => SortField::Source,
        Some(other) => {
            return Err(AppError::invalid_filter(
                "sort_by",
                format!(
                    "'{}' is not sortable; expected timestamp, severity, or source",
                    other
                ),
            ))
        }
    };

    let order = match non_empty(sort_order).as_deref() {
        None | Some("desc") => SortOrder::Desc,
        Some("asc") => SortOrder::Asc,
        Some(other) => {
            return Err(AppError::invalid_filter(
                "sort_order",
                format!("'{}' is not a sort order; expected asc or desc", other),
            ))
        }
    };

    Ok(SortSpec { field, order })
}

fn compile_page(page: Option<&str>, page_size: Option<&str>) -> Result<PageSpec, AppError> {
    let page = match non_empty(page) {
        Some(value) => {
            let number: u32 = value
                .parse()
                .map_err(|_| AppError::invalid_filter("page", "page must be a positive integer"))?;
            if number < 1 {
                return Err(AppError::invalid_filter("page", "page must be >= 1"));
            }
            number
        }
        None => 1,
    };

    let page_size = match non_empty(page_size) {
        Some(value) => {
            let size: u32 = value.parse().map_err(|_| {
                AppError::invalid_filter("page_size", "page_size must be a positive integer")
            })?;
            if size < 1 {
                return Err(AppError::invalid_filter("page_size", "page_size must be >= 1"));
            }
            // Oversized requests are clamped, not rejected; the effective
            // size is echoed back in the response.
            size.min(MAX_PAGE_SIZE)
        }
        None => DEFAULT_PAGE_SIZE,
    };

    Ok(PageSpec { page, page_size })
}

pub fn compile_granularity(raw: Option<&str>) -> Result<Granularity, AppError> {
    match non_empty(raw).as_deref() {
        None | Some("hour") => Ok(Granularity::Hour),
        Some("day") => Ok(Granularity::Day),
        Some(other) => Err(AppError::invalid_filter(
            "granularity",
            format!("'{}' is not a granularity; expected hour or day", other),
        )),
    }
}

/// Validate a stream push interval in seconds.
pub fn compile_interval(raw: Option<&str>, default_secs: u64) -> Result<u64, AppError> {
    match non_empty(raw) {
        Some(value) => {
            let secs: u64 = value.parse().map_err(|_| {
                AppError::invalid_filter("interval", "interval must be an integer number of seconds")
            })?;
            if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
                return Err(AppError::invalid_filter(
                    "interval",
                    format!(
                        "interval must be between {} and {} seconds",
                        MIN_INTERVAL_SECS, MAX_INTERVAL_SECS
                    ),
                ));
            }
            Ok(secs)
        }
        None => Ok(default_secs),
    }
}

/// Parse a UTC date-time in RFC 3339, `YYYY-MM-DDTHH:MM[:SS]`, or bare
/// `YYYY-MM-DD` (midnight) form.
fn parse_datetime(field: &'static str, value: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(AppError::invalid_filter(
        field,
        format!("'{}' is not a valid date-time", value),
    ))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
