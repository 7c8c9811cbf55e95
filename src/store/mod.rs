//! Log record store.
//!
//! The record store is a collaborator: it owns the records, this service
//! only reads them. All trait methods are read-only and safe to call
//! concurrently from any number of stream sessions and one-shot requests
//! with no extra coordination.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::filter::{FilterSpec, Granularity, PageSpec, SortSpec};
use crate::model::{LogRecord, Severity};

pub mod sqlite;

pub use sqlite::SqliteLogStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// One page of records together with the total count of all records
/// matching the filter, both computed from the same read snapshot.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub items: Vec<LogRecord>,
    pub total: u64,
}

/// Severity and source breakdowns computed from the same read snapshot.
/// Only present severities and sources appear; zero-filling is the
/// aggregation engine's job.
#[derive(Debug, Clone, Default)]
pub struct AggregateCounts {
    pub by_severity: Vec<(Severity, u64)>,
    pub by_source: Vec<(String, u64)>,
}

/// Read access to the log record store.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Fetch one page of matching records plus the filter's total count.
    /// The page and the total must come from a single consistent view of
    /// the data.
    async fn fetch_page(
        &self,
        filter: &FilterSpec,
        sort: &SortSpec,
        page: &PageSpec,
    ) -> Result<PageSnapshot, StoreError>;

    /// Fetch a single record by id.
    async fn fetch_record(&self, id: Uuid) -> Result<Option<LogRecord>, StoreError>;

    /// Count records matching the filter.
    async fn count(&self, filter: &FilterSpec) -> Result<u64, StoreError>;

    /// Severity and source counts for the filter, from one snapshot.
    async fn aggregate(&self, filter: &FilterSpec) -> Result<AggregateCounts, StoreError>;

    /// Sparse per-bucket counts at the given granularity, keyed by bucket
    /// start and ordered ascending. Empty buckets are absent here; the
    /// aggregation engine densifies the series.
    async fn bucket_counts(
        &self,
        filter: &FilterSpec,
        granularity: Granularity,
    ) -> Result<Vec<(DateTime<Utc>, u64)>, StoreError>;
}
