//! SQLite-backed log store.
//!
//! Reads run in WAL mode, so every transaction sees a stable snapshot of
//! the database. `fetch_page` and `aggregate` wrap their statements in one
//! transaction each, which is what makes a page and its total (or the
//! severity and source breakdowns) mutually consistent under concurrent
//! inserts and retention deletes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::filter::{FilterSpec, Granularity, PageSpec, SortOrder, SortSpec};
use crate::model::{LogRecord, NewLogRecord, Severity};

use super::{AggregateCounts, LogStore, PageSnapshot, StoreError};

/// Minimum search term length for the trigram index. Shorter terms cannot
/// be matched by trigrams and go straight to the LIKE scan.
const MIN_TRIGRAM_CHARS: usize = 3;

pub struct SqliteLogStore {
    pool: SqlitePool,
}

/// How the message search predicate is expressed.
///
/// `Trigram` uses the FTS5 trigram index and is the fast path. `Like` is a
/// full scan with `LIKE '%term%'`; slower, but correct even when the FTS
/// table is missing or corrupt, so every trigram query falls back to it on
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchMode {
    Trigram,
    Like,
}

impl SqliteLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database file, switch it to WAL mode, and run
    /// pending migrations.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::CorruptRow(format!("cannot create data dir: {}", e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a record. Exists for writer collaborators and tests; not
    /// exposed over HTTP.
    pub async fn insert(&self, record: &NewLogRecord) -> Result<LogRecord, StoreError> {
        let id = Uuid::new_v4();
        let timestamp = record.timestamp.unwrap_or_else(Utc::now);

        sqlx::query(
            "INSERT INTO logs (id, timestamp, severity, source, message) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(id.to_string())
        .bind(timestamp.timestamp_millis())
        .bind(record.severity.rank())
        .bind(&record.source)
        .bind(&record.message)
        .execute(&self.pool)
        .await?;

        Ok(LogRecord {
            id,
            timestamp,
            severity: record.severity,
            source: record.source.clone(),
            message: record.message.clone(),
        })
    }

    async fn fetch_page_with(
        &self,
        filter: &FilterSpec,
        sort: &SortSpec,
        page: &PageSpec,
        mode: SearchMode,
    ) -> Result<PageSnapshot, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM logs WHERE 1=1");
        push_predicates(&mut count_query, filter, mode);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await?;

        let mut page_query = QueryBuilder::<Sqlite>::new(
            "SELECT id, timestamp, severity, source, message FROM logs WHERE 1=1",
        );
        push_predicates(&mut page_query, filter, mode);
        page_query.push(" ORDER BY ");
        page_query.push(sort.field.column());
        page_query.push(match sort.order {
            SortOrder::Asc => " ASC",
            SortOrder::Desc => " DESC",
        });
        // Deterministic tie-break so identical queries paginate stably.
        page_query.push(", id ASC");
        page_query.push(" LIMIT ");
        page_query.push_bind(page.page_size as i64);
        page_query.push(" OFFSET ");
        page_query.push_bind(page.offset() as i64);

        let rows: Vec<(String, i64, i64, String, String)> =
            page_query.build_query_as().fetch_all(&mut *tx).await?;

        tx.commit().await?;

        let items = rows
            .into_iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PageSnapshot {
            items,
            total: total as u64,
        })
    }

    async fn count_with(&self, filter: &FilterSpec, mode: SearchMode) -> Result<u64, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM logs WHERE 1=1");
        push_predicates(&mut query, filter, mode);
        let total: i64 = query.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(total as u64)
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn fetch_page(
        &self,
        filter: &FilterSpec,
        sort: &SortSpec,
        page: &PageSpec,
    ) -> Result<PageSnapshot, StoreError> {
        match search_mode(filter) {
            SearchMode::Trigram => {
                match self.fetch_page_with(filter, sort, page, SearchMode::Trigram).await {
                    Ok(snapshot) => Ok(snapshot),
                    Err(StoreError::Database(e)) => {
                        tracing::warn!(error = %e, "trigram search failed, falling back to scan");
                        self.fetch_page_with(filter, sort, page, SearchMode::Like).await
                    }
                    Err(e) => Err(e),
                }
            }
            SearchMode::Like => self.fetch_page_with(filter, sort, page, SearchMode::Like).await,
        }
    }

    async fn fetch_record(&self, id: Uuid) -> Result<Option<LogRecord>, StoreError> {
        let row: Option<(String, i64, i64, String, String)> = sqlx::query_as(
            "SELECT id, timestamp, severity, source, message FROM logs WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_row).transpose()
    }

    async fn count(&self, filter: &FilterSpec) -> Result<u64, StoreError> {
        match search_mode(filter) {
            SearchMode::Trigram => match self.count_with(filter, SearchMode::Trigram).await {
                Ok(total) => Ok(total),
                Err(StoreError::Database(e)) => {
                    tracing::warn!(error = %e, "trigram search failed, falling back to scan");
                    self.count_with(filter, SearchMode::Like).await
                }
                Err(e) => Err(e),
            },
            SearchMode::Like => self.count_with(filter, SearchMode::Like).await,
        }
    }

    async fn aggregate(&self, filter: &FilterSpec) -> Result<AggregateCounts, StoreError> {
        // Analytics filters never carry a search term, so the scan path is
        // used unconditionally here.
        let mut tx = self.pool.begin().await?;

        let mut severity_query = QueryBuilder::<Sqlite>::new(
            "SELECT severity, COUNT(*) FROM logs WHERE 1=1",
        );
        push_predicates(&mut severity_query, filter, SearchMode::Like);
        severity_query.push(" GROUP BY severity ORDER BY severity");
        let severity_rows: Vec<(i64, i64)> = severity_query
            .build_query_as()
            .fetch_all(&mut *tx)
            .await?;

        let mut source_query =
            QueryBuilder::<Sqlite>::new("SELECT source, COUNT(*) FROM logs WHERE 1=1");
        push_predicates(&mut source_query, filter, SearchMode::Like);
        source_query.push(" GROUP BY source ORDER BY source");
        let source_rows: Vec<(String, i64)> = source_query
            .build_query_as()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let by_severity = severity_rows
            .into_iter()
            .map(|(rank, count)| {
                Severity::from_rank(rank)
                    .map(|severity| (severity, count as u64))
                    .ok_or_else(|| StoreError::CorruptRow(format!("unknown severity rank {}", rank)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let by_source = source_rows
            .into_iter()
            .map(|(source, count)| (source, count as u64))
            .collect();

        Ok(AggregateCounts {
            by_severity,
            by_source,
        })
    }

    async fn bucket_counts(
        &self,
        filter: &FilterSpec,
        granularity: Granularity,
    ) -> Result<Vec<(DateTime<Utc>, u64)>, StoreError> {
        let width = granularity.width_ms();

        let mut query = QueryBuilder::<Sqlite>::new("SELECT (timestamp / ");
        query.push_bind(width);
        query.push(") * ");
        query.push_bind(width);
        query.push(" AS bucket, COUNT(*) FROM logs WHERE 1=1");
        push_predicates(&mut query, filter, SearchMode::Like);
        query.push(" GROUP BY bucket ORDER BY bucket");

        let rows: Vec<(i64, i64)> = query.build_query_as().fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(bucket, count)| {
                DateTime::from_timestamp_millis(bucket)
                    .map(|ts| (ts, count as u64))
                    .ok_or_else(|| StoreError::CorruptRow(format!("bucket {} out of range", bucket)))
            })
            .collect()
    }
}

fn search_mode(filter: &FilterSpec) -> SearchMode {
    match &filter.search {
        Some(term) if term.chars().count() >= MIN_TRIGRAM_CHARS => SearchMode::Trigram,
        _ => SearchMode::Like,
    }
}

fn push_predicates(query: &mut QueryBuilder<'_, Sqlite>, filter: &FilterSpec, mode: SearchMode) {
    if let Some(severity) = filter.severity {
        query.push(" AND severity = ");
        query.push_bind(severity.rank());
    }
    if let Some(source) = &filter.source {
        query.push(" AND source = ");
        query.push_bind(source.clone());
    }
    if let Some(start) = filter.start {
        query.push(" AND timestamp >= ");
        query.push_bind(start.timestamp_millis());
    }
    // Half-open range: a record exactly at the end bound is excluded, so
    // trend buckets partition the range without overlap.
    if let Some(end) = filter.end {
        query.push(" AND timestamp < ");
        query.push_bind(end.timestamp_millis());
    }
    if let Some(term) = &filter.search {
        match mode {
            SearchMode::Trigram => {
                query.push(" AND logs.rowid IN (SELECT rowid FROM logs_fts WHERE logs_fts MATCH ");
                query.push_bind(fts_phrase(term));
                query.push(")");
            }
            SearchMode::Like => {
                query.push(" AND message LIKE ");
                query.push_bind(format!("%{}%", escape_like(term)));
                query.push(" ESCAPE '\\'");
            }
        }
    }
}

/// Quote a search term as a single FTS5 phrase. The trigram tokenizer makes
/// a phrase query behave as case-insensitive substring match.
fn fts_phrase(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn decode_row(row: (String, i64, i64, String, String)) -> Result<LogRecord, StoreError> {
    let (id, timestamp, severity, source, message) = row;
    Ok(LogRecord {
        id: Uuid::parse_str(&id)
            .map_err(|_| StoreError::CorruptRow(format!("bad record id '{}'", id)))?,
        timestamp: DateTime::from_timestamp_millis(timestamp)
            .ok_or_else(|| StoreError::CorruptRow(format!("timestamp {} out of range", timestamp)))?,
        severity: Severity::from_rank(severity)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown severity rank {}", severity)))?,
        source,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SortField;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> SqliteLogStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        SqliteLogStore::new(pool)
    }

    fn record(ts_minute: u32, severity: Severity, source: &str, message: &str) -> NewLogRecord {
        NewLogRecord {
            timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, ts_minute, 0).unwrap()),
            severity,
            source: source.to_string(),
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_page_and_total_agree() {
        let store = test_store().await;
        for minute in 0..5 {
            store
                .insert(&record(minute, Severity::Info, "api", "request handled"))
                .await
                .unwrap();
        }

        let page = PageSpec { page: 1, page_size: 2 };
        let snapshot = store
            .fetch_page(&FilterSpec::default(), &SortSpec::default(), &page)
            .await
            .unwrap();
        assert_eq!(snapshot.total, 5);
        assert_eq!(snapshot.items.len(), 2);
    }

    #[tokio::test]
    async fn test_page_beyond_end_is_empty_not_error() {
        let store = test_store().await;
        store
            .insert(&record(0, Severity::Info, "api", "only one"))
            .await
            .unwrap();

        let page = PageSpec { page: 9, page_size: 50 };
        let snapshot = store
            .fetch_page(&FilterSpec::default(), &SortSpec::default(), &page)
            .await
            .unwrap();
        assert_eq!(snapshot.total, 1);
        assert!(snapshot.items.is_empty());
    }

    #[tokio::test]
    async fn test_severity_sorts_by_rank_not_alphabetically() {
        let store = test_store().await;
        store.insert(&record(0, Severity::Warning, "api", "w")).await.unwrap();
        store.insert(&record(1, Severity::Critical, "api", "c")).await.unwrap();
        store.insert(&record(2, Severity::Error, "api", "e")).await.unwrap();

        let sort = SortSpec {
            field: SortField::Severity,
            order: SortOrder::Asc,
        };
        let snapshot = store
            .fetch_page(&FilterSpec::default(), &sort, &PageSpec::default())
            .await
            .unwrap();
        let severities: Vec<Severity> = snapshot.items.iter().map(|r| r.severity).collect();
        // Alphabetical would put CRITICAL before ERROR before WARNING.
        assert_eq!(
            severities,
            vec![Severity::Warning, Severity::Error, Severity::Critical]
        );
    }

    #[tokio::test]
    async fn test_identical_timestamps_tie_break_on_id() {
        let store = test_store().await;
        for i in 0..10 {
            store
                .insert(&record(30, Severity::Info, "api", &format!("dup {}", i)))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        for page in 1..=5 {
            let snapshot = store
                .fetch_page(
                    &FilterSpec::default(),
                    &SortSpec::default(),
                    &PageSpec { page, page_size: 2 },
                )
                .await
                .unwrap();
            seen.extend(snapshot.items.into_iter().map(|r| r.id));
        }
        let mut deduped = seen.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(seen.len(), 10, "no rows skipped across pages");
        assert_eq!(deduped.len(), 10, "no rows duplicated across pages");
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_substring() {
        let store = test_store().await;
        store
            .insert(&record(0, Severity::Error, "db", "Connection TIMEOUT while reading"))
            .await
            .unwrap();
        store
            .insert(&record(1, Severity::Info, "db", "connection established"))
            .await
            .unwrap();

        let filter = FilterSpec {
            search: Some("timeout".to_string()),
            ..Default::default()
        };
        let snapshot = store
            .fetch_page(&filter, &SortSpec::default(), &PageSpec::default())
            .await
            .unwrap();
        assert_eq!(snapshot.total, 1);
        assert!(snapshot.items[0].message.contains("TIMEOUT"));
    }

    #[tokio::test]
    async fn test_short_search_term_uses_scan_path() {
        let store = test_store().await;
        store
            .insert(&record(0, Severity::Info, "api", "GET /health 200 OK"))
            .await
            .unwrap();

        // Two characters cannot form a trigram; this must still match.
        let filter = FilterSpec {
            search: Some("OK".to_string()),
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_like_wildcards_in_search_are_literal() {
        let store = test_store().await;
        store
            .insert(&record(0, Severity::Info, "api", "usage at 95%"))
            .await
            .unwrap();
        store
            .insert(&record(1, Severity::Info, "api", "usage at 95 percent"))
            .await
            .unwrap();

        let filter = FilterSpec {
            search: Some("95%".to_string()),
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_time_range_is_half_open() {
        let store = test_store().await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        store
            .insert(&NewLogRecord {
                timestamp: Some(start),
                severity: Severity::Info,
                source: "api".to_string(),
                message: "at start".to_string(),
            })
            .await
            .unwrap();
        store
            .insert(&NewLogRecord {
                timestamp: Some(end),
                severity: Severity::Info,
                source: "api".to_string(),
                message: "at end".to_string(),
            })
            .await
            .unwrap();

        let filter = FilterSpec {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_aggregate_counts() {
        let store = test_store().await;
        store.insert(&record(0, Severity::Error, "api", "boom")).await.unwrap();
        store.insert(&record(1, Severity::Error, "db", "boom")).await.unwrap();
        store.insert(&record(2, Severity::Info, "api", "fine")).await.unwrap();

        let counts = store.aggregate(&FilterSpec::default()).await.unwrap();
        assert_eq!(
            counts.by_severity,
            vec![(Severity::Info, 1), (Severity::Error, 2)]
        );
        assert_eq!(
            counts.by_source,
            vec![("api".to_string(), 2), ("db".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_bucket_counts_align_to_hour() {
        let store = test_store().await;
        store.insert(&record(5, Severity::Info, "api", "a")).await.unwrap();
        store.insert(&record(55, Severity::Info, "api", "b")).await.unwrap();

        let buckets = store
            .bucket_counts(&FilterSpec::default(), Granularity::Hour)
            .await
            .unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(
            buckets[0].0,
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(buckets[0].1, 2);
    }

    #[tokio::test]
    async fn test_fetch_record_round_trip() {
        let store = test_store().await;
        let inserted = store
            .insert(&record(0, Severity::Critical, "worker", "panic"))
            .await
            .unwrap();

        let fetched = store.fetch_record(inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched, inserted);
        assert!(store.fetch_record(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connect_creates_file_and_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs.db");
        let path = path.to_str().unwrap();

        let store = SqliteLogStore::connect(path).await.unwrap();
        store
            .insert(&record(0, Severity::Info, "api", "persisted"))
            .await
            .unwrap();

        let snapshot = store
            .fetch_page(
                &FilterSpec::default(),
                &SortSpec::default(),
                &PageSpec::default(),
            )
            .await
            .unwrap();
        assert_eq!(snapshot.total, 1);
    }
}
