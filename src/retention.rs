//! Age-based record cleanup.
//!
//! Deletions interleave with concurrent reads; readers stay consistent
//! because every page/total pair is computed inside a single read
//! transaction (see the store module).

use chrono::{Timelike, Utc};
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::time::interval;

use crate::config::RetentionConfig;

/// Start the cleanup task.
///
/// Runs hourly and deletes expired records when the configured cleanup
/// hour comes around.
pub fn start_retention_task(
    pool: SqlitePool,
    config: RetentionConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(3600));

        loop {
            ticker.tick().await;

            if !should_run_cleanup(&config) {
                continue;
            }

            match delete_expired(&pool, config.days).await {
                Ok(0) => {}
                Ok(deleted) => {
                    tracing::info!(
                        deleted,
                        retention_days = config.days,
                        "deleted expired log records"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "retention cleanup failed");
                }
            }
        }
    })
}

fn should_run_cleanup(config: &RetentionConfig) -> bool {
    Utc::now().hour() as u8 == config.cleanup_hour
}

async fn delete_expired(pool: &SqlitePool, retention_days: u64) -> Result<u64, sqlx::Error> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days as i64)).timestamp_millis();

    let result = sqlx::query("DELETE FROM logs WHERE timestamp < ?1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
