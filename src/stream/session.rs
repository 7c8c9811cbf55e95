//! Per-session tick loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::analytics;
use crate::filter::FilterSpec;
use crate::store::{LogStore, StoreError};

use super::StreamView;

/// Event pushed from a session task to its SSE connection.
#[derive(Debug, Clone)]
pub(super) enum SessionEvent {
    Snapshot(String),
    Terminal(String),
}

/// Drive one stream session until the client disconnects or the
/// consecutive-failure budget is exhausted.
///
/// The timer keeps a steady cadence regardless of how long a tick takes.
/// Every loop iteration also watches for the receiver side going away, so
/// a disconnect cancels the pending timer wait immediately instead of
/// leaking a ticking task.
pub(super) async fn run_session(
    id: Uuid,
    store: Arc<dyn LogStore>,
    view: StreamView,
    filter: FilterSpec,
    interval_secs: u64,
    failure_budget: u32,
    tx: watch::Sender<Option<SessionEvent>>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    // If a tick overruns its slot, skip ahead rather than bursting.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_snapshot: Option<Value> = None;
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                tracing::debug!(session = %id, "client disconnected");
                return;
            }
            _ = ticker.tick() => {}
        }

        match compute_view(store.as_ref(), view, &filter).await {
            Ok(snapshot) => {
                consecutive_failures = 0;
                // Value-equality diff: emit only when the view changed.
                // The first tick always emits since there is no snapshot yet.
                if last_snapshot.as_ref() != Some(&snapshot) {
                    let payload = envelope(&snapshot);
                    if tx.send(Some(SessionEvent::Snapshot(payload))).is_err() {
                        return;
                    }
                    last_snapshot = Some(snapshot);
                }
            }
            Err(e) => {
                // Transient: keep the old snapshot, emit nothing, wait for
                // the next tick.
                consecutive_failures += 1;
                tracing::warn!(
                    session = %id,
                    error = %e,
                    consecutive_failures,
                    "tick failed, carrying last snapshot forward"
                );
                if consecutive_failures >= failure_budget {
                    tracing::error!(
                        session = %id,
                        "consecutive-failure budget exhausted, terminating session"
                    );
                    let payload = json!({
                        "error": "stream terminated after repeated storage failures",
                        "timestamp": Utc::now(),
                    })
                    .to_string();
                    let _ = tx.send(Some(SessionEvent::Terminal(payload)));
                    return;
                }
            }
        }
    }
}

async fn compute_view(
    store: &dyn LogStore,
    view: StreamView,
    filter: &FilterSpec,
) -> Result<Value, StoreError> {
    Ok(match view {
        StreamView::Count => json!({ "count": store.count(filter).await? }),
        StreamView::Aggregated => encode(&analytics::aggregated(store, filter).await?),
        StreamView::Trend(granularity) => {
            encode(&analytics::trend(store, filter, granularity).await?)
        }
        StreamView::Distribution => encode(&analytics::distribution(store, filter).await?),
    })
}

fn encode<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode snapshot");
        Value::Null
    })
}

/// Wrap a snapshot for the wire, stamping the emission time. The stamp is
/// added after diffing so an unchanged view never re-emits.
fn envelope(snapshot: &Value) -> String {
    let mut wrapped = snapshot.clone();
    if let Value::Object(map) = &mut wrapped {
        map.insert("timestamp".to_string(), json!(Utc::now()));
    }
    wrapped.to_string()
}
