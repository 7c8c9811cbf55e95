//! Live-updating stream sessions.
//!
//! Each SSE connection gets one independently scheduled tokio task that
//! re-runs its view on a timer, diffs against the last emitted snapshot,
//! and pushes only changes. Sessions live in an arena keyed by session id;
//! they share nothing but the read-only store.

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::filter::{FilterSpec, Granularity};
use crate::store::LogStore;

mod session;

use session::SessionEvent;

/// Which view a session recomputes on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamView {
    Count,
    Aggregated,
    Trend(Granularity),
    Distribution,
}

impl StreamView {
    fn name(self) -> &'static str {
        match self {
            StreamView::Count => "count",
            StreamView::Aggregated => "aggregated",
            StreamView::Trend(_) => "trend",
            StreamView::Distribution => "distribution",
        }
    }
}

/// Accounting entry for a live session, reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub view: &'static str,
    pub interval_secs: u64,
    pub connected_at: DateTime<Utc>,
}

/// Arena of live stream sessions.
pub struct SessionManager {
    store: Arc<dyn LogStore>,
    sessions: Arc<DashMap<Uuid, SessionInfo>>,
    failure_budget: u32,
}

impl SessionManager {
    pub fn new(store: Arc<dyn LogStore>, failure_budget: u32) -> Self {
        Self {
            store,
            sessions: Arc::new(DashMap::new()),
            failure_budget,
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of every live session's accounting entry.
    pub fn session_summaries(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Open a stream session: register it, spawn its tick task, and return
    /// the SSE response. The task exits (and deregisters itself) when the
    /// client disconnects or the failure budget runs out; dropping the
    /// returned response is enough to tear everything down.
    pub fn open(
        &self,
        view: StreamView,
        filter: FilterSpec,
        interval_secs: u64,
    ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let id = Uuid::new_v4();

        // A watch channel holds only the newest event: a client that stops
        // reading never accumulates a backlog on the server.
        let (tx, rx) = watch::channel(None::<SessionEvent>);

        self.sessions.insert(
            id,
            SessionInfo {
                view: view.name(),
                interval_secs,
                connected_at: Utc::now(),
            },
        );
        tracing::info!(
            session = %id,
            view = view.name(),
            interval_secs,
            "stream session opened"
        );

        let store = self.store.clone();
        let sessions = self.sessions.clone();
        let failure_budget = self.failure_budget;
        tokio::spawn(async move {
            session::run_session(id, store, view, filter, interval_secs, failure_budget, tx).await;
            sessions.remove(&id);
            tracing::info!(session = %id, "stream session closed");
        });

        let stream = futures::stream::unfold((rx, false), |(mut rx, done)| async move {
            if done {
                return None;
            }
            // Ends the stream when the session task drops its sender.
            rx.changed().await.ok()?;
            let event = rx.borrow_and_update().clone()?;
            Some(match event {
                SessionEvent::Snapshot(payload) => {
                    (Ok(Event::default().data(payload)), (rx, false))
                }
                SessionEvent::Terminal(payload) => (
                    Ok(Event::default().event("terminated").data(payload)),
                    (rx, true),
                ),
            })
        });

        Sse::new(stream).keep_alive(KeepAlive::default())
    }
}
