//! HTTP API handlers. Every endpoint here is read-only and side-effect
//! free; mutation is a different collaborator's concern.

pub mod analytics;
pub mod health;
pub mod logs;
pub mod sse;

use std::sync::Arc;

use crate::config::Config;
use crate::store::LogStore;
use crate::stream::SessionManager;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn LogStore>,
    pub sessions: Arc<SessionManager>,
}
