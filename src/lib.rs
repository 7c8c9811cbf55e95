pub mod analytics;
pub mod config;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod model;
pub mod query;
pub mod retention;
pub mod server;
pub mod store;
pub mod stream;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// Note: This function can only be called once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
