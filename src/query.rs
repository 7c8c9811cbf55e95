//! Query execution: filter + sort + pagination over the log store.

use serde::Serialize;

use crate::filter::{FilterSpec, PageSpec, SortSpec};
use crate::model::LogRecord;
use crate::store::{LogStore, StoreError};

/// One page of matching records plus pagination metadata. `total` counts
/// every record matching the filter and is consistent with `items` (both
/// come from one store snapshot). `page_size` echoes the effective size
/// after clamping.
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub items: Vec<LogRecord>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

pub async fn fetch_logs(
    store: &dyn LogStore,
    filter: &FilterSpec,
    sort: &SortSpec,
    page: &PageSpec,
) -> Result<LogPage, StoreError> {
    let snapshot = store.fetch_page(filter, sort, page).await?;
    let total_pages = snapshot.total.div_ceil(page.page_size as u64);
    Ok(LogPage {
        items: snapshot.items,
        total: snapshot.total,
        page: page.page,
        page_size: page.page_size,
        total_pages,
    })
}
