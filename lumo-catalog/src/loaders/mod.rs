//! Reconcilers, one per upstream shape
//!
//! Each loader walks a sequence of upstream records and maps them onto
//! create/update operations against the catalog store. Per-record errors
//! are caught, logged, and skipped so one bad record never aborts a page;
//! only systemic failures (exhausted retries, revoked auth) propagate to
//! the pipeline driver.

pub mod courses;
pub mod ecommerce;
pub mod organizations;
pub mod programs;

/// Actor recorded in history rows for loader-driven changes
pub const ACTOR_INGEST: &str = "ingest";

/// Per-loader ingest counters, logged at completion
#[derive(Debug, Default, Clone, Copy)]
pub struct LoaderStats {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl LoaderStats {
    pub fn absorb(&mut self, other: LoaderStats) {
        self.processed += other.processed;
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Trim an upstream string field, mapping whitespace-only to None
pub fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
