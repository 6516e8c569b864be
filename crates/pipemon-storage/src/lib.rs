//! Persistence layer for metric samples and deduplicated alerts.
//!
//! Metrics live in daily time-partitioned SQLite databases
//! ([`metrics::MetricStore`]) with WAL mode so independent collector
//! processes can append concurrently. Alerts live in a single shared
//! database ([`alert_store::AlertStore`]) because the dedup key must
//! collide across days; the breach upsert is a single atomic statement.

pub mod alert_store;
pub mod error;
pub mod metrics;
pub mod partition;


/// Aggregated metric statistics over a time window.
#[derive(Debug, Clone, Default)]
pub struct MetricSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: u64,
}

/// Information about a storage partition (daily SQLite database).
#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub date: String,
    pub size_bytes: u64,
    pub path: String,
}
