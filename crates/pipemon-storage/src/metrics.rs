use crate::error::Result;
use crate::partition::PartitionManager;
use crate::{MetricSummary, PartitionInfo};
use chrono::{DateTime, Utc};
use pipemon_common::types::{format_labels, parse_labels, MetricSample};
use std::path::Path;

/// Append-only time-series sink over daily SQLite partitions.
///
/// Append is the only mutation; all samples are kept and "latest" is a
/// read-time max(timestamp) reduction, never a storage-time overwrite.
/// Deletion happens only through [`MetricStore::cleanup`], the hook an
/// external retention policy calls.
pub struct MetricStore {
    partitions: PartitionManager,
}

impl MetricStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            partitions: PartitionManager::new(data_dir)?,
        })
    }

    pub fn append(&self, sample: &MetricSample) -> Result<()> {
        self.append_batch(std::slice::from_ref(sample))
    }

    /// Appends a batch of samples inside one transaction per partition day.
    pub fn append_batch(&self, samples: &[MetricSample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        // Collector runs produce same-day batches in practice, but samples
        // carry their own timestamps, so group by partition to be safe.
        let mut by_key: Vec<(String, Vec<&MetricSample>)> = Vec::new();
        for sample in samples {
            let key = self.partitions.get_or_create(sample.timestamp)?;
            match by_key.iter_mut().find(|(k, _)| *k == key) {
                Some((_, group)) => group.push(sample),
                None => by_key.push((key, vec![sample])),
            }
        }

        for (key, group) in by_key {
            self.partitions.with_partition(&key, |conn| {
                let tx = conn.unchecked_transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO metrics (id, timestamp, component, metric_name, metric_value, labels)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for sample in &group {
                        stmt.execute(rusqlite::params![
                            &sample.id,
                            sample.timestamp.timestamp_millis(),
                            &sample.component,
                            &sample.metric_name,
                            &sample.metric_value,
                            format_labels(&sample.labels),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Most recent sample for (component, metric_name), or `None` when the
    /// metric has never been observed.
    pub fn latest(&self, component: &str, metric_name: &str) -> Result<Option<MetricSample>> {
        for key in self.partitions.partitions_desc()? {
            let found = self.partitions.with_partition(&key, |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, timestamp, component, metric_name, metric_value, labels
                     FROM metrics WHERE component = ?1 AND metric_name = ?2
                     ORDER BY timestamp DESC LIMIT 1",
                )?;
                let mut rows = stmt.query(rusqlite::params![component, metric_name])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_sample(row)?)),
                    None => Ok(None),
                }
            })?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// All samples for (component, metric_name) at or after `since`,
    /// ascending by timestamp.
    pub fn windowed(
        &self,
        component: &str,
        metric_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>> {
        let mut results = Vec::new();
        let since_ms = since.timestamp_millis();
        for key in self.partitions.partitions_in_range(since, Utc::now())? {
            self.partitions.with_partition(&key, |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, timestamp, component, metric_name, metric_value, labels
                     FROM metrics
                     WHERE component = ?1 AND metric_name = ?2 AND timestamp >= ?3
                     ORDER BY timestamp ASC",
                )?;
                let mut rows = stmt.query(rusqlite::params![component, metric_name, since_ms])?;
                while let Some(row) = rows.next()? {
                    results.push(row_to_sample(row)?);
                }
                Ok(())
            })?;
        }
        results.sort_by_key(|s| s.timestamp);
        Ok(results)
    }

    /// min/max/avg/count over the numeric values in the window. Values are
    /// stored as decimal text, so the reduction happens here rather than in
    /// SQL; rows that do not parse are skipped.
    pub fn summary(
        &self,
        component: &str,
        metric_name: &str,
        since: DateTime<Utc>,
    ) -> Result<MetricSummary> {
        let values: Vec<f64> = self
            .windowed(component, metric_name, since)?
            .iter()
            .filter_map(|s| s.value_f64())
            .collect();
        if values.is_empty() {
            return Ok(MetricSummary::default());
        }
        let count = values.len() as u64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / count as f64;
        Ok(MetricSummary { min, max, avg, count })
    }

    /// Removes partitions older than `retention_days`; returns how many.
    pub fn cleanup(&self, retention_days: u32) -> Result<u32> {
        self.partitions.cleanup_older_than(retention_days)
    }

    pub fn list_partitions(&self) -> Result<Vec<PartitionInfo>> {
        self.partitions.list_partition_info()
    }
}

fn row_to_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricSample> {
    let ts_ms: i64 = row.get(1)?;
    let labels_str: String = row.get(5)?;
    Ok(MetricSample {
        id: row.get(0)?,
        timestamp: DateTime::from_timestamp_millis(ts_ms).unwrap_or_default(),
        component: row.get(2)?,
        metric_name: row.get(3)?,
        metric_value: row.get(4)?,
        labels: parse_labels(&labels_str),
    })
}
