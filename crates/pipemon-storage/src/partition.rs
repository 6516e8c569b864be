use crate::error::{Result, StorageError};
use crate::PartitionInfo;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const METRICS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    component TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    metric_value TEXT NOT NULL,
    labels TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_metrics_component_metric_time
    ON metrics(component, metric_name, timestamp);
CREATE INDEX IF NOT EXISTS idx_metrics_time
    ON metrics(timestamp);
";

/// One SQLite database per UTC day. WAL mode plus a busy timeout lets
/// independent collector processes append concurrently without exclusive
/// locks serializing them.
pub struct PartitionManager {
    data_dir: PathBuf,
    connections: Mutex<HashMap<String, Connection>>,
}

impl PartitionManager {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            connections: Mutex::new(HashMap::new()),
        })
    }

    /// Lock the connections map, recovering from a poisoned Mutex if necessary.
    fn lock_connections(&self) -> MutexGuard<'_, HashMap<String, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn partition_key(ts: DateTime<Utc>) -> String {
        ts.format("%Y-%m-%d").to_string()
    }

    fn partition_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.db"))
    }

    fn open_partition(&self, key: &str) -> Result<Connection> {
        let conn = Connection::open(self.partition_path(key))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        conn.execute_batch(METRICS_SCHEMA)?;
        Ok(conn)
    }

    pub fn get_or_create(&self, ts: DateTime<Utc>) -> Result<String> {
        let key = Self::partition_key(ts);
        let mut conns = self.lock_connections();
        if !conns.contains_key(&key) {
            let conn = self.open_partition(&key)?;
            tracing::info!(partition = %key, "created partition");
            conns.insert(key.clone(), conn);
        }
        Ok(key)
    }

    pub fn with_partition<F, R>(&self, key: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conns = self.lock_connections();
        let conn = conns
            .get(key)
            .ok_or_else(|| StorageError::PartitionNotFound(key.to_string()))?;
        f(conn)
    }

    /// Keys of existing partitions intersecting [from, to], ascending,
    /// loading each into the connection cache on the way.
    pub fn partitions_in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<String>> {
        let to_date = to.date_naive();
        let mut keys = Vec::new();
        let mut date = from.date_naive();
        while date <= to_date {
            let key = date.format("%Y-%m-%d").to_string();
            if self.partition_path(&key).exists() {
                let mut conns = self.lock_connections();
                if !conns.contains_key(&key) {
                    let conn = self.open_partition(&key)?;
                    conns.insert(key.clone(), conn);
                }
                keys.push(key);
            }
            date = date.succ_opt().unwrap_or(date);
        }
        Ok(keys)
    }

    /// Keys of every partition on disk, newest first. Used by latest-value
    /// reads that walk backward until they find a sample.
    pub fn partitions_desc(&self) -> Result<Vec<String>> {
        let mut keys = self.keys_on_disk()?;
        keys.sort_by(|a, b| b.cmp(a));
        for key in &keys {
            let mut conns = self.lock_connections();
            if !conns.contains_key(key) {
                let conn = self.open_partition(key)?;
                conns.insert(key.clone(), conn);
            }
        }
        Ok(keys)
    }

    fn keys_on_disk(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(date_str) = name.strip_suffix(".db") {
                if NaiveDate::parse_from_str(date_str, "%Y-%m-%d").is_ok() {
                    keys.push(date_str.to_string());
                }
            }
        }
        Ok(keys)
    }

    /// Remove partitions older than `retention_days`, including the WAL/SHM
    /// sibling files SQLite leaves next to each database. Best-effort: a
    /// file that cannot be removed is logged and skipped.
    pub fn cleanup_older_than(&self, retention_days: u32) -> Result<u32> {
        let cutoff_date = (Utc::now() - chrono::Duration::days(retention_days as i64)).date_naive();
        let mut removed = 0u32;

        for key in self.keys_on_disk()? {
            let date = match NaiveDate::parse_from_str(&key, "%Y-%m-%d") {
                Ok(d) => d,
                Err(_) => continue,
            };
            if date >= cutoff_date {
                continue;
            }

            // Drop the cached Connection first so WAL checkpoints.
            {
                let mut conns = self.lock_connections();
                conns.remove(&key);
            }

            let db_path = self.partition_path(&key);
            if let Err(e) = std::fs::remove_file(&db_path) {
                tracing::error!(partition = %key, error = %e, "failed to remove partition file");
                continue;
            }
            for suffix in ["-wal", "-shm"] {
                let aux = self.data_dir.join(format!("{key}.db{suffix}"));
                if aux.exists() {
                    if let Err(e) = std::fs::remove_file(&aux) {
                        tracing::warn!(path = %aux.display(), error = %e, "failed to remove WAL sibling");
                    }
                }
            }

            tracing::info!(partition = %key, "removed expired partition");
            removed += 1;
        }

        Ok(removed)
    }

    /// Information about all existing partitions on disk, oldest first.
    pub fn list_partition_info(&self) -> Result<Vec<PartitionInfo>> {
        let mut infos = Vec::new();
        for key in self.keys_on_disk()? {
            let path = self.partition_path(&key);
            let metadata = std::fs::metadata(&path)?;
            infos.push(PartitionInfo {
                date: key,
                size_bytes: metadata.len(),
                path: path.to_string_lossy().to_string(),
            });
        }
        infos.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(infos)
    }
}
