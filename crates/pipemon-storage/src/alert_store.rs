use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use pipemon_common::types::{dedup_key, AlertRecord, AlertState, Severity};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const ALERTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alerts (
    dedup_key TEXT PRIMARY KEY,
    component TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    last_notified_at INTEGER NOT NULL,
    notify_token TEXT NOT NULL,
    occurrence_count INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'open'
);
CREATE INDEX IF NOT EXISTS idx_alerts_component ON alerts(component);
CREATE INDEX IF NOT EXISTS idx_alerts_state ON alerts(state);
";

/// Result of folding one breach into the alert table.
#[derive(Debug, Clone)]
pub struct BreachOutcome {
    pub record: AlertRecord,
    /// True iff this caller won the notification for the current window.
    pub should_notify: bool,
}

/// Deduplicated alert records, one SQLite database shared by every
/// collector process (alerts must not be split across daily partitions:
/// the dedup key has to collide across days).
///
/// The dedup-window check and the record update happen in a single
/// `INSERT .. ON CONFLICT .. RETURNING` statement carrying a per-call
/// unique token, so two processes breaching the same key at the same
/// instant elect exactly one notifier without an exclusive read-check-write
/// lock.
pub struct AlertStore {
    conn: Mutex<Connection>,
}

impl AlertStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join("alerts.db"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        conn.execute_batch(ALERTS_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a breach for (component, alert_type).
    ///
    /// State machine, atomically:
    /// - no row / closed row: reopen with occurrence_count 1, notify;
    /// - open row inside the window: bump occurrence_count, suppress;
    /// - open row past the window: bump occurrence_count, notify, window
    ///   resets.
    ///
    /// A `dedup_window_secs` of 0 disables suppression: every breach wins.
    pub fn record_breach(
        &self,
        component: &str,
        alert_type: &str,
        severity: Severity,
        message: &str,
        dedup_window_secs: i64,
    ) -> Result<BreachOutcome> {
        let now_ms = Utc::now().timestamp_millis();
        let token = pipemon_common::id::next_id();
        let key = dedup_key(component, alert_type);
        let window_ms = dedup_window_secs.saturating_mul(1000);

        let conn = self.lock_conn();
        let (record, won_token) = conn.query_row(
            "INSERT INTO alerts (dedup_key, component, alert_type, severity, message,
                                 first_seen, last_seen, last_notified_at, notify_token,
                                 occurrence_count, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6, ?7, 1, 'open')
             ON CONFLICT(dedup_key) DO UPDATE SET
                 severity = excluded.severity,
                 message = excluded.message,
                 last_seen = excluded.last_seen,
                 occurrence_count = CASE WHEN alerts.state = 'closed'
                     THEN 1 ELSE alerts.occurrence_count + 1 END,
                 first_seen = CASE WHEN alerts.state = 'closed'
                     THEN excluded.first_seen ELSE alerts.first_seen END,
                 notify_token = CASE WHEN alerts.state = 'closed'
                         OR excluded.last_seen - alerts.last_notified_at >= ?8
                     THEN excluded.notify_token ELSE alerts.notify_token END,
                 last_notified_at = CASE WHEN alerts.state = 'closed'
                         OR excluded.last_seen - alerts.last_notified_at >= ?8
                     THEN excluded.last_seen ELSE alerts.last_notified_at END,
                 state = 'open'
             RETURNING component, alert_type, dedup_key, severity, message,
                       first_seen, last_seen, occurrence_count, state, notify_token",
            rusqlite::params![
                &key,
                component,
                alert_type,
                severity.to_string(),
                message,
                now_ms,
                &token,
                window_ms,
            ],
            |row| {
                let record = row_to_record(row)?;
                let won: String = row.get(9)?;
                Ok((record, won))
            },
        )?;
        let record = record?;

        Ok(BreachOutcome {
            should_notify: won_token == token,
            record,
        })
    }

    /// Close the record for (component, alert_type) after a clean
    /// evaluation. Returns true when an open record was actually closed; a
    /// closed key behaves as absent for the next breach.
    pub fn resolve(&self, component: &str, alert_type: &str) -> Result<bool> {
        let key = dedup_key(component, alert_type);
        let now_ms = Utc::now().timestamp_millis();
        let conn = self.lock_conn();
        let changed = conn.execute(
            "UPDATE alerts SET state = 'closed', last_seen = ?1
             WHERE dedup_key = ?2 AND state = 'open'",
            rusqlite::params![now_ms, &key],
        )?;
        Ok(changed > 0)
    }

    /// The record for (component, alert_type) regardless of state.
    pub fn get(&self, component: &str, alert_type: &str) -> Result<Option<AlertRecord>> {
        let key = dedup_key(component, alert_type);
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT component, alert_type, dedup_key, severity, message,
                    first_seen, last_seen, occurrence_count, state
             FROM alerts WHERE dedup_key = ?1",
        )?;
        let mut rows = stmt.query(rusqlite::params![&key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_record(row)??)),
            None => Ok(None),
        }
    }

    /// Records filtered by component and/or state, most recent first.
    pub fn list(
        &self,
        component: Option<&str>,
        state: Option<AlertState>,
    ) -> Result<Vec<AlertRecord>> {
        let conn = self.lock_conn();
        let mut sql = String::from(
            "SELECT component, alert_type, dedup_key, severity, message,
                    first_seen, last_seen, occurrence_count, state
             FROM alerts WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(c) = component {
            params.push(Box::new(c.to_string()));
            sql.push_str(&format!(" AND component = ?{}", params.len()));
        }
        if let Some(s) = state {
            params.push(Box::new(s.to_string()));
            sql.push_str(&format!(" AND state = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY last_seen DESC");

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let mut rows = stmt.query(param_refs.as_slice())?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_record(row)??);
        }
        Ok(results)
    }
}

type RecordResult = std::result::Result<AlertRecord, StorageError>;

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordResult> {
    let severity_str: String = row.get(3)?;
    let state_str: String = row.get(8)?;
    let first_ms: i64 = row.get(5)?;
    let last_ms: i64 = row.get(6)?;

    let severity = match severity_str.parse::<Severity>() {
        Ok(s) => s,
        Err(_) => {
            return Ok(Err(StorageError::InvalidColumn {
                column: "severity",
                value: severity_str,
            }))
        }
    };
    let state = match state_str.parse::<AlertState>() {
        Ok(s) => s,
        Err(_) => {
            return Ok(Err(StorageError::InvalidColumn {
                column: "state",
                value: state_str,
            }))
        }
    };

    Ok(Ok(AlertRecord {
        component: row.get(0)?,
        alert_type: row.get(1)?,
        dedup_key: row.get(2)?,
        severity,
        message: row.get(4)?,
        first_seen: DateTime::from_timestamp_millis(first_ms).unwrap_or_default(),
        last_seen: DateTime::from_timestamp_millis(last_ms).unwrap_or_default(),
        occurrence_count: row.get::<_, i64>(7)? as u64,
        state,
    }))
}
