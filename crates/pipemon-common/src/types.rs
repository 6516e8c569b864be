use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use pipemon_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Warning);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// One named, labeled metric observation produced by a collector.
///
/// The value is carried as decimal text rather than `f64` because samples
/// cross process and SQL boundaries; text round-trips without rounding
/// surprises. Samples are append-only: multiple samples per second for the
/// same (component, metric) are allowed, and "latest" always means
/// max(timestamp) at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: String,
    pub component: String,
    pub metric_name: String,
    /// Decimal text, e.g. `"42"` or `"99.17"`.
    pub metric_value: String,
    pub timestamp: DateTime<Utc>,
    /// Ordered key=value labels; BTreeMap keeps serialization stable.
    pub labels: BTreeMap<String, String>,
}

impl MetricSample {
    /// Builds a sample timestamped now, with no labels.
    pub fn new(component: &str, metric_name: &str, value: impl Into<MetricValue>) -> Self {
        Self {
            id: crate::id::next_id(),
            component: component.to_string(),
            metric_name: metric_name.to_string(),
            metric_value: value.into().0,
            timestamp: Utc::now(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Numeric view of the stored decimal text. `None` if the text is not
    /// parseable, which only happens for hand-written rows.
    pub fn value_f64(&self) -> Option<f64> {
        self.metric_value.trim().parse().ok()
    }
}

/// Decimal-text newtype accepted by [`MetricSample::new`].
pub struct MetricValue(pub String);

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self(v.to_string())
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        Self(v.to_string())
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        // Two decimal places is what the downstream dashboards expect;
        // integral values stay bare integers.
        if v.fract() == 0.0 && v.abs() < 1e15 {
            Self(format!("{}", v as i64))
        } else {
            Self(format!("{v:.2}"))
        }
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

/// Format labels into the flat comma-joined `key=value` form used in the
/// metrics table and in alert messages.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use pipemon_common::types::format_labels;
///
/// let mut labels = BTreeMap::new();
/// labels.insert("component".to_string(), "ingestion".to_string());
/// labels.insert("table".to_string(), "notes".to_string());
/// assert_eq!(format_labels(&labels), "component=ingestion,table=notes");
/// ```
pub fn format_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse the flat `key=value,key=value` form back into a map. Malformed
/// segments (no `=`) are dropped.
pub fn parse_labels(s: &str) -> BTreeMap<String, String> {
    s.split(',')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

/// Lifecycle state of an [`AlertRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Open,
    Closed,
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::Open => write!(f, "open"),
            AlertState::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for AlertState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AlertState::Open),
            "closed" => Ok(AlertState::Closed),
            _ => Err(format!("unknown alert state: {s}")),
        }
    }
}

/// A deduplicated alert, keyed by (component, alert_type).
///
/// At most one record per dedup key is `Open` at any instant; repeat
/// breaches inside the dedup window fold into `occurrence_count` instead of
/// creating new rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub component: String,
    pub alert_type: String,
    pub dedup_key: String,
    pub severity: Severity,
    pub message: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrence_count: u64,
    pub state: AlertState,
}

/// Canonical dedup key for a (component, alert_type) pair.
pub fn dedup_key(component: &str, alert_type: &str) -> String {
    format!("{component}:{alert_type}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_round_trips() {
        for s in ["warning", "error", "critical"] {
            let sev: Severity = s.parse().unwrap();
            assert_eq!(sev.to_string(), s);
        }
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn metric_value_formats_decimal_text() {
        assert_eq!(MetricSample::new("d", "m", 42i64).metric_value, "42");
        assert_eq!(MetricSample::new("d", "m", 30.0f64).metric_value, "30");
        assert_eq!(MetricSample::new("d", "m", 99.166f64).metric_value, "99.17");
    }

    #[test]
    fn labels_round_trip() {
        let mut labels = BTreeMap::new();
        labels.insert("component".into(), "ingestion".into());
        labels.insert("table".into(), "notes".into());
        let flat = format_labels(&labels);
        assert_eq!(parse_labels(&flat), labels);
    }
}
