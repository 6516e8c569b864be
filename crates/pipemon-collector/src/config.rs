use pipemon_alert::threshold::{CompareOp, ThresholdBand};
use pipemon_common::types::Severity;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct CollectorConfig {
    /// Directory for the metric partitions and the alert database.
    pub data_dir: PathBuf,
    /// Days of metric partitions to keep; 0 disables cleanup.
    #[serde(default)]
    pub retention_days: u32,
    /// Snowflake generator coordinates, 0-31 each. Processes writing the
    /// same data_dir should differ in at least one of the two.
    #[serde(default = "default_snowflake_id")]
    pub machine_id: i32,
    #[serde(default = "default_snowflake_id")]
    pub node_id: i32,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
    #[serde(default)]
    pub thresholds: Vec<ThresholdConfig>,
}

#[derive(Debug, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dedup_window")]
    pub window_secs: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: default_dedup_window(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_min_severity")]
    pub min_severity: String,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            min_severity: default_min_severity(),
            webhooks: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub body_template: Option<String>,
}

/// One log file to tail and extract cycle metrics from.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    pub component: String,
    pub log_path: PathBuf,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// Trailing window for the per-hour completion rate.
    #[serde(default = "default_check_window")]
    pub window_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdConfig {
    pub component: String,
    pub metric: String,
    pub warning: f64,
    pub critical: f64,
    #[serde(default = "default_operator")]
    pub operator: CompareOp,
    /// Alert type for deduplication; defaults to the metric name.
    pub alert_type: Option<String>,
    pub unit: Option<String>,
}

impl ThresholdConfig {
    pub fn band(&self) -> ThresholdBand {
        ThresholdBand {
            component: self.component.clone(),
            metric_name: self.metric.clone(),
            warning: self.warning,
            critical: self.critical,
            operator: self.operator,
            unit: self.unit.clone(),
        }
    }

    pub fn alert_type(&self) -> &str {
        self.alert_type.as_deref().unwrap_or(&self.metric)
    }
}

fn default_true() -> bool {
    true
}

fn default_dedup_window() -> i64 {
    3600
}

fn default_min_severity() -> String {
    "warning".to_string()
}

fn default_max_lines() -> usize {
    2000
}

fn default_check_window() -> i64 {
    3600
}

fn default_operator() -> CompareOp {
    CompareOp::GreaterThan
}

fn default_snowflake_id() -> i32 {
    1
}

impl CollectorConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.min_severity()?;
        for t in &self.thresholds {
            if t.metric.is_empty() || t.component.is_empty() {
                anyhow::bail!("threshold entries need a component and a metric");
            }
        }
        for c in &self.checks {
            if c.max_lines == 0 {
                anyhow::bail!(
                    "check {}: max_lines must be at least 1",
                    c.component
                );
            }
        }
        Ok(())
    }

    pub fn min_severity(&self) -> anyhow::Result<Severity> {
        self.notify
            .min_severity
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses_with_defaults() {
        let toml_str = r#"
            data_dir = "/var/lib/pipemon"

            [[checks]]
            component = "daemon"
            log_path = "/var/log/daemon.log"

            [[thresholds]]
            component = "daemon"
            metric = "daemon_cycle_duration_seconds"
            warning = 120.0
            critical = 300.0
            unit = "s"

            [[notify.webhooks]]
            url = "https://hooks.example.com/pipeline"
        "#;
        let config: CollectorConfig = toml::from_str(toml_str).unwrap();
        assert!(config.dedup.enabled);
        assert_eq!(config.dedup.window_secs, 3600);
        assert_eq!(config.checks[0].max_lines, 2000);
        assert_eq!(config.thresholds[0].operator, CompareOp::GreaterThan);
        assert_eq!(
            config.thresholds[0].alert_type(),
            "daemon_cycle_duration_seconds"
        );
        assert_eq!(config.notify.webhooks.len(), 1);
        assert_eq!(config.min_severity().unwrap(), Severity::Warning);
    }

    #[test]
    fn minimal_config_without_notify_section_validates() {
        let config: CollectorConfig = toml::from_str(r#"data_dir = "/tmp""#).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_severity().unwrap(), Severity::Warning);
        assert!(config.notify.webhooks.is_empty());
    }

    #[test]
    fn bad_operator_is_rejected() {
        let toml_str = r#"
            data_dir = "/tmp"

            [[thresholds]]
            component = "daemon"
            metric = "m"
            warning = 1.0
            critical = 2.0
            operator = "between"
        "#;
        assert!(toml::from_str::<CollectorConfig>(toml_str).is_err());
    }

    #[test]
    fn zero_max_lines_fails_validation() {
        let toml_str = r#"
            data_dir = "/tmp"

            [[checks]]
            component = "daemon"
            log_path = "/var/log/daemon.log"
            max_lines = 0
        "#;
        let config: CollectorConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}
