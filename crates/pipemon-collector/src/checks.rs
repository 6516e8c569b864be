use crate::config::CheckConfig;
use anyhow::Result;
use chrono::{DateTime, Utc};
use pipemon_common::types::MetricSample;
use pipemon_extract::cycle::CycleExtractor;
use pipemon_extract::scanner;

/// One unit of collection work. Checks are registered from configuration and
/// run concurrently each invocation; a failing check must not take its
/// siblings down with it.
pub trait Check: Send + Sync {
    /// Name for logging, usually the component being checked.
    fn name(&self) -> &str;

    /// Gathers current metric samples.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying extraction fails; a missing log
    /// file is not an error, it yields an empty aggregate.
    fn collect(&self, now: DateTime<Utc>) -> Result<Vec<MetricSample>>;
}

/// Tails one component's log and turns cycle evidence into samples.
pub struct CycleLogCheck {
    config: CheckConfig,
    extractor: CycleExtractor,
}

impl CycleLogCheck {
    pub fn new(config: CheckConfig) -> Self {
        let extractor = CycleExtractor::new(config.window_secs);
        Self { config, extractor }
    }
}

impl Check for CycleLogCheck {
    fn name(&self) -> &str {
        &self.config.component
    }

    fn collect(&self, now: DateTime<Utc>) -> Result<Vec<MetricSample>> {
        let lines = scanner::scan(
            &self.config.log_path,
            CycleExtractor::family_pattern(),
            self.config.max_lines,
        );
        let aggregate = self.extractor.extract(&lines, now);
        tracing::debug!(
            component = %self.config.component,
            lines = lines.len(),
            cycles = aggregate.cycle_count,
            failures = aggregate.failure_count,
            "extracted cycle evidence"
        );
        Ok(aggregate.to_samples(&self.config.component))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn check_extracts_samples_from_log_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path().join("daemon.log");
        let mut f = std::fs::File::create(&log_path).unwrap();
        writeln!(f, "2026-01-16 02:37:45 INFO Cycle 42 completed successfully in 30 seconds").unwrap();
        writeln!(f, "2026-01-16 02:37:45 INFO 5 | Uploaded new notes").unwrap();

        let check = CycleLogCheck::new(CheckConfig {
            component: "daemon".into(),
            log_path,
            max_lines: 100,
            window_secs: 3600,
        });
        let now = chrono::DateTime::parse_from_rfc3339("2026-01-16T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let samples = check.collect(now).unwrap();
        assert!(samples
            .iter()
            .any(|s| s.metric_name == "daemon_cycle_number" && s.metric_value == "42"));
        assert!(samples
            .iter()
            .any(|s| s.metric_name == "daemon_notes_new_count" && s.metric_value == "5"));
    }

    #[test]
    fn missing_log_yields_baseline_samples_not_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let check = CycleLogCheck::new(CheckConfig {
            component: "daemon".into(),
            log_path: dir.path().join("absent.log"),
            max_lines: 100,
            window_secs: 3600,
        });
        let samples = check.collect(Utc::now()).unwrap();
        // Zero evidence still reports the counts so dashboards see zeroes.
        assert!(samples
            .iter()
            .any(|s| s.metric_name == "daemon_cycle_count" && s.metric_value == "0"));
        assert!(!samples.iter().any(|s| s.metric_name == "daemon_cycle_number"));
    }
}
