use pipemon_common::types::Severity;
use serde::Deserialize;
use std::str::FromStr;

/// Direction of the threshold comparison: whether a breach is a value
/// above the bound or below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum CompareOp {
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greater_than" | "gt" => Ok(Self::GreaterThan),
            "less_than" | "lt" => Ok(Self::LessThan),
            "greater_equal" | "gte" => Ok(Self::GreaterEqual),
            "less_equal" | "lte" => Ok(Self::LessEqual),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl TryFrom<String> for CompareOp {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreaterThan => write!(f, "greater_than"),
            Self::LessThan => write!(f, "less_than"),
            Self::GreaterEqual => write!(f, "greater_equal"),
            Self::LessEqual => write!(f, "less_equal"),
        }
    }
}

impl CompareOp {
    fn check(&self, value: f64, bound: f64) -> bool {
        match self {
            Self::GreaterThan => value > bound,
            Self::LessThan => value < bound,
            Self::GreaterEqual => value >= bound,
            Self::LessEqual => value <= bound,
        }
    }

    /// Human wording for alert messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::GreaterThan => "above",
            Self::LessThan => "below",
            Self::GreaterEqual => "at or above",
            Self::LessEqual => "at or below",
        }
    }
}

/// Warning/critical bounds for one (component, metric_name) pair.
///
/// Loaded once per run from configuration; absent configuration for a
/// metric simply means no alerting for it.
#[derive(Debug, Clone)]
pub struct ThresholdBand {
    pub component: String,
    pub metric_name: String,
    pub warning: f64,
    pub critical: f64,
    pub operator: CompareOp,
    pub unit: Option<String>,
}

impl ThresholdBand {
    /// Stateless, total comparison of a value against the band.
    ///
    /// The critical bound is checked first and short-circuits: a value
    /// breaching both bounds is critical, never double-reported as a
    /// warning too. Any finite or non-finite f64 yields a decision.
    pub fn evaluate(&self, value: f64) -> Option<Severity> {
        if self.operator.check(value, self.critical) {
            return Some(Severity::Critical);
        }
        if self.operator.check(value, self.warning) {
            return Some(Severity::Warning);
        }
        None
    }

    /// Message for a breach of this band at `value`.
    pub fn breach_message(&self, value: f64, severity: Severity) -> String {
        let bound = match severity {
            Severity::Critical => self.critical,
            _ => self.warning,
        };
        let unit = self.unit.as_deref().unwrap_or("");
        format!(
            "{} is {} ({} threshold: value {}{unit} {} {}{unit})",
            self.metric_name,
            value,
            severity,
            value,
            self.operator.describe(),
            bound,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(warning: f64, critical: f64, operator: CompareOp) -> ThresholdBand {
        ThresholdBand {
            component: "daemon".into(),
            metric_name: "daemon_cycle_duration_seconds".into(),
            warning,
            critical,
            operator,
            unit: Some("s".into()),
        }
    }

    #[test]
    fn critical_shadows_warning() {
        let b = band(120.0, 300.0, CompareOp::GreaterThan);
        // 400 breaches both bounds; critical wins, never both.
        assert_eq!(b.evaluate(400.0), Some(Severity::Critical));
        assert_eq!(b.evaluate(200.0), Some(Severity::Warning));
        assert_eq!(b.evaluate(100.0), None);
    }

    #[test]
    fn less_than_direction() {
        let b = band(50.0, 10.0, CompareOp::LessThan);
        assert_eq!(b.evaluate(5.0), Some(Severity::Critical));
        assert_eq!(b.evaluate(30.0), Some(Severity::Warning));
        assert_eq!(b.evaluate(80.0), None);
    }

    #[test]
    fn total_over_extreme_inputs() {
        let b = band(120.0, 300.0, CompareOp::GreaterThan);
        assert_eq!(b.evaluate(0.0), None);
        assert_eq!(b.evaluate(f64::MAX), Some(Severity::Critical));
        assert_eq!(b.evaluate(f64::INFINITY), Some(Severity::Critical));
        assert_eq!(b.evaluate(f64::NEG_INFINITY), None);
        // NaN compares false everywhere: no severity, no panic.
        assert_eq!(b.evaluate(f64::NAN), None);
    }

    #[test]
    fn boundary_is_exclusive_for_strict_operators() {
        let b = band(120.0, 300.0, CompareOp::GreaterThan);
        assert_eq!(b.evaluate(120.0), None);
        assert_eq!(b.evaluate(300.0), Some(Severity::Warning));

        let b = band(120.0, 300.0, CompareOp::GreaterEqual);
        assert_eq!(b.evaluate(120.0), Some(Severity::Warning));
        assert_eq!(b.evaluate(300.0), Some(Severity::Critical));
    }

    #[test]
    fn operator_round_trips() {
        for op in ["greater_than", "less_than", "greater_equal", "less_equal"] {
            let parsed: CompareOp = op.parse().unwrap();
            assert_eq!(parsed.to_string(), op);
        }
        assert!("between".parse::<CompareOp>().is_err());
        assert_eq!("gt".parse::<CompareOp>().unwrap(), CompareOp::GreaterThan);
    }
}
