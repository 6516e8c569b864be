//! Per-cycle counters and rolling aggregates from a scanned log tail.
//!
//! The daemon being monitored reports each execution round ("cycle") as a
//! completion line with a duration, and item activity either as explicit
//! `N | Uploaded new ...` counters or as `current notes - before/after`
//! snapshot pairs. Evidence is folded through an ordered strategy table of
//! (pattern, apply) pairs; adding a new log-format variant is an append to
//! the table, not a rewrite.

use crate::timestamp;
use chrono::{DateTime, Utc};
use pipemon_common::types::MetricSample;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static RE_CYCLE_OK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[Cc]ycle\s+(\d+)\s+completed successfully in\s+(\d+)\s+seconds").unwrap()
});
static RE_CYCLE_FAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Cc]ycle\s+(\d+)\s+failed").unwrap());
static RE_NOTES_NEW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*\|\s*Uploaded new notes").unwrap());
static RE_COMMENTS_NEW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*\|\s*Uploaded new comments").unwrap());
static RE_NOTES_BEFORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"current notes - before\D*?(\d+)").unwrap());
static RE_NOTES_AFTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"current notes - after\D*?(\d+)").unwrap());

/// Union of every pattern the strategy table knows, for use as the
/// [`crate::scanner::scan`] regex family.
static RE_FAMILY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[Cc]ycle\s+\d+\s+(completed successfully|failed)|\|\s*Uploaded new (notes|comments)|current notes - (before|after)",
    )
    .unwrap()
});

/// Outcome of one monitored daemon cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    Success,
    Failure,
}

/// One cycle as reconstructed from the log tail. Transient: folded into
/// aggregate [`MetricSample`]s and discarded, never persisted as its own
/// entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleRecord {
    pub cycle_number: u64,
    pub duration_seconds: u64,
    pub outcome: Outcome,
    pub items_new: u64,
    pub items_updated: u64,
    pub items_total: u64,
    /// Epoch seconds of the completion line, when its timestamp parsed.
    pub extracted_at: Option<i64>,
}

/// Enforce the item-count consistency invariant after extraction:
/// `items_total == items_new + items_updated` whenever that information
/// exists. Applied sequentially so a bare `items_new` first seeds the total
/// and a non-zero `items_updated` then folds in.
pub fn reconcile_items(rec: &mut CycleRecord) {
    if rec.items_total == 0 && rec.items_new > 0 {
        rec.items_total = rec.items_new;
    }
    let sum = rec.items_new + rec.items_updated;
    if rec.items_total > 0 && sum > 0 && rec.items_total != sum {
        rec.items_total = sum;
    }
}

/// Best-effort aggregate over the scanned tail. Always produced, even when
/// zero lines matched, so "no evidence" stays distinguishable downstream
/// from "extraction crashed".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleAggregate {
    /// The last completion line in the tail, with reconciled item counts.
    pub current: Option<CycleRecord>,
    pub cycle_count: u64,
    pub failure_count: u64,
    /// successful / (successful + failed) × 100; 100 when zero attempts.
    pub success_rate: f64,
    pub duration_min_seconds: u64,
    pub duration_max_seconds: u64,
    pub duration_avg_seconds: f64,
    /// Completions whose own timestamp falls inside the trailing window.
    pub window_rate: u64,
    /// items_total / duration_seconds, truncated; 0 unless both positive.
    pub processing_rate: u64,
}

struct Completion {
    cycle_number: u64,
    duration_seconds: u64,
    epoch: Option<i64>,
}

#[derive(Default)]
struct TailEvidence {
    completions: Vec<Completion>,
    failure_count: u64,
    notes_new: u64,
    comments_new: u64,
    notes_before: Option<u64>,
    notes_after: Option<u64>,
}

type Apply = fn(&Captures<'_>, &str, &mut TailEvidence);

struct Strategy {
    regex: &'static LazyLock<Regex>,
    apply: Apply,
}

/// Ordered by priority; the first matching pattern consumes the line.
static STRATEGIES: &[Strategy] = &[
    Strategy { regex: &RE_CYCLE_OK, apply: apply_cycle_ok },
    Strategy { regex: &RE_CYCLE_FAIL, apply: apply_cycle_fail },
    Strategy { regex: &RE_NOTES_NEW, apply: apply_notes_new },
    Strategy { regex: &RE_COMMENTS_NEW, apply: apply_comments_new },
    Strategy { regex: &RE_NOTES_BEFORE, apply: apply_notes_before },
    Strategy { regex: &RE_NOTES_AFTER, apply: apply_notes_after },
];

fn capture_u64(caps: &Captures<'_>, idx: usize) -> Option<u64> {
    let raw = caps.get(idx)?.as_str();
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::debug!(capture = raw, "non-numeric capture, skipping line");
            None
        }
    }
}

fn apply_cycle_ok(caps: &Captures<'_>, line: &str, ev: &mut TailEvidence) {
    let (Some(cycle_number), Some(duration_seconds)) = (capture_u64(caps, 1), capture_u64(caps, 2))
    else {
        return;
    };
    ev.completions.push(Completion {
        cycle_number,
        duration_seconds,
        epoch: timestamp::parse(line),
    });
}

fn apply_cycle_fail(_caps: &Captures<'_>, _line: &str, ev: &mut TailEvidence) {
    ev.failure_count += 1;
}

fn apply_notes_new(caps: &Captures<'_>, _line: &str, ev: &mut TailEvidence) {
    if let Some(n) = capture_u64(caps, 1) {
        ev.notes_new += n;
    }
}

fn apply_comments_new(caps: &Captures<'_>, _line: &str, ev: &mut TailEvidence) {
    if let Some(n) = capture_u64(caps, 1) {
        ev.comments_new += n;
    }
}

fn apply_notes_before(caps: &Captures<'_>, _line: &str, ev: &mut TailEvidence) {
    if let Some(n) = capture_u64(caps, 1) {
        ev.notes_before = Some(n);
    }
}

fn apply_notes_after(caps: &Captures<'_>, _line: &str, ev: &mut TailEvidence) {
    if let Some(n) = capture_u64(caps, 1) {
        ev.notes_after = Some(n);
    }
}

pub struct CycleExtractor {
    window_secs: i64,
}

impl CycleExtractor {
    pub fn new(window_secs: i64) -> Self {
        Self { window_secs }
    }

    /// The regex family to scan the log tail with.
    pub fn family_pattern() -> &'static Regex {
        &RE_FAMILY
    }

    /// Fold the scanned tail into a [`CycleAggregate`].
    ///
    /// Deterministic for a fixed tail and fixed `now`: running it twice
    /// over an unchanged tail yields identical output. Malformed lines are
    /// skipped, never fatal.
    pub fn extract(&self, lines: &[String], now: DateTime<Utc>) -> CycleAggregate {
        let mut ev = TailEvidence::default();
        for line in lines {
            for strategy in STRATEGIES {
                if let Some(caps) = strategy.regex.captures(line) {
                    (strategy.apply)(&caps, line, &mut ev);
                    break;
                }
            }
        }

        let cycle_count = ev.completions.len() as u64;
        let attempts = cycle_count + ev.failure_count;
        let success_rate = if attempts == 0 {
            // Absence of failure evidence is not failure.
            100.0
        } else {
            cycle_count as f64 / attempts as f64 * 100.0
        };

        let durations: Vec<u64> = ev.completions.iter().map(|c| c.duration_seconds).collect();
        let duration_min_seconds = durations.iter().copied().min().unwrap_or(0);
        let duration_max_seconds = durations.iter().copied().max().unwrap_or(0);
        let duration_avg_seconds = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };

        let window_rate = self.window_rate(&ev, lines, now);

        let current = ev.completions.last().map(|c| {
            let mut rec = CycleRecord {
                cycle_number: c.cycle_number,
                duration_seconds: c.duration_seconds,
                outcome: Outcome::Success,
                extracted_at: c.epoch,
                ..CycleRecord::default()
            };
            // Explicit "Uploaded new ..." counters always win over the
            // before/after snapshot estimate.
            if ev.notes_new > 0 || ev.comments_new > 0 {
                rec.items_new = ev.notes_new;
                rec.items_updated = ev.comments_new;
            } else if let (Some(before), Some(after)) = (ev.notes_before, ev.notes_after) {
                rec.items_new = after.saturating_sub(before);
            }
            reconcile_items(&mut rec);
            rec
        });

        let processing_rate = current
            .as_ref()
            .filter(|r| r.items_total > 0 && r.duration_seconds > 0)
            .map(|r| r.items_total / r.duration_seconds)
            .unwrap_or(0);

        CycleAggregate {
            current,
            cycle_count,
            failure_count: ev.failure_count,
            success_rate,
            duration_min_seconds,
            duration_max_seconds,
            duration_avg_seconds,
            window_rate,
            processing_rate,
        }
    }

    /// Trailing-window completion rate against a rolling epoch threshold.
    ///
    /// Never implemented as a calendar-hour comparison: that undercounts
    /// around every hour boundary. The coarse calendar-hour match only runs
    /// when no completion line carried a parseable timestamp at all, and
    /// announces itself so false zero rates stay diagnosable.
    fn window_rate(&self, ev: &TailEvidence, lines: &[String], now: DateTime<Utc>) -> u64 {
        if ev.completions.is_empty() {
            return 0;
        }
        let parsed: Vec<i64> = ev.completions.iter().filter_map(|c| c.epoch).collect();
        if parsed.is_empty() {
            let hour_prefix = now.format("%Y-%m-%d %H:").to_string();
            tracing::debug!(
                window_secs = self.window_secs,
                "no parseable cycle timestamps, falling back to calendar-hour match"
            );
            return lines
                .iter()
                .filter(|l| RE_CYCLE_OK.is_match(l) && l.contains(&hour_prefix))
                .count() as u64;
        }
        let threshold = now.timestamp() - self.window_secs;
        parsed.iter().filter(|&&t| t >= threshold).count() as u64
    }
}

impl CycleAggregate {
    /// Project the aggregate into store-ready samples.
    ///
    /// Point metrics (cycle number, duration, item counts) are emitted only
    /// when a current cycle exists; tally metrics are always emitted so a
    /// quiet log still produces an explicit zero.
    pub fn to_samples(&self, component: &str) -> Vec<MetricSample> {
        let name = |suffix: &str| format!("{component}_{suffix}");
        let mut samples = vec![
            MetricSample::new(component, &name("cycle_count"), self.cycle_count),
            MetricSample::new(component, &name("cycle_failure_count"), self.failure_count),
            MetricSample::new(component, &name("cycles_per_hour"), self.window_rate),
        ];
        if self.cycle_count + self.failure_count > 0 {
            samples.push(MetricSample::new(
                component,
                &name("cycle_success_rate"),
                self.success_rate,
            ));
        }
        if self.cycle_count > 0 {
            samples.push(MetricSample::new(
                component,
                &name("cycle_duration_min_seconds"),
                self.duration_min_seconds,
            ));
            samples.push(MetricSample::new(
                component,
                &name("cycle_duration_max_seconds"),
                self.duration_max_seconds,
            ));
            samples.push(MetricSample::new(
                component,
                &name("cycle_duration_avg_seconds"),
                self.duration_avg_seconds,
            ));
        }
        if let Some(rec) = &self.current {
            samples.push(MetricSample::new(
                component,
                &name("cycle_number"),
                rec.cycle_number,
            ));
            samples.push(MetricSample::new(
                component,
                &name("cycle_duration_seconds"),
                rec.duration_seconds,
            ));
            samples.push(MetricSample::new(
                component,
                &name("notes_new_count"),
                rec.items_new,
            ));
            samples.push(MetricSample::new(
                component,
                &name("comments_new_count"),
                rec.items_updated,
            ));
            samples.push(MetricSample::new(
                component,
                &name("notes_processed_per_cycle"),
                rec.items_total,
            ));
            samples.push(MetricSample::new(
                component,
                &name("processing_rate_notes_per_second"),
                self.processing_rate,
            ));
        }
        samples
    }
}
