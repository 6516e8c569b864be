//! Log-derived metric extraction.
//!
//! Turns unstructured, multi-format daemon log lines into structured
//! counters: [`timestamp`] normalizes free-text timestamps to epoch
//! seconds, [`scanner`] reads a bounded tail of a log file, and [`cycle`]
//! folds the matching lines into per-cycle counters and rolling aggregates.
//!
//! Everything here is pure or read-only; evidence that is absent (missing
//! file, unparseable timestamp, no matching lines) degrades to empty or
//! zero values rather than errors, so a collector run can always report
//! a best-effort aggregate.

pub mod cycle;
pub mod scanner;
pub mod timestamp;
