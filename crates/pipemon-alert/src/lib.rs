//! Threshold evaluation and deduplicated alert dispatch.
//!
//! [`threshold::ThresholdBand`] is the stateless comparison of a metric
//! value against configured warning/critical bounds. The
//! [`dispatcher::AlertDispatcher`] is the stateful half: it folds each
//! breach into the shared alert store and drives the notifier, suppressing
//! repeats inside the dedup window.

pub mod dispatcher;
pub mod threshold;
