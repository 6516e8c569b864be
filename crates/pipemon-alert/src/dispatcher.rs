use pipemon_common::types::{AlertRecord, Severity};
use pipemon_notify::{Notification, NotifyManager};
use pipemon_storage::alert_store::AlertStore;
use pipemon_storage::error::Result;

/// Dedup behaviour of the dispatcher. The switch lives here, not in
/// callers: disabling deduplication makes every breach notify, and no code
/// path around the dispatcher can reintroduce suppression.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub dedup_enabled: bool,
    pub dedup_window_secs: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dedup_enabled: true,
            dedup_window_secs: 3600,
        }
    }
}

/// Stateful half of the alerting pipeline: folds breaches into the shared
/// [`AlertStore`] and drives the notifier.
///
/// The store's atomic upsert decides whether this invocation won the
/// notification for the current dedup window; the dispatcher then treats
/// delivery as fire-and-forget: a notification failure is logged inside
/// the notify manager and never rolls back the record transition.
pub struct AlertDispatcher {
    store: AlertStore,
    notifier: NotifyManager,
    config: DispatchConfig,
}

impl AlertDispatcher {
    pub fn new(store: AlertStore, notifier: NotifyManager, config: DispatchConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    fn effective_window(&self) -> i64 {
        if self.config.dedup_enabled {
            self.config.dedup_window_secs
        } else {
            0
        }
    }

    /// Record a breach and notify unless the dedup window suppresses it.
    pub async fn breach(
        &self,
        component: &str,
        alert_type: &str,
        severity: Severity,
        message: &str,
    ) -> Result<AlertRecord> {
        let outcome = self.store.record_breach(
            component,
            alert_type,
            severity,
            message,
            self.effective_window(),
        )?;

        if outcome.should_notify {
            let notification = Notification::new(component, severity, alert_type, message);
            self.notifier.notify(&notification).await;
            tracing::info!(
                component,
                alert_type,
                severity = %severity,
                occurrences = outcome.record.occurrence_count,
                "alert raised"
            );
        } else {
            tracing::debug!(
                component,
                alert_type,
                occurrences = outcome.record.occurrence_count,
                "alert suppressed (dedup window)"
            );
        }

        Ok(outcome.record)
    }

    /// A clean evaluation: closes any open record for the key. Returns true
    /// when a record was actually closed.
    pub fn clear(&self, component: &str, alert_type: &str) -> Result<bool> {
        let closed = self.store.resolve(component, alert_type)?;
        if closed {
            tracing::info!(component, alert_type, "alert cleared");
        }
        Ok(closed)
    }

    pub fn store(&self) -> &AlertStore {
        &self.store
    }
}
