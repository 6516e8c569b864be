//! Notification delivery for alert events.
//!
//! The dispatcher hands a [`Notification`] to the [`NotifyManager`], which
//! fans it out to every configured [`NotificationChannel`]. Delivery is
//! fire-and-forget from the caller's point of view: a channel failure is
//! logged at `warn` and never propagates, because the alert record state
//! transition must not roll back on a flaky webhook.

pub mod channels;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use pipemon_common::types::Severity;

/// One user-facing notification, already deduplicated upstream.
#[derive(Debug, Clone)]
pub struct Notification {
    pub component: String,
    pub severity: Severity,
    pub alert_type: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Notification {
    pub fn new(component: &str, severity: Severity, alert_type: &str, message: &str) -> Self {
        Self {
            component: component.to_string(),
            severity,
            alert_type: alert_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// A delivery channel that sends notifications to an external service.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers the notification through this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after retries (if applicable).
    async fn send(&self, notification: &Notification) -> Result<()>;

    /// Returns the channel type name (e.g., `"webhook"`).
    fn channel_name(&self) -> &str;
}

/// Fans one notification out to every channel at or above the minimum
/// severity.
pub struct NotifyManager {
    channels: Vec<Box<dyn NotificationChannel>>,
    min_severity: Severity,
}

impl NotifyManager {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>, min_severity: Severity) -> Self {
        Self {
            channels,
            min_severity,
        }
    }

    /// A manager with no channels: every notification is logged only.
    pub fn disabled() -> Self {
        Self::new(Vec::new(), Severity::Warning)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver to all channels. Never fails; per-channel errors are logged.
    pub async fn notify(&self, notification: &Notification) {
        if notification.severity < self.min_severity {
            tracing::debug!(
                severity = %notification.severity,
                alert_type = %notification.alert_type,
                "notification below channel severity floor, skipped"
            );
            return;
        }
        if self.channels.is_empty() {
            tracing::info!(
                component = %notification.component,
                severity = %notification.severity,
                alert_type = %notification.alert_type,
                message = %notification.message,
                "alert (no notification channel configured)"
            );
            return;
        }
        for channel in &self.channels {
            if let Err(e) = channel.send(notification).await {
                tracing::warn!(
                    channel = channel.channel_name(),
                    alert_type = %notification.alert_type,
                    error = %e,
                    "notification delivery failed"
                );
            }
        }
    }
}
