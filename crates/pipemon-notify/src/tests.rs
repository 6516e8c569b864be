use crate::{Notification, NotificationChannel, NotifyManager};
use anyhow::Result;
use async_trait::async_trait;
use pipemon_common::types::Severity;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountingChannel {
    sent: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl NotificationChannel for CountingChannel {
    async fn send(&self, _notification: &Notification) -> Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("simulated delivery failure");
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "counting"
    }
}

#[tokio::test]
async fn notify_fans_out_to_all_channels() {
    let sent = Arc::new(AtomicUsize::new(0));
    let manager = NotifyManager::new(
        vec![
            Box::new(CountingChannel { sent: Arc::clone(&sent), fail: false }),
            Box::new(CountingChannel { sent: Arc::clone(&sent), fail: false }),
        ],
        Severity::Warning,
    );
    let n = Notification::new("daemon", Severity::Critical, "slow_cycle", "slow");
    manager.notify(&n).await;
    assert_eq!(sent.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn channel_failure_does_not_propagate() {
    let sent = Arc::new(AtomicUsize::new(0));
    let manager = NotifyManager::new(
        vec![
            Box::new(CountingChannel { sent: Arc::clone(&sent), fail: true }),
            Box::new(CountingChannel { sent: Arc::clone(&sent), fail: false }),
        ],
        Severity::Warning,
    );
    let n = Notification::new("daemon", Severity::Warning, "slow_cycle", "slow");
    // Must not panic or error; the second channel still gets the event.
    manager.notify(&n).await;
    assert_eq!(sent.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn severity_floor_filters_notifications() {
    let sent = Arc::new(AtomicUsize::new(0));
    let manager = NotifyManager::new(
        vec![Box::new(CountingChannel { sent: Arc::clone(&sent), fail: false })],
        Severity::Critical,
    );
    manager
        .notify(&Notification::new("daemon", Severity::Warning, "t", "m"))
        .await;
    assert_eq!(sent.load(Ordering::SeqCst), 0);
    manager
        .notify(&Notification::new("daemon", Severity::Critical, "t", "m"))
        .await;
    assert_eq!(sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disabled_manager_logs_instead_of_sending() {
    let manager = NotifyManager::disabled();
    assert_eq!(manager.channel_count(), 0);
    // Smoke: no channels, no panic.
    manager
        .notify(&Notification::new("daemon", Severity::Critical, "t", "m"))
        .await;
}
