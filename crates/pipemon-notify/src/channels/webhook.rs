use crate::{Notification, NotificationChannel};
use anyhow::Result;
use async_trait::async_trait;

const MAX_ATTEMPTS: u32 = 3;

/// POSTs notifications as JSON to a fixed URL, with bounded retries and
/// exponential backoff. An optional body template replaces
/// `{{placeholder}}` markers instead of sending the default JSON shape.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    body_template: Option<String>,
}

impl WebhookChannel {
    pub fn new(url: &str, body_template: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            body_template,
        }
    }

    fn render_body(&self, n: &Notification) -> String {
        if let Some(template) = &self.body_template {
            template
                .replace("{{component}}", &n.component)
                .replace("{{severity}}", &n.severity.to_string())
                .replace("{{alert_type}}", &n.alert_type)
                .replace("{{message}}", &n.message)
                .replace("{{timestamp}}", &n.timestamp.to_rfc3339())
        } else {
            serde_json::json!({
                "component": n.component,
                "severity": n.severity.to_string(),
                "alert_type": n.alert_type,
                "message": n.message,
                "timestamp": n.timestamp.to_rfc3339(),
            })
            .to_string()
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let body = self.render_body(notification);
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            match self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .body(body.clone())
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    let status = resp.status();
                    tracing::warn!(
                        attempt = attempt + 1,
                        status = %status,
                        "webhook returned non-success status, retrying"
                    );
                    last_err = Some(anyhow::anyhow!("HTTP {status}"));
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "webhook send failed, retrying");
                    last_err = Some(e.into());
                }
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("webhook send failed")))
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipemon_common::types::Severity;

    #[test]
    fn template_placeholders_are_replaced() {
        let channel = WebhookChannel::new(
            "http://example.invalid/hook",
            Some("{{component}}/{{alert_type}}: {{severity}} - {{message}}".to_string()),
        );
        let n = Notification::new("daemon", Severity::Critical, "slow_cycle", "too slow");
        assert_eq!(
            channel.render_body(&n),
            "daemon/slow_cycle: critical - too slow"
        );
    }

    #[test]
    fn default_body_is_json_with_all_fields() {
        let channel = WebhookChannel::new("http://example.invalid/hook", None);
        let n = Notification::new("daemon", Severity::Warning, "slow_cycle", "too slow");
        let body: serde_json::Value = serde_json::from_str(&channel.render_body(&n)).unwrap();
        assert_eq!(body["component"], "daemon");
        assert_eq!(body["severity"], "warning");
        assert_eq!(body["alert_type"], "slow_cycle");
    }
}
