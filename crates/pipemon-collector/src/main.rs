mod checks;
mod config;

use anyhow::{Context, Result};
use checks::{Check, CycleLogCheck};
use chrono::Utc;
use clap::Parser;
use config::CollectorConfig;
use pipemon_alert::dispatcher::{AlertDispatcher, DispatchConfig};
use pipemon_alert::threshold::ThresholdBand;
use pipemon_common::types::MetricSample;
use pipemon_notify::channels::webhook::WebhookChannel;
use pipemon_notify::{NotificationChannel, NotifyManager};
use pipemon_storage::alert_store::AlertStore;
use pipemon_storage::metrics::MetricStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

/// One-shot log metrics collector. Scheduling is external: run it from cron
/// or a systemd timer; each invocation extracts, stores, evaluates and
/// exits.
#[derive(Parser)]
#[command(name = "pipemon-collector", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "config/collector.toml")]
    config: PathBuf,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "pipemon=info",
        1 => "pipemon=debug",
        _ => "pipemon=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn build_notifier(config: &CollectorConfig) -> Result<NotifyManager> {
    let channels: Vec<Box<dyn NotificationChannel>> = config
        .notify
        .webhooks
        .iter()
        .map(|w| {
            Box::new(WebhookChannel::new(&w.url, w.body_template.clone()))
                as Box<dyn NotificationChannel>
        })
        .collect();
    Ok(NotifyManager::new(channels, config.min_severity()?))
}

async fn run_checks(config: &CollectorConfig) -> Vec<MetricSample> {
    let now = Utc::now();
    let mut set = JoinSet::new();
    for check_config in config.checks.iter().cloned() {
        let check: Arc<dyn Check> = Arc::new(CycleLogCheck::new(check_config));
        set.spawn_blocking(move || {
            let name = check.name().to_string();
            (name, check.collect(now))
        });
    }

    let mut samples = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((name, Ok(batch))) => {
                tracing::debug!(check = %name, count = batch.len(), "check finished");
                samples.extend(batch);
            }
            Ok((name, Err(e))) => {
                tracing::warn!(check = %name, error = %e, "check failed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "check task panicked");
            }
        }
    }
    samples
}

async fn evaluate_thresholds(
    config: &CollectorConfig,
    store: &MetricStore,
    dispatcher: &AlertDispatcher,
) -> Result<()> {
    for threshold in &config.thresholds {
        let band: ThresholdBand = threshold.band();
        let latest = store.latest(&band.component, &band.metric_name)?;
        let Some(sample) = latest else {
            tracing::debug!(
                component = %band.component,
                metric = %band.metric_name,
                "no stored value for threshold, skipping"
            );
            continue;
        };
        let Some(value) = sample.value_f64() else {
            tracing::warn!(
                component = %band.component,
                metric = %band.metric_name,
                value = %sample.metric_value,
                "stored value is not numeric, skipping threshold"
            );
            continue;
        };

        // A failing dispatch must not abort the sweep; sibling thresholds
        // still get evaluated and the run still exits 0.
        let dispatched = match band.evaluate(value) {
            Some(severity) => {
                let message = band.breach_message(value, severity);
                dispatcher
                    .breach(&band.component, threshold.alert_type(), severity, &message)
                    .await
                    .map(|_| ())
            }
            None => dispatcher
                .clear(&band.component, threshold.alert_type())
                .map(|_| ()),
        };
        if let Err(e) = dispatched {
            tracing::warn!(
                component = %band.component,
                metric = %band.metric_name,
                error = %e,
                "alert dispatch failed"
            );
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = CollectorConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    pipemon_common::id::init(config.machine_id, config.node_id);

    let store = MetricStore::open(&config.data_dir)
        .with_context(|| format!("opening metric store in {}", config.data_dir.display()))?;
    let alert_store = AlertStore::open(&config.data_dir)
        .with_context(|| format!("opening alert store in {}", config.data_dir.display()))?;
    let dispatcher = AlertDispatcher::new(
        alert_store,
        build_notifier(&config)?,
        DispatchConfig {
            dedup_enabled: config.dedup.enabled,
            dedup_window_secs: config.dedup.window_secs,
        },
    );

    let samples = run_checks(&config).await;
    tracing::info!(count = samples.len(), "collected samples");
    store.append_batch(&samples).context("appending samples")?;

    evaluate_thresholds(&config, &store, &dispatcher).await?;

    if config.retention_days > 0 {
        match store.cleanup(config.retention_days) {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed, "expired metric partitions removed");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "partition cleanup failed"),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli).await
}
