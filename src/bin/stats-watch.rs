//! Terminal dashboard watcher.
//!
//! Subscribes to a stats-sync server with the configured filter and logs
//! every applied snapshot and state transition until Ctrl+C.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use stats_sync::adapters::HttpStatsSource;
use stats_sync::application::{RequestQueue, ResilientSubscription};
use stats_sync::config::ClientConfig;
use stats_sync::domain::subscription::SubscriptionView;
use stats_sync::ports::StatsSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stats_sync=info")),
        )
        .init();

    let config = ClientConfig::load().context("Failed to load client configuration")?;
    config.validate().context("Invalid client configuration")?;
    let filter = config.filter()?;

    let source: Arc<dyn StatsSource> = Arc::new(
        HttpStatsSource::new(config.base_url.clone(), config.request_timeout())
            .context("Failed to build HTTP client")?,
    );
    let queue = Arc::new(RequestQueue::new(config.min_request_spacing()));

    tracing::info!(
        base_url = %config.base_url,
        filtered = filter.is_some(),
        push_enabled = config.push_enabled,
        "Watching dashboard statistics"
    );
    let subscription =
        ResilientSubscription::subscribe(source, queue, config.subscription_settings(), filter);

    watch_views(subscription.watch(), shutdown_signal()).await;

    subscription.unsubscribe().await;
    tracing::info!("Watcher stopped");
    Ok(())
}

/// Logs view changes until `shutdown` resolves or the subscription ends.
async fn watch_views(
    mut views: watch::Receiver<SubscriptionView>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    let mut last_applied = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if let Some(error) = &view.error {
                    tracing::warn!(state = ?view.state, %error, "Subscription error");
                }
                if let Some(snapshot) = &view.stats {
                    if last_applied != Some(snapshot.generated_at) {
                        last_applied = Some(snapshot.generated_at);
                        tracing::info!(
                            generated_at = %snapshot.generated_at,
                            total_events = snapshot.stats.total_events,
                            total_users = snapshot.stats.total_users,
                            total_orders = snapshot.stats.total_orders,
                            total_revenue = snapshot.stats.total_revenue,
                            "Snapshot applied"
                        );
                    }
                }
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
