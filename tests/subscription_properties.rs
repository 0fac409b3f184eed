//! Behaviour of a resilient dashboard subscription against a scripted server.
//!
//! Time is paused; `advance` moves the clock and lets the driver react.

use std::sync::Arc;
use std::time::Duration;

use stats_sync::adapters::memory::{OpenOutcome, ScriptedStatsSource};
use stats_sync::application::{RequestQueue, ResilientSubscription};
use stats_sync::domain::foundation::Timestamp;
use stats_sync::domain::stats::{DashboardStats, DateRange, StatsSnapshot};
use stats_sync::domain::subscription::{
    ReconnectPolicy, SubscriptionError, SubscriptionSettings, SubscriptionState,
};
use stats_sync::ports::SourceError;

// =============================================================================
// Test Infrastructure
// =============================================================================

fn subscribe(source: &Arc<ScriptedStatsSource>, settings: SubscriptionSettings) -> ResilientSubscription {
    ResilientSubscription::subscribe(
        source.clone(),
        Arc::new(RequestQueue::new(Duration::from_secs(1))),
        settings,
        None,
    )
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

fn snapshot(generated_at: Timestamp, total_events: i64) -> StatsSnapshot {
    StatsSnapshot::new(
        DashboardStats {
            total_events,
            ..Default::default()
        },
        None,
        generated_at,
    )
}

fn displayed_events(subscription: &ResilientSubscription) -> Option<i64> {
    subscription.view().stats.map(|s| s.stats.total_events)
}

fn transport_down() -> OpenOutcome {
    OpenOutcome::Refuse(SourceError::Transport("connection refused".into()))
}

// =============================================================================
// Reconnect backoff
// =============================================================================

#[tokio::test(start_paused = true)]
async fn backoff_doubles_then_gives_up_after_five_attempts() {
    let source = Arc::new(ScriptedStatsSource::with_default(transport_down()));
    let subscription = subscribe(&source, SubscriptionSettings::default());
    settle().await;
    assert_eq!(source.opens().len(), 1);

    for (retry, delay_secs) in [1u64, 2, 4, 8, 16].into_iter().enumerate() {
        assert_eq!(subscription.state(), SubscriptionState::Reconnecting);

        advance(Duration::from_secs(delay_secs) - Duration::from_millis(1)).await;
        assert_eq!(source.opens().len(), retry + 1, "retried early at attempt {}", retry + 1);

        advance(Duration::from_millis(1)).await;
        assert_eq!(source.opens().len(), retry + 2);
    }

    assert_eq!(subscription.state(), SubscriptionState::Failed);
    assert_eq!(
        subscription.view().error,
        Some(SubscriptionError::ReconnectExhausted { attempts: 5 })
    );

    advance(Duration::from_secs(120)).await;
    assert_eq!(source.opens().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_after_failure_starts_fresh_connection() {
    let source = Arc::new(ScriptedStatsSource::with_default(transport_down()));
    let settings = SubscriptionSettings {
        reconnect: ReconnectPolicy {
            max_attempts: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let subscription = subscribe(&source, settings);
    settle().await;
    advance(Duration::from_secs(1)).await;
    assert_eq!(subscription.state(), SubscriptionState::Failed);

    source.set_default(OpenOutcome::Accept { ack: true });
    let refreshed = subscription.refresh().await;
    settle().await;

    assert!(refreshed.is_ok());
    assert_eq!(subscription.state(), SubscriptionState::Connected);
    assert_eq!(subscription.view().error, None);
}

// =============================================================================
// Debounce and request coalescing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn burst_of_filter_edits_issues_one_request_with_last_filter() {
    let source = Arc::new(ScriptedStatsSource::new());
    let settings = SubscriptionSettings {
        push_enabled: false,
        ..Default::default()
    };
    let subscription = subscribe(&source, settings);
    settle().await;
    assert_eq!(subscription.state(), SubscriptionState::PollingFallback);
    assert_eq!(source.fetches(), vec![None]);

    let mut last = None;
    for day in 1..=10 {
        let start = format!("2025-02-{day:02}");
        let range = DateRange::from_bounds(Some(start.as_str()), Some("2025-03-01")).unwrap();
        subscription.set_filter(range);
        last = range;
        advance(Duration::from_millis(10)).await;
    }

    advance(Duration::from_secs(2)).await;

    assert_eq!(source.fetches(), vec![None, last]);
    assert_eq!(subscription.view().filter, last);
}

#[tokio::test(start_paused = true)]
async fn back_to_back_refreshes_share_one_request() {
    let source = Arc::new(ScriptedStatsSource::new());
    source.set_fetch_delay(Duration::from_millis(500));
    let subscription = subscribe(&source, SubscriptionSettings::default());
    settle().await;

    let (first, second) = tokio::join!(subscription.refresh(), subscription.refresh());

    assert_eq!(source.fetches().len(), 1);
    assert_eq!(first.unwrap(), second.unwrap());
}

// =============================================================================
// Staleness
// =============================================================================

#[tokio::test(start_paused = true)]
async fn older_snapshot_is_not_applied() {
    let source = Arc::new(ScriptedStatsSource::new());
    let subscription = subscribe(&source, SubscriptionSettings::default());
    settle().await;

    let now = Timestamp::now();
    source.push_snapshot(snapshot(now, 1));
    settle().await;
    source.push_snapshot(snapshot(now.plus_millis(-1000), 2));
    settle().await;

    assert_eq!(displayed_events(&subscription), Some(1));

    source.push_snapshot(snapshot(now.plus_millis(1000), 3));
    settle().await;
    assert_eq!(displayed_events(&subscription), Some(3));
}

#[tokio::test(start_paused = true)]
async fn reconnect_never_rolls_back_displayed_stats() {
    let source = Arc::new(ScriptedStatsSource::new());
    let subscription = subscribe(&source, SubscriptionSettings::default());
    settle().await;
    assert_eq!(subscription.state(), SubscriptionState::Connected);

    let base = Timestamp::now();
    for n in 1..=3 {
        source.push_snapshot(snapshot(base.plus_millis(n * 1000), n));
        settle().await;
    }
    assert_eq!(displayed_events(&subscription), Some(3));

    source.script_opens([transport_down(), OpenOutcome::Accept { ack: true }]);
    source.drop_connection();
    settle().await;
    assert_eq!(subscription.state(), SubscriptionState::Reconnecting);
    assert_eq!(displayed_events(&subscription), Some(3));

    advance(Duration::from_secs(1)).await;
    assert_eq!(source.opens().len(), 2);
    assert_eq!(subscription.state(), SubscriptionState::Reconnecting);

    advance(Duration::from_secs(2)).await;
    assert_eq!(source.opens().len(), 3);
    assert_eq!(subscription.state(), SubscriptionState::Connected);
    assert_eq!(subscription.view().reconnect_attempts, 0);

    source.push_snapshot(snapshot(base.plus_millis(2000), 2));
    settle().await;
    assert_eq!(displayed_events(&subscription), Some(3));

    source.push_snapshot(snapshot(base.plus_millis(4000), 4));
    settle().await;
    assert_eq!(displayed_events(&subscription), Some(4));
}

// =============================================================================
// Safety net
// =============================================================================

#[tokio::test(start_paused = true)]
async fn watchdog_clears_loading_on_silent_connection() {
    let source = Arc::new(ScriptedStatsSource::with_default(OpenOutcome::Accept { ack: false }));
    let subscription = subscribe(&source, SubscriptionSettings::default());
    settle().await;
    assert!(subscription.view().is_loading);

    advance(Duration::from_secs(10)).await;

    assert!(!subscription.view().is_loading);
    assert_eq!(subscription.state(), SubscriptionState::Connecting);
}
