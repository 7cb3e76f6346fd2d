//! Tests for the sliding-window token ledger

use std::sync::Arc;
use std::time::Duration;

use prometheus_agent_pool::config::PoolConfig;
use prometheus_agent_pool::core::TokenTracker;

#[test]
fn test_from_config_uses_budget_and_window() {
    let config = PoolConfig {
        token_budget: 25_000,
        window_seconds: 30,
        ..Default::default()
    };
    let tracker = TokenTracker::from_config(&config);
    assert_eq!(tracker.budget(), 25_000);
    assert_eq!(tracker.window(), Duration::from_secs(30));
    assert_eq!(tracker.remaining_budget(), 25_000);
}

#[test]
fn test_usage_never_exceeds_budget_under_contention() {
    let tracker = Arc::new(TokenTracker::new(10_000, Duration::from_secs(60)));
    let granted: usize = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                scope.spawn(move || {
                    (0..50)
                        .filter(|_| tracker.try_reserve("worker", 100).is_some())
                        .count()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).sum()
    });
    assert_eq!(granted, 100);
    assert_eq!(tracker.reserved(), 10_000);
    assert_eq!(tracker.remaining_budget(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_settled_usage_ages_out() {
    let tracker = TokenTracker::new(20_000, Duration::from_secs(60));
    let reservation = tracker.try_reserve("security-reviewer", 12_000).unwrap();
    assert!(!tracker.can_submit(10_000));

    tracker.settle(reservation, 11_000);
    assert_eq!(tracker.reserved(), 0);
    assert_eq!(tracker.window_usage(), 11_000);
    assert!(!tracker.can_submit(10_000));

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(tracker.window_usage(), 0);
    assert!(tracker.can_submit(20_000));
    assert!(tracker.usage_by_source().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_next_expiry_tracks_oldest_entry() {
    let tracker = TokenTracker::new(1_000, Duration::from_secs(10));
    assert!(tracker.next_expiry().is_none());

    let start = tokio::time::Instant::now();
    tracker.record_usage("a", 10);
    tokio::time::advance(Duration::from_secs(4)).await;
    tracker.record_usage("b", 20);

    assert_eq!(tracker.next_expiry(), Some(start + Duration::from_secs(10)));
    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(
        tracker.next_expiry(),
        Some(start + Duration::from_secs(14))
    );
}
