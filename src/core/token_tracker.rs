//! Sliding-window token ledger used for admission control.
//!
//! Usage is recorded as timestamped entries and only entries younger than the
//! window count against the budget. A sliding window avoids the burst of
//! admissions a fixed bucket allows right after each reset.
//!
//! Admitted-but-unfinished tasks hold a *reservation* for their estimated cost.
//! Reservations never age out; they are settled into real usage (or released)
//! when the task ends, so a long-running task keeps its share of the budget.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::PoolConfig;

/// Identifier of an outstanding reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId(u64);

/// A single usage record.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// Who consumed the tokens.
    pub source: String,
    /// Tokens consumed.
    pub units: u64,
    /// When the usage was recorded.
    pub recorded_at: Instant,
}

#[derive(Debug)]
struct Reservation {
    source: String,
    units: u64,
}

#[derive(Debug, Default)]
struct Ledger {
    entries: VecDeque<LedgerEntry>,
    window_total: u64,
    reservations: HashMap<ReservationId, Reservation>,
    reserved_total: u64,
    next_reservation: u64,
}

impl Ledger {
    /// Drop entries that have aged out of the window. Entries are appended in
    /// time order, so only the front needs checking.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.recorded_at) < window {
                break;
            }
            self.window_total = self.window_total.saturating_sub(front.units);
            self.entries.pop_front();
        }
    }

    fn committed(&self) -> u64 {
        self.window_total.saturating_add(self.reserved_total)
    }

    fn push(&mut self, source: &str, units: u64, now: Instant) {
        self.window_total = self.window_total.saturating_add(units);
        self.entries.push_back(LedgerEntry {
            source: source.to_string(),
            units,
            recorded_at: now,
        });
    }
}

/// Thread-safe sliding-window ledger.
#[derive(Debug)]
pub struct TokenTracker {
    budget: u64,
    window: Duration,
    ledger: Mutex<Ledger>,
}

impl TokenTracker {
    /// Create a tracker with a budget per window.
    #[must_use]
    pub fn new(budget: u64, window: Duration) -> Self {
        Self {
            budget,
            window,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Create a tracker from pool configuration.
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.token_budget, Duration::from_secs(config.window_seconds))
    }

    /// Token budget per window.
    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Record consumed tokens at the current time.
    pub fn record_usage(&self, source_id: &str, units: u64) {
        let mut ledger = self.ledger.lock();
        let now = Instant::now();
        ledger.prune(now, self.window);
        ledger.push(source_id, units, now);
    }

    /// Whether a task with this estimate may be admitted right now.
    pub fn can_submit(&self, estimated_units: u64) -> bool {
        let mut ledger = self.ledger.lock();
        ledger.prune(Instant::now(), self.window);
        ledger.committed().saturating_add(estimated_units) <= self.budget
    }

    /// Check the budget and reserve the estimate in one critical section.
    pub fn try_reserve(&self, source_id: &str, estimated_units: u64) -> Option<ReservationId> {
        let mut ledger = self.ledger.lock();
        ledger.prune(Instant::now(), self.window);
        if ledger.committed().saturating_add(estimated_units) > self.budget {
            return None;
        }
        let id = ReservationId(ledger.next_reservation);
        ledger.next_reservation += 1;
        ledger.reserved_total = ledger.reserved_total.saturating_add(estimated_units);
        ledger.reservations.insert(
            id,
            Reservation {
                source: source_id.to_string(),
                units: estimated_units,
            },
        );
        Some(id)
    }

    /// Replace a reservation with the tokens actually consumed.
    pub fn settle(&self, reservation: ReservationId, actual_units: u64) {
        let mut ledger = self.ledger.lock();
        let Some(held) = ledger.reservations.remove(&reservation) else {
            return;
        };
        ledger.reserved_total = ledger.reserved_total.saturating_sub(held.units);
        let now = Instant::now();
        ledger.prune(now, self.window);
        if actual_units > 0 {
            ledger.push(&held.source, actual_units, now);
        }
    }

    /// Drop a reservation without recording usage.
    pub fn release(&self, reservation: ReservationId) {
        let mut ledger = self.ledger.lock();
        if let Some(held) = ledger.reservations.remove(&reservation) {
            ledger.reserved_total = ledger.reserved_total.saturating_sub(held.units);
        }
    }

    /// Tokens still available for new admissions.
    pub fn remaining_budget(&self) -> u64 {
        let mut ledger = self.ledger.lock();
        ledger.prune(Instant::now(), self.window);
        self.budget.saturating_sub(ledger.committed())
    }

    /// Recorded usage inside the window.
    pub fn window_usage(&self) -> u64 {
        let mut ledger = self.ledger.lock();
        ledger.prune(Instant::now(), self.window);
        ledger.window_total
    }

    /// Tokens held by outstanding reservations.
    pub fn reserved(&self) -> u64 {
        self.ledger.lock().reserved_total
    }

    /// Window usage grouped by source.
    pub fn usage_by_source(&self) -> BTreeMap<String, u64> {
        let snapshot: Vec<(String, u64)> = {
            let mut ledger = self.ledger.lock();
            ledger.prune(Instant::now(), self.window);
            ledger
                .entries
                .iter()
                .map(|e| (e.source.clone(), e.units))
                .collect()
        };
        let mut usage = BTreeMap::new();
        for (source, units) in snapshot {
            let total = usage.entry(source).or_insert(0u64);
            *total = total.saturating_add(units);
        }
        usage
    }

    /// When the oldest entry leaves the window, if any entry exists.
    pub fn next_expiry(&self) -> Option<Instant> {
        let mut ledger = self.ledger.lock();
        ledger.prune(Instant::now(), self.window);
        ledger
            .entries
            .front()
            .and_then(|e| e.recorded_at.checked_add(self.window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_submit_respects_budget() {
        let tracker = TokenTracker::new(25_000, Duration::from_secs(60));
        tracker.record_usage("security-reviewer", 10_000);
        tracker.record_usage("test-runner", 10_000);
        assert!(tracker.can_submit(5_000));
        assert!(!tracker.can_submit(5_001));
        assert_eq!(tracker.remaining_budget(), 5_000);
    }

    #[test]
    fn test_reservations_count_against_budget() {
        let tracker = TokenTracker::new(25_000, Duration::from_secs(60));
        let first = tracker.try_reserve("doc-writer", 10_000).unwrap();
        let second = tracker.try_reserve("doc-writer", 10_000).unwrap();
        assert!(tracker.try_reserve("doc-writer", 10_000).is_none());
        assert_eq!(tracker.reserved(), 20_000);

        tracker.settle(first, 4_000);
        tracker.release(second);
        assert_eq!(tracker.reserved(), 0);
        assert_eq!(tracker.window_usage(), 4_000);
        assert_eq!(tracker.remaining_budget(), 21_000);
    }

    #[test]
    fn test_settle_with_zero_usage_records_nothing() {
        let tracker = TokenTracker::new(100, Duration::from_secs(60));
        let id = tracker.try_reserve("code-reviewer", 50).unwrap();
        tracker.settle(id, 0);
        assert!(tracker.usage_by_source().is_empty());
        assert!(tracker.next_expiry().is_none());
    }

    #[test]
    fn test_usage_by_source() {
        let tracker = TokenTracker::new(1_000, Duration::from_secs(60));
        tracker.record_usage("a", 10);
        tracker.record_usage("b", 20);
        tracker.record_usage("a", 5);
        let usage = tracker.usage_by_source();
        assert_eq!(usage.get("a"), Some(&15));
        assert_eq!(usage.get("b"), Some(&20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_age_out_of_window() {
        let tracker = TokenTracker::new(25_000, Duration::from_secs(60));
        tracker.record_usage("test-runner", 20_000);
        assert!(!tracker.can_submit(10_000));

        let expiry = tracker.next_expiry().unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!tracker.can_submit(10_000));
        assert!(Instant::now() < expiry);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(tracker.can_submit(10_000));
        assert_eq!(tracker.window_usage(), 0);
        assert!(tracker.next_expiry().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservations_never_age_out() {
        let tracker = TokenTracker::new(10_000, Duration::from_secs(60));
        let id = tracker.try_reserve("security-reviewer", 8_000).unwrap();
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(tracker.remaining_budget(), 2_000);
        tracker.release(id);
        assert_eq!(tracker.remaining_budget(), 10_000);
    }

    #[test]
    fn test_concurrent_records_stay_time_ordered() {
        let tracker = std::sync::Arc::new(TokenTracker::new(u64::MAX, Duration::from_secs(3600)));
        std::thread::scope(|scope| {
            for i in 0..8 {
                let tracker = std::sync::Arc::clone(&tracker);
                scope.spawn(move || {
                    let source = format!("worker-{i}");
                    for _ in 0..200 {
                        tracker.record_usage(&source, 1);
                        if let Some(id) = tracker.try_reserve(&source, 1) {
                            tracker.settle(id, 1);
                        }
                    }
                });
            }
        });

        let ledger = tracker.ledger.lock();
        assert_eq!(ledger.entries.len(), 3_200);
        assert!(ledger
            .entries
            .iter()
            .zip(ledger.entries.iter().skip(1))
            .all(|(a, b)| a.recorded_at <= b.recorded_at));
    }

    #[test]
    fn test_huge_usage_saturates() {
        let tracker = TokenTracker::new(1_000, Duration::from_secs(60));
        let id = tracker.try_reserve("b", 10).unwrap();
        tracker.record_usage("a", u64::MAX);
        tracker.record_usage("a", u64::MAX);
        tracker.settle(id, u64::MAX);
        assert_eq!(tracker.reserved(), 0);
        assert_eq!(tracker.window_usage(), u64::MAX);
        assert_eq!(tracker.remaining_budget(), 0);
        assert_eq!(tracker.usage_by_source().get("a"), Some(&u64::MAX));
    }
}
