//! Slot liveness detection
//!
//! Keeps a bounded history of observed slots and decides whether the
//! validator has stopped producing blocks. Timestamps come from the tokio
//! clock so the detector follows paused time in tests.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;

/// Observations kept before the oldest is evicted
pub const MAX_SLOT_HISTORY: usize = 20;

/// A single slot reading
#[derive(Debug, Clone, Copy)]
pub struct SlotObservation {
    pub slot: u64,
    pub observed_at: Instant,
    /// Wall-clock time of the reading, for display only
    pub wall_time: DateTime<Local>,
}

/// Details of a slot that stopped advancing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckInfo {
    pub slot: u64,
    pub first_observed_at: Instant,
    pub last_observed_at: Instant,
    pub first_observed_wall: DateTime<Local>,
    pub duration: Duration,
    pub observation_count: usize,
}

impl fmt::Display for StuckInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = Duration::from_secs(self.duration.as_secs_f64().round() as u64);
        write!(
            f,
            "Stuck on slot {} for {} (observed {} times, first at {})",
            self.slot,
            humantime::format_duration(rounded),
            self.observation_count,
            self.first_observed_wall.format("%H:%M:%S")
        )
    }
}

/// Ring of the most recent slot observations
///
/// Safe to share between tasks: every method takes `&self`.
#[derive(Debug)]
pub struct SlotHistory {
    entries: Mutex<VecDeque<SlotObservation>>,
    stuck_threshold: Duration,
}

impl SlotHistory {
    pub fn new(stuck_threshold: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(MAX_SLOT_HISTORY)),
            stuck_threshold,
        }
    }

    pub fn stuck_threshold(&self) -> Duration {
        self.stuck_threshold
    }

    /// Record a slot observed now
    pub fn record(&self, slot: u64) {
        self.record_at(slot, Instant::now());
    }

    /// Record a slot observed at a given instant
    pub fn record_at(&self, slot: u64, observed_at: Instant) {
        let mut entries = self.lock();
        entries.push_back(SlotObservation {
            slot,
            observed_at,
            wall_time: Local::now(),
        });
        while entries.len() > MAX_SLOT_HISTORY {
            entries.pop_front();
        }
    }

    /// Check whether the latest slot has been repeating for at least the threshold
    ///
    /// Only the trailing run of identical slots counts; an older occurrence of
    /// the same slot separated by a different one starts a new run.
    pub fn is_stuck(&self) -> Option<StuckInfo> {
        let entries = self.lock();
        if entries.len() < 2 {
            return None;
        }

        let last = *entries.back()?;
        let run: Vec<&SlotObservation> = entries
            .iter()
            .rev()
            .take_while(|entry| entry.slot == last.slot)
            .collect();
        if run.len() < 2 {
            return None;
        }

        let first = run.last()?;
        let duration = last.observed_at.saturating_duration_since(first.observed_at);
        if duration < self.stuck_threshold {
            return None;
        }

        Some(StuckInfo {
            slot: last.slot,
            first_observed_at: first.observed_at,
            last_observed_at: last.observed_at,
            first_observed_wall: first.wall_time,
            duration,
            observation_count: run.len(),
        })
    }

    /// True when the last two observations differ
    pub fn has_progressed(&self) -> bool {
        let entries = self.lock();
        let mut recent = entries.iter().rev();
        match (recent.next(), recent.next()) {
            (Some(last), Some(previous)) => last.slot != previous.slot,
            _ => false,
        }
    }

    pub fn latest_slot(&self) -> Option<u64> {
        self.lock().back().map(|entry| entry.slot)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Oldest-first copy of the current history
    pub fn snapshot(&self) -> Vec<SlotObservation> {
        self.lock().iter().copied().collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SlotObservation>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(180);

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_keeps_only_last_twenty_observations() {
        let history = SlotHistory::new(THRESHOLD);
        let t0 = Instant::now();
        for slot in 0..21 {
            history.record_at(slot, t0 + secs(slot));
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), MAX_SLOT_HISTORY);
        assert_eq!(snapshot.first().map(|e| e.slot), Some(1));
        assert_eq!(history.latest_slot(), Some(20));
    }

    #[test]
    fn test_fewer_than_two_observations_is_never_stuck() {
        let history = SlotHistory::new(Duration::ZERO);
        assert!(history.is_stuck().is_none());

        history.record(5);
        assert!(history.is_stuck().is_none());
        assert!(!history.has_progressed());
    }

    #[test]
    fn test_different_last_two_slots_is_not_stuck() {
        let history = SlotHistory::new(Duration::ZERO);
        let t0 = Instant::now();
        history.record_at(5, t0);
        history.record_at(5, t0 + secs(200));
        history.record_at(6, t0 + secs(400));

        assert!(history.is_stuck().is_none());
        assert!(history.has_progressed());
    }

    #[test]
    fn test_repeated_slot_past_threshold_is_stuck() {
        let history = SlotHistory::new(THRESHOLD);
        let t0 = Instant::now();
        let t1 = t0 + secs(100);
        let t2 = t0 + secs(200);
        history.record_at(5, t0);
        history.record_at(5, t1);
        history.record_at(5, t2);

        let info = history.is_stuck().expect("slot 5 should be stuck");
        assert_eq!(info.slot, 5);
        assert_eq!(info.observation_count, 3);
        assert_eq!(info.first_observed_at, t0);
        assert_eq!(info.last_observed_at, t2);
        assert_eq!(info.duration, secs(200));
        assert!(!history.has_progressed());
    }

    #[test]
    fn test_repeated_slot_under_threshold_is_not_stuck() {
        let history = SlotHistory::new(THRESHOLD);
        let t0 = Instant::now();
        history.record_at(5, t0);
        history.record_at(5, t0 + secs(179));

        assert!(history.is_stuck().is_none());
    }

    #[test]
    fn test_run_exactly_at_threshold_is_stuck() {
        let history = SlotHistory::new(THRESHOLD);
        let t0 = Instant::now();
        history.record_at(5, t0);
        history.record_at(5, t0 + THRESHOLD);

        let info = history.is_stuck().expect("a run lasting the threshold is stuck");
        assert_eq!(info.duration, THRESHOLD);
        assert_eq!(info.observation_count, 2);
    }

    #[test]
    fn test_only_trailing_run_counts() {
        let history = SlotHistory::new(THRESHOLD);
        let t0 = Instant::now();
        history.record_at(5, t0);
        history.record_at(6, t0 + secs(10));
        history.record_at(5, t0 + secs(20));
        history.record_at(5, t0 + secs(190));

        // The first 5 is separated by a 6, so the run started at t0+20s
        assert!(history.is_stuck().is_none());

        history.record_at(5, t0 + secs(200));
        let info = history.is_stuck().expect("trailing run should be stuck");
        assert_eq!(info.observation_count, 3);
        assert_eq!(info.first_observed_at, t0 + secs(20));
    }

    #[test]
    fn test_stuck_info_display() {
        let history = SlotHistory::new(Duration::ZERO);
        let t0 = Instant::now();
        history.record_at(42, t0);
        history.record_at(42, t0 + Duration::from_millis(90_400));

        let info = history.is_stuck().unwrap();
        let text = info.to_string();
        assert!(text.starts_with("Stuck on slot 42 for 1m 30s (observed 2 times, first at "));
        assert_eq!(text.matches(':').count(), 2);
    }

    #[test]
    fn test_empty_history_has_no_latest_slot() {
        let history = SlotHistory::new(THRESHOLD);
        assert!(history.is_empty());
        assert_eq!(history.latest_slot(), None);
    }
}
