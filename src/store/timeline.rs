//! Append-only, time-ordered set of matching-event timestamps

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

/// Sorted set of `(timestamp, sequence)` members.
///
/// Members are identified by the venue sequence alone: a redelivered event
/// is ignored even when it is recorded under a different timestamp. Entries
/// are only dropped by [`clear`].
///
/// [`clear`]: EventTimeline::clear
#[derive(Debug, Clone, Default)]
pub struct EventTimeline {
    entries: BTreeSet<(DateTime<Utc>, u64)>,
    sequences: HashSet<u64>,
}

impl EventTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member. Returns `false` if its sequence was already recorded.
    pub fn insert(&mut self, at: DateTime<Utc>, sequence: u64) -> bool {
        if !self.sequences.insert(sequence) {
            return false;
        }
        self.entries.insert((at, sequence))
    }

    /// Number of members with `from <= timestamp <= to`
    pub fn count_in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
        if from > to {
            return 0;
        }
        self.entries.range((from, u64::MIN)..=(to, u64::MAX)).count() as u64
    }

    /// Total number of members (lifetime count since the last clear)
    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.sequences.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_window_edges() {
        let now = t0();
        let period = Duration::seconds(180);
        let mut timeline = EventTimeline::new();

        timeline.insert(now - period - Duration::seconds(1), 1);
        timeline.insert(now - period + Duration::seconds(1), 2);
        timeline.insert(now, 3);

        assert_eq!(timeline.count_in_range(now - period, now), 2);
        assert_eq!(timeline.len(), 3);
    }

    #[test]
    fn test_both_edges_inclusive() {
        let now = t0();
        let period = Duration::seconds(60);
        let mut timeline = EventTimeline::new();

        timeline.insert(now - period, 1);
        timeline.insert(now, 2);
        timeline.insert(now + Duration::nanoseconds(1), 3);

        assert_eq!(timeline.count_in_range(now - period, now), 2);
    }

    #[test]
    fn test_duplicate_member_is_ignored() {
        let mut timeline = EventTimeline::new();
        assert!(timeline.insert(t0(), 7));
        assert!(!timeline.insert(t0(), 7));
        assert_eq!(timeline.len(), 1);

        // Same instant, different trade
        assert!(timeline.insert(t0(), 8));
        assert_eq!(timeline.count_in_range(t0(), t0()), 2);
    }

    #[test]
    fn test_sequence_identifies_member() {
        let mut timeline = EventTimeline::new();
        assert!(timeline.insert(t0(), 7));
        // Same trade recorded later under a clamped timestamp
        assert!(!timeline.insert(t0() + Duration::seconds(1), 7));
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.count_in_range(t0(), t0() + Duration::seconds(1)), 1);

        timeline.clear();
        assert!(timeline.insert(t0(), 7));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let mut timeline = EventTimeline::new();
        timeline.insert(t0(), 1);
        assert_eq!(timeline.count_in_range(t0(), t0() - Duration::seconds(1)), 0);

        timeline.clear();
        assert!(timeline.is_empty());
    }
}
