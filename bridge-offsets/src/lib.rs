//! Per-partition offset tracking for the sink endpoint.
//!
//! A Kafka partition's offsets may be delivered to the AMQP peer out of
//! order relative to how they were produced — settled sends happen as soon
//! as credit allows, and unsettled sends only become "delivered" once their
//! disposition arrives, which can arrive in any order relative to other
//! in-flight deliveries on the same partition. Kafka's commit model, though,
//! only lets a consumer commit a single offset per partition: "everything up
//! to and including this point has been processed." Committing any offset
//! earlier than the true contiguous frontier is safe but wasteful (it would
//! cause redelivery on restart); committing past it would lose records.
//!
//! This module tracks, for each partition, the contiguous prefix of offsets
//! that have been delivered starting from the last committed point, and
//! only ever reports a commit position at the boundary of that prefix.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use bridge_core::DeliveryToken;

#[derive(Debug, Default)]
struct PartitionState {
    /// Last offset known to be contiguously delivered; the next safe commit
    /// position is `frontier + 1`. `None` until the frontier's seed offset
    /// (the lowest offset ever tracked for this partition) has itself been
    /// delivered.
    frontier: Option<i64>,
    /// The lowest offset ever passed to [`OffsetTracker::track`], which is
    /// the only offset allowed to seed the frontier from `None`.
    min_tracked: Option<i64>,
    /// Offsets handed to [`OffsetTracker::track`] but not yet delivered.
    in_flight: BTreeSet<i64>,
    /// Offsets delivered out of order, sitting above the current frontier
    /// with a gap still open beneath them.
    delivered_above: BTreeSet<i64>,
    /// Highest offset ever committed for this partition, used to reject
    /// duplicate or regressive tracking.
    committed: Option<i64>,
}

impl PartitionState {
    fn advance_frontier(&mut self) {
        loop {
            let candidate = match self.frontier {
                None => self.min_tracked.filter(|seed| self.delivered_above.contains(seed)),
                Some(f) => {
                    let next = f + 1;
                    self.delivered_above.contains(&next).then_some(next)
                }
            };
            match candidate {
                Some(offset) => {
                    self.delivered_above.remove(&offset);
                    self.frontier = Some(offset);
                }
                None => break,
            }
        }
    }
}

/// Tracks in-flight and delivered offsets per partition, deriving the
/// highest offset each partition is currently safe to commit.
///
/// Pure and I/O-free: callers are responsible for actually performing the
/// Kafka commit and for feeding the result back through [`Self::commit`].
#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<i32, PartitionState>,
    tags: HashMap<DeliveryToken, (i32, i64)>,
}

impl OffsetTracker {
    /// An empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a token has been handed to the event loop for a given
    /// partition and offset, before it has been delivered.
    pub fn track(&mut self, tag: DeliveryToken, partition: i32, offset: i64) {
        let state = self.partitions.entry(partition).or_default();
        state.in_flight.insert(offset);
        state.min_tracked = Some(state.min_tracked.map_or(offset, |m| m.min(offset)));
        self.tags.insert(tag, (partition, offset));
    }

    /// Mark a previously tracked token as delivered (settled at send time,
    /// or disposed of for unsettled links), advancing that partition's
    /// contiguous frontier as far as the now-available offsets allow.
    ///
    /// A tag not previously passed to [`Self::track`] is ignored.
    pub fn delivered(&mut self, tag: &DeliveryToken) {
        let Some((partition, offset)) = self.tags.remove(tag) else {
            return;
        };
        let state = self.partitions.entry(partition).or_default();
        state.in_flight.remove(&offset);
        state.delivered_above.insert(offset);
        state.advance_frontier();
    }

    /// The offsets currently safe to commit, one per partition with a
    /// contiguously delivered prefix past its last commit, expressed as
    /// "next offset to resume from" (frontier + 1) per Kafka commit
    /// convention.
    #[must_use]
    pub fn get_offsets(&self) -> HashMap<i32, i64> {
        self.partitions
            .iter()
            .filter_map(|(&partition, state)| {
                let frontier = state.frontier?;
                if state.committed == Some(frontier + 1) {
                    return None;
                }
                Some((partition, frontier + 1))
            })
            .collect()
    }

    /// Record that `offset` (a resume position, i.e. one past the last
    /// processed record) has actually been committed to Kafka for
    /// `partition`, so it is not reported again by [`Self::get_offsets`]
    /// until the frontier advances further.
    pub fn commit(&mut self, partition: i32, offset: i64) {
        let state = self.partitions.entry(partition).or_default();
        state.committed = Some(state.committed.map_or(offset, |c| c.max(offset)));
    }

    /// Drop all tracked state, used when a link detaches and its partitions
    /// are released.
    pub fn clear(&mut self) {
        self.partitions.clear();
        self.tags.clear();
    }
}

/// A handle to an [`OffsetTracker`] shared between the event loop, which
/// mutates it as dispositions arrive, and the consumer worker thread, which
/// only ever reads a snapshot of it to decide what to commit.
///
/// The tracker's own state transitions are driven exclusively by
/// calls the event loop makes through this handle; the worker thread's only
/// write path is [`Self::commit`], reporting back what it actually
/// persisted to Kafka. A `std::sync::Mutex` is adequate here: contention is
/// low (one event loop, one worker thread, and reads happen only once per
/// poll cycle).
#[derive(Debug, Clone, Default)]
pub struct SharedOffsetTracker(Arc<Mutex<OffsetTracker>>);

impl SharedOffsetTracker {
    /// An empty, shared tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// See [`OffsetTracker::track`].
    pub fn track(&self, tag: DeliveryToken, partition: i32, offset: i64) {
        self.lock().track(tag, partition, offset);
    }

    /// See [`OffsetTracker::delivered`].
    pub fn delivered(&self, tag: &DeliveryToken) {
        self.lock().delivered(tag);
    }

    /// A point-in-time snapshot of [`OffsetTracker::get_offsets`], safe to
    /// call from the consumer worker thread between poll cycles.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<i32, i64> {
        self.lock().get_offsets()
    }

    /// See [`OffsetTracker::commit`].
    pub fn commit(&self, partition: i32, offset: i64) {
        self.lock().commit(partition, offset);
    }

    /// See [`OffsetTracker::clear`].
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OffsetTracker> {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tok(n: u64) -> DeliveryToken {
        DeliveryToken::from(format!("t{n}"))
    }

    #[test]
    fn in_order_delivery_advances_frontier_one_at_a_time() {
        let mut tracker = OffsetTracker::new();
        tracker.track(tok(0), 0, 10);
        tracker.track(tok(1), 0, 11);
        tracker.track(tok(2), 0, 12);

        tracker.delivered(&tok(0));
        assert_eq!(tracker.get_offsets().get(&0), Some(&11));

        tracker.delivered(&tok(1));
        assert_eq!(tracker.get_offsets().get(&0), Some(&12));

        tracker.delivered(&tok(2));
        assert_eq!(tracker.get_offsets().get(&0), Some(&13));
    }

    #[test]
    fn out_of_order_delivery_only_advances_on_contiguous_fill() {
        let mut tracker = OffsetTracker::new();
        tracker.track(tok(0), 0, 10);
        tracker.track(tok(1), 0, 11);
        tracker.track(tok(2), 0, 12);

        tracker.delivered(&tok(2));
        assert_eq!(tracker.get_offsets().get(&0), None);

        tracker.delivered(&tok(0));
        assert_eq!(tracker.get_offsets().get(&0), Some(&11));

        tracker.delivered(&tok(1));
        assert_eq!(tracker.get_offsets().get(&0), Some(&13));
    }

    #[test]
    fn partitions_are_independent() {
        let mut tracker = OffsetTracker::new();
        tracker.track(tok(0), 0, 5);
        tracker.track(tok(1), 1, 100);

        tracker.delivered(&tok(1));
        assert_eq!(tracker.get_offsets().get(&1), Some(&101));
        assert_eq!(tracker.get_offsets().get(&0), None);
    }

    #[test]
    fn commit_suppresses_repeated_reporting_at_same_frontier() {
        let mut tracker = OffsetTracker::new();
        tracker.track(tok(0), 0, 10);
        tracker.delivered(&tok(0));
        assert_eq!(tracker.get_offsets().get(&0), Some(&11));

        tracker.commit(0, 11);
        assert_eq!(tracker.get_offsets().get(&0), None);
    }

    #[test]
    fn commit_is_monotonic_even_if_called_with_an_older_offset() {
        let mut tracker = OffsetTracker::new();
        tracker.commit(0, 50);
        tracker.commit(0, 10);
        tracker.track(tok(0), 0, 49);
        tracker.delivered(&tok(0));
        // frontier is 49 but committed stays at the max ever seen (50), so
        // nothing new is reported.
        assert_eq!(tracker.get_offsets().get(&0), None);
    }

    #[test]
    fn delivered_on_unknown_tag_is_a_no_op() {
        let mut tracker = OffsetTracker::new();
        tracker.delivered(&tok(99));
        assert!(tracker.get_offsets().is_empty());
    }

    #[test]
    fn clear_resets_all_state() {
        let mut tracker = OffsetTracker::new();
        tracker.track(tok(0), 0, 10);
        tracker.delivered(&tok(0));
        tracker.clear();
        assert!(tracker.get_offsets().is_empty());
        // A tag tracked before clear is forgotten.
        tracker.delivered(&tok(0));
        assert!(tracker.get_offsets().is_empty());
    }

    #[test]
    fn shared_tracker_is_readable_from_another_thread() {
        let shared = SharedOffsetTracker::new();
        shared.track(tok(0), 0, 10);
        shared.delivered(&tok(0));

        let reader = shared.clone();
        let snapshot = std::thread::spawn(move || reader.snapshot())
            .join()
            .unwrap();
        assert_eq!(snapshot.get(&0), Some(&11));

        shared.commit(0, 11);
        assert!(shared.snapshot().is_empty());
    }

    proptest! {
        /// However a sequence of distinct offsets on one partition is
        /// delivered, the reported commit position is always one past the
        /// longest contiguous run starting at the lowest offset tracked —
        /// never ahead of what has actually been delivered.
        #[test]
        fn frontier_never_exceeds_contiguous_prefix(
            perm in proptest::collection::vec(0i64..20, 1..20)
                .prop_map(|mut v| { v.sort_unstable(); v.dedup(); v })
        ) {
            let mut tracker = OffsetTracker::new();
            for (i, &offset) in perm.iter().enumerate() {
                tracker.track(tok(i as u64), 0, offset);
            }

            // Deliver in reverse order: maximal disorder.
            for (i, _) in perm.iter().enumerate().rev() {
                tracker.delivered(&tok(i as u64));
            }

            let reported = tracker.get_offsets().get(&0).copied();
            let expected = perm.first().map(|&first| {
                let mut frontier = first;
                for &offset in &perm[1..] {
                    if offset == frontier + 1 {
                        frontier = offset;
                    } else {
                        break;
                    }
                }
                frontier + 1
            });
            prop_assert_eq!(reported, expected);
        }

        /// Committing whatever `get_offsets` reports and then asking again
        /// never yields the same or a lower value until more is delivered.
        #[test]
        fn commit_then_requery_is_idempotent(offset in 0i64..1000) {
            let mut tracker = OffsetTracker::new();
            tracker.track(tok(0), 0, offset);
            tracker.delivered(&tok(0));
            let reported = tracker.get_offsets().get(&0).copied().unwrap();
            tracker.commit(0, reported);
            prop_assert_eq!(tracker.get_offsets().get(&0).copied(), None);
        }
    }
}
