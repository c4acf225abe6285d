//! Deferred actions keyed to the simulation clock.
//!
//! Timed follow-ups (soldier training, gatherer re-dispatch, delayed wall
//! pruning) are queued here instead of on wall-clock timers, so a paused
//! simulation stays paused and a seeded run replays exactly.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::game::{BuildingId, KingdomId, UnitId};

/// A deferred action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledEvent {
    /// A barracks finishes training a soldier.
    TrainSoldier {
        /// Kingdom that owns the barracks.
        kingdom: KingdomId,
        /// Training barracks.
        building: BuildingId,
    },
    /// An idle gatherer is sent out again.
    RequeueGatherer {
        /// Unit to re-dispatch.
        unit: UnitId,
    },
    /// Another batch of redundant walls is pruned.
    PruneWalls {
        /// Kingdom whose walls are pruned.
        kingdom: KingdomId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    at_ms: u64,
    seq: u64,
    event: ScheduledEvent,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at_ms, self.seq).cmp(&(other.at_ms, other.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-queue of events ordered by due time, then insertion order.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl Scheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `event` to fire at simulation time `at_ms`.
    pub fn schedule_at(&mut self, at_ms: u64, event: ScheduledEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry { at_ms, seq, event }));
    }

    /// Remove and return every event due at or before `now_ms`, in order.
    pub fn drain_due(&mut self, now_ms: u64) -> Vec<ScheduledEvent> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.queue.peek() {
            if entry.at_ms > now_ms {
                break;
            }
            if let Some(Reverse(entry)) = self.queue.pop() {
                due.push(entry.event);
            }
        }
        due
    }

    /// Whether an identical event is already queued.
    #[must_use]
    pub fn contains(&self, event: &ScheduledEvent) -> bool {
        self.queue.iter().any(|Reverse(e)| e.event == *event)
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
