//! Deterministic timer queue merged into the serialized event path.
//!
//! Timed behaviors (tempo thresholds, macro step delays) register callbacks
//! against a monotonic clock. Due timers are only delivered when the host
//! polls, so a firing timer can never preempt the evaluation of another
//! event. Cancellation is O(1) via a tombstone set; cancelled timers never
//! fire.

use crate::macro_player::InvocationId;
use crate::tree::TempoId;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

/// Handle of a pending timer, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// What to do when a timer fires.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TimerPayload {
    /// A tempo threshold elapsed while the input was still held.
    TempoElapsed { tempo: TempoId },
    /// A macro invocation finished its pause and wants the next step.
    MacroStep { invocation: InvocationId },
}

#[derive(Debug)]
struct Entry {
    at: Instant,
    /// Tie-breaker keeping same-deadline timers in schedule order.
    seq: u64,
    token: TimerToken,
    payload: TimerPayload,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap yields the earliest deadline first.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending-timer queue.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    queue: BinaryHeap<Entry>,
    cancelled: HashSet<TimerToken>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `at`. Returns the token to cancel it with.
    pub fn schedule(&mut self, at: Instant, payload: TimerPayload) -> TimerToken {
        let token = TimerToken(self.next_id);
        self.queue.push(Entry {
            at,
            seq: self.next_id,
            token,
            payload,
        });
        self.next_id += 1;
        token
    }

    /// Mark a pending timer as cancelled. Safe to call with a token that
    /// already fired; the tombstone is reclaimed when the entry surfaces.
    pub fn cancel(&mut self, token: TimerToken) {
        self.cancelled.insert(token);
    }

    /// Remove and return the earliest timer due at or before `now`, in
    /// (deadline, schedule-order) order. Cancelled entries are discarded.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerToken, TimerPayload)> {
        while let Some(entry) = self.queue.peek() {
            if entry.at > now {
                return None;
            }
            let entry = self.queue.pop().expect("peeked entry exists");
            if self.cancelled.remove(&entry.token) {
                continue;
            }
            return Some((entry.token, entry.payload));
        }
        None
    }

    /// Deadline of the earliest live timer, for the host's wait loop.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.queue.peek() {
            if self.cancelled.contains(&entry.token) {
                let entry = self.queue.pop().expect("peeked entry exists");
                self.cancelled.remove(&entry.token);
                continue;
            }
            return Some(entry.at);
        }
        None
    }

    /// Drop everything; used when a new profile snapshot is installed.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.cancelled.clear();
    }
}
