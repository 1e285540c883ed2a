//! Host-driven timers.
//!
//! Nothing here sleeps: the host advances time by calling
//! [`Timers::pop_due`] from its frame loop, which keeps the whole crate
//! single threaded and lets tests run on a virtual clock.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Queue of one-shot timers carrying an event of type `E`.
#[derive(Debug)]
pub struct Timers<E> {
    heap: BinaryHeap<Reverse<(Duration, TimerId)>>,
    /// Live timers. Heap entries without an event here were cancelled.
    events: HashMap<TimerId, E>,
    next_id: u64,
}

impl<E> Default for Timers<E> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            events: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<E> Timers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `event` to fire once `now >= at`.
    pub fn schedule(&mut self, at: Duration, event: E) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.heap.push(Reverse((at, id)));
        self.events.insert(id, event);
        id
    }

    /// Cancels a pending timer. Returns `false` if it already fired or was
    /// cancelled before.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.events.remove(&id).is_some()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.events.contains_key(&id)
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Deadline of the earliest live timer.
    pub fn next_deadline(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse((at, _))| *at)
    }

    /// Removes and returns the earliest timer due at `now`.
    ///
    /// Timers with equal deadlines fire in the order they were scheduled.
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerId, E)> {
        self.discard_cancelled();
        let Reverse((at, id)) = *self.heap.peek()?;
        if at > now {
            return None;
        }
        self.heap.pop();
        let event = self.events.remove(&id)?;
        Some((id, event))
    }

    /// Removes and returns every timer due at `now`, in firing order.
    ///
    /// Timers scheduled while the caller handles the batch wait for the
    /// next call, even when they are already due.
    pub fn drain_due(&mut self, now: Duration) -> Vec<(TimerId, E)> {
        let mut due = Vec::new();
        while let Some(timer) = self.pop_due(now) {
            due.push(timer);
        }
        due
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.heap.peek() {
            if self.events.contains_key(id) {
                break;
            }
            self.heap.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn fires_in_deadline_then_schedule_order() {
        let mut timers = Timers::new();
        timers.schedule(ms(200), "late");
        timers.schedule(ms(100), "first");
        timers.schedule(ms(100), "second");

        assert!(timers.pop_due(ms(50)).is_none());
        assert_eq!(timers.pop_due(ms(250)).map(|(_, e)| e), Some("first"));
        assert_eq!(timers.pop_due(ms(250)).map(|(_, e)| e), Some("second"));
        assert_eq!(timers.pop_due(ms(250)).map(|(_, e)| e), Some("late"));
        assert!(timers.pop_due(ms(250)).is_none());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut timers = Timers::new();
        let id = timers.schedule(ms(100), 1);
        timers.schedule(ms(300), 2);
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        assert!(!timers.is_pending(id));
        assert_eq!(timers.next_deadline(), Some(ms(300)));
        assert_eq!(timers.pop_due(ms(1000)).map(|(_, e)| e), Some(2));
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn fired_timer_cannot_be_cancelled() {
        let mut timers = Timers::new();
        let id = timers.schedule(ms(0), ());
        assert!(timers.pop_due(ms(0)).is_some());
        assert!(!timers.cancel(id));
    }

    #[test]
    fn cancelling_one_of_many_keeps_the_rest_in_order() {
        let mut timers = Timers::new();
        let ids: Vec<TimerId> = (0..8).map(|i| timers.schedule(ms(10 * (8 - i)), i)).collect();
        assert!(timers.cancel(ids[3]));
        assert!(timers.is_pending(ids[4]));
        assert_eq!(timers.pending(), 7);
        let fired: Vec<u64> = timers.drain_due(ms(1000)).into_iter().map(|(_, e)| e).collect();
        assert_eq!(fired, vec![7, 6, 5, 4, 2, 1, 0]);
    }

    #[test]
    fn drain_due_leaves_later_timers() {
        let mut timers = Timers::new();
        timers.schedule(ms(0), "now");
        timers.schedule(ms(50), "later");
        let due = timers.drain_due(ms(0));
        assert_eq!(due.len(), 1);
        timers.schedule(ms(0), "rescheduled");
        assert_eq!(timers.pending(), 2);
        assert_eq!(timers.next_deadline(), Some(ms(0)));
    }
}
