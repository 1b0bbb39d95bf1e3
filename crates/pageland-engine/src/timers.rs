//! One-shot timers on the cooperative sequence

use chrono::{DateTime, Utc};
use pageland_core::TabId;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Work scheduled on the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTask {
    PageLand(TabId),
    Reminder { creative_instance_id: String },
    Maintenance,
}

/// Deadline-ordered timers. Timers sharing a deadline fire in scheduling order.
#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    queue: BTreeMap<(DateTime<Utc>, TimerId), T>,
    deadlines: HashMap<TimerId, DateTime<Utc>>,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, at: DateTime<Utc>, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.queue.insert((at, id), task);
        self.deadlines.insert(id, at);
        id
    }

    /// Cancels a pending timer, handing back its task
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let at = self.deadlines.remove(&id)?;
        self.queue.remove(&(at, id))
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Removes and returns the earliest timer due at `now`
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(TimerId, DateTime<Utc>, T)> {
        let (at, id) = *self.queue.keys().next()?;
        if at > now {
            return None;
        }
        let task = self.queue.remove(&(at, id))?;
        self.deadlines.remove(&id);
        Some((id, at, task))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.deadlines.clear();
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_fires_in_deadline_then_schedule_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(start() + Duration::seconds(5), "late");
        timers.schedule(start() + Duration::seconds(1), "first");
        timers.schedule(start() + Duration::seconds(1), "second");

        assert!(timers.pop_due(start()).is_none());

        let now = start() + Duration::seconds(10);
        let fired: Vec<&str> = std::iter::from_fn(|| timers.pop_due(now).map(|(_, _, t)| t)).collect();
        assert_eq!(fired, vec!["first", "second", "late"]);
        assert!(timers.is_empty());
    }

    #[test]
    fn test_cancel() {
        let mut timers = TimerQueue::new();
        let id = timers.schedule(start(), 1);
        assert_eq!(timers.next_deadline(), Some(start()));
        assert_eq!(timers.cancel(id), Some(1));
        assert_eq!(timers.cancel(id), None);
        assert!(timers.next_deadline().is_none());
    }
}
