//! Outbound send queue.
//!
//! Pending auto-responses ordered by `fire_at`. Scheduling never blocks the
//! caller; the delivery loop is woken through the queue's `Notify`.

use crate::autoreply::{Decision, ResponseSource};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::Notify;
use uuid::Uuid;

/// A decided response waiting for its fire time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledSend {
    pub id: Uuid,
    pub scope_id: String,
    pub body: String,
    pub source: ResponseSource,
    pub fire_at: DateTime<Utc>,
}

#[derive(Debug)]
struct QueueEntry {
    fire_at: DateTime<Utc>,
    seq: u64,
    send: ScheduledSend,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Min-heap of scheduled sends
#[derive(Debug, Default)]
pub struct Dispatcher {
    queue: Mutex<BinaryHeap<Reverse<QueueEntry>>>,
    seq: AtomicU64,
    notify: Notify,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a positive decision. Returns `None` for decisions that do not send.
    pub fn schedule(&self, scope_id: &str, decision: &Decision) -> Option<Uuid> {
        if !decision.send {
            return None;
        }
        let source = decision.source.clone()?;
        let send = ScheduledSend {
            id: Uuid::new_v4(),
            scope_id: scope_id.to_string(),
            body: decision.body.clone(),
            source,
            fire_at: decision.fire_at,
        };
        let id = send.id;
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);

        self.queue.lock().push(Reverse(QueueEntry {
            fire_at: send.fire_at,
            seq,
            send,
        }));
        self.notify.notify_one();

        tracing::debug!(%id, scope_id, fire_at = %decision.fire_at, "auto-response scheduled");
        Some(id)
    }

    /// Number of sends still waiting
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drop every queued send and return how many were dropped
    pub fn cancel_all(&self) -> usize {
        let mut queue = self.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Wake-up handle for the delivery loop
    pub fn notifier(&self) -> &Notify {
        &self.notify
    }

    /// Fire time of the earliest queued send
    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.queue.lock().peek().map(|Reverse(entry)| entry.fire_at)
    }

    /// Remove and return every send due at or before `now`, earliest first
    pub fn pop_due(&self, now: DateTime<Utc>) -> Vec<ScheduledSend> {
        let mut queue = self.queue.lock();
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = queue.peek() {
            if entry.fire_at > now {
                break;
            }
            if let Some(Reverse(entry)) = queue.pop() {
                due.push(entry.send);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoreply::DecisionReason;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn decision(body: &str, fire_at: i64) -> Decision {
        Decision {
            send: true,
            body: body.to_string(),
            fire_at: ts(fire_at),
            reason: DecisionReason::Respond,
            source: Some(ResponseSource::Literal),
        }
    }

    #[test]
    fn test_pop_due_in_fire_order() {
        let dispatcher = Dispatcher::new();
        dispatcher.schedule("c", &decision("third", 30));
        dispatcher.schedule("a", &decision("first", 10));
        dispatcher.schedule("b", &decision("second", 20));

        assert_eq!(dispatcher.next_fire_at(), Some(ts(10)));
        let due = dispatcher.pop_due(ts(20));
        let bodies: Vec<_> = due.iter().map(|s| s.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
        assert_eq!(dispatcher.pending(), 1);
    }

    #[test]
    fn test_same_fire_time_keeps_schedule_order() {
        let dispatcher = Dispatcher::new();
        dispatcher.schedule("a", &decision("one", 5));
        dispatcher.schedule("b", &decision("two", 5));
        let scopes: Vec<_> = dispatcher
            .pop_due(ts(5))
            .into_iter()
            .map(|s| s.scope_id)
            .collect();
        assert_eq!(scopes, vec!["a", "b"]);
    }

    #[test]
    fn test_negative_decision_not_scheduled() {
        let dispatcher = Dispatcher::new();
        let mut skipped = decision("", 0);
        skipped.send = false;
        assert!(dispatcher.schedule("a", &skipped).is_none());
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_cancel_all() {
        let dispatcher = Dispatcher::new();
        dispatcher.schedule("a", &decision("x", 100));
        dispatcher.schedule("b", &decision("y", 200));
        assert_eq!(dispatcher.cancel_all(), 2);
        assert!(dispatcher.next_fire_at().is_none());
    }
}
