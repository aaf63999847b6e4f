//! Progress Fan-out (spec.md §4.5 component list, §9 design note).
//!
//! Per-task set of subscribers; each update is delivered to all current
//! subscribers without blocking the producer. Grounded on
//! `ddm_core::scheduler::execute::progress_worker`'s `tokio::sync::mpsc`
//! channel pattern, generalized from one persistence consumer to N
//! best-effort subscribers. The ticker/producer must not hold the
//! subscriber-set lock while invoking subscribers if a subscriber's send
//! can block: the set is snapshotted under the lock, the lock released,
//! then each subscriber is notified (spec.md §9).

use crate::task::{PublicTask, TaskStatus};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// An event delivered to progress subscribers. Status and progress share
/// this one channel so a status transition is never reordered behind an
/// in-flight progress tick (spec.md §5 "Ordering").
#[derive(Debug, Clone)]
pub enum Event {
    /// Sent as the first event on subscribe, and again on every status change.
    Snapshot(PublicTask),
    /// Sent on every throttled progress tick.
    Progress { progress: u8, speed: String },
    /// Sent once a task enters a terminal or semi-terminal state, mirroring
    /// the `Snapshot` event's status for subscribers that only care about
    /// transitions.
    Status(TaskStatus),
}

type Subscriber = mpsc::UnboundedSender<Event>;

/// Per-task subscriber registry.
#[derive(Default)]
pub struct Fanout {
    subscribers: Mutex<HashMap<Uuid, Vec<Subscriber>>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber for `task_id` and returns the receiving
    /// half. The caller is expected to send an initial `Event::Snapshot`
    /// immediately after subscribing (the Manager does this under the same
    /// lock that reads current task state, so the first event is never
    /// stale).
    pub fn subscribe(&self, task_id: Uuid) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap()
            .entry(task_id)
            .or_default()
            .push(tx);
        rx
    }

    /// Removes all closed subscribers for `task_id` (called opportunistically
    /// by `notify`, and explicitly when a listening connection closes).
    pub fn unsubscribe_closed(&self, task_id: Uuid) {
        let mut map = self.subscribers.lock().unwrap();
        if let Some(subs) = map.get_mut(&task_id) {
            subs.retain(|s| !s.is_closed());
            if subs.is_empty() {
                map.remove(&task_id);
            }
        }
    }

    /// Delivers `event` to every current subscriber of `task_id`. Snapshots
    /// the subscriber list under the lock, releases it, then sends —
    /// a slow or closed subscriber never blocks the producer or other
    /// subscribers.
    pub fn notify(&self, task_id: Uuid, event: Event) {
        let subs: Vec<Subscriber> = {
            let map = self.subscribers.lock().unwrap();
            match map.get(&task_id) {
                Some(subs) => subs.clone(),
                None => return,
            }
        };
        for sub in &subs {
            let _ = sub.send(event.clone());
        }
        self.unsubscribe_closed(task_id);
    }

    /// Drops every subscriber registered for `task_id` (called on delete).
    pub fn clear(&self, task_id: Uuid) {
        self.subscribers.lock().unwrap().remove(&task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SoftwareDescriptor, Task};

    fn public_task() -> PublicTask {
        Task::new(
            SoftwareDescriptor {
                name: "Example".to_string(),
                bundle_id: "com.example.app".to_string(),
                version: "1.0".to_string(),
                file_size_bytes: None,
            },
            "acct".to_string(),
            "https://a.apple.com/x".to_string(),
            vec![],
            None,
        )
        .to_public()
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let fanout = Fanout::new();
        let id = Uuid::new_v4();
        let mut rx = fanout.subscribe(id);

        fanout.notify(id, Event::Snapshot(public_task()));
        fanout.notify(
            id,
            Event::Progress {
                progress: 10,
                speed: "1.0 KB/s".to_string(),
            },
        );
        fanout.notify(id, Event::Status(TaskStatus::Completed));

        assert!(matches!(rx.recv().await.unwrap(), Event::Snapshot(_)));
        assert!(matches!(rx.recv().await.unwrap(), Event::Progress { .. }));
        assert!(matches!(rx.recv().await.unwrap(), Event::Status(TaskStatus::Completed)));
    }

    #[tokio::test]
    async fn notify_with_no_subscribers_does_not_panic() {
        let fanout = Fanout::new();
        fanout.notify(Uuid::new_v4(), Event::Status(TaskStatus::Failed));
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_next_notify() {
        let fanout = Fanout::new();
        let id = Uuid::new_v4();
        let rx = fanout.subscribe(id);
        drop(rx);
        fanout.notify(id, Event::Status(TaskStatus::Failed));
        // Second notify should see an empty (removed) subscriber list, not panic.
        fanout.notify(id, Event::Status(TaskStatus::Failed));
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let fanout = Fanout::new();
        let id = Uuid::new_v4();
        let mut rx1 = fanout.subscribe(id);
        let mut rx2 = fanout.subscribe(id);
        fanout.notify(id, Event::Status(TaskStatus::Downloading));
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }
}
