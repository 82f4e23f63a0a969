//! Per-task event channels.
//!
//! Every accepted task gets its own broadcast channel, created before
//! the pipeline is spawned so a subscriber that connects after the
//! accept response cannot miss events. Terminal events schedule channel
//! retirement after a short grace window, long enough for a just-opened
//! stream to drain the terminal event before the channel disappears.

use agora_types::{TaskEvent, TaskId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;
pub const RETIREMENT_GRACE: Duration = Duration::from_secs(8);

#[derive(Clone)]
pub struct TaskBroker {
    channels: Arc<RwLock<HashMap<TaskId, broadcast::Sender<TaskEvent>>>>,
    grace: Duration,
}

impl Default for TaskBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBroker {
    pub fn new() -> Self {
        Self::with_grace(RETIREMENT_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            grace,
        }
    }

    /// Create the channel for a task, or return the existing one.
    /// Idempotent, so a racing subscriber and publisher converge on the
    /// same channel.
    pub fn register(&self, task_id: TaskId) -> broadcast::Sender<TaskEvent> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(task_id)
            .or_insert_with(|| {
                debug!(%task_id, "Task channel created");
                broadcast::channel(CHANNEL_CAPACITY).0
            })
            .clone()
    }

    pub fn subscribe(&self, task_id: TaskId) -> broadcast::Receiver<TaskEvent> {
        self.register(task_id).subscribe()
    }

    /// Publish an event to a task's subscribers. Never blocks; events
    /// published with no subscriber connected are dropped by the
    /// channel, which is fine because subscribers that arrive later get
    /// the full log on the next event's `live_log`.
    pub fn publish(&self, task_id: TaskId, event: TaskEvent) {
        let sender = {
            let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
            channels.get(&task_id).cloned()
        };
        let Some(sender) = sender else {
            debug!(%task_id, "Publish to retired task channel dropped");
            return;
        };
        let terminal = event.is_terminal();
        let _ = sender.send(event);
        if terminal {
            self.retire_later(task_id);
        }
    }

    fn retire_later(&self, task_id: TaskId) {
        let channels = Arc::clone(&self.channels);
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut channels = channels.write().unwrap_or_else(|e| e.into_inner());
            if channels.remove(&task_id).is_some() {
                debug!(%task_id, "Task channel retired");
            }
        });
    }

    pub fn is_active(&self, task_id: &TaskId) -> bool {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels.contains_key(task_id)
    }

    pub fn active_count(&self) -> usize {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::{ErrorResult, StepEvent};

    fn step(n: u32) -> TaskEvent {
        TaskEvent::Step(StepEvent {
            step_num: n,
            msg: format!("step {}", n),
            live_log: vec![],
        })
    }

    fn terminal() -> TaskEvent {
        TaskEvent::Error(ErrorResult {
            error: "boom".into(),
            live_log: vec![],
        })
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let broker = TaskBroker::new();
        let id = TaskId::new();
        let a = broker.register(id);
        let b = broker.register(id);
        assert!(a.same_channel(&b));
        assert_eq!(broker.active_count(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_events_in_publish_order() {
        let broker = TaskBroker::new();
        let id = TaskId::new();
        let mut rx = broker.subscribe(id);

        broker.publish(id, step(1));
        broker.publish(id, step(2));
        broker.publish(id, step(3));

        for expected in 1..=3 {
            match rx.recv().await.unwrap() {
                TaskEvent::Step(s) => assert_eq!(s.step_num, expected),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_block() {
        let broker = TaskBroker::new();
        let id = TaskId::new();
        broker.register(id);
        broker.publish(id, step(1));
        broker.publish(id, step(2));
        assert!(broker.is_active(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_event_retires_channel_after_grace() {
        let broker = TaskBroker::with_grace(Duration::from_millis(100));
        let id = TaskId::new();
        broker.register(id);

        broker.publish(id, terminal());
        assert!(broker.is_active(&id));

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Let the retirement task run
        tokio::task::yield_now().await;
        assert!(!broker.is_active(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_within_grace_still_gets_channel() {
        let broker = TaskBroker::with_grace(Duration::from_millis(100));
        let id = TaskId::new();
        let tx = broker.register(id);

        let mut rx = broker.subscribe(id);
        tx.send(terminal()).unwrap();
        broker.publish(id, terminal());

        // Both terminal copies arrive before retirement
        assert!(rx.recv().await.is_ok());
        assert!(rx.recv().await.is_ok());
    }
}
