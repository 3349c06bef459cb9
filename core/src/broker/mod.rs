//! C2 Task Broker — priority-FIFO queues plus fan-out pub/sub for
//! provisioning and agent-dispatch work.
//!
//! Grounded on `api-server/src/gateway/manager.rs`'s broadcast-based fan-out
//! (`tokio::sync::broadcast`, no replay to late subscribers) and on
//! `original_source/portal/backend/app/services/redis_service.py`'s
//! priority-queue semantics (`_get_queue_for_type`, high-priority-first
//! draining), reimplemented over an in-memory `tokio::sync::Mutex` instead
//! of Redis since the control plane has no external broker dependency.

mod task;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::error::CoreError;
use crate::Result;

pub use task::payload;
pub use task::{Priority, Progress, Task, TaskStatus, TaskType};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A task lifecycle event, published on every state change for a task's
/// queue. Subscribers that aren't listening at publish time simply miss the
/// event — there is no replay buffer.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Enqueued(Task),
    Claimed(Task),
    Progressed(Task),
    Completed(Task),
    Failed(Task),
    Cancelled(Task),
}

impl TaskEvent {
    pub fn task(&self) -> &Task {
        match self {
            Self::Enqueued(t)
            | Self::Claimed(t)
            | Self::Progressed(t)
            | Self::Completed(t)
            | Self::Failed(t)
            | Self::Cancelled(t) => t,
        }
    }
}

#[derive(Default)]
struct Queues {
    /// Pending tasks, keyed by queue name, ordered high-priority-first then
    /// FIFO within a priority band.
    pending: HashMap<String, VecDeque<Uuid>>,
    tasks: HashMap<Uuid, Task>,
}

impl Queues {
    fn push_pending(&mut self, queue: &str, priority: Priority, id: Uuid) {
        let lane = self.pending.entry(queue.to_string()).or_default();
        match priority {
            Priority::High => {
                let split = lane
                    .iter()
                    .position(|existing| {
                        self.tasks
                            .get(existing)
                            .map(|t| t.priority != Priority::High)
                            .unwrap_or(true)
                    })
                    .unwrap_or(lane.len());
                lane.insert(split, id);
            }
            Priority::Normal | Priority::Low => lane.push_back(id),
        }
    }
}

#[derive(Clone)]
pub struct TaskBroker {
    queues: Arc<Mutex<Queues>>,
    events: broadcast::Sender<TaskEvent>,
}

impl Default for TaskBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBroker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            queues: Arc::new(Mutex::new(Queues::default())),
            events,
        }
    }

    pub async fn enqueue(&self, task_type: TaskType, priority: Priority) -> Task {
        let queue = task_type.queue_name().to_string();
        let task = Task::new(task_type, queue.clone(), priority);

        let mut guard = self.queues.lock().await;
        guard.tasks.insert(task.id, task.clone());
        guard.push_pending(&queue, priority, task.id);
        drop(guard);

        self.publish(TaskEvent::Enqueued(task.clone()));
        task
    }

    /// Pop the next pending task for `queue`, marking it claimed. Returns
    /// `None` if the queue is empty.
    pub async fn claim(&self, queue: &str) -> Option<Task> {
        let mut guard = self.queues.lock().await;
        let id = guard.pending.get_mut(queue)?.pop_front()?;
        let task = guard.tasks.get_mut(&id)?;
        task.status = TaskStatus::Running;
        task.touch();
        let claimed = task.clone();
        drop(guard);

        self.publish(TaskEvent::Claimed(claimed.clone()));
        Some(claimed)
    }

    pub async fn get(&self, id: Uuid) -> Option<Task> {
        self.queues.lock().await.tasks.get(&id).cloned()
    }

    pub async fn update_progress(&self, id: Uuid, progress: Progress) -> Result<Task> {
        let mut guard = self.queues.lock().await;
        let task = guard
            .tasks
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("task {id} not found")))?;
        task.progress = progress;
        task.touch();
        let updated = task.clone();
        drop(guard);

        self.publish(TaskEvent::Progressed(updated.clone()));
        Ok(updated)
    }

    pub async fn complete(&self, id: Uuid, result: Option<serde_json::Value>) -> Result<Task> {
        let mut guard = self.queues.lock().await;
        let task = guard
            .tasks
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("task {id} not found")))?;
        task.status = TaskStatus::Completed;
        task.result = result;
        task.touch();
        let updated = task.clone();
        drop(guard);

        self.publish(TaskEvent::Completed(updated.clone()));
        Ok(updated)
    }

    pub async fn fail(&self, id: Uuid, error: impl Into<String>) -> Result<Task> {
        let mut guard = self.queues.lock().await;
        let task = guard
            .tasks
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("task {id} not found")))?;
        task.status = TaskStatus::Failed;
        task.error = Some(error.into());
        task.touch();
        let updated = task.clone();
        drop(guard);

        self.publish(TaskEvent::Failed(updated.clone()));
        Ok(updated)
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Task> {
        let mut guard = self.queues.lock().await;
        let queue_name;
        {
            let task = guard
                .tasks
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(format!("task {id} not found")))?;
            if task.status != TaskStatus::Pending {
                return Err(CoreError::validation("only pending tasks may be cancelled"));
            }
            task.status = TaskStatus::Cancelled;
            task.touch();
            queue_name = task.queue.clone();
        }
        if let Some(lane) = guard.pending.get_mut(&queue_name) {
            lane.retain(|pending_id| *pending_id != id);
        }
        let updated = guard.tasks.get(&id).cloned().expect("checked above");
        drop(guard);

        self.publish(TaskEvent::Cancelled(updated.clone()));
        Ok(updated)
    }

    /// Re-enqueue a failed task at the head of its priority band.
    pub async fn retry(&self, id: Uuid) -> Result<Task> {
        let mut guard = self.queues.lock().await;
        let (queue, priority);
        {
            let task = guard
                .tasks
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(format!("task {id} not found")))?;
            if task.status != TaskStatus::Failed {
                return Err(CoreError::validation("only failed tasks may be retried"));
            }
            task.status = TaskStatus::Pending;
            task.error = None;
            task.attempts += 1;
            task.touch();
            queue = task.queue.clone();
            priority = task.priority;
        }
        guard.push_pending(&queue, priority, id);
        let updated = guard.tasks.get(&id).cloned().expect("checked above");
        drop(guard);
        Ok(updated)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: TaskEvent) {
        // No receivers is not an error: fan-out has no delivery guarantee.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use task::payload::WorkspaceProvisionPayload;

    fn provision(slug: &str) -> TaskType {
        TaskType::WorkspaceProvision(WorkspaceProvisionPayload {
            workspace_id: Uuid::new_v4(),
            slug: slug.to_string(),
            owner_user_id: Uuid::new_v4(),
            app_template_id: None,
        })
    }

    #[tokio::test]
    async fn high_priority_drains_before_normal_fifo() {
        let broker = TaskBroker::new();
        let low_first = broker.enqueue(provision("a"), Priority::Normal).await;
        let _low_second = broker.enqueue(provision("b"), Priority::Normal).await;
        let high = broker.enqueue(provision("c"), Priority::High).await;

        let claimed = broker.claim("provisioning").await.unwrap();
        assert_eq!(claimed.id, high.id);

        let claimed_next = broker.claim("provisioning").await.unwrap();
        assert_eq!(claimed_next.id, low_first.id);
    }

    #[tokio::test]
    async fn queue_routing_matches_task_type_prefix() {
        let broker = TaskBroker::new();
        let team_task = broker
            .enqueue(
                TaskType::CertIssue(task::payload::CertIssuePayload {
                    fqdn: "shop.example.com".to_string(),
                }),
                Priority::Normal,
            )
            .await;
        assert_eq!(team_task.queue, "certificates");
        assert!(broker.claim("certificates").await.is_some());
        assert!(broker.claim("provisioning").await.is_none());
    }

    #[tokio::test]
    async fn cancel_removes_task_from_pending_lane() {
        let broker = TaskBroker::new();
        let task = broker.enqueue(provision("a"), Priority::Normal).await;
        broker.cancel(task.id).await.unwrap();
        assert!(broker.claim("provisioning").await.is_none());
    }

    #[tokio::test]
    async fn retry_requires_failed_status() {
        let broker = TaskBroker::new();
        let task = broker.enqueue(provision("a"), Priority::Normal).await;
        assert!(broker.retry(task.id).await.is_err());
    }

    #[tokio::test]
    async fn late_subscriber_does_not_see_past_events() {
        let broker = TaskBroker::new();
        broker.enqueue(provision("a"), Priority::Normal).await;
        let mut rx = broker.subscribe();
        let task = broker.enqueue(provision("b"), Priority::Normal).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.task().id, task.id);
    }
}
