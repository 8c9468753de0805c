//! Background search tasks.
//!
//! A submitted search runs on its own tokio task; its entry here is polled
//! until the outcome lands. Finished entries are dropped after the retention
//! period, and the map never holds more than `max_tasks` entries: the oldest
//! are evicted first, finished ones before running ones.

use super::{SearchOutcome, SearchRequest};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
}

/// Snapshot of a background search, as reported over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct SearchTask {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub request: SearchRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SearchOutcome>,
}

struct TaskEntry {
    task: SearchTask,
    started: Instant,
    finished: Option<Instant>,
}

impl TaskEntry {
    fn is_expired(&self, retention: Duration) -> bool {
        self.finished
            .map(|finished| finished.elapsed() >= retention)
            .unwrap_or(false)
    }
}

pub struct TaskRegistry {
    tasks: DashMap<Uuid, TaskEntry>,
    retention: Duration,
    max_tasks: usize,
}

impl TaskRegistry {
    pub fn new(retention: Duration, max_tasks: usize) -> Self {
        Self {
            tasks: DashMap::new(),
            retention,
            max_tasks: max_tasks.max(1),
        }
    }

    /// Registers a new running task, evicting old entries to make room.
    pub fn start(&self, request: SearchRequest) -> SearchTask {
        self.cleanup_expired();
        while self.tasks.len() >= self.max_tasks {
            if !self.evict_oldest() {
                break;
            }
        }

        let task = SearchTask {
            task_id: Uuid::now_v7(),
            status: TaskStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            request,
            result: None,
        };
        self.tasks.insert(
            task.task_id,
            TaskEntry {
                task: task.clone(),
                started: Instant::now(),
                finished: None,
            },
        );
        task
    }

    /// Stores the outcome. A task evicted while running is not revived.
    pub fn complete(&self, task_id: Uuid, outcome: SearchOutcome) {
        match self.tasks.get_mut(&task_id) {
            Some(mut entry) => {
                entry.task.status = TaskStatus::Completed;
                entry.task.finished_at = Some(Utc::now());
                entry.task.result = Some(outcome);
                entry.finished = Some(Instant::now());
            }
            None => debug!(%task_id, "Finished search task no longer tracked"),
        }
    }

    pub fn get(&self, task_id: Uuid) -> Option<SearchTask> {
        {
            let entry = self.tasks.get(&task_id)?;
            if !entry.is_expired(self.retention) {
                return Some(entry.task.clone());
            }
        }
        self.tasks.remove(&task_id);
        None
    }

    /// Remove finished tasks past retention. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.tasks.len();
        let retention = self.retention;
        self.tasks.retain(|_, entry| !entry.is_expired(retention));
        before.saturating_sub(self.tasks.len())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn evict_oldest(&self) -> bool {
        let victim = self
            .tasks
            .iter()
            .min_by_key(|entry| (entry.finished.is_none(), entry.started))
            .map(|entry| *entry.key());

        match victim {
            Some(task_id) => {
                debug!(%task_id, "Evicting search task to stay within capacity");
                self.tasks.remove(&task_id).is_some()
            }
            None => false,
        }
    }
}
