use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FailureKind, GenerationError, ItemFailure, Result};
use crate::types::{validate_keys, BatchEvent, BatchSummary, JobHandle, VideoTask};

/// Per-item status within a tracked batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemStatus {
    Pending,
    Submitted,
    Polling,
    Succeeded,
    Failed,
    Cancelled,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Succeeded | ItemStatus::Failed | ItemStatus::Cancelled
        )
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, ItemStatus::Submitted | ItemStatus::Polling)
    }
}

/// One item as the UI sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItem {
    pub key: String,
    pub status: ItemStatus,
    pub handle: Option<JobHandle>,
    pub result_url: Option<String>,
    pub failure: Option<ItemFailure>,
}

impl TrackedItem {
    fn pending(key: String) -> Self {
        Self {
            key,
            status: ItemStatus::Pending,
            handle: None,
            result_url: None,
            failure: None,
        }
    }
}

/// In-memory item list driven by [`BatchEvent`]s.
///
/// Transitions only move forward (`Pending -> Submitted -> Polling ->
/// Succeeded | Failed | Cancelled`). Events for unknown keys or for items
/// that already settled are ignored, so late events from an abandoned run
/// cannot overwrite newer state. Failed items can be reset with
/// [`retry_failed`](Self::retry_failed) without touching succeeded ones.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTracker {
    id: String,
    items: Vec<TrackedItem>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl BatchTracker {
    /// Track `keys`, all pending. Keys must be non-empty and unique.
    pub fn new<I, K>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        validate_keys(keys.iter().map(String::as_str))?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            items: keys.into_iter().map(TrackedItem::pending).collect(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        })
    }

    pub fn from_tasks(tasks: &[VideoTask]) -> Result<Self> {
        Self::new(tasks.iter().map(|t| t.key.clone()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn items(&self) -> &[TrackedItem] {
        &self.items
    }

    pub fn get(&self, key: &str) -> Option<&TrackedItem> {
        self.items.iter().find(|i| i.key == key)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Apply one event. Returns `false` if the event was stale and ignored.
    pub fn apply(&mut self, event: &BatchEvent) -> bool {
        let applied = match event {
            BatchEvent::Submitted { key } => self.transition(key, |item| {
                if item.status != ItemStatus::Pending {
                    return false;
                }
                item.status = ItemStatus::Submitted;
                true
            }),
            BatchEvent::Polling { key, handle } => self.transition(key, |item| {
                if !matches!(item.status, ItemStatus::Pending | ItemStatus::Submitted) {
                    return false;
                }
                item.status = ItemStatus::Polling;
                item.handle = Some(handle.clone());
                true
            }),
            BatchEvent::Succeeded { key, result_url } => self.transition(key, |item| {
                item.status = ItemStatus::Succeeded;
                item.result_url = Some(result_url.clone());
                item.failure = None;
                true
            }),
            BatchEvent::Failed(failure) => self.transition(&failure.key, |item| {
                item.status = if failure.kind == FailureKind::Cancelled {
                    ItemStatus::Cancelled
                } else {
                    ItemStatus::Failed
                };
                item.failure = Some(failure.clone());
                true
            }),
            BatchEvent::Progress { .. } => true,
        };

        if applied {
            let now = Utc::now();
            if self.started_at.is_none() && !matches!(event, BatchEvent::Progress { .. }) {
                self.started_at = Some(now);
            }
            if event.is_terminal() && self.is_settled() {
                self.completed_at = Some(now);
            }
        } else {
            debug!(batch = %self.id, key = ?event.key(), "ignoring stale batch event");
        }
        applied
    }

    /// Run `f` on the non-terminal item with `key`.
    fn transition<F>(&mut self, key: &str, f: F) -> bool
    where
        F: FnOnce(&mut TrackedItem) -> bool,
    {
        match self.items.iter_mut().find(|i| i.key == key) {
            Some(item) if !item.status.is_terminal() => f(item),
            _ => false,
        }
    }

    /// Stop tracking an item; later events for it are ignored.
    pub fn remove(&mut self, key: &str) -> Option<TrackedItem> {
        let index = self.items.iter().position(|i| i.key == key)?;
        Some(self.items.remove(index))
    }

    /// Whether every item has reached a terminal status.
    pub fn is_settled(&self) -> bool {
        self.items.iter().all(|i| i.status.is_terminal())
    }

    /// Whether any item is submitted or polling.
    pub fn is_busy(&self) -> bool {
        self.items.iter().any(|i| i.status.is_in_flight())
    }

    pub fn keys_with_status(&self, status: ItemStatus) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| i.status == status)
            .map(|i| i.key.clone())
            .collect()
    }

    /// Reset failed and cancelled items to pending and return their keys.
    ///
    /// Succeeded items keep their results.
    pub fn retry_failed(&mut self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in &mut self.items {
            if matches!(item.status, ItemStatus::Failed | ItemStatus::Cancelled) {
                item.status = ItemStatus::Pending;
                item.failure = None;
                item.handle = None;
                keys.push(item.key.clone());
            }
        }
        if keys.is_empty() {
            return Err(GenerationError::InvalidBatch(format!(
                "No failed items to retry in batch {}",
                self.id
            )));
        }
        self.completed_at = None;
        Ok(keys)
    }

    /// Reset failed items and pick their descriptors out of `tasks`, ready to
    /// be passed back to the runner.
    ///
    /// Every failed or cancelled item needs a descriptor in `tasks`;
    /// otherwise nothing is reset and `InvalidBatch` is returned.
    pub fn retry_tasks(&mut self, tasks: &[VideoTask]) -> Result<Vec<VideoTask>> {
        let missing: Vec<&str> = self
            .items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::Failed | ItemStatus::Cancelled))
            .filter(|i| !tasks.iter().any(|t| t.key == i.key))
            .map(|i| i.key.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(GenerationError::InvalidBatch(format!(
                "No task descriptor for failed items: {}",
                missing.join(", ")
            )));
        }

        let keys = self.retry_failed()?;
        Ok(tasks
            .iter()
            .filter(|t| keys.contains(&t.key))
            .cloned()
            .collect())
    }

    /// Counts per outcome. `duration_ms` spans the first applied event to
    /// the last terminal one, or zero while unsettled.
    pub fn summary(&self) -> BatchSummary {
        let count = |status: ItemStatus| self.items.iter().filter(|i| i.status == status).count();
        let duration_ms = match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        };
        BatchSummary {
            total: self.items.len(),
            succeeded: count(ItemStatus::Succeeded),
            failed: count(ItemStatus::Failed),
            cancelled: count(ItemStatus::Cancelled),
            duration_ms,
        }
    }
}
