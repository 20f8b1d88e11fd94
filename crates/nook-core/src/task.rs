//! Task provider interface.
//!
//! The task list itself belongs to an external collaborator. The core only
//! reads category/priority for attribution and asks the provider to bump a
//! task's completed unit count after a full focus session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::storage::{load_json, save_json, KvStore};

/// Category used when a task has none (or no task is focused).
pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    /// 1 (lowest) .. 4 (highest).
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default = "default_estimate", alias = "estimatedPomos")]
    pub estimated_units: u32,
    #[serde(default, alias = "completedPomos")]
    pub completed_units: u32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_estimate() -> u32 {
    1
}

impl Task {
    pub fn new(title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            category: None,
            priority: None,
            estimated_units: default_estimate(),
            completed_units: 0,
            completed: false,
            created_at: Some(created_at),
            completed_at: None,
        }
    }

    pub fn category_or_default(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
    }
}

/// Collaborator that owns the user's task list.
pub trait TaskProvider {
    fn list_tasks(&self) -> Vec<Task>;

    fn increment_completed_units(&mut self, task_id: &str) -> Result<()>;

    fn focused_task_id(&self) -> Option<String>;

    /// The focused task, if it still exists.
    fn focused_task(&self) -> Option<Task> {
        let id = self.focused_task_id()?;
        self.list_tasks().into_iter().find(|t| t.id == id)
    }
}

/// Task list persisted in the key-value store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskList {
    tasks: Vec<Task>,
    focused_task_id: Option<String>,
    #[serde(skip)]
    revision: u64,
}

impl TaskList {
    pub const STORE_KEY: &'static str = "nook_tasks";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(store: &dyn KvStore) -> Result<Self> {
        Ok(load_json(store, Self::STORE_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, store: &dyn KvStore) -> Result<()> {
        save_json(store, Self::STORE_KEY, self)?;
        Ok(())
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Incremented on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn add(&mut self, task: Task) -> &Task {
        self.revision += 1;
        self.tasks.push(task);
        &self.tasks[self.tasks.len() - 1]
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Focus a task, or clear the focus with `None`.
    pub fn set_focus(&mut self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            if self.get(id).is_none() {
                return Err(CoreError::Task(format!("task not found: {id}")));
            }
        }
        self.focused_task_id = id.map(str::to_string);
        self.revision += 1;
        Ok(())
    }

    /// Mark a task completed. Returns `true` only on the first completion.
    pub fn complete(&mut self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| CoreError::Task(format!("task not found: {id}")))?;
        if task.completed {
            return Ok(false);
        }
        task.completed = true;
        task.completed_at = Some(at);
        if self.focused_task_id.as_deref() == Some(id) {
            self.focused_task_id = None;
        }
        self.revision += 1;
        Ok(true)
    }
}

impl TaskProvider for TaskList {
    fn list_tasks(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    fn increment_completed_units(&mut self, task_id: &str) -> Result<()> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| CoreError::Task(format!("task not found: {task_id}")))?;
        task.completed_units = task.completed_units.saturating_add(1);
        self.revision += 1;
        Ok(())
    }

    fn focused_task_id(&self) -> Option<String> {
        self.focused_task_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn focus_requires_existing_task() {
        let mut list = TaskList::new();
        assert!(list.set_focus(Some("missing")).is_err());
        let id = list.add(Task::new("Write report", Utc::now())).id.clone();
        list.set_focus(Some(&id)).unwrap();
        assert_eq!(list.focused_task().map(|t| t.title), Some("Write report".into()));
    }

    #[test]
    fn complete_is_reported_once() {
        let mut list = TaskList::new();
        let id = list.add(Task::new("Read", Utc::now())).id.clone();
        list.set_focus(Some(&id)).unwrap();
        assert!(list.complete(&id, Utc::now()).unwrap());
        assert!(!list.complete(&id, Utc::now()).unwrap());
        assert!(list.focused_task_id().is_none());
    }

    #[test]
    fn revision_tracks_mutations_only() {
        let mut list = TaskList::new();
        let id = list.add(Task::new("Plan", Utc::now())).id.clone();
        assert!(list.complete(&id, Utc::now()).unwrap());
        let revision = list.revision();
        assert!(!list.complete(&id, Utc::now()).unwrap());
        assert!(list.set_focus(Some("missing")).is_err());
        assert_eq!(list.revision(), revision);
    }

    #[test]
    fn increments_units() {
        let mut list = TaskList::new();
        let id = list.add(Task::new("Study", Utc::now())).id.clone();
        list.increment_completed_units(&id).unwrap();
        list.increment_completed_units(&id).unwrap();
        assert_eq!(list.get(&id).unwrap().completed_units, 2);
        assert!(list.increment_completed_units("nope").is_err());
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let task: Task = serde_json::from_str(
            r#"{"id":"1","category":"Study","estimatedPomos":3,"completedPomos":2}"#,
        )
        .unwrap();
        assert_eq!(task.estimated_units, 3);
        assert_eq!(task.completed_units, 2);
        assert_eq!(task.category_or_default(), "Study");
    }

    #[test]
    fn roundtrips_through_store() {
        let store = MemoryStore::new();
        let mut list = TaskList::new();
        list.add(Task::new("Persist me", Utc::now()));
        list.save(&store).unwrap();
        let loaded = TaskList::load(&store).unwrap();
        assert_eq!(loaded.tasks().len(), 1);
    }
}
