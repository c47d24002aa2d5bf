//! JSON task store
//!
//! Keeps the task list in a single JSON file. Imported items become new
//! pending tasks placed ahead of the existing ones.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// One persisted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    fn pending(name: String, now: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            due: None,
            priority: Priority::Medium,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct TaskStore {
    path: PathBuf,
    tasks: Vec<Task>,
}

impl TaskStore {
    /// Load the store; a missing file is an empty list
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tasks = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read task file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Task file {} is not valid JSON", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self { path, tasks })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Prepend one pending task per item, keeping the items' order
    pub fn import_items(&mut self, items: &[String]) -> usize {
        let now = Utc::now().timestamp_millis();
        let mut tasks: Vec<Task> = items
            .iter()
            .map(|name| Task::pending(name.clone(), now))
            .collect();
        let count = tasks.len();
        tasks.append(&mut self.tasks);
        self.tasks = tasks;
        count
    }

    /// Write the list back, replacing the file atomically
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.tasks)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path().join("tasks.json")).unwrap();
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn test_import_prepends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let mut store = TaskStore::open(&path).unwrap();
        store.import_items(&["Old".to_string()]);
        let added = store.import_items(&["Leche".to_string(), "Pan".to_string()]);

        assert_eq!(added, 2);
        let names: Vec<_> = store.tasks().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Leche", "Pan", "Old"]);
        let fresh = &store.tasks()[..2];
        assert_eq!(fresh[0].created_at, fresh[1].created_at);
        assert!(fresh.iter().all(|t| !t.completed && t.priority == Priority::Medium));
        assert_ne!(fresh[0].id, fresh[1].id);
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tasks.json");
        let mut store = TaskStore::open(&path).unwrap();
        store.import_items(&["Huevos".to_string()]);
        store.save().unwrap();

        let reopened = TaskStore::open(&path).unwrap();
        assert_eq!(reopened.tasks(), store.tasks());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"createdAt\""));
        assert!(raw.contains("\"priority\": \"medium\""));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(TaskStore::open(&path).is_err());
    }

    #[test]
    fn test_reads_records_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let id = Uuid::new_v4();
        std::fs::write(
            &path,
            format!(r#"[{{"id":"{id}","name":"Pan","due":"2025-03-01","createdAt":1,"updatedAt":2}}]"#),
        )
        .unwrap();

        let store = TaskStore::open(&path).unwrap();
        let task = &store.tasks()[0];
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.due, NaiveDate::from_ymd_opt(2025, 3, 1));
    }
}
