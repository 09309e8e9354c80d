use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::datastore::{KeyValueStore, TASKS_KEY};
use crate::task::{Task, next_task_id, normalize_text};

/// Result of [`TaskStore::clear_completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared(usize),
    NothingToClear,
}

/// Owner of the task collection. Tasks are kept most-recent-first and every
/// mutation writes the whole collection back before returning.
#[derive(Debug)]
pub struct TaskStore<S> {
    storage: S,
    tasks: Vec<Task>,
}

impl<S: KeyValueStore> TaskStore<S> {
    /// Never fails: a missing or unreadable snapshot yields an empty collection.
    #[tracing::instrument(skip(storage))]
    pub fn load(storage: S) -> Self {
        let tasks = match storage.get(TASKS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Task>>(&raw) {
                Ok(tasks) => tasks,
                Err(error) => {
                    warn!(%error, "stored tasks are malformed; starting empty");
                    vec![]
                }
            },
            Ok(None) => {
                debug!("no stored tasks yet");
                vec![]
            }
            Err(error) => {
                warn!(error = %format!("{error:#}"), "failed reading stored tasks; starting empty");
                vec![]
            }
        };

        info!(count = tasks.len(), "loaded tasks");
        Self { storage, tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Maps a user-typed selector to an id: an exact id first, then a 1-based
    /// position in the current order.
    pub fn resolve(&self, selector: &str) -> Option<String> {
        let selector = selector.trim();
        if let Some(task) = self.get(selector) {
            return Some(task.id.clone());
        }

        let position = selector.parse::<usize>().ok()?;
        position
            .checked_sub(1)
            .and_then(|idx| self.tasks.get(idx))
            .map(|task| task.id.clone())
    }

    #[tracing::instrument(skip(self, text, now))]
    pub fn add(&mut self, text: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Task>> {
        let Some(text) = normalize_text(text) else {
            debug!("ignoring blank task text");
            return Ok(None);
        };

        let id = next_task_id(&self.tasks, now);
        let task = Task::new_incomplete(id, text, now);
        self.tasks.insert(0, task.clone());
        self.persist()?;

        debug!(id = %task.id, count = self.tasks.len(), "task added");
        Ok(Some(task))
    }

    /// Returns the new completion state, or `None` when the id is unknown.
    #[tracing::instrument(skip(self))]
    pub fn toggle_complete(&mut self, id: &str) -> anyhow::Result<Option<bool>> {
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            debug!("toggle on unknown id");
            return Ok(None);
        };

        let completed = task.toggle();
        self.persist()?;
        Ok(Some(completed))
    }

    /// Returns whether a task was changed.
    #[tracing::instrument(skip(self, new_text))]
    pub fn edit(&mut self, id: &str, new_text: &str) -> anyhow::Result<bool> {
        let Some(text) = normalize_text(new_text) else {
            debug!("ignoring blank replacement text");
            return Ok(false);
        };
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            debug!("edit on unknown id");
            return Ok(false);
        };

        task.text = text;
        self.persist()?;
        Ok(true)
    }

    /// Removes and returns the task. Deleting an id twice is a no-op the second time.
    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, id: &str) -> anyhow::Result<Option<Task>> {
        let Some(idx) = self.tasks.iter().position(|task| task.id == id) else {
            debug!("delete on unknown id");
            return Ok(None);
        };

        let removed = self.tasks.remove(idx);
        self.persist()?;
        Ok(Some(removed))
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_completed(&mut self) -> anyhow::Result<ClearOutcome> {
        let before = self.tasks.len();
        self.tasks.retain(|task| !task.completed);
        let removed = before - self.tasks.len();

        if removed == 0 {
            return Ok(ClearOutcome::NothingToClear);
        }

        self.persist()?;
        info!(removed, remaining = self.tasks.len(), "cleared completed tasks");
        Ok(ClearOutcome::Cleared(removed))
    }

    pub fn has_completed(&self) -> bool {
        self.tasks.iter().any(|task| task.completed)
    }

    #[tracing::instrument(skip(self))]
    fn persist(&mut self) -> anyhow::Result<()> {
        let payload =
            serde_json::to_string(&self.tasks).context("failed to serialize tasks")?;
        self.storage
            .set(TASKS_KEY, &payload)
            .context("failed to persist tasks")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{ClearOutcome, TaskStore};
    use crate::datastore::{KeyValueStore, MemoryStore, TASKS_KEY};

    fn texts(store: &TaskStore<MemoryStore>) -> Vec<&str> {
        store.tasks().iter().map(|task| task.text.as_str()).collect()
    }

    #[test]
    fn add_prepends_and_trims() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::load(MemoryStore::new());

        store.add("Buy milk", now).unwrap();
        store.add("  Walk dog  ", now).unwrap();

        assert_eq!(texts(&store), vec!["Walk dog", "Buy milk"]);
        assert_ne!(store.tasks()[0].id, store.tasks()[1].id);
        assert!(store.tasks().iter().all(|task| !task.completed));
    }

    #[test]
    fn blank_add_changes_nothing_and_does_not_write() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::load(MemoryStore::new());

        assert!(store.add("", now).unwrap().is_none());
        assert!(store.add("   ", now).unwrap().is_none());

        assert!(store.tasks().is_empty());
        assert_eq!(store.storage().write_count(), 0);
    }

    #[test]
    fn size_tracks_adds_minus_deletes() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::load(MemoryStore::new());

        let mut ids = Vec::new();
        for (offset, text) in ["a", "b", " ", "c", "d"].iter().enumerate() {
            let at = now + Duration::milliseconds(offset as i64);
            if let Some(task) = store.add(text, at).unwrap() {
                ids.push(task.id);
            }
        }
        assert_eq!(store.tasks().len(), 4);

        assert!(store.delete(&ids[1]).unwrap().is_some());
        assert!(store.delete(&ids[1]).unwrap().is_none());
        assert!(store.delete("missing").unwrap().is_none());

        assert_eq!(store.tasks().len(), 3);
        assert_eq!(texts(&store), vec!["d", "c", "a"]);
    }

    #[test]
    fn double_toggle_restores_state() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::load(MemoryStore::new());
        let id = store.add("x", now).unwrap().unwrap().id;

        assert_eq!(store.toggle_complete(&id).unwrap(), Some(true));
        assert_eq!(store.toggle_complete(&id).unwrap(), Some(false));
        assert!(!store.tasks()[0].completed);
        assert_eq!(store.toggle_complete("nope").unwrap(), None);
    }

    #[test]
    fn edit_rejects_blank_and_unknown() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::load(MemoryStore::new());
        let id = store.add("draft", now).unwrap().unwrap().id;
        let writes = store.storage().write_count();

        assert!(!store.edit(&id, "   ").unwrap());
        assert!(!store.edit("unknown", "text").unwrap());
        assert_eq!(store.storage().write_count(), writes);
        assert_eq!(store.get(&id).unwrap().text, "draft");

        assert!(store.edit(&id, " final ").unwrap());
        assert_eq!(store.get(&id).unwrap().text, "final");
    }

    #[test]
    fn clear_completed_reports_nothing_to_clear() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::load(MemoryStore::new());
        store.add("a", now).unwrap();
        store.add("b", now).unwrap();
        let before = store.tasks().to_vec();

        assert_eq!(
            store.clear_completed().unwrap(),
            ClearOutcome::NothingToClear
        );
        assert_eq!(store.tasks(), before.as_slice());
    }

    #[test]
    fn clear_completed_keeps_incomplete_in_order() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::load(MemoryStore::new());
        let a = store.add("a", now).unwrap().unwrap().id;
        store.add("b", now).unwrap();
        let c = store.add("c", now).unwrap().unwrap().id;
        store.add("d", now).unwrap();
        store.toggle_complete(&a).unwrap();
        store.toggle_complete(&c).unwrap();

        assert_eq!(store.clear_completed().unwrap(), ClearOutcome::Cleared(2));
        assert_eq!(texts(&store), vec!["d", "b"]);
        assert!(!store.has_completed());
    }

    #[test]
    fn every_mutation_writes_through() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::load(MemoryStore::new());
        let id = store.add("persist me", now).unwrap().unwrap().id;
        store.toggle_complete(&id).unwrap();

        let storage = store.into_storage();
        let raw = storage.get(TASKS_KEY).unwrap().unwrap();
        let reloaded = TaskStore::load(storage);

        assert!(raw.contains("\"createdAt\""));
        assert_eq!(reloaded.tasks().len(), 1);
        assert!(reloaded.tasks()[0].completed);
        assert_eq!(reloaded.tasks()[0].id, id);
    }

    #[test]
    fn malformed_snapshot_loads_empty() {
        let mut storage = MemoryStore::new();
        storage.set(TASKS_KEY, "{not json").unwrap();

        let store = TaskStore::load(storage);
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn resolve_accepts_id_or_position() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::load(MemoryStore::new());
        let older = store.add("older", now).unwrap().unwrap().id;
        let newer = store
            .add("newer", now + Duration::seconds(1))
            .unwrap()
            .unwrap()
            .id;

        assert_eq!(store.resolve(&older).as_deref(), Some(older.as_str()));
        assert_eq!(store.resolve("1").as_deref(), Some(newer.as_str()));
        assert_eq!(store.resolve(" 2 ").as_deref(), Some(older.as_str()));
        assert_eq!(store.resolve("0"), None);
        assert_eq!(store.resolve("3"), None);
        assert_eq!(store.resolve("abc"), None);
    }
}
