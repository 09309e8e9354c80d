use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single to-do item. Field names on disk are camelCase so a snapshot written by
/// the browser version of the app loads unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub text: String,

    #[serde(default)]
    pub completed: bool,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new_incomplete(id: String, text: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            text,
            completed: false,
            created_at: now,
        }
    }

    pub fn toggle(&mut self) -> bool {
        self.completed = !self.completed;
        self.completed
    }
}

/// Returns the trimmed text, or `None` when nothing is left after trimming.
pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Clock-derived id: milliseconds since the epoch, bumped past any id already taken.
pub fn next_task_id(existing: &[Task], now: DateTime<Utc>) -> String {
    let mut candidate = now.timestamp_millis();
    while existing
        .iter()
        .any(|task| task.id == candidate.to_string())
    {
        candidate += 1;
    }
    candidate.to_string()
}
