use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::trace;

use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum StatusFilter {
  #[default]
  All,
  Completed,
  Incomplete
}

impl StatusFilter {
  pub fn as_str(
    self
  ) -> &'static str {
    match self {
      | StatusFilter::All => "all",
      | StatusFilter::Completed => {
        "completed"
      }
      | StatusFilter::Incomplete => {
        "incomplete"
      }
    }
  }

  pub fn admits(
    self,
    task: &Task
  ) -> bool {
    match self {
      | StatusFilter::All => true,
      | StatusFilter::Completed => {
        task.completed
      }
      | StatusFilter::Incomplete => {
        !task.completed
      }
    }
  }
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(StatusFilter::All),
      | "completed" => {
        Ok(StatusFilter::Completed)
      }
      | "incomplete" => {
        Ok(StatusFilter::Incomplete)
      }
      | other => Err(anyhow!(
        "unknown status filter: \
         {other} (expected all, \
         completed or incomplete)"
      ))
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Transient view settings. Never
/// persisted; a fresh start is
/// `{all, ""}`.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct ViewState {
  pub filter:      StatusFilter,
  pub search_term: String
}

impl ViewState {
  pub fn new(
    filter: StatusFilter,
    search_term: impl Into<String>
  ) -> Self {
    Self {
      filter,
      search_term: search_term.into()
    }
  }
}

/// Status filter first, then a
/// case-insensitive substring search
/// on the text. Keeps the input order.
#[tracing::instrument(skip(
  tasks, view
))]
pub fn visible_tasks<'a>(
  tasks: &'a [Task],
  view: &ViewState
) -> Vec<&'a Task> {
  let needle = view
    .search_term
    .trim()
    .to_lowercase();

  let out: Vec<&Task> = tasks
    .iter()
    .filter(|task| {
      view.filter.admits(task)
    })
    .filter(|task| {
      needle.is_empty()
        || task
          .text
          .to_lowercase()
          .contains(&needle)
    })
    .collect();

  trace!(
    total = tasks.len(),
    visible = out.len(),
    filter = %view.filter,
    "derived visible tasks"
  );
  out
}
