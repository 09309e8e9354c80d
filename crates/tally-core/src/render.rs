use std::io::{self, IsTerminal, Write};

use chrono::Local;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::task::Task;

pub const EMPTY_LIST_MESSAGE: &str = "No tasks to display.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
    pub incomplete: usize,
}

impl TaskCounts {
    pub fn of(tasks: &[Task]) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|task| task.completed).count();
        Self {
            total,
            completed,
            incomplete: total - completed,
        }
    }
}

/// Counter line. Always computed over the full collection, never the filtered view.
pub fn format_counter(tasks: &[Task]) -> String {
    let counts = TaskCounts::of(tasks);
    format!(
        "Total tasks: {} ({} completed, {} incomplete)",
        counts.total, counts.completed, counts.incomplete
    )
}

#[derive(Debug, Clone, Copy)]
enum Style {
    Accent,
    Dim,
}

impl Style {
    fn sgr(self) -> &'static str {
        match self {
            Style::Accent => "33",
            Style::Dim => "2",
        }
    }
}

/// One table line, kept unstyled so widths are measured on what the user sees.
#[derive(Debug)]
struct TaskRow<'a> {
    position: String,
    id: &'a str,
    done: &'static str,
    created: String,
    text: &'a str,
    completed: bool,
}

impl<'a> TaskRow<'a> {
    fn new(all: &[Task], task: &'a Task) -> Self {
        let position = all
            .iter()
            .position(|candidate| candidate.id == task.id)
            .map(|idx| (idx + 1).to_string())
            .unwrap_or_else(|| "-".to_string());

        Self {
            position,
            id: &task.id,
            done: if task.completed { "[x]" } else { "[ ]" },
            created: task
                .created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d")
                .to_string(),
            text: &task.text,
            completed: task.completed,
        }
    }
}

const HEADERS: [&str; 5] = ["#", "ID", "Done", "Created", "Text"];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.try_get_bool("color")?.unwrap_or(true);
        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, all, visible))]
    pub fn print_task_list(&mut self, all: &[Task], visible: &[&Task]) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_task_list(out, all, visible)
    }

    /// Table of `visible`, numbered by position in `all`, followed by the counter.
    pub fn write_task_list<W: Write>(
        &self,
        mut out: W,
        all: &[Task],
        visible: &[&Task],
    ) -> anyhow::Result<()> {
        if visible.is_empty() {
            writeln!(out, "{EMPTY_LIST_MESSAGE}")?;
        } else {
            let rows: Vec<TaskRow<'_>> =
                visible.iter().map(|task| TaskRow::new(all, task)).collect();
            self.write_rows(&mut out, &rows)?;
        }

        writeln!(out, "{}", format_counter(all))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "text      {}", task.text)?;
        writeln!(
            out,
            "status    {}",
            if task.completed { "completed" } else { "incomplete" }
        )?;
        writeln!(out, "created   {}", task.created_at.to_rfc3339())?;

        Ok(())
    }

    pub fn print_removing(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "Removing '{}'...", self.styled(&task.text, Style::Dim))?;
        Ok(())
    }

    /// Fixed five-column layout. The text column is last and never padded.
    fn write_rows<W: Write>(&self, mut out: W, rows: &[TaskRow<'_>]) -> anyhow::Result<()> {
        let mut widths = HEADERS.map(|header| header.width());
        for row in rows {
            widths[0] = widths[0].max(row.position.width());
            widths[1] = widths[1].max(row.id.width());
            widths[2] = widths[2].max(row.done.width());
            widths[3] = widths[3].max(row.created.width());
        }

        let header = HEADERS
            .iter()
            .zip(widths)
            .map(|(name, width)| pad(name, width))
            .collect::<Vec<_>>();
        writeln!(out, "{}", header.join(" ").trim_end())?;

        let rule = widths
            .iter()
            .enumerate()
            .map(|(idx, width)| {
                let width = if idx == HEADERS.len() - 1 {
                    rows.iter().map(|row| row.text.width()).max().unwrap_or(0).max(*width)
                } else {
                    *width
                };
                "-".repeat(width)
            })
            .collect::<Vec<_>>();
        writeln!(out, "{}", rule.join(" "))?;

        for row in rows {
            let text_style = row.completed.then_some(Style::Dim);
            writeln!(
                out,
                "{} {} {} {} {}",
                self.styled(&pad(&row.position, widths[0]), Style::Accent),
                pad(row.id, widths[1]),
                pad(row.done, widths[2]),
                pad(&row.created, widths[3]),
                match text_style {
                    Some(style) => self.styled(row.text, style),
                    None => row.text.to_string(),
                },
            )?;
        }

        Ok(())
    }

    fn styled(&self, text: &str, style: Style) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{}m{text}\x1b[0m", style.sgr())
    }
}

/// Left-aligns by display width, which `format!` padding does not account for.
fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(fill))
}
