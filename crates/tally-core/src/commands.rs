use std::io::{self, BufRead, Write};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::cli::Command;
use crate::config::Config;
use crate::datastore::KeyValueStore;
use crate::render::{Renderer, format_counter};
use crate::store::{ClearOutcome, TaskStore};
use crate::view::{StatusFilter, ViewState, visible_tasks};

/// Interactive input for the steps that need the user: confirming a clear and
/// supplying replacement text for an edit.
pub trait Prompt {
    fn confirm(&mut self, question: &str) -> anyhow::Result<bool>;

    /// `None` when input is closed.
    fn read_line(&mut self, label: &str) -> anyhow::Result<Option<String>>;
}

#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&mut self, question: &str) -> anyhow::Result<bool> {
        let answer = self.read_line(&format!("{question} [y/N] "))?;
        Ok(matches!(
            answer.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
            Some("y" | "yes")
        ))
    }

    fn read_line(&mut self, label: &str) -> anyhow::Result<Option<String>> {
        let mut out = io::stdout().lock();
        write!(out, "{label}")?;
        out.flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

#[instrument(skip(store, cfg, renderer, prompt, command, now))]
pub fn dispatch<S: KeyValueStore>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    prompt: &mut dyn Prompt,
    command: Command,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Add { text } => cmd_add(store, renderer, &text, now),
        Command::List { filter, search } => cmd_list(store, renderer, filter, search),
        Command::Done { selector } => cmd_toggle(store, renderer, &selector),
        Command::Edit { selector, text } => cmd_edit(store, renderer, prompt, &selector, &text),
        Command::Delete { selector } => cmd_delete(store, renderer, &selector),
        Command::Clear { yes } => cmd_clear(store, cfg, renderer, prompt, yes),
        Command::Count => {
            println!("{}", format_counter(store.tasks()));
            Ok(())
        }
        Command::Info { selector } => cmd_info(store, renderer, &selector),
        Command::Show => cmd_show(cfg),
    }
}

#[instrument(skip(store, renderer, words, now))]
fn cmd_add<S: KeyValueStore>(
    store: &mut TaskStore<S>,
    renderer: &mut Renderer,
    words: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    if let Some(task) = store.add(&words.join(" "), now)? {
        println!("Created task {}.", task.id);
        render_all(store, renderer)?;
    }
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_list<S: KeyValueStore>(
    store: &TaskStore<S>,
    renderer: &mut Renderer,
    filter: StatusFilter,
    search: Option<String>,
) -> anyhow::Result<()> {
    let view = ViewState::new(filter, search.unwrap_or_default());
    let visible = visible_tasks(store.tasks(), &view);
    renderer.print_task_list(store.tasks(), &visible)
}

#[instrument(skip(store, renderer))]
fn cmd_toggle<S: KeyValueStore>(
    store: &mut TaskStore<S>,
    renderer: &mut Renderer,
    selector: &str,
) -> anyhow::Result<()> {
    info!("command done");

    let Some(id) = resolve_or_report(store, selector) else {
        return Ok(());
    };

    match store.toggle_complete(&id)? {
        Some(true) => println!("Completed task {id}."),
        Some(false) => println!("Reopened task {id}."),
        None => return Ok(()),
    }
    render_all(store, renderer)
}

#[instrument(skip(store, renderer, prompt, words))]
fn cmd_edit<S: KeyValueStore>(
    store: &mut TaskStore<S>,
    renderer: &mut Renderer,
    prompt: &mut dyn Prompt,
    selector: &str,
    words: &[String],
) -> anyhow::Result<()> {
    info!("command edit");

    let Some(id) = resolve_or_report(store, selector) else {
        return Ok(());
    };

    let replacement = if words.is_empty() {
        let current = store
            .get(&id)
            .map(|task| task.text.clone())
            .unwrap_or_default();
        println!("Current: {current}");
        match prompt.read_line("New text: ")? {
            Some(line) => line,
            None => return Ok(()),
        }
    } else {
        words.join(" ")
    };

    if store.edit(&id, &replacement)? {
        println!("Updated task {id}.");
        render_all(store, renderer)?;
    } else {
        debug!("edit left task unchanged");
    }
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_delete<S: KeyValueStore>(
    store: &mut TaskStore<S>,
    renderer: &mut Renderer,
    selector: &str,
) -> anyhow::Result<()> {
    info!("command delete");

    let Some(id) = resolve_or_report(store, selector) else {
        return Ok(());
    };
    if let Some(task) = store.get(&id) {
        renderer.print_removing(task)?;
    }

    if store.delete(&id)?.is_some() {
        println!("Deleted task {id}.");
        render_all(store, renderer)?;
    }
    Ok(())
}

#[instrument(skip(store, cfg, renderer, prompt))]
fn cmd_clear<S: KeyValueStore>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    prompt: &mut dyn Prompt,
    yes: bool,
) -> anyhow::Result<()> {
    info!("command clear");

    let confirmation = cfg.try_get_bool("confirmation")?.unwrap_or(true);

    if !store.has_completed() {
        println!("No completed tasks to clear.");
        return Ok(());
    }

    let ask = !yes && confirmation;
    if ask && !prompt.confirm("Remove all completed tasks?")? {
        println!("Nothing removed.");
        return Ok(());
    }

    match store.clear_completed()? {
        ClearOutcome::Cleared(count) => {
            let noun = if count == 1 { "task" } else { "tasks" };
            println!("Removed {count} completed {noun}.");
            render_all(store, renderer)?;
        }
        ClearOutcome::NothingToClear => println!("No completed tasks to clear."),
    }
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_info<S: KeyValueStore>(
    store: &TaskStore<S>,
    renderer: &mut Renderer,
    selector: &str,
) -> anyhow::Result<()> {
    let Some(task) = store.resolve(selector).and_then(|id| store.get(&id)) else {
        println!("No task matches '{selector}'.");
        return Ok(());
    };
    renderer.print_task_info(task)
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={value}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}

fn resolve_or_report<S: KeyValueStore>(store: &TaskStore<S>, selector: &str) -> Option<String> {
    let resolved = store.resolve(selector);
    if resolved.is_none() {
        println!("No task matches '{selector}'.");
    }
    resolved
}

/// Re-renders the whole list with a fresh `{all, ""}` view after a mutation.
fn render_all<S: KeyValueStore>(
    store: &TaskStore<S>,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    let visible = visible_tasks(store.tasks(), &ViewState::default());
    renderer.print_task_list(store.tasks(), &visible)
}
