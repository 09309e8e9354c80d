use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::view::StatusFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tally",
    version,
    about = "Tally: a small task list kept in a local store",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "tallyrc")]
    pub tallyrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a task; words are joined with single spaces
    Add {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },

    /// Show tasks matching a status filter and search term
    #[command(visible_alias = "ls")]
    List {
        #[arg(
            short = 'f',
            long = "filter",
            default_value = "all",
            value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<StatusFilter>())
        )]
        filter: StatusFilter,

        #[arg(short = 's', long = "search")]
        search: Option<String>,
    },

    /// Flip a task between completed and incomplete
    #[command(visible_alias = "toggle")]
    Done { selector: String },

    /// Replace a task's text; prompts with the current text when none is given
    Edit {
        selector: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },

    /// Remove a task
    #[command(visible_alias = "rm")]
    Delete { selector: String },

    /// Remove every completed task
    Clear {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },

    /// Print the task counter
    Count,

    /// Show every field of one task
    Info { selector: String },

    /// Print the effective configuration
    Show,
}

impl Command {
    /// Command run when none is given on the command line.
    pub fn from_default_name(name: &str) -> anyhow::Result<Self> {
        match name.trim() {
            "list" | "ls" => Ok(Command::List {
                filter: StatusFilter::All,
                search: None,
            }),
            "count" => Ok(Command::Count),
            "show" => Ok(Command::Show),
            other => Err(anyhow!("unsupported default.command: {other}")),
        }
    }

    pub fn resolve(explicit: Option<Command>, cfg: &Config) -> anyhow::Result<Self> {
        if let Some(command) = explicit {
            return Ok(command);
        }

        let name = cfg
            .get("default.command")
            .unwrap_or_else(|| "list".to_string());
        debug!(command = %name, "no explicit command, using default");
        Self::from_default_name(&name)
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the argument
/// list before clap sees it. Scanning stops at the subcommand name or `--`, so task
/// text that happens to start with `rc.` is left alone.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();
    let subcommands = subcommand_names();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter.by_ref() {
        let s = arg.to_string_lossy();
        if s == "--" || subcommands.iter().any(|name| *name == s) {
            debug!(boundary = %s, "stopped scanning for rc overrides");
            cleaned.push(arg);
            break;
        }

        let parsed = s
            .strip_prefix("rc.")
            .and_then(|rest| rest.split_once('=').or_else(|| rest.split_once(':')));

        if let Some((k, v)) = parsed {
            debug!(key = %k, value = %v, "captured positional rc override");
            overrides.push((format!("rc.{k}"), v.to_string()));
            continue;
        }

        cleaned.push(arg);
    }
    cleaned.extend(iter);

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// Subcommand names and their visible aliases.
fn subcommand_names() -> Vec<String> {
    GlobalCli::command()
        .get_subcommands()
        .flat_map(|sub| {
            std::iter::once(sub.get_name().to_string())
                .chain(sub.get_visible_aliases().map(str::to_string))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Command, GlobalCli, preprocess_args};
    use crate::config::Config;
    use crate::view::StatusFilter;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["tally", "rc.color=off", "rc.confirmation:no", "list"]))
            .unwrap();

        assert_eq!(pre.cleaned_args, args(&["tally", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.confirmation".to_string(), "no".to_string()),
            ]
        );
    }

    #[test]
    fn task_text_after_subcommand_keeps_rc_words() {
        let pre = preprocess_args(&args(&[
            "tally",
            "--rc",
            "color=off",
            "add",
            "update",
            "rc.path=/usr/bin",
            "in",
            "docs",
        ]))
        .unwrap();

        assert!(pre.rc_overrides.is_empty());
        assert_eq!(
            pre.cleaned_args,
            args(&["tally", "--rc", "color=off", "add", "update", "rc.path=/usr/bin", "in", "docs"])
        );

        let aliased = preprocess_args(&args(&["tally", "rm", "rc.local:1"])).unwrap();
        assert!(aliased.rc_overrides.is_empty());

        let separated = preprocess_args(&args(&["tally", "--", "rc.x=1"])).unwrap();
        assert!(separated.rc_overrides.is_empty());
    }

    #[test]
    fn list_flags_parse_into_view_settings() {
        let cli = GlobalCli::parse_from(["tally", "list", "--filter", "completed", "-s", "work"]);
        assert_eq!(
            cli.command,
            Some(Command::List {
                filter: StatusFilter::Completed,
                search: Some("work".to_string()),
            })
        );
    }

    #[test]
    fn bad_filter_value_is_rejected() {
        assert!(GlobalCli::try_parse_from(["tally", "list", "--filter", "pending"]).is_err());
    }

    #[test]
    fn add_collects_all_words() {
        let cli = GlobalCli::parse_from(["tally", "add", "Buy", "-", "milk"]);
        assert_eq!(
            cli.command,
            Some(Command::Add {
                text: vec!["Buy".to_string(), "-".to_string(), "milk".to_string()],
            })
        );
    }

    #[test]
    fn missing_command_falls_back_to_configured_default() {
        let mut cfg = Config::defaults();
        assert_eq!(
            Command::resolve(None, &cfg).unwrap(),
            Command::List {
                filter: StatusFilter::All,
                search: None,
            }
        );

        cfg.apply_overrides([("default.command".to_string(), "count".to_string())]);
        assert_eq!(Command::resolve(None, &cfg).unwrap(), Command::Count);

        cfg.apply_overrides([("default.command".to_string(), "delete".to_string())]);
        assert!(Command::resolve(None, &cfg).is_err());
    }
}
