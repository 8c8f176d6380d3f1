//! Interactive front end for a [`ShellSession`].
//!
//! Reads lines with rustyline, hands them to the session and prints the
//! outcome in color. Completion covers verbs, kind names after `create` and
//! the names of children already cached under the current node.

use std::borrow::Cow::{self, Borrowed, Owned};
use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use serde_json::Value;

use wekan_core::shell::COMMANDS;
use wekan_core::{NodeKind, Outcome, ShellSession, WekanError};

const KIND_NAMES: &[&str] = &[
    "board",
    "list",
    "swimlane",
    "card",
    "comment",
    "checklist",
    "item",
    "label",
    "field",
    "integration",
    "user",
];

/// Rustyline helper providing completion, highlighting and hints.
#[derive(Clone, Default)]
struct CliHelper {
    /// Display names of the cached children of the current node.
    children: Vec<String>,
}

impl CliHelper {
    fn set_children(&mut self, children: Vec<String>) {
        self.children = children;
    }

    /// Start of the word being completed and its candidates.
    fn candidates(&self, line: &str) -> (usize, Vec<String>) {
        let start = line.rfind(' ').map(|i| i + 1).unwrap_or(0);
        let word = &line[start..];
        let words_before = line[..start].split_whitespace().count();

        if words_before == 0 {
            let verbs = COMMANDS
                .iter()
                .filter(|cmd| cmd.starts_with(word))
                .map(|cmd| cmd.to_string())
                .collect();
            return (start, verbs);
        }

        let verb = line.split_whitespace().next().unwrap_or_default();
        if verb == "create" && words_before == 1 {
            let kinds = KIND_NAMES
                .iter()
                .filter(|kind| kind.starts_with(word))
                .map(|kind| kind.to_string())
                .collect();
            return (start, kinds);
        }

        // only the last path segment is completed
        let segment_start = word.rfind('/').map(|i| i + 1).unwrap_or(0);
        let segment = &word[segment_start..];
        let names = self
            .children
            .iter()
            .filter(|name| name.starts_with(segment))
            .map(|name| quote_if_needed(name))
            .collect();
        (start + segment_start, names)
    }
}

fn quote_if_needed(name: &str) -> String {
    if name.contains(char::is_whitespace) {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, names) = self.candidates(&line[..pos]);
        let pairs = names
            .into_iter()
            .map(|name| Pair {
                display: name.clone(),
                replacement: name,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let verb_end = line.find(' ').unwrap_or(line.len());
        let verb = &line[..verb_end];
        if COMMANDS.contains(&verb) {
            Owned(format!("{}{}", verb.bright_cyan(), &line[verb_end..]))
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if line.is_empty() || line.contains(' ') {
            return None;
        }
        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Validator for CliHelper {}

/// Names of children already cached under the current node.
fn cached_child_names(session: &ShellSession) -> Vec<String> {
    let client = session.client();
    let top = session.context().top();
    client
        .node(top)
        .kind()
        .navigable_kinds()
        .iter()
        .filter_map(|kind| client.cached_children(top, *kind))
        .flatten()
        .map(|child| client.title(*child))
        .collect()
}

/// Turns an outcome into printable lines.
pub fn render(outcome: &Outcome) -> Vec<String> {
    match outcome {
        Outcome::Empty => Vec::new(),
        Outcome::Moved { path } | Outcome::Path(path) => vec![path.bright_white().to_string()],
        Outcome::Listing(entries) if entries.is_empty() => {
            vec!["(empty)".bright_black().to_string()]
        }
        Outcome::Listing(entries) => entries
            .iter()
            .map(|entry| {
                format!(
                    "{} {} {} {}",
                    format!("{:>3}", entry.index).yellow(),
                    format!("{:<12}", entry.kind.as_str()).cyan(),
                    entry.title,
                    format!("({})", entry.id).bright_black()
                )
            })
            .collect(),
        Outcome::History(lines) => lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{} {}", format!("{:>4}", i + 1).bright_black(), line))
            .collect(),
        Outcome::Details(entry, attributes) => {
            let mut lines = vec![format!(
                "{} {} {}",
                entry.kind.as_str().cyan(),
                entry.title.bold(),
                format!("({})", entry.id).bright_black()
            )];
            let width = attributes.keys().map(String::len).max().unwrap_or(0);
            lines.extend(attributes.iter().map(|(key, value)| {
                format!("  {}  {}", format!("{key:<width$}").yellow(), display_value(value))
            }));
            lines
        }
        Outcome::Created(entry) => vec![
            format!("created {} '{}' ({})", entry.kind, entry.title, entry.id)
                .green()
                .to_string(),
        ],
        Outcome::Edited(entry) => vec![
            format!("updated {} '{}' ({})", entry.kind, entry.title, entry.id)
                .green()
                .to_string(),
        ],
        Outcome::Deleted(entry) => vec![
            format!("deleted {} '{}' ({})", entry.kind, entry.title, entry.id)
                .yellow()
                .to_string(),
        ],
        Outcome::Refreshed(path) => vec![format!("cache cleared for {path}").bright_black().to_string()],
        Outcome::Help(verbs) => {
            let width = verbs.iter().map(|(verb, _)| verb.len()).max().unwrap_or(0);
            verbs
                .iter()
                .map(|(verb, description)| {
                    format!("  {}  {}", format!("{verb:<width$}").bold(), description)
                })
                .collect()
        }
        Outcome::Exit => vec!["Goodbye!".bright_green().to_string()],
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

pub fn render_error(err: &WekanError) -> String {
    format!("Error: {err}").red().to_string()
}

/// Runs the read-eval-print loop until `exit`, end of input or a fatal error.
///
/// Line history is loaded from and saved to `history_path` when given.
pub fn run(mut session: ShellSession, history_path: Option<&Path>, history_size: usize) -> Result<()> {
    let config = Config::builder()
        .max_history_size(history_size)?
        .auto_add_history(false)
        .build();
    let mut rl: Editor<CliHelper, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(CliHelper::default()));

    if let Some(path) = history_path {
        if let Err(err) = rl.load_history(path) {
            tracing::debug!(path = %path.display(), error = %err, "no readline history loaded");
        }
    }

    println!("{}", "=== Wekan shell ===".bright_magenta().bold());
    println!("{}", "Type 'help' for commands, 'exit' to leave.".bright_black());

    let mut fatal = None;
    loop {
        let names = cached_child_names(&session);
        if let Some(helper) = rl.helper_mut() {
            helper.set_children(names);
        }

        match rl.readline(&session.prompt()) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                match session.execute(&line) {
                    Ok(outcome) => {
                        for rendered in render(&outcome) {
                            println!("{rendered}");
                        }
                        if outcome == Outcome::Exit {
                            break;
                        }
                    }
                    Err(err) => {
                        eprintln!("{}", render_error(&err));
                        if err.is_fatal() {
                            fatal = Some(err);
                            break;
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'exit' to leave.".yellow());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye!".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {err:?}").red());
                break;
            }
        }
    }

    if let Some(path) = history_path {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(err) = rl.save_history(path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to save readline history");
        }
    }

    match fatal {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Creates the global `tracing` subscriber, writing to stderr.
///
/// `RUST_LOG` selects the level; the default keeps the shell quiet.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
