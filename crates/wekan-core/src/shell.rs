//! The interactive session: a context stack, a history and the verbs that
//! operate on them.
//!
//! [`ShellSession::execute`] takes one command line and returns a structured
//! [`Outcome`]; rendering is left to the front end. A failed command never
//! changes the context stack.

use regex::Regex;
use serde_json::{Map, Value};

use crate::client::{NodeRef, PendingNode, WekanClient};
use crate::error::{Result, WekanError};
use crate::model::NodeKind;
use crate::navigation::{self, ContextStack, resolve};

/// Verbs understood by [`Command::parse`], for completion.
pub const COMMANDS: &[&str] = &[
    "cd", "ls", "pwd", "history", "show", "cat", "mv", "refresh", "create", "edit", "delete",
    "rm", "help", "exit", "quit",
];

/// Keys whose values are always taken as plain strings.
const TEXT_KEYS: &[&str] = &[
    "title",
    "description",
    "name",
    "comment",
    "username",
    "email",
    "password",
    "color",
    "url",
];

const PROMPT_SEGMENT_WIDTH: usize = 12;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Cd(String),
    Ls {
        kind: Option<NodeKind>,
        filter: Option<String>,
    },
    Pwd,
    History,
    Show(Option<String>),
    Mv(String),
    Refresh,
    Create {
        kind: NodeKind,
        title: Option<String>,
        attributes: Map<String, Value>,
    },
    Edit(Map<String, Value>),
    Delete(Option<String>),
    Help,
    Exit,
}

impl Command {
    /// Tokenizes with shell quoting rules. Returns `None` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let words = shell_words::split(line)
            .map_err(|e| WekanError::validation(format!("cannot parse command line: {e}")))?;
        let Some((verb, args)) = words.split_first() else {
            return Ok(None);
        };

        let command = match verb.as_str() {
            "cd" => Command::Cd(args.first().cloned().unwrap_or_else(|| "/".to_string())),
            "ls" => parse_ls(args)?,
            "pwd" => Command::Pwd,
            "history" => Command::History,
            "show" | "cat" => Command::Show(args.first().cloned()),
            "mv" => Command::Mv(
                args.first()
                    .cloned()
                    .ok_or_else(|| WekanError::validation("usage: mv <path>"))?,
            ),
            "refresh" => Command::Refresh,
            "create" => parse_create(args)?,
            "edit" => {
                let patch = parse_assignments(args)?;
                if patch.is_empty() {
                    return Err(WekanError::validation("usage: edit key=value ..."));
                }
                Command::Edit(patch)
            }
            "delete" | "rm" => Command::Delete(args.first().cloned()),
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            other => {
                return Err(WekanError::validation(format!(
                    "unknown command '{other}', try 'help'"
                )));
            }
        };
        Ok(Some(command))
    }
}

fn parse_ls(args: &[String]) -> Result<Command> {
    let mut kind = None;
    let mut filter = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-k" | "--kind" => {
                let name = iter
                    .next()
                    .ok_or_else(|| WekanError::validation("usage: ls [-k kind] [pattern]"))?;
                kind = Some(name.parse()?);
            }
            _ if filter.is_none() => filter = Some(arg.clone()),
            _ => return Err(WekanError::validation("usage: ls [-k kind] [pattern]")),
        }
    }
    Ok(Command::Ls { kind, filter })
}

fn parse_create(args: &[String]) -> Result<Command> {
    let Some((kind, rest)) = args.split_first() else {
        return Err(WekanError::validation(
            "usage: create <kind> <title> [key=value ...]",
        ));
    };
    let kind: NodeKind = kind.parse()?;
    let (title, assignments) = match rest.split_first() {
        Some((first, tail)) if !first.contains('=') => (Some(first.clone()), tail),
        _ => (None, rest),
    };
    Ok(Command::Create {
        kind,
        title,
        attributes: parse_assignments(assignments)?,
    })
}

fn parse_assignments(args: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for arg in args {
        let (key, raw) = arg
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| WekanError::validation(format!("expected key=value, got '{arg}'")))?;
        let value = if TEXT_KEYS.contains(&key) {
            Value::String(raw.to_string())
        } else {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        };
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// One row of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// 1-based position, usable as a path segment.
    pub index: usize,
    pub kind: NodeKind,
    pub id: String,
    pub title: String,
}

impl Entry {
    fn of(client: &WekanClient, node: NodeRef, index: usize) -> Self {
        let entry = client.node(node);
        Self {
            index,
            kind: entry.kind(),
            id: entry.id().unwrap_or_default().to_string(),
            title: client.title(node),
        }
    }
}

/// Result of one executed command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Empty,
    Moved { path: String },
    Listing(Vec<Entry>),
    Path(String),
    History(Vec<String>),
    Details(Entry, Map<String, Value>),
    Created(Entry),
    Edited(Entry),
    Deleted(Entry),
    Refreshed(String),
    Help(Vec<(&'static str, &'static str)>),
    Exit,
}

/// Owns the client and the navigation state of one interactive session.
pub struct ShellSession {
    client: WekanClient,
    stack: ContextStack,
    history: Vec<String>,
}

impl ShellSession {
    pub fn new(client: WekanClient) -> Self {
        let stack = ContextStack::new(client.root());
        Self {
            client,
            stack,
            history: Vec::new(),
        }
    }

    pub fn client(&self) -> &WekanClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut WekanClient {
        &mut self.client
    }

    pub fn context(&self) -> &ContextStack {
        &self.stack
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn pwd(&self) -> String {
        navigation::render_path(&self.client, &self.stack)
    }

    /// The current path with long segments shortened.
    pub fn prompt(&self) -> String {
        let segments: Vec<String> = self.stack.nodes()[1..]
            .iter()
            .map(|node| abbreviate(&self.client.title(*node)))
            .collect();
        format!("wekan:/{}> ", segments.join("/"))
    }

    /// Runs one command line.
    pub fn execute(&mut self, line: &str) -> Result<Outcome> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Outcome::Empty);
        }
        self.history.push(line.to_string());

        let Some(command) = Command::parse(line)? else {
            return Ok(Outcome::Empty);
        };
        let verb = line.split_whitespace().next().unwrap_or_default();
        tracing::debug!(verb, "executing");
        self.run(command)
    }

    fn run(&mut self, command: Command) -> Result<Outcome> {
        match command {
            Command::Cd(path) => {
                let target = resolve(&mut self.client, &path, &self.stack)?;
                self.stack = target.stack;
                Ok(Outcome::Moved { path: self.pwd() })
            }
            Command::Ls { kind, filter } => self.ls(kind, filter.as_deref()),
            Command::Pwd => Ok(Outcome::Path(self.pwd())),
            Command::History => Ok(Outcome::History(self.history.clone())),
            Command::Show(path) => {
                let node = self.target(path.as_deref())?;
                self.client.fetch_attributes(node, true)?;
                let attributes = self.client.node(node).attributes().clone();
                Ok(Outcome::Details(Entry::of(&self.client, node, 0), attributes))
            }
            Command::Mv(path) => self.mv(&path),
            Command::Refresh => {
                self.client.refresh_all(self.stack.top());
                Ok(Outcome::Refreshed(self.pwd()))
            }
            Command::Create {
                kind,
                title,
                attributes,
            } => self.create(kind, title, attributes),
            Command::Edit(patch) => {
                let node = self.stack.top();
                self.client.edit(node, patch, None)?;
                if let Err(err) = self.client.fetch_attributes(node, true) {
                    tracing::warn!(error = %err, "edited but could not reload attributes");
                }
                Ok(Outcome::Edited(Entry::of(&self.client, node, 0)))
            }
            Command::Delete(path) => self.delete(path.as_deref()),
            Command::Help => Ok(Outcome::Help(self.help())),
            Command::Exit => Ok(Outcome::Exit),
        }
    }

    fn target(&mut self, path: Option<&str>) -> Result<NodeRef> {
        match path {
            Some(path) => Ok(resolve(&mut self.client, path, &self.stack)?.node()),
            None => Ok(self.stack.top()),
        }
    }

    fn ls(&mut self, kind: Option<NodeKind>, filter: Option<&str>) -> Result<Outcome> {
        let top = self.stack.top();
        let kinds: Vec<NodeKind> = match kind {
            Some(kind) => vec![kind],
            None => self.client.node(top).kind().navigable_kinds().to_vec(),
        };
        let pattern = filter.map(Regex::new).transpose()?;

        let mut all = Vec::new();
        for kind in kinds {
            all.extend(self.client.list_children(top, kind, None)?);
        }

        // numbering follows the unfiltered order so it can be fed back to `cd`
        let entries = all
            .iter()
            .enumerate()
            .map(|(i, node)| Entry::of(&self.client, *node, i + 1))
            .filter(|entry| pattern.as_ref().is_none_or(|re| re.is_match(&entry.title)))
            .collect();
        Ok(Outcome::Listing(entries))
    }

    fn mv(&mut self, path: &str) -> Result<Outcome> {
        let card = self.stack.top();
        if self.client.node(card).kind() != NodeKind::Card {
            return Err(WekanError::validation("mv only applies to cards"));
        }
        let target = resolve(&mut self.client, path, &self.stack)?;
        self.client.edit(card, Map::new(), Some(target.node()))?;

        let mut stack = target.stack;
        stack.push(card);
        self.stack = stack;
        Ok(Outcome::Moved { path: self.pwd() })
    }

    fn create(
        &mut self,
        kind: NodeKind,
        title: Option<String>,
        mut attributes: Map<String, Value>,
    ) -> Result<Outcome> {
        let parent = match kind {
            NodeKind::Board | NodeKind::User => self.stack.root(),
            _ => self.stack.top(),
        };
        let parent_kind = self.client.node(parent).kind();
        if !parent_kind.can_contain(kind) {
            return Err(WekanError::creation(format!(
                "cannot create a {kind} inside a {parent_kind}"
            )));
        }

        let relation = if kind == NodeKind::Card {
            Some(self.card_relation(parent, &mut attributes)?)
        } else {
            None
        };

        let mut pending = match title {
            Some(title) => PendingNode::titled(kind, title),
            None => PendingNode::new(kind),
        }
        .with_attributes(attributes);
        if let Some(relation) = relation {
            pending = pending.related_to(relation);
        }

        let node = self.client.create_child(parent, pending)?;
        if let Err(err) = self.client.fetch_attributes(node, false) {
            tracing::warn!(%kind, error = %err, "created but could not reload attributes");
        }
        Ok(Outcome::Created(Entry::of(&self.client, node, 0)))
    }

    /// The other parent of a new card: `swimlane=`/`list=` if given, else
    /// the first one on the board.
    fn card_relation(&mut self, parent: NodeRef, attributes: &mut Map<String, Value>) -> Result<NodeRef> {
        let (key, kind) = match self.client.node(parent).kind() {
            NodeKind::List => ("swimlane", NodeKind::Swimlane),
            _ => ("list", NodeKind::List),
        };
        let board = self
            .client
            .node(parent)
            .parent()
            .ok_or_else(|| WekanError::creation("cannot locate the board of this card"))?;
        let candidates = self.client.list_children(board, kind, None)?;

        match attributes.remove(key) {
            Some(value) => {
                let segment = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                navigation::match_segment(&self.client, &candidates, &segment)
            }
            None => candidates
                .first()
                .copied()
                .ok_or_else(|| WekanError::creation(format!("the board has no {kind} for the card"))),
        }
    }

    fn delete(&mut self, path: Option<&str>) -> Result<Outcome> {
        let node = self.target(path)?;
        let entry = Entry::of(&self.client, node, 0);
        self.client.delete(node)?;
        // deleting a card's other parent can stale an entry below it
        let first_stale = self
            .stack
            .nodes()
            .iter()
            .position(|entry| self.client.node(*entry).is_stale());
        if let Some(position) = first_stale {
            self.stack.truncate_to(position);
        }
        Ok(Outcome::Deleted(entry))
    }

    fn help(&self) -> Vec<(&'static str, &'static str)> {
        let kind = self.client.node(self.stack.top()).kind();
        let mut verbs = vec![
            ("cd <path>", "change the current node (name, index, id, .., /)"),
            ("ls [-k kind] [pattern]", "list children, optionally filtered by regex"),
            ("pwd", "print the current path"),
            ("show [path]", "fetch and print attributes"),
            ("refresh", "refetch children of the current node on next listing"),
        ];
        if !kind.child_kinds().is_empty() {
            verbs.push(("create <kind> <title> [key=value ...]", "create a child"));
        }
        if kind == NodeKind::Client {
            verbs.push(("create board|user <title> ...", "create a board or user"));
        }
        if kind == NodeKind::Card {
            verbs.push(("mv <path>", "move this card to a list or swimlane"));
        }
        if kind != NodeKind::Client {
            verbs.push(("edit key=value ...", "update the current node"));
            verbs.push(("delete [path]", "delete the current or given node"));
        }
        verbs.extend([
            ("history", "show commands entered this session"),
            ("help", "show this help"),
            ("exit", "leave the shell"),
        ]);
        verbs
    }
}

fn abbreviate(segment: &str) -> String {
    if segment.chars().count() <= PROMPT_SEGMENT_WIDTH {
        return segment.to_string();
    }
    let head: String = segment.chars().take(PROMPT_SEGMENT_WIDTH - 3).collect();
    format!("{head}...")
}
