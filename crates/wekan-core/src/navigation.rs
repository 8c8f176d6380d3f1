//! Path resolution over the resource graph.
//!
//! A path is a `/`-separated sequence of segments. Each segment names a
//! child of the node produced by the previous one, by id, title, 1-based
//! position or a unique case-insensitive substring of the title, tried in
//! that order. `.` stays put, `..` goes up one level and stops at the root.
//!
//! Under a board, lists and swimlanes form one candidate set with lists
//! first. Under a card, checklists come before comments.

use crate::client::{NodeRef, WekanClient};
use crate::error::{Result, WekanError};

pub const SEPARATOR: char = '/';

/// The chain of nodes from the root to the current position.
///
/// Never empty: the first entry is always the client root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStack(Vec<NodeRef>);

impl ContextStack {
    pub fn new(root: NodeRef) -> Self {
        Self(vec![root])
    }

    pub fn root(&self) -> NodeRef {
        self.0[0]
    }

    pub fn top(&self) -> NodeRef {
        self.0[self.0.len() - 1]
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.0
    }

    /// Number of levels below the root.
    pub fn depth(&self) -> usize {
        self.0.len() - 1
    }

    pub fn push(&mut self, node: NodeRef) {
        self.0.push(node);
    }

    /// Goes up one level. At the root this does nothing.
    pub fn pop(&mut self) {
        if self.0.len() > 1 {
            self.0.pop();
        }
    }

    /// Keeps the first `len` entries, never dropping the root.
    pub fn truncate_to(&mut self, len: usize) {
        self.0.truncate(len.max(1));
    }
}

/// Outcome of a successful resolution: the stack ending at the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub stack: ContextStack,
}

impl ResolvedTarget {
    pub fn node(&self) -> NodeRef {
        self.stack.top()
    }
}

/// Resolves `path` against `context`.
///
/// The context is never modified; on success the caller gets a new stack to
/// adopt. The first segment that fails to resolve aborts with its error.
pub fn resolve(client: &mut WekanClient, path: &str, context: &ContextStack) -> Result<ResolvedTarget> {
    let path = path.trim();
    let mut stack = if path.starts_with(SEPARATOR) {
        ContextStack::new(context.root())
    } else {
        context.clone()
    };

    for segment in path.split(SEPARATOR).map(str::trim).filter(|s| !s.is_empty()) {
        match segment {
            "." => {}
            ".." => stack.pop(),
            _ => {
                let next = resolve_segment(client, stack.top(), segment)?;
                stack.push(next);
            }
        }
    }

    tracing::debug!(path, depth = stack.depth(), "path resolved");
    Ok(ResolvedTarget { stack })
}

/// Resolves one bare segment against the children of `node`.
pub fn resolve_segment(client: &mut WekanClient, node: NodeRef, segment: &str) -> Result<NodeRef> {
    let candidates = navigable_children(client, node)?;
    match_segment(client, &candidates, segment)
}

/// The combined, ordered candidate set for path segments below `node`.
pub fn navigable_children(client: &mut WekanClient, node: NodeRef) -> Result<Vec<NodeRef>> {
    let kinds = client.node(node).kind().navigable_kinds();
    let mut children = Vec::new();
    for kind in kinds {
        children.extend(client.list_children(node, *kind, None)?);
    }
    Ok(children)
}

/// Picks the candidate a segment names.
pub fn match_segment(client: &WekanClient, candidates: &[NodeRef], segment: &str) -> Result<NodeRef> {
    let by_id: Vec<NodeRef> = candidates
        .iter()
        .copied()
        .filter(|c| client.node(*c).id() == Some(segment))
        .collect();
    if let Some(found) = single(client, segment, by_id)? {
        return Ok(found);
    }

    let by_title: Vec<NodeRef> = candidates
        .iter()
        .copied()
        .filter(|c| client.node(*c).title() == segment)
        .collect();
    if let Some(found) = single(client, segment, by_title)? {
        return Ok(found);
    }

    if let Ok(index) = segment.parse::<usize>() {
        if let Some(found) = index.checked_sub(1).and_then(|i| candidates.get(i)) {
            return Ok(*found);
        }
    }

    let needle = segment.to_lowercase();
    let by_substring: Vec<NodeRef> = candidates
        .iter()
        .copied()
        .filter(|c| client.node(*c).title().to_lowercase().contains(&needle))
        .collect();
    if let Some(found) = single(client, segment, by_substring)? {
        return Ok(found);
    }

    Err(WekanError::not_found("path segment", segment))
}

fn single(client: &WekanClient, segment: &str, matches: Vec<NodeRef>) -> Result<Option<NodeRef>> {
    match matches.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        _ => Err(WekanError::AmbiguousPath {
            segment: segment.to_string(),
            candidates: matches
                .iter()
                .map(|c| {
                    let node = client.node(*c);
                    format!("{} ({})", node.title(), node.id().unwrap_or_default())
                })
                .collect(),
        }),
    }
}

/// Renders a stack as an absolute path of display names.
pub fn render_path(client: &WekanClient, stack: &ContextStack) -> String {
    let names: Vec<String> = stack.nodes()[1..]
        .iter()
        .map(|node| client.title(*node))
        .collect();
    format!("{SEPARATOR}{}", names.join("/"))
}
