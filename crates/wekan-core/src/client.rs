//! The resource graph: an in-memory mirror of the remote board hierarchy.
//!
//! Nodes live in an arena owned by [`WekanClient`] and are addressed by
//! [`NodeRef`] handles. A handle is the node's identity: listing the same
//! children twice hands back the same handles, and there is at most one node
//! per remote id and kind. Parent links are plain handles and never own
//! anything.
//!
//! Every method that mutates a cache takes `&mut self`, so a move or an edit
//! has exclusive access to all caches for its whole duration.

use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};

use crate::auth::AuthSession;
use crate::error::{Result, WekanError};
use crate::model::{CUSTOM_FIELD_TYPES, NodeKind};
use crate::transport::{Intent, Method, Response, Transport, status_error};

const DEFAULT_BOARD_COLOR: &str = "belize";
const DEFAULT_LABEL_COLOR: &str = "green";

/// Attributes that re-parent a node. They only change through a move.
const RELATION_KEYS: &[&str] = &["boardId", "listId", "swimlaneId"];

/// Handle to a node in one client's graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(usize);

#[derive(Debug, Default)]
struct ChildCache {
    entries: Vec<NodeRef>,
    loaded: bool,
}

/// One remote entity as last seen by this client.
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    id: Option<String>,
    attributes: Map<String, Value>,
    loaded: bool,
    stale: bool,
    /// Owning container; for a card this is its list.
    parent: Option<NodeRef>,
    /// A card's swimlane. Unused for every other kind.
    lane: Option<NodeRef>,
    children: HashMap<NodeKind, ChildCache>,
}

impl Node {
    fn new(kind: NodeKind, id: Option<String>, attributes: Map<String, Value>) -> Self {
        Self {
            kind,
            id,
            attributes,
            loaded: false,
            stale: false,
            parent: None,
            lane: None,
            children: HashMap::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Remote id. `None` only for the client root.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Display name, falling back to the id.
    pub fn title(&self) -> String {
        self.kind
            .title_keys()
            .iter()
            .find_map(|key| self.attributes.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| self.id.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent
    }

    /// The swimlane of a card.
    pub fn swimlane(&self) -> Option<NodeRef> {
        self.lane
    }

    /// Whether the full document has been fetched, as opposed to a listing summary.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn entity_id(&self) -> String {
        self.id.clone().unwrap_or_default()
    }
}

/// Desired attributes of a node that does not exist remotely yet.
///
/// Handed to [`WekanClient::create_child`]; it becomes a graph node only once
/// the server has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNode {
    kind: NodeKind,
    attributes: Map<String, Value>,
    relation: Option<NodeRef>,
}

impl PendingNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attributes: Map::new(),
            relation: None,
        }
    }

    /// A pending node with its display name set.
    pub fn titled(kind: NodeKind, title: impl Into<String>) -> Self {
        let key = kind.title_keys().first().copied().unwrap_or("title");
        Self::new(kind).attr(key, title.into())
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// The second parent of a card: its swimlane when created under a list,
    /// its list when created under a swimlane.
    pub fn related_to(mut self, node: NodeRef) -> Self {
        self.relation = Some(node);
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }
}

/// Root of the resource graph and sole owner of the auth session.
pub struct WekanClient {
    transport: Box<dyn Transport>,
    auth: AuthSession,
    nodes: Vec<Node>,
    registry: HashMap<(NodeKind, String), NodeRef>,
}

impl std::fmt::Debug for WekanClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WekanClient")
            .field("auth", &self.auth)
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl WekanClient {
    pub fn new(transport: impl Transport + 'static, auth: AuthSession) -> Self {
        Self {
            transport: Box::new(transport),
            auth,
            nodes: vec![Node::new(NodeKind::Client, None, Map::new())],
            registry: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeRef {
        NodeRef(0)
    }

    /// The node behind a handle.
    ///
    /// Handles are never invalidated, so this only fails for a handle that
    /// came from a different client.
    pub fn get(&self, node: NodeRef) -> Option<&Node> {
        self.nodes.get(node.0)
    }

    pub fn node(&self, node: NodeRef) -> &Node {
        &self.nodes[node.0]
    }

    fn node_mut(&mut self, node: NodeRef) -> &mut Node {
        &mut self.nodes[node.0]
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn title(&self, node: NodeRef) -> String {
        if node == self.root() {
            return "/".to_string();
        }
        self.node(node).title()
    }

    /// Looks up the node for a remote id, if this client has seen it.
    pub fn lookup(&self, kind: NodeKind, id: &str) -> Option<NodeRef> {
        self.registry.get(&(kind, id.to_string())).copied()
    }

    /// Authenticates if needed and returns the current user's id.
    pub fn login(&mut self) -> Result<String> {
        let token = self.auth.ensure_token(&*self.transport)?;
        Ok(token.user_id.clone())
    }

    /// The authenticated user as a graph node. Attributes load lazily.
    pub fn current_user(&mut self) -> Result<NodeRef> {
        let user_id = self.login()?;
        let root = self.root();
        let doc = Map::from_iter([("_id".to_string(), json!(user_id))]);
        Ok(self.materialize(root, NodeKind::User, user_id, doc))
    }

    pub fn boards(&mut self, filter: Option<&str>) -> Result<Vec<NodeRef>> {
        let root = self.root();
        self.list_children(root, NodeKind::Board, filter)
    }

    pub fn users(&mut self, filter: Option<&str>) -> Result<Vec<NodeRef>> {
        let root = self.root();
        self.list_children(root, NodeKind::User, filter)
    }

    // ------------------------------------------------------------------
    // Node operations
    // ------------------------------------------------------------------

    /// Loads the node's full document unless it is already loaded.
    ///
    /// A node the server no longer knows is marked stale and dropped from
    /// its parents' caches.
    pub fn fetch_attributes(&mut self, node: NodeRef, force: bool) -> Result<NodeRef> {
        self.ensure_live(node)?;
        let current = self.node(node);
        if current.kind == NodeKind::Client || (current.loaded && !force) {
            return Ok(node);
        }

        let kind = current.kind;
        let id = current.entity_id();
        let document = match kind {
            NodeKind::Label => {
                let board = self.require_parent(node)?;
                let board_doc = self.get_document(board)?;
                embedded_entry(&board_doc, "labels", &id)
            }
            _ => {
                let path = self.item_path(node)?;
                match self.get_document_at(&path, kind, &id) {
                    Ok(doc) => Some(doc),
                    Err(err) if err.is_not_found() => None,
                    Err(err) => return Err(err),
                }
            }
        };

        let Some(document) = document else {
            tracing::warn!(kind = %kind, id = %id, "remote entity is gone, marking stale");
            self.mark_stale(node);
            return Err(WekanError::not_found(kind.as_str(), id));
        };

        let entry = self.node_mut(node);
        entry.attributes = document;
        entry.loaded = true;
        if kind == NodeKind::Card {
            self.link_card_relations(node);
        }
        Ok(node)
    }

    /// Lists the children of one kind, fetching them on a cache miss.
    ///
    /// `filter` is an unanchored, case-sensitive regex matched against each
    /// child's display name. Filtering never touches the cache.
    pub fn list_children(
        &mut self,
        parent: NodeRef,
        kind: NodeKind,
        filter: Option<&str>,
    ) -> Result<Vec<NodeRef>> {
        self.ensure_live(parent)?;
        let pattern = filter.map(Regex::new).transpose()?;
        let parent_kind = self.node(parent).kind;
        if !parent_kind.can_contain(kind) {
            return Err(WekanError::validation(format!(
                "a {parent_kind} has no {kind} children"
            )));
        }

        let cached = self
            .node(parent)
            .children
            .get(&kind)
            .is_some_and(|cache| cache.loaded);
        if cached {
            tracing::debug!(parent = %self.title(parent), %kind, "child cache hit");
        } else {
            self.populate(parent, kind)?;
        }

        let entries = self
            .node(parent)
            .children
            .get(&kind)
            .map(|cache| cache.entries.clone())
            .unwrap_or_default();

        Ok(match pattern {
            Some(re) => entries
                .into_iter()
                .filter(|child| re.is_match(&self.node(*child).title()))
                .collect(),
            None => entries,
        })
    }

    /// Children of one kind already in the cache. Never fetches.
    pub fn cached_children(&self, parent: NodeRef, kind: NodeKind) -> Option<&[NodeRef]> {
        self.get(parent)?
            .children
            .get(&kind)
            .filter(|cache| cache.loaded)
            .map(|cache| cache.entries.as_slice())
    }

    /// Forgets the cached children of one kind; the next listing refetches.
    pub fn refresh(&mut self, parent: NodeRef, kind: NodeKind) {
        if let Some(cache) = self.node_mut(parent).children.get_mut(&kind) {
            cache.loaded = false;
            cache.entries.clear();
        }
    }

    /// Forgets every child cache of a node and its loaded document.
    pub fn refresh_all(&mut self, node: NodeRef) {
        let entry = self.node_mut(node);
        entry.children.clear();
        if entry.kind != NodeKind::Client {
            entry.loaded = false;
        }
    }

    /// Creates a child remotely and adds it to the graph.
    ///
    /// Nothing is added to the graph unless the server accepts the node and
    /// returns its id.
    pub fn create_child(&mut self, parent: NodeRef, pending: PendingNode) -> Result<NodeRef> {
        self.ensure_live(parent)?;
        let parent_kind = self.node(parent).kind;
        let kind = pending.kind;
        if !parent_kind.can_contain(kind) {
            return Err(WekanError::creation(format!(
                "a {parent_kind} cannot contain a {kind}"
            )));
        }

        let plan = self.plan_creation(parent, &pending)?;
        let response = self.request(plan.method, &plan.path, Some(&plan.payload))?;
        if !response.is_success() {
            return Err(status_error(&response, Intent::Create, kind.as_str(), ""));
        }
        let id = extract_id(&response.body)
            .ok_or_else(|| WekanError::creation(format!("server returned no id for the new {kind}")))?;

        let mut attributes = match plan.payload {
            Value::Object(map) if kind == NodeKind::Label => map
                .get("label")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            Value::Object(map) => map,
            _ => Map::new(),
        };
        attributes.insert("_id".to_string(), json!(id));
        if let Some(body) = response.body.as_object() {
            for (key, value) in body {
                attributes.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let mut node = Node::new(kind, Some(id.clone()), attributes);
        node.loaded = kind.embedded_in_parent().is_some();
        node.parent = Some(plan.primary);
        node.lane = plan.lane;
        let handle = NodeRef(self.nodes.len());
        self.nodes.push(node);
        self.registry.insert((kind, id.clone()), handle);

        self.insert_cached(plan.primary, kind, handle);
        if let Some(lane) = plan.lane {
            self.insert_cached(lane, kind, handle);
        }
        tracing::info!(%kind, %id, parent = %self.title(parent), "created");
        Ok(handle)
    }

    /// Applies a partial update and, for cards, an optional move.
    ///
    /// `new_parent` must be a list or swimlane of the card's board. Local
    /// state, including both parents' caches, changes only after the server
    /// has accepted the update.
    pub fn edit(
        &mut self,
        node: NodeRef,
        patch: Map<String, Value>,
        new_parent: Option<NodeRef>,
    ) -> Result<NodeRef> {
        self.ensure_live(node)?;
        let kind = self.node(node).kind;
        let id = self.node(node).entity_id();
        if !kind.editable() {
            return Err(WekanError::unsupported(kind.as_str(), "edit"));
        }
        if patch.is_empty() && new_parent.is_none() {
            return Err(WekanError::validation("nothing to change"));
        }
        if let Some(key) = RELATION_KEYS.iter().find(|key| patch.contains_key(**key)) {
            return Err(WekanError::validation(format!(
                "'{key}' cannot be edited directly; use mv to move a card"
            )));
        }

        let mut payload = patch;
        if let Some(target) = new_parent {
            self.ensure_live(target)?;
            if kind != NodeKind::Card {
                return Err(WekanError::validation(format!("a {kind} cannot be moved")));
            }
            if self.board_of(target)? != self.board_of(node)? {
                return Err(WekanError::validation(
                    "cards can only move within their board",
                ));
            }
            let target_id = self.node(target).entity_id();
            match self.node(target).kind {
                NodeKind::List => payload.insert("listId".to_string(), json!(target_id)),
                NodeKind::Swimlane => payload.insert("swimlaneId".to_string(), json!(target_id)),
                other => {
                    return Err(WekanError::validation(format!(
                        "a card cannot be moved into a {other}"
                    )));
                }
            };
        }

        let path = self.item_path(node)?;
        let body = Value::Object(payload.clone());
        let response = self.request(Method::Put, &path, Some(&body))?;
        if !response.is_success() {
            return Err(status_error(&response, Intent::Write, kind.as_str(), &id));
        }

        // committed remotely
        self.node_mut(node).attributes.extend(payload);
        if let Some(target) = new_parent {
            self.relocate_card(node, target);
        }
        tracing::info!(%kind, %id, moved = new_parent.is_some(), "edited");
        Ok(node)
    }

    /// Deletes the entity remotely, then drops it and everything cached
    /// below it from the graph.
    pub fn delete(&mut self, node: NodeRef) -> Result<()> {
        self.ensure_live(node)?;
        let kind = self.node(node).kind;
        let id = self.node(node).entity_id();
        if !kind.deletable() {
            return Err(WekanError::unsupported(kind.as_str(), "delete"));
        }

        let path = self.item_path(node)?;
        let response = self.request(Method::Delete, &path, None)?;
        if !response.is_success() {
            return Err(status_error(&response, Intent::Write, kind.as_str(), &id));
        }

        let mut pending: Vec<NodeRef> = vec![node];
        while let Some(current) = pending.pop() {
            let entry = self.node_mut(current);
            entry.stale = true;
            let kind = entry.kind;
            let id = entry.entity_id();
            let children: Vec<NodeRef> = entry
                .children
                .values()
                .flat_map(|cache| cache.entries.iter().copied())
                .collect();
            self.registry.remove(&(kind, id));
            self.detach(current);
            pending.extend(children.into_iter().filter(|c| !self.node(*c).stale));
        }
        tracing::info!(%kind, %id, "deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Graph maintenance
    // ------------------------------------------------------------------

    fn ensure_live(&self, node: NodeRef) -> Result<()> {
        let Some(entry) = self.get(node) else {
            return Err(WekanError::validation("node handle belongs to another client"));
        };
        if entry.stale {
            return Err(WekanError::stale(entry.kind.as_str(), entry.entity_id()));
        }
        Ok(())
    }

    /// Marks a single node stale and removes it from the caches holding it.
    fn mark_stale(&mut self, node: NodeRef) {
        self.node_mut(node).stale = true;
        self.detach(node);
    }

    fn detach(&mut self, node: NodeRef) {
        let entry = self.node(node);
        let kind = entry.kind;
        let holders: Vec<NodeRef> = entry.parent.into_iter().chain(entry.lane).collect();
        for holder in holders {
            self.evict_cached(holder, kind, node);
        }
    }

    fn insert_cached(&mut self, parent: NodeRef, kind: NodeKind, child: NodeRef) {
        if let Some(cache) = self.node_mut(parent).children.get_mut(&kind) {
            if cache.loaded && !cache.entries.contains(&child) {
                cache.entries.push(child);
            }
        }
    }

    fn evict_cached(&mut self, parent: NodeRef, kind: NodeKind, child: NodeRef) {
        if let Some(cache) = self.node_mut(parent).children.get_mut(&kind) {
            cache.entries.retain(|entry| *entry != child);
        }
    }

    /// Fetches one child collection and replaces the cache with it.
    fn populate(&mut self, parent: NodeRef, kind: NodeKind) -> Result<()> {
        let documents = match kind.embedded_in_parent() {
            Some(field) => {
                let document = self.get_document(parent)?;
                let entry = self.node_mut(parent);
                entry.attributes = document;
                entry.loaded = true;
                entry
                    .attributes
                    .get(field)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            }
            None => {
                let path = self.listing_path(parent, kind)?;
                let parent_kind = self.node(parent).kind;
                let parent_id = self.node(parent).entity_id();
                let response = self.request(Method::Get, &path, None)?;
                if !response.is_success() {
                    let err = status_error(&response, Intent::Read, parent_kind.as_str(), &parent_id);
                    if err.is_not_found() && parent_kind != NodeKind::Client {
                        self.mark_stale(parent);
                    }
                    return Err(err);
                }
                match response.body {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    other => {
                        return Err(WekanError::transport(format!(
                            "expected a {kind} listing, got {other}"
                        )));
                    }
                }
            }
        };

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(documents.len());
        for document in documents {
            let Value::Object(document) = document else {
                continue;
            };
            let Some(id) = document.get("_id").and_then(Value::as_str).map(str::to_string) else {
                tracing::warn!(%kind, "listing entry without _id skipped");
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            entries.push(self.materialize(parent, kind, id, document));
        }

        tracing::debug!(parent = %self.title(parent), %kind, count = entries.len(), "children fetched");
        let cache = self.node_mut(parent).children.entry(kind).or_default();
        cache.entries = entries;
        cache.loaded = true;
        Ok(())
    }

    /// Returns the node for a remote id, creating it on first sight.
    fn materialize(
        &mut self,
        parent: NodeRef,
        kind: NodeKind,
        id: String,
        document: Map<String, Value>,
    ) -> NodeRef {
        let embedded = kind.embedded_in_parent().is_some();
        let known = self.lookup(kind, &id);
        let handle = match known {
            Some(existing) => {
                let entry = self.node_mut(existing);
                entry.stale = false;
                if embedded {
                    entry.attributes = document;
                } else {
                    entry.attributes.extend(document);
                }
                existing
            }
            None => {
                let mut node = Node::new(kind, Some(id.clone()), document);
                node.loaded = embedded;
                let handle = NodeRef(self.nodes.len());
                self.nodes.push(node);
                self.registry.insert((kind, id), handle);
                handle
            }
        };

        match (kind, self.node(parent).kind) {
            (NodeKind::Card, NodeKind::Swimlane) => self.node_mut(handle).lane = Some(parent),
            _ => self.node_mut(handle).parent = Some(parent),
        }
        if kind == NodeKind::Card {
            self.link_card_relations(handle);
        }
        handle
    }

    /// Links a card's other parent from its `listId`/`swimlaneId` when that
    /// node is already known.
    fn link_card_relations(&mut self, card: NodeRef) {
        let list = self
            .node(card)
            .attribute("listId")
            .and_then(Value::as_str)
            .and_then(|id| self.lookup(NodeKind::List, id));
        let lane = self
            .node(card)
            .attribute("swimlaneId")
            .and_then(Value::as_str)
            .and_then(|id| self.lookup(NodeKind::Swimlane, id));
        let entry = self.node_mut(card);
        if let Some(list) = list {
            entry.parent = Some(list);
        }
        if let Some(lane) = lane {
            entry.lane = Some(lane);
        }
    }

    fn relocate_card(&mut self, card: NodeRef, target: NodeRef) {
        let target_kind = self.node(target).kind;
        let previous = match target_kind {
            NodeKind::List => self.node_mut(card).parent.replace(target),
            _ => self.node_mut(card).lane.replace(target),
        };
        if let Some(previous) = previous.filter(|p| *p != target) {
            self.evict_cached(previous, NodeKind::Card, card);
        }
        self.insert_cached(target, NodeKind::Card, card);
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    fn require_parent(&self, node: NodeRef) -> Result<NodeRef> {
        let entry = self.node(node);
        entry.parent.or(entry.lane).ok_or_else(|| {
            WekanError::validation(format!(
                "{} '{}' is not attached to a parent",
                entry.kind,
                entry.entity_id()
            ))
        })
    }

    fn id_of(&self, node: NodeRef) -> String {
        self.node(node).entity_id()
    }

    /// Id of the board a node belongs to.
    fn board_of(&self, node: NodeRef) -> Result<String> {
        let mut current = node;
        loop {
            let entry = self.node(current);
            match entry.kind {
                NodeKind::Board => return Ok(entry.entity_id()),
                NodeKind::Client | NodeKind::User => {
                    return Err(WekanError::validation(format!(
                        "a {} does not belong to a board",
                        entry.kind
                    )));
                }
                _ => current = self.require_parent(current)?,
            }
        }
    }

    /// Id of a card's list, from the linked node or the `listId` attribute.
    fn card_list_id(&self, card: NodeRef) -> Result<String> {
        let entry = self.node(card);
        if let Some(list) = entry.parent {
            return Ok(self.id_of(list));
        }
        entry
            .attribute("listId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                WekanError::validation(format!(
                    "card '{}' has no known list",
                    entry.entity_id()
                ))
            })
    }

    fn item_path(&self, node: NodeRef) -> Result<String> {
        let entry = self.node(node);
        let id = entry.entity_id();
        let path = match entry.kind {
            NodeKind::Client => return Err(WekanError::unsupported("client", "address")),
            NodeKind::Board => format!("/api/boards/{id}"),
            NodeKind::User => format!("/api/users/{id}"),
            NodeKind::List | NodeKind::Swimlane | NodeKind::CustomField | NodeKind::Integration => {
                format!("/api/boards/{}/{}/{id}", self.board_of(node)?, entry.kind.collection())
            }
            NodeKind::Label => format!("/api/boards/{}", self.board_of(node)?),
            NodeKind::Card => format!(
                "/api/boards/{}/lists/{}/cards/{id}",
                self.board_of(node)?,
                self.card_list_id(node)?
            ),
            NodeKind::CardComment | NodeKind::CardChecklist => {
                let card = self.require_parent(node)?;
                format!(
                    "/api/boards/{}/cards/{}/{}/{id}",
                    self.board_of(node)?,
                    self.id_of(card),
                    entry.kind.collection()
                )
            }
            NodeKind::CardChecklistItem => {
                let checklist = self.require_parent(node)?;
                format!("{}/items/{id}", self.item_path(checklist)?)
            }
        };
        Ok(path)
    }

    fn listing_path(&mut self, parent: NodeRef, kind: NodeKind) -> Result<String> {
        let parent_kind = self.node(parent).kind;
        let path = match (parent_kind, kind) {
            (NodeKind::Client, NodeKind::Board) => {
                let user_id = self.login()?;
                format!("/api/users/{user_id}/boards")
            }
            (NodeKind::Client, NodeKind::User) => "/api/users".to_string(),
            (NodeKind::List | NodeKind::Swimlane, NodeKind::Card) => {
                format!("{}/cards", self.item_path(parent)?)
            }
            (NodeKind::Card, _) => format!(
                "/api/boards/{}/cards/{}/{}",
                self.board_of(parent)?,
                self.id_of(parent),
                kind.collection()
            ),
            _ => format!("{}/{}", self.item_path(parent)?, kind.collection()),
        };
        Ok(path)
    }

    fn plan_creation(&mut self, parent: NodeRef, pending: &PendingNode) -> Result<CreationPlan> {
        let kind = pending.kind;
        let attributes = &pending.attributes;
        let require = |key: &str| -> Result<()> {
            match attributes.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
                Some(Value::String(_)) | None => Err(WekanError::creation(format!(
                    "a {kind} requires a non-empty '{key}'"
                ))),
                Some(_) => Ok(()),
            }
        };

        let mut payload = Map::new();
        let mut primary = parent;
        let mut lane = None;
        let path = match kind {
            NodeKind::Board => {
                require("title")?;
                let owner = self.login()?;
                payload.extend([
                    ("owner".to_string(), json!(owner)),
                    ("permission".to_string(), json!("private")),
                    ("color".to_string(), json!(DEFAULT_BOARD_COLOR)),
                    ("isAdmin".to_string(), json!(true)),
                    ("isActive".to_string(), json!(true)),
                    ("isNoComments".to_string(), json!(false)),
                    ("isCommentOnly".to_string(), json!(false)),
                ]);
                "/api/boards".to_string()
            }
            NodeKind::User => {
                for key in ["username", "email", "password"] {
                    require(key)?;
                }
                "/api/users".to_string()
            }
            NodeKind::List | NodeKind::Swimlane | NodeKind::CardChecklist => {
                require("title")?;
                self.listing_path(parent, kind)?
            }
            NodeKind::CustomField => {
                require("name")?;
                let field_type = attributes.get("type").and_then(Value::as_str).unwrap_or("");
                if !CUSTOM_FIELD_TYPES.contains(&field_type) {
                    return Err(WekanError::creation(format!(
                        "custom field type must be one of {}",
                        CUSTOM_FIELD_TYPES.join(", ")
                    )));
                }
                payload.extend([
                    ("settings".to_string(), json!({})),
                    ("showOnCard".to_string(), json!(false)),
                    ("automaticallyOnCard".to_string(), json!(false)),
                    ("showLabelOnMiniCard".to_string(), json!(false)),
                    ("showSumAtTopOfList".to_string(), json!(false)),
                ]);
                self.listing_path(parent, kind)?
            }
            NodeKind::Integration => {
                require("url")?;
                self.listing_path(parent, kind)?
            }
            NodeKind::Label => {
                require("name")?;
                let mut label = Map::new();
                label.insert("color".to_string(), json!(DEFAULT_LABEL_COLOR));
                label.extend(attributes.clone());
                return Ok(CreationPlan {
                    method: Method::Put,
                    path: format!("{}/labels", self.item_path(parent)?),
                    payload: json!({ "label": label }),
                    primary,
                    lane,
                });
            }
            NodeKind::Card => {
                require("title")?;
                let relation = pending.relation.ok_or_else(|| match self.node(parent).kind {
                    NodeKind::List => WekanError::creation("a card requires a swimlane"),
                    _ => WekanError::creation("a card requires a list"),
                })?;
                self.ensure_live(relation)
                    .map_err(|e| WekanError::creation(e.to_string()))?;
                let (list, swimlane) = match (self.node(parent).kind, self.node(relation).kind) {
                    (NodeKind::List, NodeKind::Swimlane) => (parent, relation),
                    (NodeKind::Swimlane, NodeKind::List) => (relation, parent),
                    (_, other) => {
                        return Err(WekanError::creation(format!(
                            "a card cannot be related to a {other}"
                        )));
                    }
                };
                if self.board_of(list)? != self.board_of(swimlane)? {
                    return Err(WekanError::creation(
                        "list and swimlane belong to different boards",
                    ));
                }
                primary = list;
                lane = Some(swimlane);
                let author = self.login()?;
                payload.extend([
                    ("description".to_string(), json!("")),
                    ("members".to_string(), json!([])),
                    ("authorId".to_string(), json!(author)),
                ]);
                format!("{}/cards", self.item_path(list)?)
            }
            NodeKind::CardComment => {
                require("comment")?;
                let author = self.login()?;
                payload.insert("authorId".to_string(), json!(author));
                self.listing_path(parent, kind)?
            }
            NodeKind::CardChecklistItem => {
                require("title")?;
                format!("{}/items", self.item_path(parent)?)
            }
            NodeKind::Client => return Err(WekanError::unsupported("client", "create")),
        };

        for (key, value) in attributes {
            payload.insert(key.clone(), value.clone());
        }
        if let Some(swimlane) = lane {
            payload.insert("swimlaneId".to_string(), json!(self.id_of(swimlane)));
        }

        Ok(CreationPlan {
            method: Method::Post,
            path,
            payload: Value::Object(payload),
            primary,
            lane,
        })
    }

    // ------------------------------------------------------------------
    // Wire
    // ------------------------------------------------------------------

    /// Issues one authenticated call. The token is checked right before the
    /// call goes out.
    fn request(&mut self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        let token = self.auth.ensure_token(&*self.transport)?.value.clone();
        tracing::debug!(%method, path, "wekan request");
        let response = self.transport.call(method, path, Some(&token), body)?;
        if response.status == 401 {
            // the server may revoke a token before its advertised expiry
            self.auth.invalidate();
        }
        Ok(response)
    }

    fn get_document(&mut self, node: NodeRef) -> Result<Map<String, Value>> {
        let kind = self.node(node).kind;
        let id = self.node(node).entity_id();
        let path = self.item_path(node)?;
        let result = self.get_document_at(&path, kind, &id);
        if let Err(err) = &result {
            if err.is_not_found() {
                self.mark_stale(node);
            }
        }
        result
    }

    fn get_document_at(&mut self, path: &str, kind: NodeKind, id: &str) -> Result<Map<String, Value>> {
        let response = self.request(Method::Get, path, None)?;
        if !response.is_success() {
            return Err(status_error(&response, Intent::Read, kind.as_str(), id));
        }
        match response.body {
            Value::Object(map) => Ok(map),
            // Wekan answers unknown ids with an empty body rather than 404
            Value::Null => Err(WekanError::not_found(kind.as_str(), id)),
            Value::Array(items) if items.is_empty() => Err(WekanError::not_found(kind.as_str(), id)),
            other => Err(WekanError::transport(format!(
                "expected a {kind} document, got {other}"
            ))),
        }
    }
}

struct CreationPlan {
    method: Method,
    path: String,
    payload: Value,
    primary: NodeRef,
    lane: Option<NodeRef>,
}

fn extract_id(body: &Value) -> Option<String> {
    match body {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Object(map) => map.get("_id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn embedded_entry(document: &Map<String, Value>, field: &str, id: &str) -> Option<Map<String, Value>> {
    document
        .get(field)?
        .as_array()?
        .iter()
        .filter_map(Value::as_object)
        .find(|entry| entry.get("_id").and_then(Value::as_str) == Some(id))
        .cloned()
}
