//! In-memory Wekan server for tests.
//!
//! Routes the subset of the REST API the client uses, issues real-looking
//! tokens and records every call so tests can count round trips.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::auth::{AuthSession, Credentials, LOGIN_PATH, Token};
use crate::client::WekanClient;
use crate::error::{Result, WekanError};
use crate::transport::{Method, Response, Transport};

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// How an injected failure presents itself.
#[derive(Debug, Clone)]
pub enum Failure {
    Status(u16, Value),
    Network(String),
}

#[derive(Debug, Clone)]
struct Entity {
    kind: &'static str,
    id: String,
    /// Board id, card id or empty, depending on the kind.
    scope: String,
    doc: Map<String, Value>,
}

#[derive(Debug, Default)]
struct State {
    user_id: String,
    next_id: usize,
    tokens: Vec<(String, DateTime<Utc>)>,
    token_ttl: Option<Duration>,
    entities: Vec<Entity>,
    calls: Vec<Call>,
    failures: Vec<(Method, Failure)>,
}

#[derive(Debug, Clone)]
pub struct FakeWekan {
    state: Arc<Mutex<State>>,
}

impl Default for FakeWekan {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWekan {
    pub fn new() -> Self {
        let state = State {
            user_id: "u-admin".to_string(),
            ..State::default()
        };
        let server = Self {
            state: Arc::new(Mutex::new(state)),
        };
        server.insert("user", "", "u-admin", json!({"username": USERNAME}));
        server
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// A client logged out, pointed at this server.
    pub fn client(&self) -> WekanClient {
        WekanClient::new(
            self.clone(),
            AuthSession::new(Credentials::new(USERNAME, PASSWORD)),
        )
    }

    /// A client seeded with a token that expires at `expires_at`.
    pub fn client_with_token(&self, expires_at: DateTime<Utc>) -> WekanClient {
        let token = self.issue_token(expires_at);
        WekanClient::new(
            self.clone(),
            AuthSession::new(Credentials::new(USERNAME, PASSWORD)).with_token(token),
        )
    }

    pub fn issue_token(&self, expires_at: DateTime<Utc>) -> Token {
        let mut state = self.state();
        let value = format!("token-{}", state.tokens.len() + 1);
        state.tokens.push((value.clone(), expires_at));
        Token {
            value,
            user_id: state.user_id.clone(),
            expires_at,
        }
    }

    /// Invalidates every issued token, as a server-side logout would.
    pub fn revoke_tokens(&self) {
        let revoked_at = Utc::now() - Duration::seconds(1);
        for (_, expires) in self.state().tokens.iter_mut() {
            *expires = revoked_at;
        }
    }

    /// An embedded checklist item as the server holds it.
    pub fn item(&self, checklist: &str, id: &str) -> Option<Value> {
        self.embedded("checklist", checklist, "items", id)
    }

    pub fn set_token_ttl(&self, ttl: Duration) {
        self.state().token_ttl = Some(ttl);
    }

    pub fn user_id(&self) -> String {
        self.state().user_id.clone()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    fn insert(&self, kind: &'static str, scope: &str, id: &str, fields: Value) {
        let mut doc = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        doc.insert("_id".to_string(), json!(id));
        self.state().entities.push(Entity {
            kind,
            id: id.to_string(),
            scope: scope.to_string(),
            doc,
        });
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        format!("{prefix}{}", state.next_id)
    }

    pub fn add_board(&self, title: &str) -> String {
        let id = self.next_id("b");
        self.insert(
            "board",
            "",
            &id,
            json!({"title": title, "archived": false, "color": "belize", "labels": []}),
        );
        id
    }

    pub fn add_list(&self, board: &str, title: &str) -> String {
        let id = self.next_id("l");
        self.insert("list", board, &id, json!({"title": title, "boardId": board}));
        id
    }

    pub fn add_swimlane(&self, board: &str, title: &str) -> String {
        let id = self.next_id("s");
        self.insert("swimlane", board, &id, json!({"title": title, "boardId": board}));
        id
    }

    pub fn add_card(&self, board: &str, list: &str, swimlane: &str, title: &str) -> String {
        let id = self.next_id("c");
        self.insert(
            "card",
            board,
            &id,
            json!({
                "title": title,
                "description": "",
                "boardId": board,
                "listId": list,
                "swimlaneId": swimlane,
            }),
        );
        id
    }

    pub fn add_comment(&self, card: &str, text: &str) -> String {
        let id = self.next_id("m");
        self.insert("comment", card, &id, json!({"text": text, "userId": "u-admin"}));
        id
    }

    pub fn add_checklist(&self, card: &str, title: &str) -> String {
        let id = self.next_id("k");
        self.insert("checklist", card, &id, json!({"title": title, "items": []}));
        id
    }

    pub fn add_item(&self, checklist: &str, title: &str) -> String {
        let id = self.next_id("i");
        let mut state = self.state();
        if let Some(entity) = state
            .entities
            .iter_mut()
            .find(|e| e.kind == "checklist" && e.id == checklist)
        {
            if let Some(Value::Array(items)) = entity.doc.get_mut("items") {
                items.push(json!({"_id": id, "title": title, "isFinished": false}));
            }
        }
        id
    }

    pub fn add_label(&self, board: &str, name: &str, color: &str) -> String {
        let id = self.next_id("t");
        let mut state = self.state();
        if let Some(entity) = state
            .entities
            .iter_mut()
            .find(|e| e.kind == "board" && e.id == board)
        {
            if let Some(Value::Array(labels)) = entity.doc.get_mut("labels") {
                labels.push(json!({"_id": id, "name": name, "color": color}));
            }
        }
        id
    }

    pub fn add_user(&self, username: &str) -> String {
        let id = self.next_id("u");
        self.insert("user", "", &id, json!({"username": username}));
        id
    }

    /// Deletes an entity behind the client's back.
    pub fn remove_remote(&self, id: &str) {
        self.state().entities.retain(|e| e.id != id);
    }

    pub fn rename_remote(&self, id: &str, title: &str) {
        let mut state = self.state();
        if let Some(entity) = state.entities.iter_mut().find(|e| e.id == id) {
            entity.doc.insert("title".to_string(), json!(title));
        }
    }

    pub fn field(&self, id: &str, key: &str) -> Option<Value> {
        self.state()
            .entities
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.doc.get(key).cloned())
    }

    pub fn exists(&self, id: &str) -> bool {
        self.state().entities.iter().any(|e| e.id == id)
    }

    // ------------------------------------------------------------------
    // Call log and failure injection
    // ------------------------------------------------------------------

    /// The next non-login call with `method` fails instead of being served.
    pub fn fail_next(&self, method: Method, failure: Failure) {
        self.state().failures.push((method, failure));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn login_calls(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.path == LOGIN_PATH)
            .count()
    }

    pub fn api_calls(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.path != LOGIN_PATH)
            .count()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    fn login(&self, body: Option<&Value>) -> Response {
        let body = body.cloned().unwrap_or(Value::Null);
        let username = body.get("username").and_then(Value::as_str);
        let password = body.get("password").and_then(Value::as_str);
        if username != Some(USERNAME) || password != Some(PASSWORD) {
            return Response::new(400, json!({"error": 400, "reason": "Incorrect password"}));
        }
        let mut state = self.state();
        let ttl = state.token_ttl.unwrap_or_else(|| Duration::hours(1));
        let expires_at = Utc::now() + ttl;
        let value = format!("token-{}", state.tokens.len() + 1);
        state.tokens.push((value.clone(), expires_at));
        Response::ok(json!({
            "id": state.user_id,
            "token": value,
            "tokenExpires": expires_at.to_rfc3339(),
        }))
    }

    fn authorized(&self, token: Option<&str>) -> bool {
        let now = Utc::now();
        let state = self.state();
        token.is_some_and(|t| {
            state
                .tokens
                .iter()
                .any(|(value, expires)| value == t && *expires > now)
        })
    }

    fn find(&self, kind: &str, id: &str) -> Option<Entity> {
        self.state()
            .entities
            .iter()
            .find(|e| e.kind == kind && e.id == id)
            .cloned()
    }

    fn summaries(&self, kind: &str, keep: impl Fn(&Entity) -> bool, fields: &[&str]) -> Value {
        let state = self.state();
        let items: Vec<Value> = state
            .entities
            .iter()
            .filter(|e| e.kind == kind && keep(e))
            .map(|e| {
                let mut summary = Map::new();
                summary.insert("_id".to_string(), json!(e.id));
                for field in fields {
                    if let Some(value) = e.doc.get(*field) {
                        summary.insert(field.to_string(), value.clone());
                    }
                }
                Value::Object(summary)
            })
            .collect();
        Value::Array(items)
    }

    fn create(&self, kind: &'static str, scope: &str, prefix: &str, body: Option<&Value>) -> Response {
        let fields = body.cloned().unwrap_or_else(|| json!({}));
        let needs_title = matches!(kind, "list" | "swimlane" | "card" | "checklist" | "board");
        if needs_title
            && fields
                .get("title")
                .and_then(Value::as_str)
                .is_none_or(str::is_empty)
        {
            return Response::new(400, json!({"reason": "title is required"}));
        }
        if kind == "card" && fields.get("swimlaneId").and_then(Value::as_str).is_none() {
            return Response::new(400, json!({"reason": "swimlaneId is required"}));
        }
        let id = self.next_id(prefix);
        self.insert(kind, scope, &id, fields);
        Response::ok(json!({"_id": id}))
    }

    fn update(&self, kind: &str, id: &str, body: Option<&Value>) -> Response {
        let mut state = self.state();
        let Some(entity) = state
            .entities
            .iter_mut()
            .find(|e| e.kind == kind && e.id == id)
        else {
            return Response::new(404, Value::Null);
        };
        if let Some(Value::Object(patch)) = body {
            for (key, value) in patch {
                entity.doc.insert(key.clone(), value.clone());
            }
        }
        Response::ok(json!({"_id": id}))
    }

    fn delete(&self, kind: &str, id: &str) -> Response {
        let mut state = self.state();
        let before = state.entities.len();
        state.entities.retain(|e| !(e.kind == kind && e.id == id));
        if state.entities.len() == before {
            Response::new(404, Value::Null)
        } else {
            Response::ok(json!({"_id": id}))
        }
    }

    fn get(&self, kind: &str, id: &str) -> Response {
        match self.find(kind, id) {
            Some(entity) => Response::ok(Value::Object(entity.doc)),
            None => Response::new(404, Value::Null),
        }
    }

    fn embedded(&self, parent_kind: &str, parent: &str, field: &str, id: &str) -> Option<Value> {
        let entity = self.find(parent_kind, parent)?;
        entity
            .doc
            .get(field)?
            .as_array()?
            .iter()
            .find(|item| item.get("_id").and_then(Value::as_str) == Some(id))
            .cloned()
    }

    fn checklist_items<'a>(state: &'a mut State, checklist: &str) -> Option<&'a mut Vec<Value>> {
        state
            .entities
            .iter_mut()
            .find(|e| e.kind == "checklist" && e.id == checklist)?
            .doc
            .get_mut("items")?
            .as_array_mut()
    }

    fn update_item(&self, checklist: &str, id: &str, body: Option<&Value>) -> Response {
        let mut state = self.state();
        let item = Self::checklist_items(&mut state, checklist).and_then(|items| {
            items
                .iter_mut()
                .find(|item| item.get("_id").and_then(Value::as_str) == Some(id))
        });
        let Some(Value::Object(item)) = item else {
            return Response::new(404, Value::Null);
        };
        if let Some(Value::Object(patch)) = body {
            for (key, value) in patch {
                item.insert(key.clone(), value.clone());
            }
        }
        Response::ok(json!({"_id": id}))
    }

    fn delete_item(&self, checklist: &str, id: &str) -> Response {
        let mut state = self.state();
        let Some(items) = Self::checklist_items(&mut state, checklist) else {
            return Response::new(404, Value::Null);
        };
        let before = items.len();
        items.retain(|item| item.get("_id").and_then(Value::as_str) != Some(id));
        if items.len() == before {
            Response::new(404, Value::Null)
        } else {
            Response::ok(json!({"_id": id}))
        }
    }

    fn comment_summaries(&self, card: &str) -> Value {
        // the listing calls the body `comment`, the item document `text`
        let state = self.state();
        let items: Vec<Value> = state
            .entities
            .iter()
            .filter(|e| e.kind == "comment" && e.scope == card)
            .map(|e| json!({"_id": e.id, "comment": e.doc.get("text").cloned().unwrap_or(Value::Null)}))
            .collect();
        Value::Array(items)
    }

    fn route(&self, method: Method, path: &str, body: Option<&Value>) -> Response {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let me = self.user_id();
        use Method::*;
        match (method, segments.as_slice()) {
            (Get, ["api", "users", user, "boards"]) if *user == me => {
                Response::ok(self.summaries("board", |_| true, &["title"]))
            }
            (Get, ["api", "users"]) => Response::ok(self.summaries("user", |_| true, &["username"])),
            (Post, ["api", "users"]) => self.create("user", "", "u", body),
            (Get, ["api", "users", id]) => self.get("user", id),
            (Put, ["api", "users", id]) => self.update("user", id, body),
            (Delete, ["api", "users", id]) => self.delete("user", id),

            (Post, ["api", "boards"]) => {
                let mut fields = body.cloned().unwrap_or_else(|| json!({}));
                if let Value::Object(map) = &mut fields {
                    map.entry("labels").or_insert_with(|| json!([]));
                }
                self.create("board", "", "b", Some(&fields))
            }
            (Get, ["api", "boards", b]) => self.get("board", b),
            (Put, ["api", "boards", b]) => self.update("board", b, body),
            (Delete, ["api", "boards", b]) => self.delete("board", b),

            (Put, ["api", "boards", b, "labels"]) => {
                if self.find("board", b).is_none() {
                    return Response::new(404, Value::Null);
                }
                let label = body.and_then(|v| v.get("label"));
                let name = label
                    .and_then(|l| l.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let color = label
                    .and_then(|l| l.get("color"))
                    .and_then(Value::as_str)
                    .unwrap_or("green");
                let id = self.add_label(b, name, color);
                Response::ok(json!(id))
            }

            (Get, ["api", "boards", b, "lists"]) => {
                Response::ok(self.summaries("list", |e| e.scope == *b, &["title"]))
            }
            (Post, ["api", "boards", b, "lists"]) => self.create("list", b, "l", body),
            (Get, ["api", "boards", _, "lists", l]) => self.get("list", l),
            (Put, ["api", "boards", _, "lists", l]) => self.update("list", l, body),
            (Delete, ["api", "boards", _, "lists", l]) => self.delete("list", l),

            (Get, ["api", "boards", b, "swimlanes"]) => {
                Response::ok(self.summaries("swimlane", |e| e.scope == *b, &["title"]))
            }
            (Post, ["api", "boards", b, "swimlanes"]) => self.create("swimlane", b, "s", body),
            (Get, ["api", "boards", _, "swimlanes", s]) => self.get("swimlane", s),
            (Put, ["api", "boards", _, "swimlanes", s]) => self.update("swimlane", s, body),
            (Delete, ["api", "boards", _, "swimlanes", s]) => self.delete("swimlane", s),

            (Get, ["api", "boards", _, "lists", l, "cards"]) => Response::ok(self.summaries(
                "card",
                |e| e.doc.get("listId").and_then(Value::as_str) == Some(*l),
                &["title", "description"],
            )),
            (Post, ["api", "boards", b, "lists", l, "cards"]) => {
                let mut fields = body.cloned().unwrap_or_else(|| json!({}));
                if let Value::Object(map) = &mut fields {
                    map.insert("listId".to_string(), json!(l));
                    map.insert("boardId".to_string(), json!(b));
                }
                self.create("card", b, "c", Some(&fields))
            }
            (Get, ["api", "boards", _, "lists", l, "cards", c]) => match self.find("card", c) {
                Some(card) if card.doc.get("listId").and_then(Value::as_str) == Some(*l) => {
                    Response::ok(Value::Object(card.doc))
                }
                _ => Response::new(404, Value::Null),
            },
            (Put, ["api", "boards", _, "lists", _, "cards", c]) => self.update("card", c, body),
            (Delete, ["api", "boards", _, "lists", _, "cards", c]) => self.delete("card", c),
            (Get, ["api", "boards", _, "swimlanes", s, "cards"]) => Response::ok(self.summaries(
                "card",
                |e| e.doc.get("swimlaneId").and_then(Value::as_str) == Some(*s),
                &["title", "description", "listId"],
            )),

            (Get, ["api", "boards", _, "cards", c, "comments"]) => {
                Response::ok(self.comment_summaries(c))
            }
            (Post, ["api", "boards", _, "cards", c, "comments"]) => {
                let text = body
                    .and_then(|v| v.get("comment"))
                    .cloned()
                    .unwrap_or(Value::Null);
                if !text.is_string() {
                    return Response::new(400, json!({"reason": "comment is required"}));
                }
                self.create("comment", c, "m", Some(&json!({"text": text})))
            }
            (Get, ["api", "boards", _, "cards", _, "comments", m]) => self.get("comment", m),
            (Delete, ["api", "boards", _, "cards", _, "comments", m]) => self.delete("comment", m),

            (Get, ["api", "boards", _, "cards", c, "checklists"]) => {
                Response::ok(self.summaries("checklist", |e| e.scope == *c, &["title"]))
            }
            (Post, ["api", "boards", _, "cards", c, "checklists"]) => {
                let mut fields = body.cloned().unwrap_or_else(|| json!({}));
                if let Value::Object(map) = &mut fields {
                    map.insert("items".to_string(), json!([]));
                }
                self.create("checklist", c, "k", Some(&fields))
            }
            (Get, ["api", "boards", _, "cards", _, "checklists", k]) => self.get("checklist", k),
            (Delete, ["api", "boards", _, "cards", _, "checklists", k]) => {
                self.delete("checklist", k)
            }
            (Post, ["api", "boards", _, "cards", _, "checklists", k, "items"]) => {
                let title = body
                    .and_then(|v| v.get("title"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if title.is_empty() {
                    return Response::new(400, json!({"reason": "title is required"}));
                }
                if self.find("checklist", k).is_none() {
                    return Response::new(404, Value::Null);
                }
                let id = self.add_item(k, title);
                Response::ok(json!({"_id": id}))
            }
            (Get, ["api", "boards", _, "cards", _, "checklists", k, "items", i]) => {
                match self.embedded("checklist", k, "items", i) {
                    Some(item) => Response::ok(item),
                    None => Response::new(404, Value::Null),
                }
            }
            (Put, ["api", "boards", _, "cards", _, "checklists", k, "items", i]) => {
                self.update_item(k, i, body)
            }
            (Delete, ["api", "boards", _, "cards", _, "checklists", k, "items", i]) => {
                self.delete_item(k, i)
            }

            (Get, ["api", "boards", b, "custom-fields"]) => {
                Response::ok(self.summaries("custom field", |e| e.scope == *b, &["name"]))
            }
            (Post, ["api", "boards", b, "custom-fields"]) => {
                self.create("custom field", b, "f", body)
            }
            (Get, ["api", "boards", _, "custom-fields", f]) => self.get("custom field", f),
            (Put, ["api", "boards", _, "custom-fields", f]) => self.update("custom field", f, body),
            (Delete, ["api", "boards", _, "custom-fields", f]) => self.delete("custom field", f),
            (Get, ["api", "boards", b, "integrations"]) => Response::ok(self.summaries(
                "integration",
                |e| e.scope == *b,
                &["title", "url"],
            )),
            (Post, ["api", "boards", b, "integrations"]) => self.create("integration", b, "g", body),
            (Get, ["api", "boards", _, "integrations", g]) => self.get("integration", g),
            (Put, ["api", "boards", _, "integrations", g]) => self.update("integration", g, body),
            (Delete, ["api", "boards", _, "integrations", g]) => self.delete("integration", g),

            _ => Response::new(404, json!({"reason": format!("no route for {method} {path}")})),
        }
    }
}

impl Transport for FakeWekan {
    fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Response> {
        self.state().calls.push(Call {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        if path == LOGIN_PATH && method == Method::Post {
            return Ok(self.login(body));
        }

        let failure = {
            let mut state = self.state();
            let position = state.failures.iter().position(|(m, _)| *m == method);
            position.map(|index| state.failures.remove(index).1)
        };
        match failure {
            Some(Failure::Network(message)) => return Err(WekanError::transport(message)),
            Some(Failure::Status(status, body)) => return Ok(Response::new(status, body)),
            None => {}
        }

        if !self.authorized(token) {
            return Ok(Response::new(401, json!({"reason": "Unauthorized"})));
        }
        Ok(self.route(method, path, body))
    }
}
