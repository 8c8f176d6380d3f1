//! Node variants and their static properties.
//!
//! Every remote entity is one [`NodeKind`]. What a kind can contain, which
//! attribute holds its display name and how it is addressed on the wire is
//! looked up here instead of being spread across per-entity types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WekanError;

/// The closed set of entity variants in the resource graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Client,
    Board,
    List,
    Swimlane,
    Card,
    CardComment,
    CardChecklist,
    CardChecklistItem,
    User,
    Label,
    CustomField,
    Integration,
}

/// Allowed `type` values for a custom field.
pub const CUSTOM_FIELD_TYPES: &[&str] = &[
    "text",
    "number",
    "date",
    "dropdown",
    "currency",
    "checkbox",
    "stringtemplate",
];

impl NodeKind {
    /// Lower-case name used in messages and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Client => "client",
            NodeKind::Board => "board",
            NodeKind::List => "list",
            NodeKind::Swimlane => "swimlane",
            NodeKind::Card => "card",
            NodeKind::CardComment => "comment",
            NodeKind::CardChecklist => "checklist",
            NodeKind::CardChecklistItem => "item",
            NodeKind::User => "user",
            NodeKind::Label => "label",
            NodeKind::CustomField => "custom field",
            NodeKind::Integration => "integration",
        }
    }

    /// Every child kind that can be listed under this kind.
    pub fn child_kinds(self) -> &'static [NodeKind] {
        use NodeKind::*;
        match self {
            Client => &[Board, User],
            Board => &[List, Swimlane, Label, CustomField, Integration],
            List | Swimlane => &[Card],
            Card => &[CardChecklist, CardComment],
            CardChecklist => &[CardChecklistItem],
            CardComment | CardChecklistItem | User | Label | CustomField | Integration => &[],
        }
    }

    /// Child kinds a path segment is resolved against, in the fixed order
    /// positional indices span them.
    pub fn navigable_kinds(self) -> &'static [NodeKind] {
        use NodeKind::*;
        match self {
            Client => &[Board],
            Board => &[List, Swimlane],
            List | Swimlane => &[Card],
            Card => &[CardChecklist, CardComment],
            CardChecklist => &[CardChecklistItem],
            _ => &[],
        }
    }

    pub fn can_contain(self, child: NodeKind) -> bool {
        self.child_kinds().contains(&child)
    }

    /// Attribute keys holding the display name, tried in order.
    pub fn title_keys(self) -> &'static [&'static str] {
        match self {
            NodeKind::Label | NodeKind::CustomField => &["name"],
            NodeKind::User => &["username"],
            NodeKind::CardComment => &["comment", "text"],
            _ => &["title"],
        }
    }

    /// URL segment of the collection this kind lives in.
    pub(crate) fn collection(self) -> &'static str {
        match self {
            NodeKind::Client => "",
            NodeKind::Board => "boards",
            NodeKind::List => "lists",
            NodeKind::Swimlane => "swimlanes",
            NodeKind::Card => "cards",
            NodeKind::CardComment => "comments",
            NodeKind::CardChecklist => "checklists",
            NodeKind::CardChecklistItem => "items",
            NodeKind::User => "users",
            NodeKind::Label => "labels",
            NodeKind::CustomField => "custom-fields",
            NodeKind::Integration => "integrations",
        }
    }

    /// Kinds whose listing comes embedded in the parent's own document.
    pub(crate) fn embedded_in_parent(self) -> Option<&'static str> {
        match self {
            NodeKind::Label => Some("labels"),
            NodeKind::CardChecklistItem => Some("items"),
            _ => None,
        }
    }

    pub(crate) fn editable(self) -> bool {
        !matches!(
            self,
            NodeKind::Client | NodeKind::CardComment | NodeKind::CardChecklist | NodeKind::Label
        )
    }

    pub(crate) fn deletable(self) -> bool {
        !matches!(self, NodeKind::Client | NodeKind::Label)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = WekanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "board" | "boards" => NodeKind::Board,
            "list" | "lists" => NodeKind::List,
            "swimlane" | "swimlanes" | "lane" => NodeKind::Swimlane,
            "card" | "cards" => NodeKind::Card,
            "comment" | "comments" => NodeKind::CardComment,
            "checklist" | "checklists" => NodeKind::CardChecklist,
            "item" | "items" => NodeKind::CardChecklistItem,
            "user" | "users" => NodeKind::User,
            "label" | "labels" => NodeKind::Label,
            "field" | "customfield" | "custom-field" => NodeKind::CustomField,
            "integration" | "integrations" => NodeKind::Integration,
            other => {
                return Err(WekanError::validation(format!(
                    "unknown resource type '{other}'"
                )));
            }
        };
        Ok(kind)
    }
}
