//! Error types for the Wekan client core.

use thiserror::Error;

/// The error type shared by the resource graph, the path resolver and the shell.
///
/// Variants map onto the failure classes a caller has to tell apart: bad
/// credentials are fatal, transport failures are surfaced without retry, and
/// navigation errors leave the caller's context untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WekanError {
    /// The login call rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server refused the token on a single call (401). The token is
    /// dropped and the next call logs in again.
    #[error("Session rejected: {0}")]
    Unauthorized(String),

    /// The authenticated user may not access this entity (403).
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Network failure, timeout or server-side (5xx) error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote entity or path segment does not exist.
    #[error("Not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// More than one child matched a path segment at the same priority.
    #[error("Ambiguous path segment '{segment}': matches {}", .candidates.join(", "))]
    AmbiguousPath {
        segment: String,
        candidates: Vec<String>,
    },

    /// Operation on a node that was deleted or found missing remotely.
    #[error("Stale reference: {entity_type} '{id}' no longer exists")]
    StaleReference {
        entity_type: &'static str,
        id: String,
    },

    /// The server rejected a create call, or a required relation is missing.
    #[error("Creation failed: {0}")]
    Creation(String),

    /// The server rejected an edit payload, or the request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote API has no endpoint for this operation.
    #[error("Unsupported operation: cannot {operation} a {entity_type}")]
    Unsupported {
        entity_type: &'static str,
        operation: &'static str,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },
}

impl WekanError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a StaleReference error
    pub fn stale(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::StaleReference {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an Auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a Creation error
    pub fn creation(message: impl Into<String>) -> Self {
        Self::Creation(message.into())
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn unsupported(entity_type: &'static str, operation: &'static str) -> Self {
        Self::Unsupported {
            entity_type,
            operation,
        }
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an authentication error
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// A per-call refusal: an expired or revoked token, or a 403.
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Forbidden(_))
    }

    /// Check if this is a transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if this is an ambiguous path error
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::AmbiguousPath { .. })
    }

    /// Check if this is a stale reference error
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleReference { .. })
    }

    /// Check if this is a creation error
    pub fn is_creation(&self) -> bool {
        matches!(self, Self::Creation(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Rejected credentials end the session; everything else, a refused
    /// token included, is reported and the shell keeps running.
    pub fn is_fatal(&self) -> bool {
        self.is_auth()
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for WekanError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for WekanError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for WekanError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for WekanError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<regex::Error> for WekanError {
    fn from(err: regex::Error) -> Self {
        Self::Validation(format!("invalid filter pattern: {err}"))
    }
}

/// A type alias for `Result<T, WekanError>`.
pub type Result<T> = std::result::Result<T, WekanError>;
