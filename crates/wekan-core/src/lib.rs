pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod navigation;
pub mod shell;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthSession, Credentials, Token};
pub use client::{Node, NodeRef, PendingNode, WekanClient};
pub use config::WekanConfig;
pub use error::{Result, WekanError};
pub use model::NodeKind;
pub use navigation::{ContextStack, ResolvedTarget};
pub use shell::{Command, Entry, Outcome, ShellSession};
pub use transport::{Method, Response, Transport};
