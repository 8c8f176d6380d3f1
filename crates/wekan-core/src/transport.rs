//! The HTTP capability the core is built on.
//!
//! The core never talks to the network itself. It hands a method, a path
//! relative to the server root, an optional bearer token and an optional JSON
//! body to a [`Transport`], and interprets the status it gets back.

use serde_json::Value;
use std::fmt;

use crate::error::{Result, WekanError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and decoded body of a completed call.
///
/// An empty or non-JSON body is represented as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Server-provided reason, if the body carries one.
    pub fn reason(&self) -> String {
        for key in ["reason", "error", "message"] {
            if let Some(text) = self.body.get(key).and_then(Value::as_str) {
                return text.to_string();
            }
        }
        match &self.body {
            Value::Null => format!("HTTP {}", self.status),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Performs one HTTP exchange.
///
/// Implementations report network failures and timeouts as
/// [`WekanError::Transport`] and must not retry on their own.
pub trait Transport {
    fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Response>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Response> {
        (**self).call(method, path, token, body)
    }
}

/// What a call was meant to do, used to pick the error class for a
/// rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intent {
    Read,
    Create,
    Write,
}

/// Translates a non-success status into the error taxonomy.
pub(crate) fn status_error(
    response: &Response,
    intent: Intent,
    entity_type: &'static str,
    id: &str,
) -> WekanError {
    let reason = response.reason();
    match response.status {
        401 => WekanError::unauthorized(reason),
        403 => WekanError::forbidden(reason),
        404 => WekanError::not_found(entity_type, id),
        400..=499 if intent == Intent::Create => WekanError::creation(reason),
        400..=499 => WekanError::validation(reason),
        _ => WekanError::transport(format!("HTTP {}: {}", response.status, reason)),
    }
}
