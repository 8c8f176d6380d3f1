//! Bearer-token session for the Wekan API.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::fmt;

use crate::error::{Result, WekanError};
use crate::transport::{Method, Transport};

pub const LOGIN_PATH: &str = "/users/login";

/// Username/password pair exchanged for a token.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A token together with the user it was issued for.
#[derive(Clone, PartialEq)]
pub struct Token {
    pub value: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// A token is unusable at its expiry instant, not only after it.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    id: String,
    token: String,
    #[serde(rename = "tokenExpires")]
    token_expires: String,
}

/// Owns the credentials and the current token of one client.
///
/// There is no background refresh: the token is checked, and renewed if
/// needed, right before each outbound call.
#[derive(Debug)]
pub struct AuthSession {
    credentials: Credentials,
    token: Option<Token>,
    logins: usize,
}

impl AuthSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            token: None,
            logins: 0,
        }
    }

    /// Seeds the session with a previously issued token.
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.user_id.as_str())
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Number of authentication calls issued so far.
    pub fn login_count(&self) -> usize {
        self.logins
    }

    /// Returns a token valid right now, authenticating first if there is
    /// none or it has expired.
    pub fn ensure_token<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<&Token> {
        self.ensure_token_at(transport, Utc::now())
    }

    pub fn ensure_token_at<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        now: DateTime<Utc>,
    ) -> Result<&Token> {
        let needs_login = match &self.token {
            Some(token) => token.is_expired_at(now),
            None => true,
        };
        if needs_login {
            if self.token.is_some() {
                tracing::info!("API token expired, re-authenticating as {}", self.credentials.username);
            }
            let token = self.login(transport)?;
            self.token = Some(token);
        }
        self.token
            .as_ref()
            .ok_or_else(|| WekanError::auth("no token after login"))
    }

    /// Drops the cached token so the next call authenticates again.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    fn login<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<Token> {
        self.logins += 1;
        let payload = json!({
            "username": self.credentials.username,
            "password": self.credentials.password,
        });
        let response = transport.call(Method::Post, LOGIN_PATH, None, Some(&payload))?;

        if !response.is_success() {
            if response.status >= 500 {
                return Err(WekanError::transport(format!(
                    "login failed with HTTP {}: {}",
                    response.status,
                    response.reason()
                )));
            }
            return Err(WekanError::auth(format!(
                "credentials for '{}' were rejected: {}",
                self.credentials.username,
                response.reason()
            )));
        }

        let parsed: LoginResponse = serde_json::from_value(response.body)
            .map_err(|e| WekanError::auth(format!("malformed login response: {e}")))?;
        let expires_at = DateTime::parse_from_rfc3339(&parsed.token_expires)
            .map_err(|e| {
                WekanError::auth(format!(
                    "unparseable token expiry '{}': {e}",
                    parsed.token_expires
                ))
            })?
            .with_timezone(&Utc);

        tracing::info!(user_id = %parsed.id, %expires_at, "authenticated against Wekan");

        Ok(Token {
            value: parsed.token,
            user_id: parsed.id,
            expires_at,
        })
    }
}
