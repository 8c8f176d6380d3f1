//! Blocking HTTP transport for the Wekan REST API.

use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

use wekan_core::auth::AuthSession;
use wekan_core::config::WekanConfig;
use wekan_core::error::{Result, WekanError};
use wekan_core::transport::{Method, Response, Transport};
use wekan_core::WekanClient;

/// Sends requests to one Wekan server over `reqwest`'s blocking client.
///
/// Status codes are passed through untouched; only network failures and
/// timeouts become errors here.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wekan-nav/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| WekanError::transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &WekanConfig) -> Result<Self> {
        Self::new(&config.base_url, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        }
    }
}

impl Transport for HttpTransport {
    fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .request(method, &url)
            .header("accept", "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().map_err(|err| {
            let kind = if err.is_timeout() {
                "timed out"
            } else if err.is_connect() {
                "could not connect"
            } else {
                "failed"
            };
            WekanError::transport(format!("{method} {url} {kind}: {err}"))
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|err| WekanError::transport(format!("failed to read response body: {err}")))?;
        tracing::debug!(%method, path, status, bytes = text.len(), "wekan response");

        Ok(Response::new(status, decode_body(&text)))
    }
}

/// Empty bodies become `Null`; bodies that are not JSON are kept as text.
fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Builds a logged-out client for the configured server.
pub fn connect(config: &WekanConfig) -> Result<WekanClient> {
    let transport = HttpTransport::from_config(config)?;
    let auth = AuthSession::new(config.credentials()?);
    tracing::debug!(base_url = transport.base_url(), "connecting");
    Ok(WekanClient::new(transport, auth))
}
