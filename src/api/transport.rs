//! HTTP transport abstraction.
//!
//! The authenticated client only needs "send this request, give me the status
//! and body". Keeping that behind a trait lets the refresh logic run against a
//! scripted transport in tests.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::error::{ApiError, Result};

/// HTTP verbs used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

/// A single outbound API request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  /// Path relative to the base endpoint (e.g. "budgets/current/")
  pub path: String,
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
  /// Access token to send as a bearer credential
  pub bearer: Option<String>,
  /// Set once the request has been resent after a token refresh
  pub retried: bool,
}

impl ApiRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      query: Vec::new(),
      body: None,
      bearer: None,
      retried: false,
    }
  }

  pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
    self.query = query;
    self
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }
}

/// Status and decoded body of an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
  pub status: u16,
  /// JSON body; `Null` for empty bodies, a string for non-JSON bodies
  pub body: Value,
}

impl ApiResponse {
  pub fn new(status: u16, body: Value) -> Self {
    Self { status, body }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_unauthorized(&self) -> bool {
    self.status == 401
  }

  /// Convert into the payload, or a pass-through status error.
  pub fn into_result(self) -> Result<Value> {
    if self.is_success() {
      Ok(self.body)
    } else {
      Err(ApiError::Status {
        status: self.status,
        body: body_text(&self.body),
      })
    }
  }
}

/// Render a response body for error messages.
pub(crate) fn body_text(body: &Value) -> String {
  match body {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Sends requests and returns raw responses.
///
/// Implementations report network failures as `ApiError::Transport` and every
/// HTTP status, including 4xx/5xx, as an `Ok` response.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// reqwest-backed transport against a base endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  /// Create a transport for the given base URL (e.g. "http://localhost:8000/api").
  ///
  /// `timeout` of `None` keeps reqwest's default behaviour.
  pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
    let mut base_url =
      Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

    // Url::join replaces the last segment unless the base ends with '/'
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let client = builder.build()?;

    Ok(Self { client, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Build the full URL for a resource path.
  pub fn url(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
    let url = self.url(&request.path)?;
    debug!(method = ?request.method, %url, retried = request.retried, "sending request");

    let mut builder = match request.method {
      Method::Get => self.client.get(url),
      Method::Post => self.client.post(url),
      Method::Put => self.client.put(url),
      Method::Delete => self.client.delete(url),
    };

    if !request.query.is_empty() {
      builder = builder.query(&request.query);
    }
    if let Some(token) = &request.bearer {
      builder = builder.bearer_auth(token);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let bytes = response.bytes().await?;

    let body = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    Ok(ApiResponse { status, body })
  }
}
