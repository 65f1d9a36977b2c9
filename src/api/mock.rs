//! Scripted transport for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::error::Result;
use super::transport::{ApiRequest, ApiResponse, Transport};

type Handler = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync>;

/// Transport that answers through a closure and records every request.
pub(crate) struct MockTransport {
  handler: Handler,
  requests: Mutex<Vec<ApiRequest>>,
  latency: Option<Duration>,
  path_latency: HashMap<String, Duration>,
}

impl MockTransport {
  pub(crate) fn new(
    handler: impl Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync + 'static,
  ) -> Self {
    Self {
      handler: Box::new(handler),
      requests: Mutex::new(Vec::new()),
      latency: None,
      path_latency: HashMap::new(),
    }
  }

  /// Delay every response, so concurrent callers overlap.
  pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  /// Delay responses for one path, overriding the default latency.
  pub(crate) fn with_path_latency(mut self, path: &str, latency: Duration) -> Self {
    self.path_latency.insert(path.to_string(), latency);
    self
  }

  pub(crate) fn requests(&self) -> Vec<ApiRequest> {
    self.requests.lock().unwrap().clone()
  }

  /// Number of requests sent to `path`.
  pub(crate) fn count(&self, path: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.path == path)
      .count()
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
    self.requests.lock().unwrap().push(request.clone());

    let latency = self.path_latency.get(&request.path).copied().or(self.latency);
    if let Some(latency) = latency {
      tokio::time::sleep(latency).await;
    }

    (self.handler)(request)
  }
}

pub(crate) fn respond(status: u16, body: Value) -> Result<ApiResponse> {
  Ok(ApiResponse::new(status, body))
}
