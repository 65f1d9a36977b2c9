//! Authenticated request client.
//!
//! Every request carries the stored access token as a bearer credential. A
//! 401 on a request that has not been retried yet triggers one token refresh
//! followed by one resend of the same request. Any other outcome (success,
//! other status codes, network failures) reaches the caller untouched.
//!
//! Refreshes are single-flight: callers that hit 401 while a refresh is
//! already running wait for that refresh instead of starting their own.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::error::{ApiError, Result};
use super::transport::{body_text, ApiRequest, ApiResponse, Method, Transport};
use super::types::{LoginResponse, RefreshResponse, User};
use crate::session::Session;

pub const REFRESH_PATH: &str = "auth/token/refresh/";
pub const LOGIN_PATH: &str = "auth/login/";
pub const PROFILE_PATH: &str = "auth/profile/";

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
  /// The refresh token was rejected; the user has to log in again
  RefreshFailed,
  UserRequested,
}

/// Called when the session ends, typically to send the user to the login
/// entry point.
pub type LogoutHook = Arc<dyn Fn(LogoutReason) + Send + Sync>;

type RefreshFlight = Shared<BoxFuture<'static, Result<()>>>;

/// HTTP client that authenticates requests and transparently refreshes
/// expired access tokens.
#[derive(Clone)]
pub struct AuthClient {
  transport: Arc<dyn Transport>,
  session: Session,
  /// Refresh currently in flight, shared by every caller that needs it
  refresh_flight: Arc<Mutex<Option<RefreshFlight>>>,
  on_logout: Option<LogoutHook>,
}

impl AuthClient {
  pub fn new(transport: Arc<dyn Transport>, session: Session) -> Self {
    Self {
      transport,
      session,
      refresh_flight: Arc::new(Mutex::new(None)),
      on_logout: None,
    }
  }

  /// Register the callback run when the session ends.
  pub fn with_logout_hook(mut self, hook: impl Fn(LogoutReason) + Send + Sync + 'static) -> Self {
    self.on_logout = Some(Arc::new(hook));
    self
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub async fn get(&self, path: &str, query: Vec<(String, String)>) -> Result<Value> {
    let request = ApiRequest::new(Method::Get, path).with_query(query);
    self.execute(request).await?.into_result()
  }

  pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
    let request = ApiRequest::new(Method::Post, path).with_body(serde_json::to_value(body)?);
    self.execute(request).await?.into_result()
  }

  pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
    let request = ApiRequest::new(Method::Put, path).with_body(serde_json::to_value(body)?);
    self.execute(request).await?.into_result()
  }

  pub async fn delete(&self, path: &str) -> Result<Value> {
    let request = ApiRequest::new(Method::Delete, path);
    self.execute(request).await?.into_result()
  }

  /// Send a request with the stored credential, refreshing once on 401.
  ///
  /// Returns the raw response for every status except 401. A 401 on an
  /// already-retried request becomes `ApiError::Unauthorized`.
  pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
    loop {
      let generation = self.session.generation();
      request.bearer = self.session.access_token()?;

      let response = self.transport.send(&request).await?;
      if !response.is_unauthorized() {
        return Ok(response);
      }

      if request.retried {
        warn!(path = %request.path, "request rejected again after token refresh");
        return Err(ApiError::Unauthorized {
          body: body_text(&response.body),
        });
      }

      debug!(path = %request.path, "access token rejected, refreshing");
      request.retried = true;
      self.refresh(generation).await?;
    }
  }

  /// Make sure the access token that produced a 401 has been replaced.
  ///
  /// `seen_generation` is the session generation the failed request read its
  /// token under. If it has moved on, another caller already refreshed, or
  /// the session was ended and the caller gets `RefreshFailed`.
  async fn refresh(&self, seen_generation: u64) -> Result<()> {
    let flight = {
      let mut slot = self
        .refresh_flight
        .lock()
        .map_err(|e| ApiError::Storage(format!("Lock poisoned: {}", e)))?;

      if let Some(flight) = slot.as_ref() {
        debug!("joining in-flight token refresh");
        flight.clone()
      } else if self.session.generation() != seen_generation {
        // Cleared by a failed refresh
        if self.session.access_token()?.is_none() {
          debug!("session ended while the request was in flight");
          return Err(ApiError::RefreshFailed("session ended".to_string()));
        }
        debug!("credentials changed since the request was sent, retrying");
        return Ok(());
      } else {
        let flight = self.start_refresh();
        *slot = Some(flight.clone());
        flight
      }
    };

    flight.await
  }

  fn start_refresh(&self) -> RefreshFlight {
    let transport = Arc::clone(&self.transport);
    let session = self.session.clone();
    let slot = Arc::clone(&self.refresh_flight);
    let on_logout = self.on_logout.clone();

    async move {
      let result = exchange_refresh_token(transport.as_ref(), &session).await;

      if let Err(e) = &result {
        warn!(error = %e, "token refresh failed, ending session");
        if let Err(clear_err) = session.clear_credentials() {
          warn!(error = %clear_err, "failed to clear credentials");
        }
        if let Some(hook) = &on_logout {
          hook(LogoutReason::RefreshFailed);
        }
      }

      if let Ok(mut slot) = slot.lock() {
        *slot = None;
      }

      result
    }
    .boxed()
    .shared()
  }

  /// Exchange email and password for a credential pair.
  pub async fn login(&self, email: &str, password: &str) -> Result<User> {
    let request = ApiRequest::new(Method::Post, LOGIN_PATH)
      .with_body(json!({ "email": email, "password": password }));

    // Sent directly: a 401 here means wrong credentials, not an expired token
    let body = self.transport.send(&request).await?.into_result()?;
    let login: LoginResponse = serde_json::from_value(body)?;

    self
      .session
      .set_credentials(&login.tokens.access, Some(&login.tokens.refresh))?;
    self.session.set_user(&login.user)?;

    info!(email = %login.user.email, "logged in");
    Ok(login.user)
  }

  /// End the session locally.
  pub fn logout(&self) -> Result<()> {
    self.session.clear_credentials()?;
    info!("logged out");

    if let Some(hook) = &self.on_logout {
      hook(LogoutReason::UserRequested);
    }
    Ok(())
  }

  /// Fetch the current user's profile and remember it.
  pub async fn profile(&self) -> Result<User> {
    let body = self.get(PROFILE_PATH, Vec::new()).await?;
    let user: User = serde_json::from_value(body)?;
    self.session.set_user(&user)?;
    Ok(user)
  }
}

async fn exchange_refresh_token(transport: &dyn Transport, session: &Session) -> Result<()> {
  let refresh = session
    .refresh_token()?
    .ok_or_else(|| ApiError::RefreshFailed("no refresh token stored".to_string()))?;

  let request =
    ApiRequest::new(Method::Post, REFRESH_PATH).with_body(json!({ "refresh": refresh }));

  let response = transport
    .send(&request)
    .await
    .map_err(|e| ApiError::RefreshFailed(e.to_string()))?;

  if !response.is_success() {
    return Err(ApiError::RefreshFailed(format!(
      "server returned {}: {}",
      response.status,
      body_text(&response.body)
    )));
  }

  let tokens: RefreshResponse = serde_json::from_value(response.body)
    .map_err(|e| ApiError::RefreshFailed(format!("invalid refresh response: {}", e)))?;

  session.set_credentials(&tokens.access, tokens.refresh.as_deref())?;
  info!(rotated = tokens.refresh.is_some(), "access token refreshed");

  Ok(())
}

impl std::fmt::Debug for AuthClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AuthClient")
      .field("session", &self.session)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::{respond, MockTransport};
  use std::time::Duration;

  const FRESH_ACCESS: &str = "fresh-access";
  const FRESH_REFRESH: &str = "fresh-refresh";

  /// Backend that only accepts `FRESH_ACCESS` and rotates both tokens on refresh.
  fn rotating_backend() -> MockTransport {
    MockTransport::new(|req| {
      if req.path == REFRESH_PATH {
        return respond(200, json!({ "access": FRESH_ACCESS, "refresh": FRESH_REFRESH }));
      }
      if req.bearer.as_deref() == Some(FRESH_ACCESS) {
        respond(200, json!({ "path": req.path }))
      } else {
        respond(401, json!({ "detail": "Given token not valid for any token type" }))
      }
    })
  }

  fn expired_session() -> Session {
    let session = Session::in_memory();
    session
      .set_credentials("expired-access", Some("stored-refresh"))
      .unwrap();
    session
  }

  fn client_with(transport: &Arc<MockTransport>, session: Session) -> AuthClient {
    AuthClient::new(transport.clone(), session)
  }

  fn recorded_reasons(client: AuthClient) -> (AuthClient, Arc<Mutex<Vec<LogoutReason>>>) {
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reasons);
    let client = client.with_logout_hook(move |reason| sink.lock().unwrap().push(reason));
    (client, reasons)
  }

  #[tokio::test]
  async fn test_attaches_bearer_token() {
    let transport = Arc::new(MockTransport::new(|_| respond(200, json!([]))));
    let session = Session::in_memory();
    session.set_credentials("valid-access", Some("r")).unwrap();
    let client = client_with(&transport, session);

    client.get("categories/", Vec::new()).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].bearer.as_deref(), Some("valid-access"));
    assert!(!requests[0].retried);
  }

  #[tokio::test]
  async fn test_no_bearer_without_credentials() {
    let transport = Arc::new(MockTransport::new(|_| respond(200, json!([]))));
    let client = client_with(&transport, Session::in_memory());

    client.get("categories/", Vec::new()).await.unwrap();

    assert_eq!(transport.requests()[0].bearer, None);
  }

  #[tokio::test]
  async fn test_refresh_and_retry_for_every_verb() {
    for method in [Method::Get, Method::Post, Method::Put, Method::Delete] {
      let transport = Arc::new(rotating_backend());
      let client = client_with(&transport, expired_session());

      let result = match method {
        Method::Get => client.get("transactions/", Vec::new()).await,
        Method::Post => client.post("transactions/", &json!({"amount": "5.00"})).await,
        Method::Put => client.put("transactions/4/", &json!({"amount": "6.00"})).await,
        Method::Delete => client.delete("transactions/4/").await,
      };
      assert!(result.is_ok(), "{:?} failed: {:?}", method, result);

      let requests = transport.requests();
      assert_eq!(requests.len(), 3, "{:?}", method);

      assert_eq!(requests[0].method, method);
      assert_eq!(requests[0].bearer.as_deref(), Some("expired-access"));

      assert_eq!(requests[1].path, REFRESH_PATH);
      assert_eq!(requests[1].bearer, None);
      assert_eq!(requests[1].body, Some(json!({ "refresh": "stored-refresh" })));

      assert_eq!(requests[2].method, method);
      assert_eq!(requests[2].bearer.as_deref(), Some(FRESH_ACCESS));
      assert!(requests[2].retried);
      assert_eq!(requests[2].body, requests[0].body);
    }
  }

  #[tokio::test]
  async fn test_refresh_stores_tokens_before_retry() {
    let transport = Arc::new(rotating_backend());
    let session = expired_session();
    let client = client_with(&transport, session.clone());

    client.get("budgets/", Vec::new()).await.unwrap();

    assert_eq!(session.access_token().unwrap().as_deref(), Some(FRESH_ACCESS));
    assert_eq!(session.refresh_token().unwrap().as_deref(), Some(FRESH_REFRESH));
  }

  #[tokio::test]
  async fn test_refresh_without_rotation_keeps_refresh_token() {
    let transport = Arc::new(MockTransport::new(|req| {
      if req.path == REFRESH_PATH {
        return respond(200, json!({ "access": FRESH_ACCESS }));
      }
      match req.bearer.as_deref() {
        Some(FRESH_ACCESS) => respond(200, json!({})),
        _ => respond(401, json!({})),
      }
    }));
    let session = expired_session();
    let client = client_with(&transport, session.clone());

    client.get("budgets/", Vec::new()).await.unwrap();

    assert_eq!(session.access_token().unwrap().as_deref(), Some(FRESH_ACCESS));
    assert_eq!(session.refresh_token().unwrap().as_deref(), Some("stored-refresh"));
  }

  #[tokio::test]
  async fn test_second_401_is_not_retried() {
    let transport = Arc::new(MockTransport::new(|req| {
      if req.path == REFRESH_PATH {
        respond(200, json!({ "access": "also-rejected" }))
      } else {
        respond(401, json!({ "detail": "nope" }))
      }
    }));
    let client = client_with(&transport, expired_session());

    let err = client.get("transactions/", Vec::new()).await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(err.status(), Some(401));
    assert_eq!(transport.count(REFRESH_PATH), 1);
    assert_eq!(transport.requests().len(), 3);
  }

  #[tokio::test]
  async fn test_refresh_failure_clears_session() {
    let transport = Arc::new(MockTransport::new(|req| {
      if req.path == REFRESH_PATH {
        respond(401, json!({ "detail": "Token is blacklisted" }))
      } else {
        respond(401, json!({}))
      }
    }));
    let session = expired_session();
    session.set_user(&json!({"id": 1})).unwrap();
    let (client, reasons) = recorded_reasons(client_with(&transport, session.clone()));

    let err = client.get("dashboard/", Vec::new()).await.unwrap_err();

    assert!(matches!(err, ApiError::RefreshFailed(_)));
    assert_eq!(session.credentials().unwrap(), None);
    assert_eq!(session.user::<Value>().unwrap(), None);
    // Original request and the refresh, no retry with the stale token
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(*reasons.lock().unwrap(), vec![LogoutReason::RefreshFailed]);
  }

  #[tokio::test]
  async fn test_refresh_network_failure_clears_session() {
    let transport = Arc::new(MockTransport::new(|req| {
      if req.path == REFRESH_PATH {
        Err(ApiError::Transport("connection refused".to_string()))
      } else {
        respond(401, json!({}))
      }
    }));
    let session = expired_session();
    let client = client_with(&transport, session.clone());

    let err = client.get("categories/", Vec::new()).await.unwrap_err();

    assert!(matches!(err, ApiError::RefreshFailed(_)));
    assert!(!session.is_authenticated());
  }

  #[tokio::test]
  async fn test_missing_refresh_token_ends_session() {
    let transport = Arc::new(MockTransport::new(|_| respond(401, json!({}))));
    let session = Session::in_memory();
    session.set_credentials("expired-access", None).unwrap();
    let (client, reasons) = recorded_reasons(client_with(&transport, session.clone()));

    let err = client.get("categories/", Vec::new()).await.unwrap_err();

    assert!(matches!(err, ApiError::RefreshFailed(_)));
    assert_eq!(transport.requests().len(), 1);
    assert!(!session.is_authenticated());
    assert_eq!(reasons.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_other_errors_pass_through() {
    for status in [400u16, 403, 404, 500] {
      let transport = Arc::new(MockTransport::new(move |_| {
        respond(status, json!({ "detail": "failure" }))
      }));
      let client = client_with(&transport, expired_session());

      let err = client.get("budgets/9/", Vec::new()).await.unwrap_err();

      assert_eq!(err.status(), Some(status));
      assert_eq!(transport.requests().len(), 1);
      assert_eq!(transport.count(REFRESH_PATH), 0);
    }
  }

  #[tokio::test]
  async fn test_network_failure_passes_through() {
    let transport = Arc::new(MockTransport::new(|_| {
      Err(ApiError::Transport("connection reset".to_string()))
    }));
    let session = expired_session();
    let client = client_with(&transport, session.clone());

    let err = client.delete("categories/2/").await.unwrap_err();

    assert_eq!(err, ApiError::Transport("connection reset".to_string()));
    assert_eq!(transport.requests().len(), 1);
    assert!(session.is_authenticated());
  }

  #[tokio::test]
  async fn test_concurrent_401s_share_one_refresh() {
    let transport = Arc::new(rotating_backend().with_latency(Duration::from_millis(10)));
    let client = client_with(&transport, expired_session());

    let (a, b, c) = tokio::join!(
      client.get("transactions/", Vec::new()),
      client.get("budgets/current/", Vec::new()),
      client.get("categories/", Vec::new()),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(transport.count(REFRESH_PATH), 1);
    assert_eq!(transport.requests().len(), 7);
  }

  #[tokio::test]
  async fn test_late_401_after_failed_refresh_is_not_resent() {
    let transport = Arc::new(
      MockTransport::new(|req| {
        if req.path == REFRESH_PATH {
          respond(401, json!({ "detail": "Token is blacklisted" }))
        } else {
          respond(401, json!({ "detail": "Token is invalid or expired" }))
        }
      })
      .with_path_latency(REFRESH_PATH, Duration::from_millis(20))
      .with_path_latency("budgets/comparison/", Duration::from_millis(50)),
    );
    let session = expired_session();
    let (client, reasons) = recorded_reasons(client_with(&transport, session.clone()));

    let (fast, slow) = tokio::join!(
      client.get("categories/", Vec::new()),
      client.get("budgets/comparison/", Vec::new()),
    );

    assert!(matches!(fast, Err(ApiError::RefreshFailed(_))));
    assert!(matches!(slow, Err(ApiError::RefreshFailed(_))));
    assert!(!session.is_authenticated());

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| !r.retried));
    assert_eq!(transport.count(REFRESH_PATH), 1);
    assert_eq!(transport.count("budgets/comparison/"), 1);
    assert_eq!(reasons.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_expired_token_on_budget_current() {
    let transport = Arc::new(MockTransport::new(|req| {
      if req.path == REFRESH_PATH {
        assert_eq!(req.body, Some(json!({ "refresh": "stored-refresh" })));
        return respond(200, json!({ "access": FRESH_ACCESS }));
      }
      assert_eq!(req.path, "budgets/current/");
      assert_eq!(
        req.query,
        vec![
          ("month".to_string(), "3".to_string()),
          ("year".to_string(), "2024".to_string()),
        ]
      );
      match req.bearer.as_deref() {
        Some(FRESH_ACCESS) => respond(200, json!({ "month": 3, "year": 2024, "budgets": [] })),
        _ => respond(401, json!({ "detail": "Token is invalid or expired" })),
      }
    }));
    let client = client_with(&transport, expired_session());

    let query = vec![
      ("month".to_string(), "3".to_string()),
      ("year".to_string(), "2024".to_string()),
    ];
    let body = client.get("budgets/current/", query).await.unwrap();

    assert_eq!(body, json!({ "month": 3, "year": 2024, "budgets": [] }));
  }

  #[tokio::test]
  async fn test_login_stores_credentials_and_user() {
    let transport = Arc::new(MockTransport::new(|req| {
      assert_eq!(req.path, LOGIN_PATH);
      assert_eq!(req.bearer, None);
      respond(
        200,
        json!({
          "user": { "id": 7, "email": "test@example.com", "first_name": "Test", "last_name": "User" },
          "tokens": { "access": "a1", "refresh": "r1" }
        }),
      )
    }));
    let session = Session::in_memory();
    let client = client_with(&transport, session.clone());

    let user = client.login("test@example.com", "test123").await.unwrap();

    assert_eq!(user.id, 7);
    assert_eq!(session.access_token().unwrap().as_deref(), Some("a1"));
    assert_eq!(session.refresh_token().unwrap().as_deref(), Some("r1"));
    assert_eq!(session.user::<User>().unwrap(), Some(user));
  }

  #[tokio::test]
  async fn test_login_rejected_does_not_refresh() {
    let transport = Arc::new(MockTransport::new(|_| {
      respond(401, json!({ "error": "Invalid credentials" }))
    }));
    let client = client_with(&transport, Session::in_memory());

    let err = client.login("test@example.com", "wrong").await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(transport.count(REFRESH_PATH), 0);
  }

  #[tokio::test]
  async fn test_logout_clears_session_and_fires_hook() {
    let transport = Arc::new(MockTransport::new(|_| respond(200, json!({}))));
    let session = expired_session();
    let (client, reasons) = recorded_reasons(client_with(&transport, session.clone()));

    client.logout().unwrap();

    assert!(!session.is_authenticated());
    assert_eq!(*reasons.lock().unwrap(), vec![LogoutReason::UserRequested]);
    assert!(transport.requests().is_empty());
  }
}
