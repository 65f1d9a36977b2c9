//! Credential session shared by every outgoing request.
//!
//! A `Session` is an explicit handle over a [`CredentialStore`]. It is created
//! once and handed to the request client; there is no global token state.
//! Tokens are kept under fixed keys so a persistent store can be reopened by a
//! later process.

mod store;

use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub use store::{CredentialStore, MemoryStore, SqliteStore};

use crate::api::error::Result;
use crate::config::{SessionConfig, StoreKind};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";

/// Access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
  pub access: String,
  pub refresh: Option<String>,
}

/// Cloneable handle to the process-wide credential pair.
#[derive(Clone)]
pub struct Session {
  store: Arc<dyn CredentialStore>,
  /// Bumped on every credential write
  generation: Arc<AtomicU64>,
}

impl Session {
  pub fn new(store: impl CredentialStore + 'static) -> Self {
    Self {
      store: Arc::new(store),
      generation: Arc::new(AtomicU64::new(0)),
    }
  }

  /// Session that lives only as long as the process.
  pub fn in_memory() -> Self {
    Self::new(MemoryStore::new())
  }

  /// Open the session store selected in the configuration.
  pub fn from_config(config: &SessionConfig) -> Result<Self> {
    match config.store {
      StoreKind::Memory => Ok(Self::in_memory()),
      StoreKind::Sqlite => {
        let store = match &config.path {
          Some(path) => SqliteStore::open(path)?,
          None => SqliteStore::open_default()?,
        };
        Ok(Self::new(store))
      }
    }
  }

  pub fn access_token(&self) -> Result<Option<String>> {
    self.store.get(ACCESS_TOKEN_KEY)
  }

  pub fn refresh_token(&self) -> Result<Option<String>> {
    self.store.get(REFRESH_TOKEN_KEY)
  }

  /// Current credential pair, if logged in.
  pub fn credentials(&self) -> Result<Option<Credentials>> {
    Ok(self.access_token()?.map(|access| Credentials {
      access,
      refresh: self.refresh_token().ok().flatten(),
    }))
  }

  pub fn is_authenticated(&self) -> bool {
    matches!(self.access_token(), Ok(Some(_)))
  }

  /// Store a new access token, and a new refresh token when one is given.
  ///
  /// Without a refresh token the previously stored one is kept.
  pub fn set_credentials(&self, access: &str, refresh: Option<&str>) -> Result<()> {
    self.store.set(ACCESS_TOKEN_KEY, access)?;
    if let Some(refresh) = refresh {
      self.store.set(REFRESH_TOKEN_KEY, refresh)?;
    }
    self.generation.fetch_add(1, Ordering::SeqCst);
    debug!(rotated_refresh = refresh.is_some(), "credentials updated");
    Ok(())
  }

  /// Remove both tokens and the cached user profile.
  pub fn clear_credentials(&self) -> Result<()> {
    self.store.remove(ACCESS_TOKEN_KEY)?;
    self.store.remove(REFRESH_TOKEN_KEY)?;
    self.store.remove(USER_KEY)?;
    self.generation.fetch_add(1, Ordering::SeqCst);
    debug!("credentials cleared");
    Ok(())
  }

  pub fn set_user<T: Serialize>(&self, user: &T) -> Result<()> {
    let json = serde_json::to_string(user)?;
    self.store.set(USER_KEY, &json)
  }

  /// The profile stored at login, if any.
  pub fn user<T: DeserializeOwned>(&self) -> Result<Option<T>> {
    match self.store.get(USER_KEY)? {
      Some(json) => Ok(Some(serde_json::from_str(&json)?)),
      None => Ok(None),
    }
  }

  /// Number of credential writes so far.
  ///
  /// A caller that observed generation `n` and later sees `n + k` knows the
  /// token it sent has since been replaced.
  pub fn generation(&self) -> u64 {
    self.generation.load(Ordering::SeqCst)
  }
}

impl std::fmt::Debug for Session {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Session")
      .field("authenticated", &self.is_authenticated())
      .field("generation", &self.generation())
      .finish_non_exhaustive()
  }
}
