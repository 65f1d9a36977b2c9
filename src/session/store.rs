//! Credential store trait with in-memory and SQLite implementations.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::api::error::{ApiError, Result};

/// Client-local key-value storage for credentials.
pub trait CredentialStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove a key. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;
}

/// Store that keeps values for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CredentialStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let values = self.values.lock().map_err(|e| lock_poisoned(&e))?;
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut values = self.values.lock().map_err(|e| lock_poisoned(&e))?;
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut values = self.values.lock().map_err(|e| lock_poisoned(&e))?;
    values.remove(key);
    Ok(())
  }
}

/// SQLite-backed store that survives restarts.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create the store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| ApiError::Storage(format!("Failed to create session directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      ApiError::Storage(format!(
        "Failed to open session database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_connection(conn)
  }

  /// Open a throwaway in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| ApiError::Storage("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("ledgerline").join("session.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| lock_poisoned(&e))?;

    conn
      .execute_batch(SESSION_SCHEMA)
      .map_err(|e| ApiError::Storage(format!("Failed to run session migrations: {}", e)))?;

    Ok(())
  }
}

const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl CredentialStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.conn.lock().map_err(|e| lock_poisoned(&e))?;

    let value = conn
      .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
        row.get::<_, String>(0)
      })
      .optional()?;

    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| lock_poisoned(&e))?;

    conn.execute(
      "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
       ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
      params![key, value],
    )?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| lock_poisoned(&e))?;
    conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
    Ok(())
  }
}

fn lock_poisoned(e: &dyn std::fmt::Display) -> ApiError {
  ApiError::Storage(format!("Lock poisoned: {}", e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exercise(store: &dyn CredentialStore) {
    assert_eq!(store.get("accessToken").unwrap(), None);

    store.set("accessToken", "a1").unwrap();
    assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("a1"));

    store.set("accessToken", "a2").unwrap();
    assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("a2"));

    store.remove("accessToken").unwrap();
    assert_eq!(store.get("accessToken").unwrap(), None);

    // Removing twice is fine
    store.remove("accessToken").unwrap();
  }

  #[test]
  fn test_memory_store() {
    exercise(&MemoryStore::new());
  }

  #[test]
  fn test_sqlite_store() {
    exercise(&SqliteStore::open_in_memory().unwrap());
  }

  /// Scratch directory removed on drop, even when an assertion fails.
  struct ScratchDir(PathBuf);

  impl ScratchDir {
    fn new() -> Self {
      let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
      Self(std::env::temp_dir().join(format!("ledgerline-test-{}-{}", std::process::id(), nanos)))
    }
  }

  impl Drop for ScratchDir {
    fn drop(&mut self) {
      let _ = std::fs::remove_dir_all(&self.0);
    }
  }

  #[test]
  fn test_sqlite_store_persists_across_connections() {
    let dir = ScratchDir::new();
    let path = dir.0.join("session.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store.set("refreshToken", "r1").unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.get("refreshToken").unwrap().as_deref(), Some("r1"));
  }
}
