//! Persisted session credentials.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::api::types::User;

/// Bearer token and the account it was issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
  pub token: String,
  pub user: Option<User>,
}

/// Trait for credential storage backends.
pub trait CredentialStore: Send + Sync {
  /// Load the current session, if any.
  fn load(&self) -> Result<Option<StoredSession>>;

  /// Replace the current session.
  fn save(&self, session: &StoredSession) -> Result<()>;

  /// Forget the current session.
  fn clear(&self) -> Result<()>;
}

/// In-memory store. Used for tests and for tokens supplied by environment.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
  session: Mutex<Option<StoredSession>>,
}

impl MemoryCredentialStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_token(token: impl Into<String>) -> Self {
    Self {
      session: Mutex::new(Some(StoredSession {
        token: token.into(),
        user: None,
      })),
    }
  }
}

impl CredentialStore for MemoryCredentialStore {
  fn load(&self) -> Result<Option<StoredSession>> {
    let session = self
      .session
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(session.clone())
  }

  fn save(&self, session: &StoredSession) -> Result<()> {
    let mut current = self
      .session
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *current = Some(session.clone());
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let mut current = self
      .session
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *current = None;
    Ok(())
  }
}

/// SQLite-based credential storage.
pub struct SqliteCredentialStore {
  conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open session database at {}: {}", path.display(), e))?;

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
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("schoolhub").join("session.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SESSION_SCHEMA)
      .map_err(|e| eyre!("Failed to run session migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the session table. A single row keyed by `id = 1`.
const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    token TEXT NOT NULL,
    user_json TEXT,
    saved_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl CredentialStore for SqliteCredentialStore {
  fn load(&self) -> Result<Option<StoredSession>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(String, Option<String>)> = conn
      .query_row(
        "SELECT token, user_json FROM session WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read session: {}", e))?;

    let Some((token, user_json)) = row else {
      return Ok(None);
    };

    let user = match user_json {
      Some(json) => Some(
        serde_json::from_str(&json).map_err(|e| eyre!("Failed to parse stored user: {}", e))?,
      ),
      None => None,
    };

    Ok(Some(StoredSession { token, user }))
  }

  fn save(&self, session: &StoredSession) -> Result<()> {
    let user_json = session
      .user
      .as_ref()
      .map(serde_json::to_string)
      .transpose()
      .map_err(|e| eyre!("Failed to serialize user: {}", e))?;

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO session (id, token, user_json, saved_at)
         VALUES (1, ?1, ?2, datetime('now'))",
        params![session.token, user_json],
      )
      .map_err(|e| eyre!("Failed to save session: {}", e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM session", [])
      .map_err(|e| eyre!("Failed to clear session: {}", e))?;

    Ok(())
  }
}
