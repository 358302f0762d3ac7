//! Persister trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::query::{DehydratedQuery, QueryKey};

/// Trait for persistence backends.
pub trait Persister: Send + Sync {
  /// Replace everything stored with `queries`.
  fn save(&self, queries: &[DehydratedQuery]) -> Result<()>;

  /// Load stored queries, discarding those older than `max_age`.
  fn restore(&self, max_age: Duration) -> Result<Vec<DehydratedQuery>>;

  /// Number of stored queries.
  fn count(&self) -> Result<usize>;

  fn clear(&self) -> Result<()>;
}

/// Persister that doesn't store anything.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopPersister;

impl Persister for NoopPersister {
  fn save(&self, _queries: &[DehydratedQuery]) -> Result<()> {
    Ok(()) // Discard
  }

  fn restore(&self, _max_age: Duration) -> Result<Vec<DehydratedQuery>> {
    Ok(Vec::new()) // Always empty
  }

  fn count(&self) -> Result<usize> {
    Ok(0)
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

impl<P: Persister + ?Sized> Persister for Box<P> {
  fn save(&self, queries: &[DehydratedQuery]) -> Result<()> {
    (**self).save(queries)
  }

  fn restore(&self, max_age: Duration) -> Result<Vec<DehydratedQuery>> {
    (**self).restore(max_age)
  }

  fn count(&self) -> Result<usize> {
    (**self).count()
  }

  fn clear(&self) -> Result<()> {
    (**self).clear()
  }
}

/// SQLite-based persister.
pub struct SqlitePersister {
  conn: Mutex<Connection>,
}

/// Schema for persisted queries.
const PERSIST_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS persisted_queries (
    query_hash TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    variables TEXT NOT NULL,
    data BLOB NOT NULL,
    data_updated_at TEXT NOT NULL,
    persisted_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_persisted_queries_kind ON persisted_queries(kind);
"#;

impl SqlitePersister {
  /// Open the persister at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;
    Self::with_connection(conn)
  }

  /// A throwaway database, for tests and `--no-persist` runs.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(PERSIST_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("forumq").join("queries.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl Persister for SqlitePersister {
  fn save(&self, queries: &[DehydratedQuery]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM persisted_queries", [])
      .map_err(|e| eyre!("Failed to delete old queries: {}", e))?;

    for query in queries {
      let data =
        serde_json::to_vec(&query.data).map_err(|e| eyre!("Failed to serialize query: {}", e))?;
      tx.execute(
        "INSERT OR REPLACE INTO persisted_queries (query_hash, kind, variables, data, data_updated_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
          query.key.digest(),
          query.key.kind_name(),
          query.key.variables(),
          data,
          query.data_updated_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store query: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    debug!(count = queries.len(), "persisted queries");
    Ok(())
  }

  fn restore(&self, max_age: Duration) -> Result<Vec<DehydratedQuery>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT kind, variables, data, data_updated_at FROM persisted_queries
         ORDER BY kind, variables",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, String, Vec<u8>, String)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
      .map_err(|e| eyre!("Failed to query persisted queries: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let now = Utc::now();
    let mut restored = Vec::with_capacity(rows.len());
    for (kind, variables, data, updated_at) in rows {
      let key = QueryKey::from_parts(kind, variables);
      let data_updated_at = match parse_datetime(&updated_at) {
        Ok(at) => at,
        Err(e) => {
          warn!(query = %key, error = %e, "skipping persisted query");
          continue;
        }
      };
      let expired = (now - data_updated_at)
        .to_std()
        .is_ok_and(|age| age > max_age);
      if expired {
        continue;
      }
      match serde_json::from_slice(&data) {
        Ok(data) => restored.push(DehydratedQuery {
          key,
          data,
          data_updated_at,
        }),
        Err(e) => warn!(query = %key, error = %e, "skipping unreadable persisted query"),
      }
    }

    Ok(restored)
  }

  fn count(&self) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM persisted_queries", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count persisted queries: {}", e))?;
    Ok(usize::try_from(count).unwrap_or(0))
  }

  fn clear(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM persisted_queries", [])
      .map_err(|e| eyre!("Failed to clear persisted queries: {}", e))?;
    Ok(())
  }
}

/// Parse an RFC 3339 timestamp.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn query(kind: &str, page: u32, age: chrono::Duration) -> DehydratedQuery {
    DehydratedQuery {
      key: QueryKey::new(kind, &page).unwrap(),
      data: json!({ "pages": [[page]], "pageParams": [page] }),
      data_updated_at: Utc::now() - age,
    }
  }

  #[test]
  fn test_save_and_restore() {
    let persister = SqlitePersister::in_memory().unwrap();
    let saved = vec![query("node.topics", 1, chrono::Duration::minutes(5))];
    persister.save(&saved).unwrap();

    let restored = persister.restore(Duration::from_secs(3600)).unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].key, saved[0].key);
    assert_eq!(restored[0].data, saved[0].data);
    assert_eq!(
      restored[0].data_updated_at.timestamp(),
      saved[0].data_updated_at.timestamp()
    );
  }

  #[test]
  fn test_restore_drops_expired() {
    let persister = SqlitePersister::in_memory().unwrap();
    persister
      .save(&[
        query("node.topics", 1, chrono::Duration::minutes(5)),
        query("node.topics", 2, chrono::Duration::hours(30)),
      ])
      .unwrap();

    let restored = persister
      .restore(Duration::from_secs(60 * 60 * 24))
      .unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(persister.count().unwrap(), 2);
  }

  #[test]
  fn test_save_replaces_previous_snapshot() {
    let persister = SqlitePersister::in_memory().unwrap();
    persister
      .save(&[query("a", 1, chrono::Duration::zero()), query("b", 1, chrono::Duration::zero())])
      .unwrap();
    persister.save(&[query("c", 1, chrono::Duration::zero())]).unwrap();
    assert_eq!(persister.count().unwrap(), 1);

    persister.clear().unwrap();
    assert_eq!(persister.count().unwrap(), 0);
  }

  #[test]
  fn test_noop_persister() {
    let persister = NoopPersister;
    persister.save(&[query("a", 1, chrono::Duration::zero())]).unwrap();
    assert!(persister.restore(Duration::MAX).unwrap().is_empty());
  }
}
