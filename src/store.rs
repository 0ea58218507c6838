//! Durable key-value storage backed by SQLite.
//!
//! One table holds everything the bridge persists: the provider secret
//! and the per-token engine registrations. Use `":memory:"` for tests.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Persistent key-value store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the store at the given database path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .context("failed to create kv table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Set a value (upsert).
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    /// Remove a key. Removing an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    /// All entries whose key starts with `prefix`, ordered by key.
    pub fn list(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT key, value FROM kv WHERE key LIKE ?1 || '%' ORDER BY key")?;
        let rows = stmt.query_map([prefix], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_store() -> Store {
        Store::open(":memory:").unwrap()
    }

    #[test]
    fn get_returns_none_for_missing_key() {
        let store = mem_store();
        assert!(store.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn set_and_get() {
        let store = mem_store();
        store.set("secret", "ABCD").unwrap();
        assert_eq!(store.get("secret").unwrap().unwrap(), "ABCD");
    }

    #[test]
    fn set_overwrites_existing() {
        let store = mem_store();
        store.set("key", "old").unwrap();
        store.set("key", "new").unwrap();
        assert_eq!(store.get("key").unwrap().unwrap(), "new");
    }

    #[test]
    fn delete_removes_key() {
        let store = mem_store();
        store.set("key", "value").unwrap();
        store.delete("key").unwrap();
        assert!(store.get("key").unwrap().is_none());
    }

    #[test]
    fn delete_nonexistent_is_ok() {
        let store = mem_store();
        store.delete("nonexistent").unwrap();
    }

    #[test]
    fn list_filters_by_prefix() {
        let store = mem_store();
        store.set("engine-id:tok-a", "1").unwrap();
        store.set("engine-id:tok-b", "2").unwrap();
        store.set("provider-secret", "FF").unwrap();

        let entries = store.list("engine-id:").unwrap();
        assert_eq!(
            entries,
            vec![
                ("engine-id:tok-a".to_string(), "1".to_string()),
                ("engine-id:tok-b".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn list_empty_prefix_returns_everything() {
        let store = mem_store();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(store.list("").unwrap().len(), 2);
    }

    #[test]
    fn persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store-test.db");

        {
            let store = Store::open(&path).unwrap();
            store.set("key", "persisted").unwrap();
        }

        {
            let store = Store::open(&path).unwrap();
            assert_eq!(store.get("key").unwrap().unwrap(), "persisted");
        }
    }
}
