//! Storage layer for formkeeper.
//!
//! Everything the application persists is a JSON document under one of two
//! logical keys: [`CUSTOMERS_KEY`] holds the record collection and
//! [`SCHEMA_KEY`] holds the active schema template. [`KeyValueStore`] is the
//! seam between the workbook and the backing store; [`Storage`] keeps the
//! documents in a `SQLite` file and [`MemoryStore`] keeps them in a map.

mod memory;
pub mod migrations;
pub mod schema;

pub use memory::MemoryStore;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Key holding the record collection.
pub const CUSTOMERS_KEY: &str = "customers";

/// Key holding the active schema template.
pub const SCHEMA_KEY: &str = "schema";

/// Asynchronous string-keyed store of JSON documents.
///
/// Writes to different keys are independent; there are no cross-key
/// transactions.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the document stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails or holds unreadable data.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Store `value` under `key`, replacing any previous document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<()>;
}

/// `SQLite`-backed document store.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection; locks are never held across an await point.
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a store at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("database connection lock poisoned"))
    }

    /// Read a raw document.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored text is not JSON.
    pub fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let text: Option<String> = self
            .conn()?
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;

        debug!(key, found = text.is_some(), "read document");
        text.map(|t| serde_json::from_str(&t))
            .transpose()
            .map_err(Error::from)
    }

    /// Write a raw document, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the query fails.
    pub fn write(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        let updated_at = Utc::now().to_rfc3339();

        self.conn()?.execute(
            r"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, text, updated_at],
        )?;

        debug!(key, bytes = text.len(), "wrote document");
        Ok(())
    }

    /// List stored keys in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Delete a document.
    ///
    /// Returns `true` if a document was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let rows = self.conn()?.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(rows > 0)
    }

    /// Get statistics about the store.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let conn = self.conn()?;

        let total_keys: i64 = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;

        let last: Option<String> = conn
            .query_row(
                "SELECT updated_at FROM kv ORDER BY updated_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let last_updated = last
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let layout_version: i32 = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_keys,
            last_updated,
            layout_version,
            db_size_bytes,
        })
    }
}

#[async_trait::async_trait]
impl KeyValueStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.read(key)
    }

    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.write(key, value)
    }
}

/// Statistics about the store.
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Number of stored documents.
    pub total_keys: i64,
    /// When any document was last written.
    pub last_updated: Option<DateTime<Utc>>,
    /// Table-layout version recorded in the metadata table.
    pub layout_version: i32,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.path(), Path::new(":memory:"));
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_write_and_read() {
        let storage = create_test_storage();
        let doc = json!([{ "id": "a", "first_name": "Ada" }]);

        storage.write(CUSTOMERS_KEY, &doc).unwrap();
        assert_eq!(storage.read(CUSTOMERS_KEY).unwrap(), Some(doc));
    }

    #[test]
    fn test_read_missing() {
        let storage = create_test_storage();
        assert!(storage.read(SCHEMA_KEY).unwrap().is_none());
    }

    #[test]
    fn test_write_replaces() {
        let storage = create_test_storage();
        storage.write(SCHEMA_KEY, &json!({ "v": 1 })).unwrap();
        storage.write(SCHEMA_KEY, &json!({ "v": 2 })).unwrap();

        assert_eq!(storage.read(SCHEMA_KEY).unwrap(), Some(json!({ "v": 2 })));
        assert_eq!(storage.keys().unwrap(), vec![SCHEMA_KEY.to_string()]);
    }

    #[test]
    fn test_keys_sorted() {
        let storage = create_test_storage();
        storage.write(SCHEMA_KEY, &json!({})).unwrap();
        storage.write(CUSTOMERS_KEY, &json!([])).unwrap();

        assert_eq!(storage.keys().unwrap(), vec!["customers", "schema"]);
    }

    #[test]
    fn test_delete() {
        let storage = create_test_storage();
        storage.write(SCHEMA_KEY, &json!({})).unwrap();

        assert!(storage.delete(SCHEMA_KEY).unwrap());
        assert!(!storage.delete(SCHEMA_KEY).unwrap());
        assert!(storage.read(SCHEMA_KEY).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_document_is_an_error() {
        let storage = create_test_storage();
        storage
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES ('schema', '{not json', '')",
                [],
            )
            .unwrap();

        assert!(storage.read(SCHEMA_KEY).is_err());
    }

    #[test]
    fn test_stats() {
        let storage = create_test_storage();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_keys, 0);
        assert!(stats.last_updated.is_none());
        assert_eq!(stats.layout_version, migrations::CURRENT_VERSION);
        assert_eq!(stats.db_size_bytes, 0);

        storage.write(CUSTOMERS_KEY, &json!([])).unwrap();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_keys, 1);
        assert!(stats.last_updated.is_some());
    }

    #[test]
    fn test_open_creates_parent_dirs_and_persists() {
        let dir = std::env::temp_dir().join(format!("formkeeper_test_{}", std::process::id()));
        let db_path = dir.join("nested").join("records.db");

        {
            let storage = Storage::open(&db_path).unwrap();
            storage.write(CUSTOMERS_KEY, &json!([{ "id": "a" }])).unwrap();
            assert_eq!(storage.path(), db_path);
            assert!(storage.stats().unwrap().db_size_bytes > 0);
        }

        let reopened = Storage::open(&db_path).unwrap();
        assert_eq!(
            reopened.read(CUSTOMERS_KEY).unwrap(),
            Some(json!([{ "id": "a" }]))
        );

        drop(reopened);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_key_value_store_impl() {
        let storage = create_test_storage();
        let store: &dyn KeyValueStore = &storage;

        assert!(store.get(CUSTOMERS_KEY).await.unwrap().is_none());
        store.set(CUSTOMERS_KEY, &json!([])).await.unwrap();
        assert_eq!(store.get(CUSTOMERS_KEY).await.unwrap(), Some(json!([])));
    }
}
