//! In-memory key-value store.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use super::KeyValueStore;
use crate::error::Result;

/// In-process document store, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with documents.
    #[must_use]
    pub fn with_documents<I, K>(documents: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        Self {
            documents: Mutex::new(
                documents
                    .into_iter()
                    .map(|(k, v)| (k.into(), v))
                    .collect(),
            ),
        }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.documents.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        debug!(key, "storing document in memory");
        self.documents
            .lock()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}
