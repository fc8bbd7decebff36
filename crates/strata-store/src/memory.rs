//! In-memory parameter store backed by a radix trie
//!
//! The trie keeps hierarchical listing (`list("/prefix/dev")`) cheap.

use crate::error::{StoreError, StoreResult};
use crate::key::ParameterKey;
use crate::stage::Stage;
use crate::store::{check_value, ParameterRecord, ParameterStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};

/// Thread-safe in-process store
#[derive(Debug)]
pub struct InMemoryParameterStore {
    trie: RwLock<Trie<String, ParameterRecord>>,
}

impl Default for InMemoryParameterStore {
    fn default() -> Self {
        Self {
            trie: RwLock::new(Trie::new()),
        }
    }
}

impl InMemoryParameterStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with records
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = ParameterRecord>) -> Self {
        let mut trie = Trie::new();
        for record in records {
            trie.insert(record.key.as_str().to_string(), record);
        }
        Self {
            trie: RwLock::new(trie),
        }
    }

    /// Snapshot of every record, sorted by key
    #[must_use]
    pub fn records(&self) -> Vec<ParameterRecord> {
        let mut records: Vec<_> = self.trie.read().values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.trie.read().len()
    }

    /// Check if store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn put_sync(
        &self,
        key: &ParameterKey,
        value: &str,
        writer: &Stage,
    ) -> StoreResult<String> {
        check_value(key, value)?;
        let path = key.as_str().to_string();
        let mut trie = self.trie.write();
        let record = ParameterRecord::upsert(trie.get(&path), key, value, writer);
        trie.insert(path, record);
        Ok(value.to_string())
    }

    pub(crate) fn get_sync(&self, key: &ParameterKey) -> StoreResult<ParameterRecord> {
        let path = key.as_str().to_string();
        self.trie
            .read()
            .get(&path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    pub(crate) fn delete_sync(&self, key: &ParameterKey) -> bool {
        let path = key.as_str().to_string();
        self.trie.write().remove(&path).is_some()
    }

    pub(crate) fn list_sync(&self, prefix: &ParameterKey) -> Vec<ParameterRecord> {
        let path = prefix.as_str().to_string();
        let trie = self.trie.read();
        let mut records: Vec<ParameterRecord> = trie
            .get_raw_descendant(&path)
            .map(|subtrie| {
                subtrie
                    .values()
                    .filter(|record| record.key.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }
}

#[async_trait]
impl ParameterStore for InMemoryParameterStore {
    async fn put(&self, key: &ParameterKey, value: &str, writer: &Stage) -> StoreResult<String> {
        let stored = self.put_sync(key, value, writer)?;
        tracing::debug!(key = %key, stage = %writer, "parameter stored");
        Ok(stored)
    }

    async fn get(&self, key: &ParameterKey) -> StoreResult<ParameterRecord> {
        self.get_sync(key)
    }

    async fn delete(&self, key: &ParameterKey) -> StoreResult<bool> {
        Ok(self.delete_sync(key))
    }

    async fn list(&self, prefix: &ParameterKey) -> StoreResult<Vec<ParameterRecord>> {
        Ok(self.list_sync(prefix))
    }
}
