//! File-backed parameter store
//!
//! Keeps state in a single JSON document so separate CLI invocations (one per
//! unit) share published keys. Every operation holds an exclusive lock on a
//! sibling `.lock` file and re-reads the document; writes go through a temp
//! file and a rename.

use crate::error::StoreResult;
use crate::key::ParameterKey;
use crate::memory::InMemoryParameterStore;
use crate::stage::Stage;
use crate::store::{ParameterRecord, ParameterStore};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    parameters: Vec<ParameterRecord>,
}

struct DocumentLock<'a> {
    _local: MutexGuard<'a, ()>,
    _file: File,
}

/// JSON document store
#[derive(Debug)]
pub struct FileParameterStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileParameterStore {
    /// Store persisted at `path`; the file is created on first write
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn lock(&self) -> StoreResult<DocumentLock<'_>> {
        let local = self.guard.lock().await;
        let lock_path = self.path.with_extension("lock");
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = lock_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;
            FileExt::lock_exclusive(&file)?;
            Ok(file)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(DocumentLock {
            _local: local,
            _file: file,
        })
    }

    async fn load(&self) -> StoreResult<InMemoryParameterStore> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let doc: StoreDocument = serde_json::from_slice(&bytes)?;
                Ok(InMemoryParameterStore::from_records(doc.parameters))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(InMemoryParameterStore::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &InMemoryParameterStore) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let doc = StoreDocument {
            parameters: snapshot.records(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ParameterStore for FileParameterStore {
    async fn put(&self, key: &ParameterKey, value: &str, writer: &Stage) -> StoreResult<String> {
        let _lock = self.lock().await?;
        let snapshot = self.load().await?;
        let before = snapshot.get_sync(key).ok();
        let stored = snapshot.put_sync(key, value, writer)?;
        if before.as_ref() != snapshot.get_sync(key).ok().as_ref() {
            self.save(&snapshot).await?;
        }
        tracing::debug!(key = %key, stage = %writer, path = %self.path.display(), "parameter stored");
        Ok(stored)
    }

    async fn get(&self, key: &ParameterKey) -> StoreResult<ParameterRecord> {
        let _lock = self.lock().await?;
        self.load().await?.get_sync(key)
    }

    async fn delete(&self, key: &ParameterKey) -> StoreResult<bool> {
        let _lock = self.lock().await?;
        let snapshot = self.load().await?;
        let existed = snapshot.delete_sync(key);
        if existed {
            self.save(&snapshot).await?;
        }
        Ok(existed)
    }

    async fn list(&self, prefix: &ParameterKey) -> StoreResult<Vec<ParameterRecord>> {
        let _lock = self.lock().await?;
        Ok(self.load().await?.list_sync(prefix))
    }
}
