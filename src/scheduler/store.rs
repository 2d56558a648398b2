//! Durable store for reversal records
//!
//! The store owns durable truth: every pending reversal is persisted here and
//! reloaded on startup. The sweep engine only ever holds a disposable
//! projection of this data. `YamlReversalStore` keeps an in-memory map and
//! mirrors every mutation to a YAML file.

use crate::scheduler::{ReversalKey, ReversalKind, ReversalRecord, ReversalStatus, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Contract for the durable record store.
///
/// `insert` upserts: an existing record with the same key is replaced, which
/// is what enforces "last write wins" when a sanction is re-applied. `delete`
/// is idempotent. `mark_in_flight` is an in-memory claim only; the `InFlight`
/// status is never written to disk.
#[async_trait]
pub trait ReversalStore: Send + Sync {
    /// Insert or replace the record for its key
    async fn insert(&self, record: ReversalRecord) -> Result<(), StoreError>;

    /// Delete the record for a key; deleting a missing key is not an error
    async fn delete(&self, key: &ReversalKey) -> Result<(), StoreError>;

    /// Delete a batch of keys with a single persistence write
    async fn delete_batch(&self, keys: &[ReversalKey]) -> Result<(), StoreError>;

    /// Return a claimed record to `Pending` with a new execution time and an
    /// incremented attempt count. Returns `Ok(false)` when the key is gone,
    /// which is how a retry loses gracefully to a concurrent cancel.
    async fn requeue(
        &self,
        key: &ReversalKey,
        execute_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Fetch one record by key
    fn get(&self, key: &ReversalKey) -> Option<ReversalRecord>;

    /// All records, regardless of kind. Used at startup recovery.
    fn list_all(&self) -> Vec<ReversalRecord>;

    /// All records of one kind. Used by the sweep to batch homogeneous work.
    fn list_by_kind(&self, kind: ReversalKind) -> Vec<ReversalRecord>;

    /// Claim a pending record for dispatch, returning its claimed form.
    /// Returns `None` if the key is absent or the record is already claimed,
    /// which is what keeps two concurrent dispatches of one key apart.
    fn mark_in_flight(&self, key: &ReversalKey) -> Option<ReversalRecord>;
}

/// YAML-file-backed store
pub struct YamlReversalStore {
    path: PathBuf,
    records: DashMap<ReversalKey, ReversalRecord>,
}

impl YamlReversalStore {
    /// Load the store from `path`, or start empty if the file is missing.
    ///
    /// Records found in `InFlight` state are coerced back to `Pending`: a
    /// crash mid-dispatch must look like the dispatch never started.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = DashMap::new();

        if let Ok(file_content) = tokio::fs::read_to_string(&path).await {
            match serde_yaml::from_str::<Vec<ReversalRecord>>(&file_content) {
                Ok(loaded) => {
                    for mut record in loaded {
                        if record.status == ReversalStatus::InFlight {
                            record.status = ReversalStatus::Pending;
                        }
                        records.insert(record.key, record);
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse reversal store, starting empty");
                }
            }
        }

        Self { path, records }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    async fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let records: Vec<ReversalRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let yaml = serde_yaml::to_string(&records)?;
        tokio::fs::write(&self.path, yaml).await?;
        Ok(())
    }
}

#[async_trait]
impl ReversalStore for YamlReversalStore {
    async fn insert(&self, record: ReversalRecord) -> Result<(), StoreError> {
        self.records.insert(record.key, record);
        self.save().await
    }

    async fn delete(&self, key: &ReversalKey) -> Result<(), StoreError> {
        if self.records.remove(key).is_some() {
            self.save().await?;
        }
        Ok(())
    }

    async fn delete_batch(&self, keys: &[ReversalKey]) -> Result<(), StoreError> {
        let mut removed = false;
        for key in keys {
            removed |= self.records.remove(key).is_some();
        }
        if removed {
            self.save().await?;
        }
        Ok(())
    }

    async fn requeue(
        &self,
        key: &ReversalKey,
        execute_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let requeued = match self.records.get_mut(key) {
            Some(mut record) => record.requeue(execute_at).is_ok(),
            None => false,
        };
        if requeued {
            self.save().await?;
        }
        Ok(requeued)
    }

    fn get(&self, key: &ReversalKey) -> Option<ReversalRecord> {
        self.records.get(key).map(|entry| entry.value().clone())
    }

    fn list_all(&self) -> Vec<ReversalRecord> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn list_by_kind(&self, kind: ReversalKind) -> Vec<ReversalRecord> {
        self.records
            .iter()
            .filter_map(|entry| {
                let record = entry.value();
                if record.key.kind == kind {
                    Some(record.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    fn mark_in_flight(&self, key: &ReversalKey) -> Option<ReversalRecord> {
        let mut record = self.records.get_mut(key)?;
        if record.begin_dispatch().is_err() {
            return None;
        }
        Some(record.clone())
    }
}
