//! In-memory storage implementation for testing

use crate::backup::{self, BackupSink, Frame, Snapshot};
use crate::namespace::validate;
use crate::query::{traverse_ordered, Window};
use crate::{QueryOptions, QueryPage, Repository, Result, SchemaConfig, StorageError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
struct Bucket {
    records: BTreeMap<Vec<u8>, Vec<u8>>,
    sequence: u64,
}

/// In-memory storage implementation
///
/// Fast, non-persistent storage primarily for testing.
/// All data is lost when the storage is dropped. A single lock guards every
/// bucket, so writes serialize store-wide just like the redb backend.
pub struct InMemoryStorage {
    buckets: RwLock<BTreeMap<String, Bucket>>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(name: &str) -> StorageError {
    StorageError::BucketNotFound(name.to_string())
}

#[async_trait]
impl Repository for InMemoryStorage {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let buckets = self.buckets.read();
        let b = buckets.get(bucket).ok_or_else(|| not_found(bucket))?;
        Ok(b.records.get(key).cloned())
    }

    fn get_all(&self, bucket: &str) -> Result<Vec<Vec<u8>>> {
        let buckets = self.buckets.read();
        let b = buckets.get(bucket).ok_or_else(|| not_found(bucket))?;
        Ok(b.records.values().cloned().collect())
    }

    fn update(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        validate(bucket)?;
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .records
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        let mut buckets = self.buckets.write();
        let b = buckets.get_mut(bucket).ok_or_else(|| not_found(bucket))?;
        b.records.remove(key);
        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.buckets.write().remove(bucket);
        Ok(())
    }

    fn init_schema(&self, schema: &SchemaConfig) -> Result<()> {
        let names = schema.bucket_names();
        for name in &names {
            validate(name).map_err(|e| StorageError::initialization(name, e))?;
        }

        let mut buckets = self.buckets.write();
        for name in names {
            buckets.entry(name).or_default();
        }
        Ok(())
    }

    fn buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().keys().cloned().collect())
    }

    fn next_sequence(&self, bucket: &str) -> Result<u64> {
        let mut buckets = self.buckets.write();
        let b = buckets.get_mut(bucket).ok_or_else(|| not_found(bucket))?;
        b.sequence = b
            .sequence
            .checked_add(1)
            .ok_or_else(|| StorageError::SequenceExhausted(bucket.to_string()))?;
        Ok(b.sequence)
    }

    fn query(&self, namespace: &str, opts: &QueryOptions) -> Result<QueryPage> {
        let buckets = self.buckets.read();
        let b = buckets.get(namespace).ok_or_else(|| not_found(namespace))?;

        let total = b.records.len();
        if total == 0 {
            return Ok(QueryPage::empty());
        }

        let window = Window::compute(total, opts);
        let cursor = b.records.values().map(Ok::<_, StorageError>);
        let items = traverse_ordered(cursor, opts.order, window, |v| v.clone())?;
        Ok(QueryPage { total, items })
    }

    async fn backup(&self, cancel: &CancellationToken, sink: Box<dyn BackupSink>) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        let snapshot = MemorySnapshot(self.buckets.read().clone());
        backup::stream(snapshot, sink, cancel).await
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// A copy of every bucket taken under one read lock
struct MemorySnapshot(BTreeMap<String, Bucket>);

impl Snapshot for MemorySnapshot {
    fn for_each_frame(&self, visit: &mut dyn FnMut(&Frame<'_>) -> Result<()>) -> Result<()> {
        for (name, bucket) in &self.0 {
            visit(&Frame::Bucket {
                name: Cow::Borrowed(name.as_str()),
                sequence: bucket.sequence,
            })?;
            for (key, value) in &bucket.records {
                visit(&Frame::Record {
                    key: Cow::Borrowed(key.as_slice()),
                    value: Cow::Borrowed(value.as_slice()),
                })?;
            }
        }
        Ok(())
    }
}
