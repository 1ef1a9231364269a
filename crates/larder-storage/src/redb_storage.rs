//! redb-based persistent storage implementation

use crate::backup::{self, BackupSink, Frame, Snapshot};
use crate::namespace::{self, validate};
use crate::query::{traverse_ordered, Window};
use crate::{QueryOptions, QueryPage, Repository, Result, SchemaConfig, StorageError};
use async_trait::async_trait;
use redb::{
    Database, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition, TableError,
    TableHandle, WriteTransaction,
};
use std::borrow::Cow;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

// Per-bucket counters live in one reserved table, keyed by bucket name.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new(namespace::SEQUENCES_TABLE);

fn bucket(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

fn user_tables(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut names: Vec<String> = names.filter(|n| n != SEQUENCES.name()).collect();
    names.sort();
    names
}

/// redb-based persistent storage
///
/// Every bucket is a redb table in a single file. redb allows one write
/// transaction at a time store-wide and any number of concurrent readers,
/// which is exactly the locking discipline the repository promises.
pub struct RedbStorage {
    db: Database,
    path: PathBuf,
}

impl RedbStorage {
    /// Create or open a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path)?;

        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        debug!(path = %path.display(), "opened store");
        Ok(Self { db, path })
    }

    /// Build a new store at `path` from a snapshot produced by `backup`.
    ///
    /// Refuses to overwrite an existing file. On failure the partially
    /// written file is removed.
    pub fn restore(path: impl AsRef<Path>, reader: impl Read) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("refusing to restore over {}", path.display()),
            )));
        }

        let storage = Self::open(path)?;
        match storage.load_snapshot(reader) {
            Ok(()) => Ok(storage),
            Err(e) => {
                drop(storage);
                let _ = std::fs::remove_file(path);
                Err(e)
            }
        }
    }

    /// Get the file path of this storage
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_snapshot(&self, reader: impl Read) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut sequences = write_txn.open_table(SEQUENCES)?;
            let mut current = None;

            backup::read_frames(reader, |frame| {
                match frame {
                    Frame::Bucket { name, sequence } => {
                        validate(&name)?;
                        // a table can only be open once per transaction
                        current = None;
                        let table = write_txn.open_table(bucket(&name))?;
                        if sequence > 0 {
                            sequences.insert(&*name, sequence)?;
                        }
                        current = Some(table);
                    }
                    Frame::Record { key, value } => {
                        if let Some(table) = current.as_mut() {
                            table.insert(&*key, &*value)?;
                        }
                    }
                    Frame::Header { .. } | Frame::End => {}
                }
                Ok(())
            })?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn open_read(
        txn: &ReadTransaction,
        name: &str,
    ) -> Result<redb::ReadOnlyTable<&'static [u8], &'static [u8]>> {
        validate(name)?;
        txn.open_table(bucket(name)).map_err(|e| match e {
            TableError::TableDoesNotExist(_) => StorageError::BucketNotFound(name.to_string()),
            e => e.into(),
        })
    }

    /// Existence check that does not create the table
    fn exists_in(txn: &WriteTransaction, name: &str) -> Result<bool> {
        validate(name)?;
        Ok(txn.list_tables()?.any(|handle| handle.name() == name))
    }

    fn provision(&self, names: &[String]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        for name in names {
            validate(name)
                .and_then(|_| {
                    write_txn.open_table(bucket(name))?;
                    Ok(())
                })
                .map_err(|e| StorageError::initialization(name, e))?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl Repository for RedbStorage {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = Self::open_read(&read_txn, bucket)?;

        let value = table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    fn get_all(&self, bucket: &str) -> Result<Vec<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = Self::open_read(&read_txn, bucket)?;

        let mut values = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            values.push(value.value().to_vec());
        }
        Ok(values)
    }

    fn update(&self, bucket_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        validate(bucket_name)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(bucket(bucket_name))?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete(&self, bucket_name: &str, key: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        if !Self::exists_in(&write_txn, bucket_name)? {
            return Err(StorageError::BucketNotFound(bucket_name.to_string()));
        }
        {
            let mut table = write_txn.open_table(bucket(bucket_name))?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_bucket(&self, bucket_name: &str) -> Result<()> {
        validate(bucket_name)?;
        let write_txn = self.db.begin_write()?;
        {
            // false when the table never existed; dropping is idempotent
            write_txn.delete_table(bucket(bucket_name))?;
            let mut sequences = write_txn.open_table(SEQUENCES)?;
            sequences.remove(bucket_name)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn init_schema(&self, schema: &SchemaConfig) -> Result<()> {
        let names = schema.bucket_names();
        let result = self.provision(&names);

        match &result {
            Ok(()) => info!(
                buckets = names.len(),
                path = %self.path.display(),
                "schema initialized"
            ),
            Err(e) => error!(error = %e, path = %self.path.display(), "schema initialization failed"),
        }
        result
    }

    fn buckets(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let names = read_txn.list_tables()?.map(|h| h.name().to_string());
        Ok(user_tables(names))
    }

    fn next_sequence(&self, bucket_name: &str) -> Result<u64> {
        let write_txn = self.db.begin_write()?;
        if !Self::exists_in(&write_txn, bucket_name)? {
            return Err(StorageError::BucketNotFound(bucket_name.to_string()));
        }

        // read, increment and write inside the one exclusive transaction
        let next = {
            let mut sequences = write_txn.open_table(SEQUENCES)?;
            let current = sequences.get(bucket_name)?.map(|v| v.value()).unwrap_or(0);
            let next = current
                .checked_add(1)
                .ok_or_else(|| StorageError::SequenceExhausted(bucket_name.to_string()))?;
            sequences.insert(bucket_name, next)?;
            next
        };
        write_txn.commit()?;
        Ok(next)
    }

    fn query(&self, namespace: &str, opts: &QueryOptions) -> Result<QueryPage> {
        let read_txn = self.db.begin_read()?;
        let table = Self::open_read(&read_txn, namespace)?;

        let total = table.len()? as usize;
        if total == 0 {
            return Ok(QueryPage::empty());
        }

        let window = Window::compute(total, opts);
        if window.is_empty() {
            return Ok(QueryPage {
                total,
                items: Vec::new(),
            });
        }

        let items = traverse_ordered(table.iter()?, opts.order, window, |(_, v)| {
            v.value().to_vec()
        })?;
        Ok(QueryPage { total, items })
    }

    async fn backup(&self, cancel: &CancellationToken, sink: Box<dyn BackupSink>) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        let snapshot = RedbSnapshot {
            txn: self.db.begin_read()?,
        };
        backup::stream(snapshot, sink, cancel).await
    }

    fn close(self: Box<Self>) -> Result<()> {
        let RedbStorage { db, path } = *self;
        drop(db);
        info!(path = %path.display(), "store closed");
        Ok(())
    }
}

/// One read transaction, held for the life of a backup
struct RedbSnapshot {
    txn: ReadTransaction,
}

impl Snapshot for RedbSnapshot {
    fn for_each_frame(&self, visit: &mut dyn FnMut(&Frame<'_>) -> Result<()>) -> Result<()> {
        let names = user_tables(self.txn.list_tables()?.map(|h| h.name().to_string()));
        let sequences = self.txn.open_table(SEQUENCES)?;

        for name in &names {
            let sequence = sequences.get(name.as_str())?.map(|v| v.value()).unwrap_or(0);
            visit(&Frame::Bucket {
                name: Cow::Borrowed(name.as_str()),
                sequence,
            })?;

            let table = self.txn.open_table(bucket(name))?;
            for entry in table.iter()? {
                let (key, value) = entry?;
                visit(&Frame::Record {
                    key: Cow::Borrowed(key.value()),
                    value: Cow::Borrowed(value.value()),
                })?;
            }
        }
        Ok(())
    }
}
