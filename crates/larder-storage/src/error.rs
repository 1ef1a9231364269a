//! Error types for storage operations

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    #[error("Database creation error: {0}")]
    DatabaseCreation(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Invalid bucket name: {0:?}")]
    InvalidBucket(String),

    #[error("Failed to provision bucket {bucket}: {source}")]
    Initialization {
        bucket: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error("Sequence exhausted for bucket: {0}")]
    SequenceExhausted(String),

    #[error("Backup cancelled")]
    Cancelled,

    #[error("Backup task failed: {0}")]
    BackupTask(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl StorageError {
    /// True when the target bucket does not exist.
    ///
    /// An absent key inside an existing bucket is never an error, so this is
    /// the only "not found" a collaborator has to map.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::BucketNotFound(_))
    }

    pub(crate) fn initialization(bucket: &str, source: StorageError) -> Self {
        StorageError::Initialization {
            bucket: bucket.to_string(),
            source: Box::new(source),
        }
    }
}
