//! Larder Storage - Bucket-namespaced key-value persistence
//!
//! This crate provides the storage contract everything above it (users,
//! addons, content, indexes) goes through, with two backends:
//! - In-memory (for testing)
//! - redb (production embedded database, one file for all buckets)
//!
//! ## Architecture
//!
//! - Buckets: independent ordered namespaces of byte keys and opaque values
//! - Queries: paginated, ordered walks over a bucket's cursor
//! - Sequences: one atomic counter per bucket
//! - Backups: consistent snapshots streamed to a sink, cancellable mid-flight

mod backup;
mod config;
mod error;
mod memory;
mod query;
mod redb_storage;
mod repository;

pub mod index;
pub mod namespace;

pub use backup::{BackupMetadata, BackupSink, CONTENT_TYPE, FORMAT_VERSION};
pub use config::StorageConfig;
pub use error::{Result, StorageError};
pub use memory::InMemoryStorage;
pub use namespace::SchemaConfig;
pub use query::Window;
pub use redb_storage::RedbStorage;
pub use repository::{Order, QueryOptions, QueryPage, Repository};

pub use tokio_util::sync::CancellationToken;
