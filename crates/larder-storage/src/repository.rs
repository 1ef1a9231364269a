//! Repository trait and query options

use crate::backup::BackupSink;
use crate::{Result, SchemaConfig};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Pluggable storage backend
///
/// Every higher-level concern (users, addons, content, indexes) goes through
/// this contract. Implementations must provide:
/// - Bucket-scoped KV operations (get, get_all, update, delete)
/// - Bucket lifecycle (init_schema, delete_bucket)
/// - Per-bucket sequences, paginated queries and snapshot backups
///
/// Writes serialize store-wide; reads never block each other.
#[async_trait]
pub trait Repository: Send + Sync {
    // ========== Records ==========

    /// Get the value stored under `key`
    ///
    /// Returns `Ok(None)` when the key is absent and
    /// `Err(BucketNotFound)` when the bucket itself is missing.
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Every value in the bucket, in key order
    fn get_all(&self, bucket: &str) -> Result<Vec<Vec<u8>>>;

    /// Insert or overwrite a record, creating the bucket if needed
    fn update(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove a record; an absent key is not an error
    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()>;

    // ========== Buckets ==========

    /// Drop a bucket and its sequence; a missing bucket is not an error
    fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// Ensure every bucket named by the schema exists
    fn init_schema(&self, schema: &SchemaConfig) -> Result<()>;

    /// Names of all buckets, in name order
    fn buckets(&self) -> Result<Vec<String>>;

    /// Atomically increment and return the bucket's counter
    fn next_sequence(&self, bucket: &str) -> Result<u64>;

    // ========== Queries ==========

    /// One page of a bucket in key order
    fn query(&self, namespace: &str, opts: &QueryOptions) -> Result<QueryPage>;

    // ========== Maintenance ==========

    /// Stream a consistent snapshot of the whole store into `sink`
    ///
    /// Returns `Err(Cancelled)` as soon as `cancel` fires; whatever reached the
    /// sink by then is truncated and must be discarded by the caller.
    async fn backup(&self, cancel: &CancellationToken, sink: Box<dyn BackupSink>) -> Result<()>;

    /// Release the store
    fn close(self: Box<Self>) -> Result<()>;
}

/// Iteration direction for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl Order {
    /// Lenient parse: only `"asc"` is ascending, anything else is descending.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "asc" => Order::Asc,
            _ => Order::Desc,
        }
    }
}

impl From<&str> for Order {
    fn from(s: &str) -> Self {
        Order::parse_lenient(s)
    }
}

/// Pagination options for [`Repository::query`]
///
/// `count` and `offset` are signed so malformed input can be clamped instead
/// of rejected: any negative count means "all", any negative offset means 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub count: i64,
    pub offset: i64,
    pub order: Order,
}

impl QueryOptions {
    /// Every record, newest key first
    pub fn all() -> Self {
        Self {
            count: -1,
            offset: 0,
            order: Order::Desc,
        }
    }

    pub fn page(count: i64, offset: i64) -> Self {
        Self {
            count,
            offset,
            order: Order::Desc,
        }
    }

    pub fn order(mut self, order: impl Into<Order>) -> Self {
        self.order = order.into();
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::all()
    }
}

/// Result of a query: the bucket's key count plus the requested page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPage {
    pub total: usize,
    pub items: Vec<Vec<u8>>,
}

impl QueryPage {
    pub fn empty() -> Self {
        Self::default()
    }
}
