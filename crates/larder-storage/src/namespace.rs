//! Bucket naming convention
//!
//! Every logical domain maps to one physical bucket name. The literal names
//! here are part of the on-disk layout and must not change, otherwise existing
//! store files stop lining up with the code reading them.

use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const CONFIG: &str = "__config";
pub const USERS: &str = "__users";
pub const ADDONS: &str = "__addons";
pub const UPLOADS: &str = "__uploads";
pub const CONTENT_INDEX: &str = "__contentIndex";
pub const RECOVERY_KEYS: &str = "__recoveryKeys";

/// Buckets every store is provisioned with, independent of content types.
pub const SYSTEM_BUCKETS: [&str; 5] = [CONFIG, USERS, ADDONS, UPLOADS, CONTENT_INDEX];

/// Holds per-bucket sequence counters; never usable as a bucket.
pub const SEQUENCES_TABLE: &str = "__larder_sequences";

pub const SORTED_SUFFIX: &str = "__sorted";
pub const INDEX_PREFIX: &str = "__index_";

/// Name of the ordering companion bucket for a content type.
pub fn sorted(content_type: &str) -> String {
    format!("{}{}", content_type, SORTED_SUFFIX)
}

/// Name of the bucket backing an index namespace.
pub fn index(namespace: &str) -> String {
    format!("{}{}", INDEX_PREFIX, namespace)
}

/// Reject names no backend may store records under.
///
/// Shared by every backend so a snapshot taken from one always restores
/// into another.
pub(crate) fn validate(name: &str) -> Result<()> {
    if name.is_empty() || name == SEQUENCES_TABLE {
        return Err(StorageError::InvalidBucket(name.to_string()));
    }
    Ok(())
}

/// The logical domain a physical bucket name belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace<'a> {
    /// One of the fixed double-underscore system tables
    System(&'a str),
    /// An `__index_<namespace>` bucket
    Index(&'a str),
    /// A `<type>__sorted` companion bucket
    Sorted(&'a str),
    /// Anything else; assumed to be a content type
    Content(&'a str),
}

impl<'a> Namespace<'a> {
    /// Classify a physical bucket name.
    pub fn classify(bucket: &'a str) -> Self {
        if let Some(ns) = bucket.strip_prefix(INDEX_PREFIX) {
            return Namespace::Index(ns);
        }
        if let Some(t) = bucket.strip_suffix(SORTED_SUFFIX) {
            if !t.is_empty() {
                return Namespace::Sorted(t);
            }
        }
        if bucket.starts_with("__") {
            return Namespace::System(bucket);
        }
        Namespace::Content(bucket)
    }

    /// Short label for listings.
    pub fn kind(&self) -> &'static str {
        match self {
            Namespace::System(_) => "system",
            Namespace::Index(_) => "index",
            Namespace::Sorted(_) => "sorted",
            Namespace::Content(_) => "content",
        }
    }
}

/// The full set of buckets to provision at schema-init time.
///
/// Built up before the store is opened and handed to `init_schema`; there is
/// no process-wide registry to append to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Registered content types; each gets a primary and a `__sorted` bucket
    pub content_types: BTreeSet<String>,
    /// Additional buckets, system tables included
    pub buckets: BTreeSet<String>,
}

impl SchemaConfig {
    /// An empty schema: no content types, no system buckets.
    pub fn empty() -> Self {
        Self {
            content_types: BTreeSet::new(),
            buckets: BTreeSet::new(),
        }
    }

    pub fn with_content_type(mut self, name: impl Into<String>) -> Self {
        self.content_types.insert(name.into());
        self
    }

    pub fn with_bucket(mut self, name: impl Into<String>) -> Self {
        self.buckets.insert(name.into());
        self
    }

    /// Every bucket name this schema provisions, deduplicated and sorted.
    pub fn bucket_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for t in &self.content_types {
            names.insert(t.clone());
            names.insert(sorted(t));
        }
        names.extend(self.buckets.iter().cloned());
        names.into_iter().collect()
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            content_types: BTreeSet::new(),
            buckets: SYSTEM_BUCKETS.iter().map(|s| s.to_string()).collect(),
        }
    }
}
