//! Index entries
//!
//! An index is a disposable `__index_<namespace>` bucket mapping lookup keys
//! to JSON values. Writing an index entry is a separate write from the record
//! it points at; there is no cross-bucket atomicity.

use crate::namespace;
use crate::{Repository, Result};
use serde::Serialize;

/// Raw JSON value stored at `key` in the index namespace
pub fn get_index(repo: &dyn Repository, ns: &str, key: &str) -> Result<Option<Vec<u8>>> {
    repo.get(&namespace::index(ns), key.as_bytes())
}

/// Store `value` as JSON at `key` in the index namespace
pub fn set_index<T: Serialize + ?Sized>(
    repo: &dyn Repository,
    ns: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_vec(value)?;
    repo.update(&namespace::index(ns), key.as_bytes(), &json)
}

pub fn delete_index(repo: &dyn Repository, ns: &str, key: &str) -> Result<()> {
    repo.delete(&namespace::index(ns), key.as_bytes())
}

/// Remove the whole index namespace
pub fn drop_index(repo: &dyn Repository, ns: &str) -> Result<()> {
    repo.delete_bucket(&namespace::index(ns))
}
