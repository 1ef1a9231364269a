//! Larder - Bucket-namespaced key-value persistence
//!
//! This is the root workspace crate that provides integration tests.
//! The actual implementation is in the workspace member crates.

// Re-export main crates for convenience
pub use larder_storage as storage;
