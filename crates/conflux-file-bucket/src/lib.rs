//! File-backed bucket for conflux transform logs
//!
//! Stores one JSON document per key under a directory named after the bucket
//! so that transform logs survive restarts.
//!
//! Features:
//! - Atomic writes (temp file + rename) on the blocking thread pool
//! - Keys are escaped into safe file names, no path traversal
//! - Optional pretty-printed documents for inspection

mod store;

pub use store::{FileBucket, FileBucketConfig};
