//! Shared types and utilities for rusty-assets.
//!
//! This crate provides common functionality used across all rusty-assets crates:
//! - Asset kinds and local asset references
//! - SHA-1 content digests (blocking and async streaming)
//! - Generic progress callback trait
//! - Archive-relative path helpers
//! - Shared constants and error types

pub mod asset;
pub mod constants;
pub mod error;
pub mod hash;
pub mod path_utils;
pub mod progress;

// Re-export commonly used items at crate root
pub use asset::{AssetKind, LocalAsset};
pub use constants::*;
pub use error::PathError;
pub use hash::{hash_bytes, hash_file_async, Sha1Hasher, DIGEST_HEX_LEN};
pub use path_utils::{
    is_within_root, lexical_normalize, relative_posix_path, resolve_relative_path, to_posix_path,
};
pub use progress::{progress_fn, FnProgress, NoOpProgress, ProgressCallback};
