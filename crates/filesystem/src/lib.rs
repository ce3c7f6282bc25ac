//! File system operations for rusty-assets.
//!
//! This crate turns local import sources into something the pipelines can
//! iterate over, and writes export archives back out:
//! - `resolve_source()` - Directory/tar/tar.gz normalization and asset discovery
//! - `NdjsonLines`, `find_first()`, `read_all()` - Sidecar line access
//! - `MetadataTable` - In-memory sidecar index (first entry wins)
//! - `NdjsonWriter` - Sidecar output for exports
//! - `pack_directory()` - tar / tar.gz packing for exports

pub mod archive;
pub mod error;
pub mod ndjson;
pub mod resolver;

// Re-export main types
pub use archive::{decompress_maybe, is_gzip, is_tar, pack_directory, unpack_maybe, ArchiveFormat};
pub use error::FileSystemError;
pub use ndjson::{
    find_first, find_first_in_file, find_metadata_entry, is_entry_for, read_all,
    read_all_from_file, MetadataEntry, MetadataTable, NdjsonLines, NdjsonWriter,
};
pub use resolver::{find_metadata_file, resolve_source, ResolvedSource};
