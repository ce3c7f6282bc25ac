//! Shared constants used across rusty-assets crates.

/// Name of the metadata sidecar file inside an import/export archive.
pub const METADATA_FILE_NAME: &str = "data.ndjson";

/// Directory holding generic file assets.
pub const FILES_DIR: &str = "files";

/// Directory holding image assets.
pub const IMAGES_DIR: &str = "images";

/// Maximum directory depth searched for the metadata sidecar.
/// Depth 1 is the import root itself.
pub const METADATA_SEARCH_DEPTH: usize = 2;

/// Default size of the per-run worker pool.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Above this many assets the sidecar is read once into memory
/// instead of being re-scanned per asset.
pub const METADATA_MATERIALIZE_THRESHOLD: usize = 8;

/// Read buffer size for streaming hashes and copies (64KB).
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Bytes peeked from an input stream to detect a tar header.
pub const TAR_PEEK_SIZE: usize = 512;

/// Prefix for temporary extraction directories.
pub const TEMP_DIR_PREFIX: &str = "rusty-assets-import";

/// Prefix for temporary staging directories of archive exports.
pub const EXPORT_TEMP_DIR_PREFIX: &str = "rusty-assets-export";
