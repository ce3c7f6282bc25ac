//! Content digest computation.
//!
//! Assets are deduplicated by the SHA-1 of their bytes, hex encoded
//! (40 lowercase characters). Files are always streamed through the
//! hasher in fixed-size chunks, never read whole.

use std::path::Path;

use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;

use crate::constants::READ_BUFFER_SIZE;

/// Length of a hex-encoded content digest.
pub const DIGEST_HEX_LEN: usize = 40;

/// Compute the SHA-1 digest of a byte slice.
///
/// # Arguments
/// * `data` - Bytes to hash
///
/// # Returns
/// 40-character lowercase hex string (160 bits).
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher: Sha1Hasher = Sha1Hasher::new();
    hasher.update(data);
    hasher.finish_hex()
}

/// Compute the SHA-1 digest of a file with async reads.
///
/// Each chunk read is a suspension point, so hashing many files on one
/// runtime interleaves with the network calls of other assets.
///
/// # Arguments
/// * `path` - Path to the file to hash
///
/// # Errors
/// Returns error if file cannot be read.
pub async fn hash_file_async(path: &Path) -> Result<String, std::io::Error> {
    let mut file: tokio::fs::File = tokio::fs::File::open(path).await?;
    let mut hasher: Sha1Hasher = Sha1Hasher::new();
    let mut buffer: Vec<u8> = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let bytes_read: usize = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finish_hex())
}

/// Streaming hasher for incremental SHA-1 hashing.
#[derive(Clone, Default)]
pub struct Sha1Hasher {
    inner: Sha1,
}

impl Sha1Hasher {
    /// Create a new streaming hasher.
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    /// Update the hasher with additional data.
    ///
    /// # Arguments
    /// * `data` - Bytes to add to the hash computation
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the raw 20-byte digest.
    pub fn finish(self) -> [u8; 20] {
        let mut digest: [u8; 20] = [0u8; 20];
        digest.copy_from_slice(&self.inner.finalize());
        digest
    }

    /// Finalize and return the digest as a 40-char hex string.
    pub fn finish_hex(self) -> String {
        hex::encode(self.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hash_bytes_known_value() {
        assert_eq!(
            hash_bytes(b"hello world"),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn test_hash_bytes_empty() {
        let hash: String = hash_bytes(b"");
        assert_eq!(hash, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(hash.len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn test_sha1_hasher_incremental() {
        let mut hasher: Sha1Hasher = Sha1Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finish_hex(), hash_bytes(b"hello world"));
    }

    #[tokio::test]
    async fn test_hash_file_async_spans_multiple_chunks() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let file_path: std::path::PathBuf = dir.path().join("large.bin");
        let data: Vec<u8> = (0..(READ_BUFFER_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();

        let mut file: std::fs::File = std::fs::File::create(&file_path).unwrap();
        file.write_all(&data).unwrap();
        drop(file);

        assert_eq!(hash_file_async(&file_path).await.unwrap(), hash_bytes(&data));
    }

    #[tokio::test]
    async fn test_hash_file_async_not_found() {
        let result: Result<String, std::io::Error> =
            hash_file_async(Path::new("/nonexistent/file.txt")).await;
        assert!(result.is_err());
    }
}
