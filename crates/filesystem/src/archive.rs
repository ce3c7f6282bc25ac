//! Tar and gzip handling for import sources and export destinations.
//!
//! Import inputs are sniffed rather than trusted by extension: a stream may
//! or may not be gzip-compressed, and may or may not be a tar archive.
//! Extraction never writes outside the destination directory.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusty_assets_common::{to_posix_path, TAR_PEEK_SIZE};
use walkdir::WalkDir;

use crate::error::FileSystemError;

/// Gzip member magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Offset of the `ustar` magic inside a tar header block.
const TAR_MAGIC_OFFSET: usize = 257;

/// POSIX tar magic.
const TAR_MAGIC: &[u8] = b"ustar";

/// Archive format of an export destination, derived from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Plain tar.
    Tar,
    /// Gzip-compressed tar.
    TarGz,
}

impl ArchiveFormat {
    /// Detect the archive format from a destination path.
    ///
    /// # Returns
    /// `None` if the path does not name an archive (a plain directory).
    pub fn from_path(path: &Path) -> Option<Self> {
        let name: String = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }
}

/// Check whether a prefix starts with the gzip magic.
pub fn is_gzip(prefix: &[u8]) -> bool {
    prefix.starts_with(&GZIP_MAGIC)
}

/// Check whether a prefix contains a POSIX tar header.
pub fn is_tar(prefix: &[u8]) -> bool {
    prefix.len() >= TAR_MAGIC_OFFSET + TAR_MAGIC.len()
        && &prefix[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == TAR_MAGIC
}

/// Wrap a reader in a gzip decoder if its first bytes are the gzip magic.
///
/// Uncompressed streams are passed through unchanged.
///
/// # Arguments
/// * `reader` - Raw input stream
///
/// # Errors
/// Returns error if the stream cannot be peeked.
pub fn decompress_maybe<R: Read + 'static>(reader: R) -> std::io::Result<Box<dyn Read>> {
    let mut buffered: BufReader<R> = BufReader::new(reader);
    let compressed: bool = is_gzip(buffered.fill_buf()?);

    if compressed {
        Ok(Box::new(GzDecoder::new(buffered)))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Unpack a stream into `destination` if it is a tar archive.
///
/// Peeks up to [`TAR_PEEK_SIZE`] bytes to detect the tar header, then
/// replays them in front of the rest of the stream. Entries whose paths
/// would escape `destination` are skipped by the unpacker.
///
/// # Arguments
/// * `reader` - Decompressed input stream
/// * `destination` - Existing directory to unpack into
/// * `label` - Source name used in error messages
///
/// # Returns
/// `true` if the stream was a tar archive and was unpacked.
pub fn unpack_maybe<R: Read>(
    mut reader: R,
    destination: &Path,
    label: &str,
) -> Result<bool, FileSystemError> {
    let mut prefix: Vec<u8> = Vec::with_capacity(TAR_PEEK_SIZE);
    reader
        .by_ref()
        .take(TAR_PEEK_SIZE as u64)
        .read_to_end(&mut prefix)
        .map_err(|e| FileSystemError::InvalidArchive {
            path: label.to_string(),
            message: e.to_string(),
        })?;

    if !is_tar(&prefix) {
        return Ok(false);
    }

    let mut archive = tar::Archive::new(Cursor::new(prefix).chain(reader));
    archive.set_preserve_permissions(false);
    archive
        .unpack(destination)
        .map_err(|e| FileSystemError::InvalidArchive {
            path: label.to_string(),
            message: e.to_string(),
        })?;

    Ok(true)
}

/// Pack a directory tree into a tar archive.
///
/// Entries are added in sorted order with paths relative to `source_dir`,
/// so the same tree always produces the same entry list.
///
/// # Arguments
/// * `source_dir` - Directory whose contents become the archive root
/// * `archive_path` - Archive file to create
/// * `format` - Plain or gzip-compressed tar
pub fn pack_directory(
    source_dir: &Path,
    archive_path: &Path,
    format: ArchiveFormat,
) -> Result<(), FileSystemError> {
    let file: File = File::create(archive_path)
        .map_err(|e| FileSystemError::from_io(archive_path.display().to_string(), e))?;

    match format {
        ArchiveFormat::Tar => {
            let file: File = write_tree(file, source_dir, archive_path)?;
            file.sync_all()
                .map_err(|e| FileSystemError::from_io(archive_path.display().to_string(), e))
        }
        ArchiveFormat::TarGz => {
            let encoder: GzEncoder<File> = GzEncoder::new(file, Compression::default());
            let encoder: GzEncoder<File> = write_tree(encoder, source_dir, archive_path)?;
            let file: File = encoder
                .finish()
                .map_err(|e| FileSystemError::from_io(archive_path.display().to_string(), e))?;
            file.sync_all()
                .map_err(|e| FileSystemError::from_io(archive_path.display().to_string(), e))
        }
    }
}

/// Append every entry below `source_dir` to a tar stream.
fn write_tree<W: Write>(
    writer: W,
    source_dir: &Path,
    archive_path: &Path,
) -> Result<W, FileSystemError> {
    let to_archive_error = |e: std::io::Error| FileSystemError::InvalidArchive {
        path: archive_path.display().to_string(),
        message: e.to_string(),
    };

    let mut builder: tar::Builder<W> = tar::Builder::new(writer);
    builder.mode(tar::HeaderMode::Deterministic);

    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry: walkdir::DirEntry = entry?;
        let relative: &Path = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| FileSystemError::InvalidArchive {
                path: entry.path().display().to_string(),
                message: "entry outside source directory".to_string(),
            })?;
        let name: String = to_posix_path(relative);

        if entry.file_type().is_dir() {
            builder
                .append_dir(&name, entry.path())
                .map_err(to_archive_error)?;
        } else if entry.file_type().is_file() {
            builder
                .append_path_with_name(entry.path(), &name)
                .map_err(to_archive_error)?;
        }
    }

    builder.into_inner().map_err(to_archive_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_tree_fixture(root: &Path) {
        std::fs::create_dir_all(root.join("images")).unwrap();
        std::fs::write(root.join("images/a.jpg"), b"aaa").unwrap();
        std::fs::write(root.join("data.ndjson"), b"{}\n").unwrap();
    }

    #[test]
    fn test_archive_format_from_path() {
        assert_eq!(
            ArchiveFormat::from_path(Path::new("/out/export.tar.gz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("export.TGZ")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("export.tar")),
            Some(ArchiveFormat::Tar)
        );
        assert_eq!(ArchiveFormat::from_path(Path::new("/out/export")), None);
    }

    #[test]
    fn test_is_gzip() {
        assert!(is_gzip(&[0x1f, 0x8b, 0x08]));
        assert!(!is_gzip(b"ustar"));
        assert!(!is_gzip(&[]));
    }

    #[test]
    fn test_is_tar_requires_full_header_prefix() {
        let mut block: Vec<u8> = vec![0u8; 512];
        block[257..262].copy_from_slice(b"ustar");
        assert!(is_tar(&block));
        assert!(!is_tar(&block[..200]));
        assert!(!is_tar(&vec![0u8; 512]));
    }

    #[test]
    fn test_pack_and_unpack_tar_gz() {
        let source: TempDir = TempDir::new().unwrap();
        write_tree_fixture(source.path());

        let out: TempDir = TempDir::new().unwrap();
        let archive_path: PathBuf = out.path().join("export.tar.gz");
        pack_directory(source.path(), &archive_path, ArchiveFormat::TarGz).unwrap();

        let reader: Box<dyn Read> = decompress_maybe(File::open(&archive_path).unwrap()).unwrap();
        let dest: TempDir = TempDir::new().unwrap();
        assert!(unpack_maybe(reader, dest.path(), "export.tar.gz").unwrap());

        assert_eq!(std::fs::read(dest.path().join("images/a.jpg")).unwrap(), b"aaa");
        assert!(dest.path().join("data.ndjson").is_file());
    }

    #[test]
    fn test_unpack_plain_tar() {
        let source: TempDir = TempDir::new().unwrap();
        write_tree_fixture(source.path());

        let out: TempDir = TempDir::new().unwrap();
        let archive_path: PathBuf = out.path().join("export.tar");
        pack_directory(source.path(), &archive_path, ArchiveFormat::Tar).unwrap();

        let reader: Box<dyn Read> = decompress_maybe(File::open(&archive_path).unwrap()).unwrap();
        let dest: TempDir = TempDir::new().unwrap();
        assert!(unpack_maybe(reader, dest.path(), "export.tar").unwrap());
        assert!(dest.path().join("images/a.jpg").is_file());
    }

    #[test]
    fn test_unpack_maybe_ignores_non_tar() {
        let dest: TempDir = TempDir::new().unwrap();
        let unpacked: bool =
            unpack_maybe(Cursor::new(b"just some bytes".to_vec()), dest.path(), "x").unwrap();
        assert!(!unpacked);
        assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_decompress_maybe_passes_through_plain_stream() {
        let mut reader: Box<dyn Read> =
            decompress_maybe(Cursor::new(b"plain".to_vec())).unwrap();
        let mut out: String = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "plain");
    }

    #[test]
    fn test_decompress_maybe_inflates_gzip() {
        let mut encoder: GzEncoder<Vec<u8>> = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"compressed payload").unwrap();
        let bytes: Vec<u8> = encoder.finish().unwrap();

        let mut reader: Box<dyn Read> = decompress_maybe(Cursor::new(bytes)).unwrap();
        let mut out: String = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "compressed payload");
    }
}
