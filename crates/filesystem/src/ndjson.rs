//! Newline-delimited JSON sidecar access.
//!
//! The metadata sidecar holds one `{"filename": ..., "aspects": ...}` object
//! per line. Two access patterns are offered over the same line iterator:
//!
//! - **Single-match search** ([`find_first`]): stops at the first line the
//!   predicate accepts. Lines after the match are never read, so a malformed
//!   line there is never reported.
//! - **Full materialization** ([`read_all`], [`MetadataTable`]): reads the
//!   lines once so that many lookups can be served from memory. The table
//!   reports a malformed line only to lookups that would have reached it.
//!
//! Both take their reader by value and drop it before returning, so the
//! underlying handle is released exactly once whether the call matched,
//! ran out of lines, or failed.
//!
//! Duplicate filenames resolve to the **first** entry in file order in both
//! patterns.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::FileSystemError;

/// Label used in errors for readers that are not backed by a named file.
const STREAM_LABEL: &str = "<stream>";

/// One sidecar line: a filename and its opaque aspects payload.
///
/// `aspects` is `None` only when the key is missing. A present key is kept
/// as a value even when it is `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry<A> {
    /// Asset path relative to the working directory, e.g. `images/a.jpg`.
    pub filename: String,
    /// Aspects to set on the asset's documents.
    #[serde(
        default = "absent",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none",
        bound(deserialize = "A: Deserialize<'de>")
    )]
    pub aspects: Option<A>,
}

fn absent<A>() -> Option<A> {
    None
}

/// Wrap whatever the key holds, `null` included.
fn present<'de, D, A>(deserializer: D) -> Result<Option<A>, D::Error>
where
    D: Deserializer<'de>,
    A: Deserialize<'de>,
{
    A::deserialize(deserializer).map(Some)
}

impl<A> MetadataEntry<A> {
    /// Create a new entry.
    pub fn new(filename: impl Into<String>, aspects: Option<A>) -> Self {
        Self {
            filename: filename.into(),
            aspects,
        }
    }
}

/// Lazy iterator over the parsed JSON values of an NDJSON stream.
///
/// Blank lines are skipped. Each item is one parsed line or the error that
/// stopped it. The iterator is finite and cannot be rewound; start over by
/// opening the source again.
pub struct NdjsonLines<R> {
    reader: R,
    source: String,
    line_number: usize,
    buffer: String,
    finished: bool,
}

impl<R: BufRead> NdjsonLines<R> {
    /// Iterate over a buffered reader.
    pub fn new(reader: R) -> Self {
        Self::with_source(reader, STREAM_LABEL)
    }

    /// Iterate over a buffered reader, naming it in errors.
    ///
    /// # Arguments
    /// * `reader` - Buffered NDJSON input
    /// * `source` - Name reported in parse and I/O errors
    pub fn with_source(reader: R, source: impl Into<String>) -> Self {
        Self {
            reader,
            source: source.into(),
            line_number: 0,
            buffer: String::new(),
            finished: false,
        }
    }

    /// 1-based number of the last line read (0 before the first read).
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Return the first line accepted by `predicate`, deserialized as `T`.
    ///
    /// Consumes the iterator; the reader is dropped on every exit path.
    ///
    /// # Errors
    /// A parse error on any line up to and including the match.
    pub fn find_first<T, P>(mut self, mut predicate: P) -> Result<Option<T>, FileSystemError>
    where
        T: DeserializeOwned,
        P: FnMut(&Value) -> bool,
    {
        while let Some(item) = self.next() {
            let value: Value = item?;
            if predicate(&value) {
                return self.deserialize(value).map(Some);
            }
        }
        Ok(None)
    }

    /// Deserialize every line as `T`, in file order.
    ///
    /// Consumes the iterator; the reader is dropped on every exit path.
    pub fn read_all<T: DeserializeOwned>(mut self) -> Result<Vec<T>, FileSystemError> {
        let mut values: Vec<T> = Vec::new();
        while let Some(item) = self.next() {
            let value: Value = item?;
            values.push(self.deserialize(value)?);
        }
        Ok(values)
    }

    /// Convert the value of the current line, tagging errors with its position.
    fn deserialize<T: DeserializeOwned>(&self, value: Value) -> Result<T, FileSystemError> {
        serde_json::from_value(value).map_err(|e| FileSystemError::ParseError {
            path: self.source.clone(),
            line: self.line_number,
            message: e.to_string(),
        })
    }
}

impl NdjsonLines<BufReader<File>> {
    /// Open a file for line iteration.
    ///
    /// # Errors
    /// Returns `FileSystemError::IoError` if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, FileSystemError> {
        let file: File =
            File::open(path).map_err(|e| FileSystemError::from_io(path.display().to_string(), e))?;
        Ok(Self::with_source(
            BufReader::new(file),
            path.display().to_string(),
        ))
    }
}

impl<R: BufRead> Iterator for NdjsonLines<R> {
    type Item = Result<Value, FileSystemError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.buffer.clear();
            match self.reader.read_line(&mut self.buffer) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {
                    self.line_number += 1;
                    let trimmed: &str = self.buffer.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(trimmed).map_err(|e| {
                        FileSystemError::ParseError {
                            path: self.source.clone(),
                            line: self.line_number,
                            message: e.to_string(),
                        }
                    }));
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(FileSystemError::from_io(self.source.clone(), e)));
                }
            }
        }
    }
}

/// Find the first line accepted by `predicate`.
///
/// # Arguments
/// * `reader` - Buffered NDJSON input, released before this returns
/// * `predicate` - Called with each parsed line until it returns `true`
///
/// # Returns
/// The matching line deserialized as `T`, or `None` if no line matched.
pub fn find_first<T, R, P>(reader: R, predicate: P) -> Result<Option<T>, FileSystemError>
where
    T: DeserializeOwned,
    R: BufRead,
    P: FnMut(&Value) -> bool,
{
    NdjsonLines::new(reader).find_first(predicate)
}

/// Find the first line of a file accepted by `predicate`.
pub fn find_first_in_file<T, P>(path: &Path, predicate: P) -> Result<Option<T>, FileSystemError>
where
    T: DeserializeOwned,
    P: FnMut(&Value) -> bool,
{
    NdjsonLines::open(path)?.find_first(predicate)
}

/// Read every line of an NDJSON stream.
///
/// # Arguments
/// * `reader` - Buffered NDJSON input, released before this returns
pub fn read_all<T, R>(reader: R) -> Result<Vec<T>, FileSystemError>
where
    T: DeserializeOwned,
    R: BufRead,
{
    NdjsonLines::new(reader).read_all()
}

/// Read every line of an NDJSON file.
pub fn read_all_from_file<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FileSystemError> {
    NdjsonLines::open(path)?.read_all()
}

/// Check whether a parsed line is the sidecar entry for `filename`.
pub fn is_entry_for(value: &Value, filename: &str) -> bool {
    value.get("filename").and_then(Value::as_str) == Some(filename)
}

/// Scan a sidecar file for the first entry of `filename`.
///
/// This re-reads the file on every call; prefer [`MetadataTable`] when
/// looking up many assets.
pub fn find_metadata_entry<A: DeserializeOwned>(
    path: &Path,
    filename: &str,
) -> Result<Option<MetadataEntry<A>>, FileSystemError> {
    find_first_in_file(path, |value: &Value| is_entry_for(value, filename))
}

/// In-memory sidecar index keyed by filename.
///
/// Built once from a single pass over the sidecar, then read-only. Lookups
/// answer exactly as a [`find_first`] scan of the same file would: a line
/// that cannot be read stops the pass, entries before it stay available,
/// and only lookups that would have had to read past it report the error.
#[derive(Debug, Clone)]
pub struct MetadataTable<A> {
    entries: HashMap<String, Result<MetadataEntry<A>, FileSystemError>>,
    duplicates: usize,
    read_error: Option<FileSystemError>,
}

impl<A> Default for MetadataTable<A> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            duplicates: 0,
            read_error: None,
        }
    }
}

impl<A: DeserializeOwned> MetadataTable<A> {
    /// Load a sidecar file into memory.
    ///
    /// # Errors
    /// Returns `FileSystemError::IoError` if the file cannot be opened.
    /// Malformed lines do not fail the load; see [`MetadataTable::lookup`].
    pub fn load(path: &Path) -> Result<Self, FileSystemError> {
        Ok(Self::from_lines(NdjsonLines::open(path)?))
    }

    /// Build a table from a line iterator.
    ///
    /// Lines without a string `filename` are ignored, as no lookup could
    /// ever match them. The first line that fails to parse ends the pass.
    pub fn from_lines<R: BufRead>(mut lines: NdjsonLines<R>) -> Self {
        let mut table: Self = Self::default();

        while let Some(item) = lines.next() {
            let value: Value = match item {
                Ok(value) => value,
                Err(e) => {
                    log::debug!("Metadata pass stopped: {}", e);
                    table.read_error = Some(e);
                    break;
                }
            };
            let Some(filename) = value.get("filename").and_then(Value::as_str) else {
                continue;
            };

            if table.entries.contains_key(filename) {
                log::debug!(
                    "Ignoring duplicate metadata entry for {} at line {}",
                    filename,
                    lines.line_number()
                );
                table.duplicates += 1;
                continue;
            }

            let filename: String = filename.to_string();
            let entry: Result<MetadataEntry<A>, FileSystemError> = lines.deserialize(value);
            table.entries.insert(filename, entry);
        }

        table
    }
}

impl<A> MetadataTable<A> {
    /// Build a table from entries; the first entry per filename wins.
    pub fn from_entries(entries: impl IntoIterator<Item = MetadataEntry<A>>) -> Self {
        let mut table: Self = Self::default();
        for entry in entries {
            if table.entries.contains_key(&entry.filename) {
                table.duplicates += 1;
            } else {
                table.entries.insert(entry.filename.clone(), Ok(entry));
            }
        }
        table
    }

    /// Look up the entry for a filename.
    ///
    /// # Returns
    /// `Ok(None)` if the whole sidecar was read and has no entry.
    ///
    /// # Errors
    /// The entry's own conversion error, or, for a filename not seen
    /// before the pass stopped, the error that stopped it.
    pub fn lookup(&self, filename: &str) -> Result<Option<&MetadataEntry<A>>, FileSystemError> {
        match self.entries.get(filename) {
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(e)) => Err(e.clone()),
            None => match &self.read_error {
                Some(e) => Err(e.clone()),
                None => Ok(None),
            },
        }
    }

    /// Look up the aspects for a filename.
    ///
    /// # Errors
    /// Same as [`MetadataTable::lookup`].
    pub fn aspects(&self, filename: &str) -> Result<Option<&A>, FileSystemError> {
        Ok(self
            .lookup(filename)?
            .and_then(|entry| entry.aspects.as_ref()))
    }

    /// Number of distinct filenames.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lines ignored because their filename was already present.
    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }

    /// The error that ended the pass early, if any.
    pub fn read_error(&self) -> Option<&FileSystemError> {
        self.read_error.as_ref()
    }
}

/// Writes one compact JSON value per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    source: String,
    lines_written: u64,
}

impl<W: Write> NdjsonWriter<W> {
    /// Wrap a writer.
    ///
    /// # Arguments
    /// * `writer` - Destination stream
    /// * `source` - Name reported in I/O errors
    pub fn new(writer: W, source: impl Into<String>) -> Self {
        Self {
            writer,
            source: source.into(),
            lines_written: 0,
        }
    }

    /// Serialize `value` and append it as one line.
    pub fn write_line<T: Serialize>(&mut self, value: &T) -> Result<(), FileSystemError> {
        serde_json::to_writer(&mut self.writer, value).map_err(|e| FileSystemError::IoError {
            path: self.source.clone(),
            message: e.to_string(),
        })?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| FileSystemError::from_io(self.source.clone(), e))?;
        self.lines_written += 1;
        Ok(())
    }

    /// Number of lines written so far.
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W, FileSystemError> {
        self.writer
            .flush()
            .map_err(|e| FileSystemError::from_io(self.source.clone(), e))?;
        Ok(self.writer)
    }
}

impl NdjsonWriter<BufWriter<File>> {
    /// Create (or truncate) an NDJSON file.
    pub fn create(path: &Path) -> Result<Self, FileSystemError> {
        let file: File = File::create(path)
            .map_err(|e| FileSystemError::from_io(path.display().to_string(), e))?;
        Ok(Self::new(BufWriter::new(file), path.display().to_string()))
    }
}
