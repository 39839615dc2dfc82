// 📂 Source Reader - fixed-column CSV, no header row
//
// Every record is kept twice: the raw text line (what goes to the error log,
// untouched) and the parsed fields (what goes to the validator). Both come
// from the same physical line so they can never drift apart.

use crate::error::{IngestError, Result};
use crate::validator::Invalid;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

// ============================================================================
// SOURCE ROW
// ============================================================================

/// One non-blank line of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// 1-based physical line number in the source file
    pub line_number: usize,

    /// Line text without its line terminator
    pub raw: String,
}

impl SourceRow {
    pub fn new(line_number: usize, raw: impl Into<String>) -> Self {
        SourceRow {
            line_number,
            raw: raw.into(),
        }
    }

    /// Parse the raw line as a single CSV record
    pub fn fields(&self) -> std::result::Result<Vec<String>, Invalid> {
        parse_record(&self.raw)
    }
}

/// Parse one line of text as a CSV record
///
/// A record never spans lines here, so an odd number of quotes means a
/// quoted field was left open and the line is unparseable.
pub fn parse_record(line: &str) -> std::result::Result<Vec<String>, Invalid> {
    if line.bytes().filter(|&b| b == b'"').count() % 2 != 0 {
        return Err(Invalid::Unparseable("unterminated quoted field".to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Ok(record.iter().map(str::to_string).collect()),
        Ok(false) => Ok(Vec::new()),
        Err(e) => Err(Invalid::Unparseable(e.to_string())),
    }
}

// ============================================================================
// SOURCE READER (streaming)
// ============================================================================

/// Line-by-line reader that also fingerprints everything it consumes
pub struct SourceReader<R> {
    reader: R,
    path: PathBuf,
    line_number: usize,
    hasher: Sha256,
    buf: String,
}

impl SourceReader<BufReader<File>> {
    /// Open a file on disk; failure is `SourceUnreadable`
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| IngestError::source_unreadable(path, e))?;
        Ok(SourceReader::new(BufReader::new(file), path))
    }
}

impl<R: BufRead> SourceReader<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        SourceReader {
            reader,
            path: path.into(),
            line_number: 0,
            hasher: Sha256::new(),
            buf: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next non-blank row, or `None` at end of file
    pub fn next_row(&mut self) -> Result<Option<SourceRow>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_line(&mut self.buf)
                .map_err(|e| IngestError::source_unreadable(&self.path, e))?;
            if read == 0 {
                return Ok(None);
            }

            self.line_number += 1;
            self.hasher.update(self.buf.as_bytes());

            let line = self
                .buf
                .strip_suffix('\n')
                .map(|l| l.strip_suffix('\r').unwrap_or(l))
                .unwrap_or(self.buf.as_str());

            if line.trim().is_empty() {
                continue;
            }

            return Ok(Some(SourceRow::new(self.line_number, line)));
        }
    }

    /// Up to `size` rows; an empty vec means the source is exhausted
    pub fn next_chunk(&mut self, size: usize) -> Result<Vec<SourceRow>> {
        let mut chunk = Vec::with_capacity(size);
        while chunk.len() < size {
            match self.next_row()? {
                Some(row) => chunk.push(row),
                None => break,
            }
        }
        Ok(chunk)
    }

    /// SHA-256 (hex) of every byte consumed so far
    pub fn checksum(&self) -> String {
        format!("{:x}", self.hasher.clone().finalize())
    }
}

impl<R: BufRead> Iterator for SourceReader<R> {
    type Item = Result<SourceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

// ============================================================================
// WHOLE-FILE READ
// ============================================================================

/// A source file read completely into memory
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub rows: Vec<SourceRow>,
    pub checksum: String,
}

/// Read every row of `path` before any processing starts
pub fn read_all(path: &Path) -> Result<SourceFile> {
    let content =
        std::fs::read_to_string(path).map_err(|e| IngestError::source_unreadable(path, e))?;

    let mut reader = SourceReader::new(content.as_bytes(), path);
    let rows = reader.by_ref().collect::<Result<Vec<_>>>()?;

    Ok(SourceFile {
        path: path.to_path_buf(),
        rows,
        checksum: reader.checksum(),
    })
}
