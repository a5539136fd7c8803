//! Line source and row parser
//!
//! The source is single-pass: iterating consumes the underlying reader, and
//! the file handle is closed when the iterator is dropped, whether the read
//! loop finished or bailed out early.

use bulkbench_common::{BenchError, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use super::types::Row;

/// Default field delimiter
pub const DEFAULT_DELIMITER: char = '\t';

const READ_BUFFER_BYTES: usize = 1 << 20;

/// Streams raw lines from a (possibly gzip-compressed) text file
pub struct LineSource {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource").field("path", &self.path).finish()
    }
}

impl LineSource {
    /// Open `path` for reading. Files ending in `.gz` are decompressed on the fly.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            BenchError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot open {}: {}", path.display(), e),
            ))
        })?;

        let is_gzip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

        let inner: Box<dyn Read + Send> = if is_gzip {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };

        Ok(Self {
            path,
            reader: Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, inner)),
        })
    }

    /// Wrap an in-memory or already-open reader
    pub fn from_reader(name: impl Into<PathBuf>, reader: impl BufRead + Send + 'static) -> Self {
        Self {
            path: name.into(),
            reader: Box::new(reader),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume the source as a lazy sequence of lines without terminators
    pub fn lines(self) -> Lines {
        Lines {
            inner: self.reader.lines(),
        }
    }
}

/// Iterator over the lines of a [`LineSource`]
pub struct Lines {
    inner: std::io::Lines<Box<dyn BufRead + Send>>,
}

impl Iterator for Lines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|line| {
            line.map(|mut line| {
                if line.ends_with('\r') {
                    line.pop();
                }
                line
            })
            .map_err(BenchError::from)
        })
    }
}

/// Splits lines into rows on a single-character delimiter
#[derive(Debug, Clone, Copy)]
pub struct RowParser {
    delimiter: char,
}

impl Default for RowParser {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl RowParser {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Split the header line. Its field count fixes the row arity; names are
    /// kept verbatim, empty ones included.
    pub fn parse_header(&self, line: &str) -> Vec<String> {
        self.parse(line)
    }

    /// Split a data line. Short and long lines are kept as they are.
    pub fn parse(&self, line: &str) -> Row {
        line.split(self.delimiter).map(str::to_string).collect()
    }
}
