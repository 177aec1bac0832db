//! Lazy row reader over a delimited byte stream
//!
//! A [`RowSource`] yields `Ok(row)` for every usable record, `None` once the
//! stream is exhausted and `Some(Err(..))` when the underlying reader breaks.
//! Blank lines and records that cannot be decoded are skipped and counted;
//! they never end the sequence.

use crate::config::CsvFormat;
use crate::error::Result;
use std::io::{self, Cursor, Read};

/// An ordered sequence of field values
pub type Row = Vec<String>;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Counters kept while reading a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowSourceStats {
    /// Rows handed to the caller, header included
    pub rows: u64,
    /// Lines whose fields were all empty
    pub blank_skipped: u64,
    /// Records that could not be decoded
    pub malformed_skipped: u64,
}

impl RowSourceStats {
    pub fn skipped(&self) -> u64 {
        self.blank_skipped + self.malformed_skipped
    }
}

pub struct RowSource<R: Read> {
    reader: csv::Reader<io::Chain<Cursor<Vec<u8>>, R>>,
    record: csv::ByteRecord,
    stats: RowSourceStats,
    label: String,
    finished: bool,
}

impl<R: Read> RowSource<R> {
    /// Wrap a byte stream, consuming a leading UTF-8 byte-order mark if present
    pub fn new(inner: R, format: &CsvFormat) -> Result<Self> {
        let mut inner = inner;
        let prefix = read_prefix(&mut inner)?;
        let prefix = if prefix == UTF8_BOM { Vec::new() } else { prefix };

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(format.delimiter_byte()?)
            .quote(format.quote_byte()?)
            .from_reader(Cursor::new(prefix).chain(inner));

        Ok(Self {
            reader,
            record: csv::ByteRecord::new(),
            stats: RowSourceStats::default(),
            label: String::from("input"),
            finished: false,
        })
    }

    /// Name used in skip log lines
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn stats(&self) -> RowSourceStats {
        self.stats
    }

    fn decode(&self) -> Option<Row> {
        self.record
            .iter()
            .map(|field| std::str::from_utf8(field).ok().map(str::to_owned))
            .collect()
    }
}

impl<R: Read> Iterator for RowSource<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(false) => self.finished = true,
                Ok(true) => {
                    let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                    match self.decode() {
                        Some(row) if is_blank(&row) => {
                            self.stats.blank_skipped += 1;
                            log::debug!("{}: blank line {} skipped", self.label, line);
                        }
                        Some(row) => {
                            self.stats.rows += 1;
                            return Some(Ok(row));
                        }
                        None => {
                            self.stats.malformed_skipped += 1;
                            log::warn!("{}: CSV row skipped at line {}: invalid UTF-8", self.label, line);
                        }
                    }
                }
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
                Err(e) => {
                    self.stats.malformed_skipped += 1;
                    log::warn!("{}: CSV row skipped: {}", self.label, e);
                }
            }
        }
        None
    }
}

fn is_blank(row: &Row) -> bool {
    row.iter().all(|field| field.trim().is_empty())
}

/// Read up to three bytes, tolerating short reads
fn read_prefix<R: Read>(inner: &mut R) -> io::Result<Vec<u8>> {
    let mut buf = [0u8; 3];
    let mut filled = 0;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(buf[..filled].to_vec())
}
