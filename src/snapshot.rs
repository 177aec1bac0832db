//! Hash index over the previous run's dataset
//!
//! The index is built in one complete pass before any current-side row is
//! classified. Each primary-key hash maps to exactly one entry; when the
//! previous dataset repeats a key, the later row replaces the earlier one
//! (last write wins) and keeps the earlier row's position.

use crate::error::{Result, Side};
use crate::hash::{Digest, RowHasher};
use crate::row_source::Row;
use indexmap::IndexMap;

/// How often the progress callback fires during a build
const PROGRESS_INTERVAL: u64 = 10_000;

/// One previous-dataset row as seen by the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub primary_key_hash: Digest,
    pub full_row_hash: Digest,
    pub raw_row: Row,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Data rows consumed, header excluded
    pub rows: u64,
    /// Rows that replaced an earlier row with the same key
    pub duplicate_keys: u64,
    /// Lines the row source skipped while feeding the build
    pub source_rows_skipped: u64,
}

#[derive(Debug, Default)]
pub struct SnapshotIndex {
    headers: Row,
    entries: IndexMap<Digest, SnapshotEntry>,
    stats: SnapshotStats,
}

impl SnapshotIndex {
    /// Index of a dataset with no rows at all
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build<I>(rows: I, primary_key_columns: &[String]) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        Self::build_with_progress(rows, primary_key_columns, None)
    }

    /// Build the index, reporting the number of data rows consumed so far
    pub fn build_with_progress<I>(
        rows: I,
        primary_key_columns: &[String],
        progress_callback: Option<&dyn Fn(u64)>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        let mut rows = rows.into_iter();

        let headers = match rows.next() {
            Some(header) => header?,
            None => {
                log::warn!("Previous dataset is empty; indexing nothing");
                return Ok(Self::empty());
            }
        };

        let hasher = RowHasher::resolve(&headers, primary_key_columns, Side::Previous)?;
        let mut index = Self {
            headers,
            entries: IndexMap::new(),
            stats: SnapshotStats::default(),
        };

        for row in rows {
            index.insert(&hasher, row?);

            if index.stats.rows % PROGRESS_INTERVAL == 0 {
                if let Some(callback) = progress_callback {
                    callback(index.stats.rows);
                }
            }
        }

        if index.stats.duplicate_keys > 0 {
            log::info!(
                "Previous dataset repeated {} primary key(s); later rows were kept",
                index.stats.duplicate_keys
            );
        }
        if let Some(callback) = progress_callback {
            callback(index.stats.rows);
        }

        Ok(index)
    }

    fn insert(&mut self, hasher: &RowHasher, raw_row: Row) {
        let pair = hasher.hash(&raw_row);
        self.stats.rows += 1;

        let entry = SnapshotEntry {
            primary_key_hash: pair.primary_key_hash,
            full_row_hash: pair.full_row_hash,
            raw_row,
        };

        if self.entries.insert(pair.primary_key_hash, entry).is_some() {
            self.stats.duplicate_keys += 1;
            log::debug!(
                "Duplicate primary key at previous data row {}; replacing earlier row",
                self.stats.rows
            );
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn get(&self, primary_key_hash: &Digest) -> Option<&SnapshotEntry> {
        self.entries.get(primary_key_hash)
    }

    pub fn contains(&self, primary_key_hash: &Digest) -> bool {
        self.entries.contains_key(primary_key_hash)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Digest> {
        self.entries.keys()
    }

    /// Entries in the order their keys first appeared
    pub fn entries(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> SnapshotStats {
        self.stats
    }

    pub(crate) fn set_source_rows_skipped(&mut self, skipped: u64) {
        self.stats.source_rows_skipped = skipped;
    }

    pub(crate) fn into_entries(self) -> impl Iterator<Item = SnapshotEntry> {
        self.entries.into_values()
    }
}
