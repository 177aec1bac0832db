//! Streaming classification of current-side rows against a snapshot index

use crate::config::{DatasetConfig, ModifiedOutputFormat, ModifiedOutputSettings};
use crate::error::{Result, Side};
use crate::hash::{Digest, RowHashPair, RowHasher};
use crate::row_source::Row;
use crate::snapshot::{SnapshotEntry, SnapshotIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Added,
    Modified,
    Unmodified,
    Deleted,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Added,
        Classification::Modified,
        Classification::Deleted,
        Classification::Unmodified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Added => "Added",
            Classification::Modified => "Modified",
            Classification::Unmodified => "Unmodified",
            Classification::Deleted => "Deleted",
        }
    }

    /// Name of the output this classification is written to, e.g. `studentsAdded`
    pub fn output_name(&self, dataset: &str) -> String {
        format!("{}{}", dataset, self.as_str())
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Previous-dataset keys not yet matched by a current row
#[derive(Debug, Default)]
pub struct UnattestedSet {
    keys: HashSet<Digest>,
}

impl UnattestedSet {
    pub fn from_index(index: &SnapshotIndex) -> Self {
        Self {
            keys: index.keys().copied().collect(),
        }
    }

    /// Mark a key as seen on the current side. Returns whether it was still pending.
    pub fn attest(&mut self, primary_key_hash: &Digest) -> bool {
        self.keys.remove(primary_key_hash)
    }

    pub fn contains(&self, primary_key_hash: &Digest) -> bool {
        self.keys.contains(primary_key_hash)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Classify one hashed current-side row.
///
/// The key leaves `unattested` whether or not it was present there.
pub fn classify(
    pair: &RowHashPair,
    index: &SnapshotIndex,
    unattested: &mut UnattestedSet,
) -> Classification {
    unattested.attest(&pair.primary_key_hash);

    match index.get(&pair.primary_key_hash) {
        None => Classification::Added,
        Some(entry) if entry.full_row_hash != pair.full_row_hash => Classification::Modified,
        Some(_) => Classification::Unmodified,
    }
}

/// Per-classification row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub added: u64,
    pub modified: u64,
    pub unmodified: u64,
    pub deleted: u64,
}

impl ClassificationCounts {
    pub fn record(&mut self, classification: Classification) {
        match classification {
            Classification::Added => self.added += 1,
            Classification::Modified => self.modified += 1,
            Classification::Unmodified => self.unmodified += 1,
            Classification::Deleted => self.deleted += 1,
        }
    }

    pub fn get(&self, classification: Classification) -> u64 {
        match classification {
            Classification::Added => self.added,
            Classification::Modified => self.modified,
            Classification::Unmodified => self.unmodified,
            Classification::Deleted => self.deleted,
        }
    }

    /// Rows seen on the current side
    pub fn current_rows(&self) -> u64 {
        self.added + self.modified + self.unmodified
    }

    pub fn has_changes(&self) -> bool {
        self.added + self.modified + self.deleted > 0
    }
}

/// A classified row together with the values to write for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRow {
    pub classification: Classification,
    pub row: Row,
}

/// Owns one dataset's index and unattested set for the classification pass
#[derive(Debug)]
pub struct DiffClassifier {
    index: SnapshotIndex,
    unattested: UnattestedSet,
    hasher: RowHasher,
    headers: Row,
    /// For each current column, its position in the previous header
    previous_positions: Vec<Option<usize>>,
    modified_output: ModifiedOutputSettings,
    counts: ClassificationCounts,
}

impl DiffClassifier {
    /// Resolve the primary key against the current header and take ownership of `index`
    pub fn new(index: SnapshotIndex, headers: Row, config: &DatasetConfig) -> Result<Self> {
        let hasher = RowHasher::resolve(&headers, &config.primary_key_columns, Side::Current)?;
        let previous_positions = headers
            .iter()
            .map(|name| index.headers().iter().position(|old| old == name))
            .collect();
        let unattested = UnattestedSet::from_index(&index);

        Ok(Self {
            index,
            unattested,
            hasher,
            headers,
            previous_positions,
            modified_output: config.modified_output.clone(),
            counts: ClassificationCounts::default(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn counts(&self) -> ClassificationCounts {
        self.counts
    }

    /// Previous keys still waiting for a match
    pub fn unattested(&self) -> &UnattestedSet {
        &self.unattested
    }

    pub fn classify(&mut self, row: Row) -> ClassifiedRow {
        let pair = self.hasher.hash(&row);
        let classification = classify(&pair, &self.index, &mut self.unattested);
        self.counts.record(classification);

        let row = match (classification, self.index.get(&pair.primary_key_hash)) {
            (Classification::Modified, Some(previous)) => self.modified_row(row, previous),
            _ => row,
        };

        ClassifiedRow {
            classification,
            row,
        }
    }

    /// Close the pass and hand back every previous row no current row matched,
    /// in previous-dataset order.
    pub fn finish(self) -> (Vec<Row>, ClassificationCounts) {
        let Self {
            index,
            unattested,
            mut counts,
            ..
        } = self;

        let deleted: Vec<Row> = index
            .into_entries()
            .filter(|entry| unattested.contains(&entry.primary_key_hash))
            .map(|entry| entry.raw_row)
            .collect();
        counts.deleted = deleted.len() as u64;

        (deleted, counts)
    }

    fn modified_row(&self, current: Row, previous: &SnapshotEntry) -> Row {
        match self.modified_output.output_format {
            ModifiedOutputFormat::NewRowAll => current,
            // Columns the previous header lacks stay empty to keep alignment
            ModifiedOutputFormat::OldRowAll => self
                .previous_positions
                .iter()
                .map(|pos| {
                    pos.and_then(|idx| previous.raw_row.get(idx).cloned())
                        .unwrap_or_default()
                })
                .collect(),
            ModifiedOutputFormat::NewRowChangedOnly => self.changed_only(current, previous, false),
            ModifiedOutputFormat::OldRowChangedOnly => self.changed_only(current, previous, true),
        }
    }

    /// Key columns are always written; other columns carry the sentinel when unchanged
    fn changed_only(&self, current: Row, previous: &SnapshotEntry, use_previous: bool) -> Row {
        let sentinel = self.modified_output.unmodified_value();

        current
            .into_iter()
            .enumerate()
            .map(|(idx, value)| {
                if self.hasher.is_key_column(idx) {
                    return value;
                }

                let old = self
                    .previous_positions
                    .get(idx)
                    .copied()
                    .flatten()
                    .and_then(|pos| previous.raw_row.get(pos));

                match old {
                    Some(old) if *old == value => sentinel.to_string(),
                    Some(old) if use_previous => old.clone(),
                    None if use_previous => String::new(),
                    _ => value,
                }
            })
            .collect()
    }
}
