//! Row hashing for primary-key identity and full-row content

use crate::error::{Result, RowdiffError, Side};
use blake3::Hasher;

/// A 32-byte blake3 digest
pub type Digest = blake3::Hash;

/// Identity and content hashes of one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowHashPair {
    pub primary_key_hash: Digest,
    pub full_row_hash: Digest,
}

/// Hash a row given the positions of its primary-key columns.
///
/// Key values are fed in `key_columns` order; the full-row hash covers every
/// field in column order. A key position past the end of a short row hashes
/// as an empty value.
pub fn hash_row(row: &[String], key_columns: &[usize]) -> RowHashPair {
    let key_values = key_columns
        .iter()
        .map(|&idx| row.get(idx).map(String::as_str).unwrap_or(""));

    RowHashPair {
        primary_key_hash: hash_values(key_values),
        full_row_hash: hash_values(row.iter().map(String::as_str)),
    }
}

fn hash_values<'a>(values: impl Iterator<Item = &'a str>) -> Digest {
    let mut hasher = Hasher::new();
    for value in values {
        // Length prefix keeps ["ab", "c"] and ["a", "bc"] apart
        hasher.update(&(value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.finalize()
}

/// Primary-key positions resolved once against a header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHasher {
    key_columns: Vec<usize>,
}

impl RowHasher {
    /// Resolve key column names against `headers`.
    ///
    /// Fails on the first name the header does not contain.
    pub fn resolve(headers: &[String], primary_key_columns: &[String], side: Side) -> Result<Self> {
        let key_columns = primary_key_columns
            .iter()
            .map(|name| {
                headers
                    .iter()
                    .position(|header| header == name)
                    .ok_or_else(|| RowdiffError::missing_primary_key(name.clone(), side))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { key_columns })
    }

    pub fn key_columns(&self) -> &[usize] {
        &self.key_columns
    }

    pub fn is_key_column(&self, idx: usize) -> bool {
        self.key_columns.contains(&idx)
    }

    pub fn hash(&self, row: &[String]) -> RowHashPair {
        hash_row(row, &self.key_columns)
    }
}
