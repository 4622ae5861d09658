//! # Primary Key Index
//!
//! An in-memory map from composite primary key to record number, rebuilt by
//! a full scan when the database opens and maintained incrementally by
//! create and committed deletes.
//!
//! ## Key Semantics
//!
//! A `PrimaryKey` is the ordered tuple of the logical schema's primary-key
//! column values, trimmed. Equality and hashing are value-based, and empty
//! components are legal keys: legacy files predate some key columns and
//! store them as all-NUL fields.
//!
//! ## Index Guarantees
//!
//! The index is sound but not necessarily complete: `lookup` either returns
//! a record number whose row carried that key when it was indexed, or
//! nothing, in which case the caller falls back to a linear scan (and may
//! feed what it finds back into the index). Inserting an already-present
//! key keeps the existing entry; removal is exact.

use std::fmt;

use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::schema::table::TableSchema;

/// The ordered tuple of primary-key column values for one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    values: SmallVec<[String; 4]>,
}

impl PrimaryKey {
    /// Build the key for a full row of column values. Missing positions
    /// contribute empty components.
    pub fn from_values(schema: &TableSchema, values: &[String]) -> PrimaryKey {
        let components = schema
            .primary_key_indices()
            .into_iter()
            .map(|i| values.get(i).map(|v| v.trim().to_string()).unwrap_or_default())
            .collect();
        PrimaryKey { values: components }
    }

    /// Build the key from a search criteria array. Returns None unless
    /// every primary-key position carries a value; a partial key cannot be
    /// looked up and the caller must scan instead.
    pub fn from_criteria(schema: &TableSchema, criteria: &[Option<String>]) -> Option<PrimaryKey> {
        let mut components = SmallVec::new();
        for i in schema.primary_key_indices() {
            match criteria.get(i) {
                Some(Some(v)) => components.push(v.trim().to_string()),
                _ => return None,
            }
        }
        Some(PrimaryKey { values: components })
    }

    /// Expand the key back into a criteria array: primary-key positions
    /// carry the key components, everything else matches anything.
    pub fn to_criteria(&self, schema: &TableSchema) -> Vec<Option<String>> {
        let mut criteria = vec![None; schema.column_count()];
        for (component, i) in self.values.iter().zip(schema.primary_key_indices()) {
            criteria[i] = Some(component.clone());
        }
        criteria
    }

    pub fn components(&self) -> &[String] {
        &self.values
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.values.join("/"))
    }
}

/// Mutex-guarded map from primary key to record number.
#[derive(Debug, Default)]
pub struct PrimaryKeyIndex {
    entries: Mutex<HashMap<PrimaryKey, u32>>,
}

impl PrimaryKeyIndex {
    pub fn new() -> PrimaryKeyIndex {
        PrimaryKeyIndex::default()
    }

    /// Insert an entry unless the key is already mapped (first write wins).
    pub fn insert(&self, key: PrimaryKey, record_no: u32) {
        self.entries.lock().entry(key).or_insert(record_no);
    }

    /// Remove the entry for `key` if present.
    pub fn remove(&self, key: &PrimaryKey) {
        self.entries.lock().remove(key);
    }

    pub fn lookup(&self, key: &PrimaryKey) -> Option<u32> {
        self.entries.lock().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
