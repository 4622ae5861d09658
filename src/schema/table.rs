//! # Logical Table Schema
//!
//! The business view of a record: an ordered list of named, fixed-width
//! columns, some of which together form the primary key. The engine is
//! constructed with exactly one `TableSchema` and keeps it for the life of
//! the file.
//!
//! A logical column count may exceed the physical field count of an old
//! data file; the data file's schema is then aligned in memory (see
//! [`super::FileSchema::split_field`]). After alignment, logical column i
//! and physical field i cover the same bytes, so the engine indexes both
//! views with the same position.

use crate::error::{DbError, Result};

/// One logical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    length: usize,
    primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, length: usize) -> Column {
        Column {
            name: name.into(),
            length,
            primary_key: false,
        }
    }

    pub fn primary_key(name: impl Into<String>, length: usize) -> Column {
        Column {
            name: name.into(),
            length,
            primary_key: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }
}

/// The ordered set of logical columns for one table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(columns: Vec<Column>) -> TableSchema {
        TableSchema { columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| DbError::Format(format!("no column named '{name}'")))
    }

    pub fn column_length(&self, name: &str) -> Result<usize> {
        Ok(self.columns[self.column_index(name)?].length)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Positions of the columns that together form the primary key,
    /// in column order.
    pub fn primary_key_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect()
    }

    /// Build a criteria array carrying only the primary-key positions of
    /// `values`; every other position matches anything. Positions past the
    /// end of `values` stay unconstrained.
    pub fn pk_criteria(&self, values: &[String]) -> Vec<Option<String>> {
        let mut criteria = vec![None; self.columns.len()];
        for i in self.primary_key_indices() {
            if let Some(v) = values.get(i) {
                criteria[i] = Some(v.clone());
            }
        }
        criteria
    }
}
