//! Core value types shared by the backfill components.

use std::collections::HashSet;
use std::fmt;

use crate::bail;
use crate::error::{BackfillResult, ErrorKind};

/// Separator between source and destination names in a table entry.
pub const TABLE_ENTRY_SEPARATOR: char = ':';

/// Pairs a source table with the destination table it is loaded into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableMapping {
    source_name: String,
    destination_name: String,
}

impl TableMapping {
    pub fn new(source_name: impl Into<String>, destination_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            destination_name: destination_name.into(),
        }
    }

    /// Maps a table onto the destination table of the same name.
    pub fn same_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name)
    }

    /// Parses a `source` or `source:destination` entry.
    pub fn parse(entry: &str) -> BackfillResult<Self> {
        let parts = entry.split(TABLE_ENTRY_SEPARATOR).map(str::trim).collect::<Vec<_>>();

        match parts.as_slice() {
            [source] if !source.is_empty() => Ok(Self::same_name(*source)),
            [source, destination] if !source.is_empty() && !destination.is_empty() => {
                Ok(Self::new(*source, *destination))
            }
            _ => bail!(
                ErrorKind::ConfigError,
                "Invalid table entry",
                format!("`{entry}` is not of the form `source` or `source:destination`")
            ),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn destination_name(&self) -> &str {
        &self.destination_name
    }
}

impl fmt::Display for TableMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source_name == self.destination_name {
            f.write_str(&self.source_name)
        } else {
            write!(f, "{} -> {}", self.source_name, self.destination_name)
        }
    }
}

/// Ordered list of column names.
///
/// The order drives both the export projection and the import binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet(Vec<String>);

impl ColumnSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self(columns)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|c| c == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` when both sets hold the same names, regardless of order.
    pub fn same_names(&self, other: &ColumnSet) -> bool {
        let left = self.0.iter().collect::<HashSet<_>>();
        let right = other.0.iter().collect::<HashSet<_>>();

        self.len() == other.len() && left == right
    }
}

impl From<Vec<String>> for ColumnSet {
    fn from(columns: Vec<String>) -> Self {
        Self(columns)
    }
}

impl<S: Into<String>> FromIterator<S> for ColumnSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ColumnSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Everything needed to move one table.
#[derive(Debug, Clone)]
pub struct ReplicationJob {
    pub mapping: TableMapping,
    /// Reconciled columns in destination order.
    pub columns: ColumnSet,
    /// Reconciled columns stored as the boolean surrogate type in the destination.
    pub boolean_columns: ColumnSet,
    /// Source row count taken before the destination transaction opened.
    pub source_row_count: u64,
    /// Destination row count taken after the load committed.
    pub destination_row_count: Option<u64>,
}

impl ReplicationJob {
    pub fn new(
        mapping: TableMapping,
        columns: ColumnSet,
        boolean_columns: ColumnSet,
        source_row_count: u64,
    ) -> Self {
        Self {
            mapping,
            columns,
            boolean_columns,
            source_row_count,
            destination_row_count: None,
        }
    }

    pub fn is_boolean(&self, column: &str) -> bool {
        self.boolean_columns.contains(column)
    }
}

/// The source position captured before any table is loaded.
///
/// Rows written to the source after this point are not guaranteed to be part of the load;
/// the continuous stream has to start from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCheckpoint {
    pub table: String,
    pub column: String,
    pub value: String,
}

impl fmt::Display for SourceCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_plain_and_renamed_entries() {
        assert_eq!(
            TableMapping::parse("blocks").unwrap(),
            TableMapping::same_name("blocks")
        );
        assert_eq!(
            TableMapping::parse("receipts:receipts_v2").unwrap(),
            TableMapping::new("receipts", "receipts_v2")
        );
    }

    #[test]
    fn parse_rejects_malformed_entries() {
        for entry in ["", "a:", ":b", "a:b:c"] {
            let err = TableMapping::parse(entry).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigError, "entry {entry:?}");
        }
    }

    #[test]
    fn same_names_ignores_order() {
        let left: ColumnSet = ["id", "balance"].into_iter().collect();
        let right: ColumnSet = ["balance", "id"].into_iter().collect();
        let other: ColumnSet = ["id"].into_iter().collect();

        assert!(left.same_names(&right));
        assert!(!left.same_names(&other));
        assert_ne!(left, right);
    }
}
