//! The ordered list of tables a run loads.

use crate::error::BackfillResult;
use crate::types::TableMapping;

/// Tables loaded when no explicit list is configured, in load order.
pub const DEFAULT_TABLES: &[&str] = &[
    "access_keys",
    "account_changes",
    "accounts",
    "action_receipt_actions",
    "action_receipt_input_data",
    "action_receipt_output_data",
    "action_receipts",
    "blocks",
    "chunks",
    "data_receipts",
    "execution_outcome_receipts",
    "execution_outcomes",
    "receipts",
    "transaction_actions",
    "transactions",
];

/// Ordered table mappings processed by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    mappings: Vec<TableMapping>,
}

impl Catalog {
    pub fn new(mappings: Vec<TableMapping>) -> Self {
        Self { mappings }
    }

    /// Builds the catalog from configured entries, falling back to [`DEFAULT_TABLES`].
    pub fn from_entries(entries: &[String]) -> BackfillResult<Self> {
        if entries.is_empty() {
            return Ok(Self::default());
        }

        let mappings = entries
            .iter()
            .map(|entry| TableMapping::parse(entry))
            .collect::<BackfillResult<Vec<_>>>()?;

        Ok(Self::new(mappings))
    }

    pub fn mappings(&self) -> &[TableMapping] {
        &self.mappings
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(
            DEFAULT_TABLES
                .iter()
                .map(|name| TableMapping::same_name(*name))
                .collect(),
        )
    }
}
