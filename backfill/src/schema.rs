//! Column reconciliation between the source and destination tables.

use tracing::debug;

use crate::bail;
use crate::destination::DestinationDatabase;
use crate::error::{BackfillResult, ErrorKind};
use crate::source::SourceDatabase;
use crate::types::{ColumnSet, TableMapping};

/// Columns agreed on for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledSchema {
    /// Transferred columns in destination order.
    pub columns: ColumnSet,
    /// Subset of [`ReconciledSchema::columns`] stored as booleans in the destination.
    pub boolean_columns: ColumnSet,
}

/// Computes the column set to transfer for a table mapping.
///
/// Only reads metadata; never touches table contents.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaReconciler;

impl SchemaReconciler {
    pub async fn reconcile<S, D>(
        &self,
        source: &S,
        destination: &mut D,
        mapping: &TableMapping,
    ) -> BackfillResult<ReconciledSchema>
    where
        S: SourceDatabase,
        D: DestinationDatabase,
    {
        let source_columns = source.table_columns(mapping.source_name()).await?;
        let destination_columns = destination
            .table_columns(mapping.destination_name())
            .await?;

        let columns = reconcile_columns(mapping, &source_columns, &destination_columns)?;

        let boolean_columns = destination
            .boolean_columns(mapping.destination_name())
            .await?
            .iter()
            .filter(|column| columns.contains(column))
            .collect::<ColumnSet>();

        debug!(
            table = %mapping,
            columns = %columns,
            boolean_columns = %boolean_columns,
            "reconciled table columns"
        );

        Ok(ReconciledSchema {
            columns,
            boolean_columns,
        })
    }
}

/// Intersects both column lists, keeping destination order.
///
/// Source columns missing in the destination are dropped. Fails with
/// [`ErrorKind::SchemaMismatch`] when nothing is left or when a destination column has no
/// source counterpart.
pub fn reconcile_columns(
    mapping: &TableMapping,
    source: &ColumnSet,
    destination: &ColumnSet,
) -> BackfillResult<ColumnSet> {
    let reconciled = destination
        .iter()
        .filter(|column| source.contains(column))
        .collect::<ColumnSet>();

    if reconciled.is_empty() {
        bail!(
            ErrorKind::SchemaMismatch,
            "Source and destination tables share no columns",
            format!(
                "table {mapping}: source columns [{source}], destination columns [{destination}]"
            )
        );
    }

    if !reconciled.same_names(destination) {
        let missing = destination
            .iter()
            .filter(|column| !reconciled.contains(column))
            .collect::<ColumnSet>();
        bail!(
            ErrorKind::SchemaMismatch,
            "Destination columns are missing in the source table",
            format!("table {mapping}: missing source columns [{missing}]")
        );
    }

    Ok(reconciled)
}
