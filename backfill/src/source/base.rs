use std::future::Future;

use tokio::process::Command;

use crate::error::BackfillResult;
use crate::types::{ColumnSet, ReplicationJob};

/// Database rows are read from.
///
/// Metadata, counts and the checkpoint are read in-process. The table contents are exported
/// by an external process so that they never pass through this process' memory.
pub trait SourceDatabase {
    /// Returns the name of the source, used in logs.
    fn name() -> &'static str;

    /// Returns the columns of `table` in ordinal order.
    fn table_columns(&self, table: &str) -> impl Future<Output = BackfillResult<ColumnSet>> + Send;

    /// Counts the rows of `table`.
    fn row_count(&self, table: &str) -> impl Future<Output = BackfillResult<u64>> + Send;

    /// Returns the maximum of `column` in `table` as text, `0` when the table is empty.
    fn checkpoint(
        &self,
        table: &str,
        column: &str,
    ) -> impl Future<Output = BackfillResult<String>> + Send;

    /// Builds the process writing the reconciled columns of the job's source table to stdout.
    ///
    /// Rows are tab separated with optional double quote enclosure and no header.
    fn export_command(&self, job: &ReplicationJob) -> Command;
}
