use std::future::Future;
use std::path::Path;

use tokio::process::Command;

use crate::error::BackfillResult;
use crate::types::{ColumnSet, ReplicationJob};

/// Database a table is reloaded into.
///
/// All statements run on one session, so autocommit state and the open transaction carry over
/// between calls. The bulk import itself runs in a separate process and therefore in a separate
/// session; it only sees what this session has committed.
pub trait DestinationDatabase {
    /// Returns the name of the destination, used in logs.
    fn name() -> &'static str;

    /// Returns the loadable columns of `table` in ordinal order.
    fn table_columns(
        &mut self,
        table: &str,
    ) -> impl Future<Output = BackfillResult<ColumnSet>> + Send;

    /// Returns the columns of `table` stored as the boolean surrogate type.
    fn boolean_columns(
        &mut self,
        table: &str,
    ) -> impl Future<Output = BackfillResult<ColumnSet>> + Send;

    /// Counts the rows of `table` as seen by this session.
    fn row_count(&mut self, table: &str) -> impl Future<Output = BackfillResult<u64>> + Send;

    /// Turns autocommit on or off for this session.
    fn set_autocommit(&mut self, enabled: bool)
    -> impl Future<Output = BackfillResult<()>> + Send;

    /// Deletes every row of `table` inside the current transaction.
    fn delete_all_rows(&mut self, table: &str) -> impl Future<Output = BackfillResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = BackfillResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = BackfillResult<()>> + Send;

    /// Refreshes the optimizer statistics of `table`.
    fn analyze_table(&mut self, table: &str) -> impl Future<Output = BackfillResult<()>> + Send;

    /// Builds the process reading the job's rows from `conduit` into the destination table.
    ///
    /// The conduit suffix tells the import which codec the stream is encoded with.
    fn import_command(&self, conduit: &Path, job: &ReplicationJob) -> Command;
}
