//! Truncate and reload of one destination table.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::destination::DestinationDatabase;
use crate::error::{BackfillError, BackfillResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{TRANSACTION_AFTER_DELETE, backfill_fail_point};

/// Durations of the two phases of a table reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadTimings {
    pub delete: Duration,
    pub transfer: Duration,
}

/// Drives the destination session through a table reload.
///
/// The session runs with autocommit off. Existing rows are deleted and committed before the
/// load starts, since the load runs in its own session and would otherwise wait on the row
/// locks held by the delete. The load is committed on success. Any failure rolls back the
/// uncommitted part and restores autocommit before the error is returned. A failure before
/// the delete commit leaves the previous contents in place; a failure after it leaves the
/// table empty or partially loaded until the next run reloads it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionCoordinator;

impl TransactionCoordinator {
    pub async fn replace_table_contents<D, F>(
        &self,
        destination: &mut D,
        table: &str,
        load: F,
    ) -> BackfillResult<ReloadTimings>
    where
        D: DestinationDatabase,
        F: Future<Output = BackfillResult<()>>,
    {
        match self.reload(destination, table, load).await {
            Ok(timings) => Ok(timings),
            Err(err) => Err(self.recover(destination, table, err).await),
        }
    }

    async fn reload<D, F>(
        &self,
        destination: &mut D,
        table: &str,
        load: F,
    ) -> BackfillResult<ReloadTimings>
    where
        D: DestinationDatabase,
        F: Future<Output = BackfillResult<()>>,
    {
        destination.set_autocommit(false).await?;

        let started = Instant::now();
        destination.delete_all_rows(table).await?;

        #[cfg(feature = "failpoints")]
        backfill_fail_point(TRANSACTION_AFTER_DELETE)?;

        destination.commit().await?;
        let delete = started.elapsed();
        info!(table, duration_secs = delete.as_secs_f64(), "deleted destination rows");

        let started = Instant::now();
        load.await?;
        destination.commit().await?;
        let transfer = started.elapsed();
        info!(table, duration_secs = transfer.as_secs_f64(), "transferred table rows");

        destination.set_autocommit(true).await?;

        Ok(ReloadTimings { delete, transfer })
    }

    /// Rolls back and restores autocommit, keeping `err` as the primary error.
    async fn recover<D>(&self, destination: &mut D, table: &str, err: BackfillError) -> BackfillError
    where
        D: DestinationDatabase,
    {
        warn!(table, error = %err, "table reload failed, rolling back");

        let mut errors = vec![err];
        if let Err(rollback_err) = destination.rollback().await {
            warn!(table, error = %rollback_err, "rollback failed");
            errors.push(rollback_err);
        }
        if let Err(autocommit_err) = destination.set_autocommit(true).await {
            warn!(table, error = %autocommit_err, "failed to restore autocommit");
            errors.push(autocommit_err);
        }

        if errors.len() == 1 {
            return errors.remove(0);
        }

        BackfillError::from(errors)
    }
}
