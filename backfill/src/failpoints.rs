use fail::fail_point;

use crate::bail;
use crate::error::{BackfillResult, ErrorKind};

pub const TRANSACTION_AFTER_DELETE: &str = "transaction.after_delete";
pub const PIPELINE_BEFORE_LOAD_WAIT: &str = "pipeline.before_load_wait";

pub fn backfill_fail_point(name: &str) -> BackfillResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("pipeline") => ErrorKind::PipelineStageFailed,
            Some("transaction") => ErrorKind::DestinationTransactionFailed,
            _ => ErrorKind::FailpointTriggered,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
