//! Row count comparison after a table reload.

use tracing::{info, warn};

use crate::bail;
use crate::error::{BackfillResult, ErrorKind};
use crate::types::{SourceCheckpoint, TableMapping};

/// Line framing the mismatch warning so it stands out in plain logs.
const BANNER: &str = "!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!";

/// Result of comparing source and destination row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Match(u64),
    Mismatch { source: u64, destination: u64 },
}

impl VerificationOutcome {
    pub fn compare(source: u64, destination: u64) -> Self {
        if source == destination {
            VerificationOutcome::Match(source)
        } else {
            VerificationOutcome::Mismatch {
                source,
                destination,
            }
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, VerificationOutcome::Match(_))
    }
}

/// Reports row count mismatches.
///
/// The source keeps receiving writes while it is exported, so a mismatch is expected for
/// growing tables and only reported. In strict mode it fails the run instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationReporter {
    strict: bool,
}

impl VerificationReporter {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn verify(
        &self,
        mapping: &TableMapping,
        source_count: u64,
        destination_count: u64,
        checkpoint: &SourceCheckpoint,
    ) -> BackfillResult<VerificationOutcome> {
        let outcome = VerificationOutcome::compare(source_count, destination_count);

        match outcome {
            VerificationOutcome::Match(count) => {
                info!(table = %mapping, rows = count, "row counts match");
            }
            VerificationOutcome::Mismatch {
                source,
                destination,
            } => {
                warn!("{BANNER}");
                warn!(
                    table = %mapping,
                    source_rows = source,
                    destination_rows = destination,
                    checkpoint = %checkpoint,
                    "row count mismatch between source and destination"
                );
                warn!("{BANNER}");

                if self.strict {
                    bail!(
                        ErrorKind::VerificationFailed,
                        "Row counts differ after the load",
                        format!(
                            "table {mapping}: {source} source rows, {destination} destination rows"
                        )
                    );
                }
            }
        }

        Ok(outcome)
    }
}
