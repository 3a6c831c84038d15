//! Backfill loader binary.
//!
//! Loads the configuration, initializes tracing, and reloads every configured table from
//! Postgres into MemSQL. Exits non-zero on the first failure.

use std::process::ExitCode;

use backfill_config::shared::BackfillConfig;
use backfill_telemetry::init_tracing;
use tracing::{error, info};

use crate::config::load_backfill_config;
use crate::core::start_backfill_with_config;
use crate::error::{LoaderError, LoaderResult};

mod config;
mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> LoaderResult<()> {
    let config = load_backfill_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(LoaderError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config))
}

async fn async_main(config: BackfillConfig) -> LoaderResult<()> {
    let summary = start_backfill_with_config(config).await?;

    info!(
        tables = summary.tables.len(),
        checkpoint_table = summary.checkpoint.table,
        checkpoint = %summary.checkpoint,
        "backfill finished, start the replication stream from the checkpoint"
    );

    Ok(())
}
