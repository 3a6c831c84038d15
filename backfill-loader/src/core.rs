use backfill::destination::memsql::MemSqlDestination;
use backfill::identifier::ReservedKeywords;
use backfill::orchestrator::{BackfillSummary, ReplicationOrchestrator, RunSettings};
use backfill::source::postgres::PostgresSource;
use backfill_config::shared::{BackfillConfig, MemSqlConnectionConfig, PgConnectionConfig};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::error::{LoaderError, LoaderResult};

/// Connects both databases and reloads every configured table.
///
/// SIGINT and SIGTERM stop the run. The in-flight table stream is dropped, which kills its
/// processes, removes its conduit and closes the destination session so the server rolls back
/// the open transaction.
pub async fn start_backfill_with_config(config: BackfillConfig) -> LoaderResult<BackfillSummary> {
    info!("starting backfill");

    log_config(&config);

    let settings = RunSettings::from_config(&config)?;
    let keywords = ReservedKeywords::new(&config.reserved_keywords);
    let source = PostgresSource::connect(config.source.clone(), keywords.clone()).await?;
    let destination = MemSqlDestination::connect(config.destination.clone(), keywords).await?;

    let mut orchestrator = ReplicationOrchestrator::with_settings(source, destination, settings);

    let mut sigterm = signal(SignalKind::terminate())?;
    let summary = tokio::select! {
        result = orchestrator.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("sigint (ctrl+c) received, stopping backfill");
            return Err(LoaderError::Interrupted("sigint"));
        }
        _ = sigterm.recv() => {
            warn!("sigterm received, stopping backfill");
            return Err(LoaderError::Interrupted("sigterm"));
        }
    };

    for report in summary.mismatches() {
        warn!(
            table = %report.mapping,
            source_rows = report.source_rows,
            destination_rows = report.destination_rows,
            "table loaded with a row count mismatch"
        );
    }

    Ok(summary)
}

fn log_config(config: &BackfillConfig) {
    debug!(
        tables = ?config.tables,
        compression = config.compression,
        checkpoint_table = config.checkpoint.table,
        checkpoint_column = config.checkpoint.column,
        reserved_keywords = ?config.reserved_keywords,
        fail_on_count_mismatch = config.fail_on_count_mismatch,
        "backfill config"
    );
    log_source_config(&config.source);
    log_destination_config(&config.destination);
}

fn log_source_config(config: &PgConnectionConfig) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        schema = config.schema,
        username = config.username,
        "source postgres connection config"
    );
}

fn log_destination_config(config: &MemSqlConnectionConfig) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        "destination memsql connection config"
    );
}
