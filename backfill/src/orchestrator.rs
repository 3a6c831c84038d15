//! Sequential reload of every table of the catalog.

use std::time::Instant;

use backfill_config::shared::{BackfillConfig, CheckpointConfig};
use tracing::info;

use crate::catalog::Catalog;
use crate::compression::CompressionMode;
use crate::destination::DestinationDatabase;
use crate::error::BackfillResult;
use crate::pipeline::{Conduit, StreamPipeline};
use crate::schema::SchemaReconciler;
use crate::source::SourceDatabase;
use crate::transaction::{ReloadTimings, TransactionCoordinator};
use crate::types::{ReplicationJob, SourceCheckpoint, TableMapping};
use crate::verify::{VerificationOutcome, VerificationReporter};

/// Outcome of one table reload.
#[derive(Debug, Clone)]
pub struct TableReport {
    pub mapping: TableMapping,
    pub source_rows: u64,
    pub destination_rows: u64,
    pub outcome: VerificationOutcome,
    pub timings: ReloadTimings,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct BackfillSummary {
    /// Position the continuous stream has to start from.
    pub checkpoint: SourceCheckpoint,
    pub tables: Vec<TableReport>,
}

impl BackfillSummary {
    /// Returns the reports of tables whose row counts differed.
    pub fn mismatches(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|report| !report.outcome.is_match())
    }
}

/// Engine settings parsed from a [`BackfillConfig`].
///
/// Parsing only looks at the configuration, so it can run before either database is reached.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub catalog: Catalog,
    pub compression: CompressionMode,
    pub checkpoint: CheckpointConfig,
    pub reporter: VerificationReporter,
}

impl RunSettings {
    /// Parses the codec and the table entries of `config`.
    pub fn from_config(config: &BackfillConfig) -> BackfillResult<Self> {
        let compression = config.compression.parse::<CompressionMode>()?;
        let catalog = Catalog::from_entries(&config.tables)?;

        Ok(Self {
            catalog,
            compression,
            checkpoint: config.checkpoint.clone(),
            reporter: VerificationReporter::new(config.fail_on_count_mismatch),
        })
    }
}

/// Drives the reload of every table of a [`Catalog`], one table at a time.
///
/// The source checkpoint is captured once before the first table. Any table failure stops the
/// run; tables already loaded stay loaded.
#[derive(Debug)]
pub struct ReplicationOrchestrator<S, D> {
    source: S,
    destination: D,
    catalog: Catalog,
    checkpoint: CheckpointConfig,
    pipeline: StreamPipeline,
    reconciler: SchemaReconciler,
    coordinator: TransactionCoordinator,
    reporter: VerificationReporter,
}

impl<S, D> ReplicationOrchestrator<S, D>
where
    S: SourceDatabase,
    D: DestinationDatabase,
{
    pub fn new(
        source: S,
        destination: D,
        catalog: Catalog,
        compression: CompressionMode,
        checkpoint: CheckpointConfig,
        reporter: VerificationReporter,
    ) -> Self {
        Self {
            source,
            destination,
            catalog,
            checkpoint,
            pipeline: StreamPipeline::new(compression),
            reconciler: SchemaReconciler,
            coordinator: TransactionCoordinator,
            reporter,
        }
    }

    /// Builds an orchestrator from settings parsed with [`RunSettings::from_config`].
    pub fn with_settings(source: S, destination: D, settings: RunSettings) -> Self {
        Self::new(
            source,
            destination,
            settings.catalog,
            settings.compression,
            settings.checkpoint,
            settings.reporter,
        )
    }

    /// Builds an orchestrator from the run configuration.
    ///
    /// Fails with a configuration error on an unknown compression mode or a malformed table
    /// entry, before anything is read from either database.
    pub fn from_config(source: S, destination: D, config: &BackfillConfig) -> BackfillResult<Self> {
        let settings = RunSettings::from_config(config)?;

        Ok(Self::with_settings(source, destination, settings))
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Reloads every table of the catalog in order.
    pub async fn run(&mut self) -> BackfillResult<BackfillSummary> {
        let checkpoint = self.capture_checkpoint().await?;
        info!(
            source = S::name(),
            destination = D::name(),
            tables = self.catalog.len(),
            compression = %self.pipeline.compression(),
            checkpoint = %checkpoint,
            "starting backfill"
        );

        let started = Instant::now();
        let mut tables = Vec::with_capacity(self.catalog.len());
        for mapping in self.catalog.mappings().to_vec() {
            let report = self.replicate_table(&mapping, &checkpoint).await?;
            tables.push(report);
        }

        info!(
            tables = tables.len(),
            duration_secs = started.elapsed().as_secs_f64(),
            checkpoint = %checkpoint,
            "data initialization finished, start the replication stream at the checkpoint"
        );

        Ok(BackfillSummary { checkpoint, tables })
    }

    async fn capture_checkpoint(&self) -> BackfillResult<SourceCheckpoint> {
        let value = self
            .source
            .checkpoint(&self.checkpoint.table, &self.checkpoint.column)
            .await?;

        Ok(SourceCheckpoint {
            table: self.checkpoint.table.clone(),
            column: self.checkpoint.column.clone(),
            value,
        })
    }

    async fn replicate_table(
        &mut self,
        mapping: &TableMapping,
        checkpoint: &SourceCheckpoint,
    ) -> BackfillResult<TableReport> {
        info!(table = %mapping, "loading table");

        // Reconciliation only reads metadata, so a mismatch fails before any transaction.
        let schema = self
            .reconciler
            .reconcile(&self.source, &mut self.destination, mapping)
            .await?;

        let source_rows = self.source.row_count(mapping.source_name()).await?;
        let mut job = ReplicationJob::new(
            mapping.clone(),
            schema.columns,
            schema.boolean_columns,
            source_rows,
        );

        let pipeline = self.pipeline;
        let conduit = Conduit::create(mapping.destination_name(), pipeline.compression())?;
        let dump = self.source.export_command(&job);
        let load = self.destination.import_command(conduit.path(), &job);

        let timings = self
            .coordinator
            .replace_table_contents(
                &mut self.destination,
                mapping.destination_name(),
                pipeline.run(&conduit, dump, load),
            )
            .await?;
        drop(conduit);

        let destination_rows = self.destination.row_count(mapping.destination_name()).await?;
        job.destination_row_count = Some(destination_rows);

        let outcome = self
            .reporter
            .verify(mapping, source_rows, destination_rows, checkpoint)?;

        self.destination
            .analyze_table(mapping.destination_name())
            .await?;

        info!(
            table = %mapping,
            source_rows,
            destination_rows,
            delete_secs = timings.delete.as_secs_f64(),
            transfer_secs = timings.transfer.as_secs_f64(),
            "table loaded"
        );

        Ok(TableReport {
            mapping: job.mapping,
            source_rows,
            destination_rows,
            outcome,
            timings,
        })
    }
}
