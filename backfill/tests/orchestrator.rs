use backfill::catalog::Catalog;
use backfill::compression::CompressionMode;
use backfill::error::ErrorKind;
use backfill::orchestrator::{ReplicationOrchestrator, RunSettings};
use backfill::test_utils::memory::{
    DestinationFault, DestinationOperation, MemoryDestination, MemorySource, MemoryTable, Row, row,
};
use backfill::types::TableMapping;
use backfill::verify::{VerificationOutcome, VerificationReporter};
use backfill_config::shared::{
    BackfillConfig, CheckpointConfig, MemSqlConnectionConfig, PgConnectionConfig,
};
use backfill_telemetry::init_test_tracing;

fn checkpoint_config() -> CheckpointConfig {
    CheckpointConfig {
        table: "blocks".to_string(),
        column: "block_height".to_string(),
    }
}

/// A source with `accounts` and the `blocks` table the checkpoint is read from.
fn source() -> MemorySource {
    let source = MemorySource::new();
    source.insert_table(
        "accounts",
        MemoryTable::new(
            &["id", "balance", "is_active"],
            vec![row(&["1", "100", "t"]), row(&["2", "200", "f"])],
        ),
    );
    source.insert_table(
        "blocks",
        MemoryTable::new(
            &["block_height", "block_hash"],
            vec![row(&["41", "a"]), row(&["42", "b"])],
        ),
    );
    source
}

fn destination() -> MemoryDestination {
    let destination = MemoryDestination::new();
    destination.insert_table(
        "accounts",
        MemoryTable::new(&["id", "balance", "is_active"], vec![row(&["9", "900", "1"])])
            .with_boolean_columns(&["is_active"]),
    );
    destination
}

fn orchestrator(
    source: &MemorySource,
    destination: &MemoryDestination,
    tables: &[&str],
    compression: CompressionMode,
) -> ReplicationOrchestrator<MemorySource, MemoryDestination> {
    let catalog = Catalog::new(tables.iter().map(|entry| TableMapping::parse(entry).unwrap()).collect());

    ReplicationOrchestrator::new(
        source.clone(),
        destination.clone(),
        catalog,
        compression,
        checkpoint_config(),
        VerificationReporter::default(),
    )
}

fn expected_accounts() -> Vec<Row> {
    vec![row(&["1", "100", "1"]), row(&["2", "200", "0"])]
}

#[tokio::test(flavor = "multi_thread")]
async fn booleans_are_decoded_and_counts_match() {
    init_test_tracing();
    let source = source();
    let destination = destination();

    let summary = orchestrator(&source, &destination, &["accounts"], CompressionMode::None)
        .run()
        .await
        .unwrap();

    assert_eq!(destination.table_rows("accounts"), expected_accounts());
    assert_eq!(summary.checkpoint.value, "42");
    assert_eq!(summary.tables.len(), 1);
    assert_eq!(summary.tables[0].outcome, VerificationOutcome::Match(2));
    assert_eq!(summary.mismatches().count(), 0);
    assert!(destination.is_autocommit());
}

#[tokio::test(flavor = "multi_thread")]
async fn every_codec_loads_the_same_rows_as_plain_streams() {
    init_test_tracing();
    let source = source();

    let plain = destination();
    orchestrator(&source, &plain, &["accounts"], CompressionMode::None)
        .run()
        .await
        .unwrap();
    assert_eq!(plain.table_rows("accounts"), expected_accounts());

    for compression in [CompressionMode::Lz4, CompressionMode::Gzip] {
        let compressed = destination();
        let summary = orchestrator(&source, &compressed, &["accounts"], compression)
            .run()
            .await
            .unwrap();

        assert_eq!(
            compressed.table_rows("accounts"),
            plain.table_rows("accounts"),
            "codec {compression}"
        );
        assert_eq!(summary.mismatches().count(), 0);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn count_mismatch_is_reported_and_later_tables_still_load() {
    init_test_tracing();
    let source = source();
    let destination = destination();
    destination.insert_table("blocks", MemoryTable::new(&["block_height", "block_hash"], vec![]));
    // Lands after the source count, so the destination ends up with one row more.
    source.push_row_during_export("blocks", row(&["43", "c"]));

    let summary = orchestrator(
        &source,
        &destination,
        &["blocks", "accounts"],
        CompressionMode::None,
    )
    .run()
    .await
    .unwrap();

    let mismatches = summary.mismatches().collect::<Vec<_>>();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].mapping, TableMapping::same_name("blocks"));
    assert_eq!(
        mismatches[0].outcome,
        VerificationOutcome::Mismatch {
            source: 2,
            destination: 3
        }
    );
    assert_eq!(summary.checkpoint.value, "42");

    assert_eq!(summary.tables.len(), 2);
    assert_eq!(summary.tables[1].outcome, VerificationOutcome::Match(2));
    assert_eq!(destination.table_rows("accounts"), expected_accounts());
}

#[tokio::test(flavor = "multi_thread")]
async fn statements_follow_the_reload_protocol() {
    init_test_tracing();
    let source = source();
    let destination = destination();

    orchestrator(&source, &destination, &["accounts"], CompressionMode::None)
        .run()
        .await
        .unwrap();

    assert_eq!(
        destination.operations(),
        vec![
            DestinationOperation::SetAutocommit(false),
            DestinationOperation::DeleteAllRows("accounts".to_string()),
            DestinationOperation::Commit,
            DestinationOperation::Load("accounts".to_string()),
            DestinationOperation::Commit,
            DestinationOperation::SetAutocommit(true),
            DestinationOperation::AnalyzeTable("accounts".to_string()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn reruns_converge_to_the_source_contents() {
    init_test_tracing();
    let source = source();
    let destination = destination();

    for _ in 0..2 {
        orchestrator(&source, &destination, &["accounts"], CompressionMode::None)
            .run()
            .await
            .unwrap();

        assert_eq!(destination.table_rows("accounts"), expected_accounts());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn disjoint_columns_fail_before_any_transaction() {
    init_test_tracing();
    let source = source();
    source.insert_table("receipts", MemoryTable::new(&["a", "b"], vec![row(&["1", "2"])]));
    let destination = destination();
    destination.insert_table("receipts", MemoryTable::new(&["c", "d"], vec![]));

    let err = orchestrator(&source, &destination, &["receipts"], CompressionMode::None)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    assert!(destination.operations().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn extra_source_columns_are_not_transferred() {
    init_test_tracing();
    let source = MemorySource::new();
    source.insert_table(
        "blocks",
        MemoryTable::new(
            &["block_hash", "block_height", "gas_price"],
            vec![row(&["a", "1", "5"]), row(&["b", "2", "6"])],
        ),
    );
    let destination = MemoryDestination::new();
    destination.insert_table(
        "blocks",
        MemoryTable::new(&["block_height", "block_hash"], vec![]),
    );

    orchestrator(&source, &destination, &["blocks"], CompressionMode::None)
        .run()
        .await
        .unwrap();

    assert_eq!(
        destination.table_rows("blocks"),
        vec![row(&["1", "a"]), row(&["2", "b"])]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn renamed_tables_load_into_the_destination_name() {
    init_test_tracing();
    let source = source();
    let destination = MemoryDestination::new();
    destination.insert_table(
        "accounts_v2",
        MemoryTable::new(&["id", "is_active"], vec![]).with_boolean_columns(&["is_active"]),
    );

    orchestrator(&source, &destination, &["accounts:accounts_v2"], CompressionMode::Gzip)
        .run()
        .await
        .unwrap();

    assert_eq!(
        destination.table_rows("accounts_v2"),
        vec![row(&["1", "1"]), row(&["2", "0"])]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn nulls_and_special_characters_survive_the_stream() {
    init_test_tracing();
    let source = source();
    source.insert_table(
        "transactions",
        MemoryTable::new(
            &["hash", "memo"],
            vec![
                vec![Some("h1".to_string()), None],
                row(&["h2", "NULL"]),
                row(&["h3", "tab\there \"quoted\" back\\slash"]),
                row(&["h4", ""]),
            ],
        ),
    );
    let destination = MemoryDestination::new();
    destination.insert_table("transactions", MemoryTable::new(&["hash", "memo"], vec![]));

    orchestrator(&source, &destination, &["transactions"], CompressionMode::None)
        .run()
        .await
        .unwrap();

    assert_eq!(
        destination.table_rows("transactions"),
        vec![
            vec![Some("h1".to_string()), None],
            row(&["h2", "NULL"]),
            row(&["h3", "tab\there \"quoted\" back\\slash"]),
            row(&["h4", ""]),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_delete_rolls_back_and_keeps_previous_rows() {
    init_test_tracing();
    let source = source();
    let destination = destination();
    destination.inject_fault(DestinationFault::DeleteAllRows);

    let err = orchestrator(&source, &destination, &["accounts"], CompressionMode::None)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationTransactionFailed);
    assert_eq!(destination.table_rows("accounts"), vec![row(&["9", "900", "1"])]);
    assert!(destination.operations().contains(&DestinationOperation::Rollback));
    assert!(destination.is_autocommit());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_load_rolls_back_and_a_rerun_recovers() {
    init_test_tracing();
    let source = source();
    let destination = destination();
    destination.inject_fault(DestinationFault::Load);

    let err = orchestrator(&source, &destination, &["accounts"], CompressionMode::Gzip)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PipelineStageFailed);
    let operations = destination.operations();
    assert_eq!(operations.last(), Some(&DestinationOperation::SetAutocommit(true)));
    assert!(operations.contains(&DestinationOperation::Rollback));
    // The delete was committed before the load started.
    assert!(destination.table_rows("accounts").is_empty());

    destination.clear_faults();
    orchestrator(&source, &destination, &["accounts"], CompressionMode::Gzip)
        .run()
        .await
        .unwrap();

    assert_eq!(destination.table_rows("accounts"), expected_accounts());
}

#[tokio::test(flavor = "multi_thread")]
async fn load_that_never_opens_its_input_fails_the_table() {
    init_test_tracing();
    let source = source();
    let destination = destination();
    destination.inject_fault(DestinationFault::LoadBeforeOpen);

    let err = orchestrator(&source, &destination, &["accounts"], CompressionMode::None)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PipelineStageFailed);
    assert!(destination.is_autocommit());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_export_loads_nothing() {
    init_test_tracing();
    let source = source();
    source.fail_export("accounts");
    let destination = destination();

    let err = orchestrator(&source, &destination, &["accounts"], CompressionMode::None)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PipelineStageFailed);
    assert!(err.to_string().contains("dump stage"));
    assert!(destination.table_rows("accounts").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn analyze_failure_fails_the_run() {
    init_test_tracing();
    let source = source();
    let destination = destination();
    destination.inject_fault(DestinationFault::AnalyzeTable);

    let err = orchestrator(&source, &destination, &["accounts"], CompressionMode::None)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
    assert_eq!(destination.table_rows("accounts"), expected_accounts());
}

#[tokio::test(flavor = "multi_thread")]
async fn tables_load_in_catalog_order_and_stop_at_the_first_failure() {
    init_test_tracing();
    let source = source();
    let destination = destination();
    destination.insert_table("blocks", MemoryTable::new(&["block_height", "block_hash"], vec![]));

    let err = orchestrator(
        &source,
        &destination,
        &["blocks", "missing", "accounts"],
        CompressionMode::None,
    )
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceTableMissing);
    assert_eq!(destination.table_rows("blocks").len(), 2);
    // Never reached.
    assert_eq!(destination.table_rows("accounts"), vec![row(&["9", "900", "1"])]);
}

fn config(compression: &str, tables: Vec<String>) -> BackfillConfig {
    BackfillConfig {
        source: PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "indexer".to_string(),
            schema: "public".to_string(),
            username: "postgres".to_string(),
            password: None,
        },
        destination: MemSqlConnectionConfig {
            host: "localhost".to_string(),
            port: 3306,
            name: "indexer".to_string(),
            username: "root".to_string(),
            password: None,
        },
        tables,
        compression: compression.to_string(),
        checkpoint: checkpoint_config(),
        reserved_keywords: vec!["reads".to_string(), "primary".to_string()],
        fail_on_count_mismatch: false,
    }
}

#[test]
fn unknown_compression_is_rejected_up_front() {
    let err = ReplicationOrchestrator::from_config(
        MemorySource::new(),
        MemoryDestination::new(),
        &config("zstd", vec![]),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[test]
fn configured_tables_replace_the_default_catalog() {
    let orchestrator = ReplicationOrchestrator::from_config(
        MemorySource::new(),
        MemoryDestination::new(),
        &config("gz", vec!["blocks".to_string(), "receipts:receipts_v2".to_string()]),
    )
    .unwrap();

    assert_eq!(
        orchestrator.catalog().mappings(),
        &[
            TableMapping::same_name("blocks"),
            TableMapping::new("receipts", "receipts_v2"),
        ]
    );

    let default = ReplicationOrchestrator::from_config(
        MemorySource::new(),
        MemoryDestination::new(),
        &config("none", vec![]),
    )
    .unwrap();
    assert_eq!(default.catalog(), &Catalog::default());
}

#[test]
fn settings_reject_entries_the_connection_checks_accept() {
    for (compression, tables) in [
        ("lz4 ", vec![]),
        ("none", vec![" :accounts".to_string()]),
        ("none", vec!["accounts: ".to_string()]),
        ("none", vec!["blocks".to_string(), "a:b:c".to_string()]),
    ] {
        let config = config(compression, tables);
        assert_eq!(config.validate(), Ok(()));

        let err = RunSettings::from_config(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError, "config {config:?}");
    }
}
