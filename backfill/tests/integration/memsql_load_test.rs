use backfill::catalog::Catalog;
use backfill::compression::CompressionMode;
use backfill::destination::memsql::MemSqlDestination;
use backfill::error::ErrorKind;
use backfill::identifier::ReservedKeywords;
use backfill::orchestrator::ReplicationOrchestrator;
use backfill::source::postgres::PostgresSource;
use backfill::test_utils::database::{
    DestinationTestDatabase, SourceTestDatabase, TEST_SOURCE_SCHEMA, live_databases_configured,
};
use backfill::types::TableMapping;
use backfill::verify::{VerificationOutcome, VerificationReporter};
use backfill_config::shared::CheckpointConfig;
use backfill_telemetry::init_test_tracing;
use sqlx::{Executor, MySqlConnection};

async fn seed_source(database: &SourceTestDatabase) {
    let statements = [
        format!(
            "create table {TEST_SOURCE_SCHEMA}.accounts (id bigint primary key, balance numeric, is_active boolean, note text, created_at timestamptz default now())"
        ),
        format!(
            "insert into {TEST_SOURCE_SCHEMA}.accounts (id, balance, is_active, note) values (1, 100, true, 'tab\there'), (2, 200, false, null), (3, 300, true, 'back\\slash')"
        ),
        format!(
            r#"create table {TEST_SOURCE_SCHEMA}.access_keys (account_id bigint, "reads" bigint, "primary" boolean)"#
        ),
        format!(
            r#"insert into {TEST_SOURCE_SCHEMA}.access_keys (account_id, "reads", "primary") values (1, 5, true)"#
        ),
        format!("create table {TEST_SOURCE_SCHEMA}.blocks (block_height bigint primary key)"),
        format!("insert into {TEST_SOURCE_SCHEMA}.blocks values (7), (8)"),
    ];

    for statement in statements {
        database
            .pool
            .execute(statement.as_str())
            .await
            .expect("Failed to seed source");
    }
}

async fn seed_destination(database: &mut DestinationTestDatabase) {
    let statements = [
        "create table accounts (id bigint primary key, balance decimal(20, 0), is_active tinyint(1), note text)",
        "insert into accounts values (99, 1, 0, 'stale')",
        "create table access_keys (account_id bigint, `reads` bigint, `primary` tinyint(1))",
    ];

    for statement in statements {
        database
            .connection
            .execute(statement)
            .await
            .expect("Failed to seed destination");
    }
}

async fn accounts(connection: &mut MySqlConnection) -> Vec<(i64, i64, Option<String>)> {
    sqlx::query_as("select id, cast(is_active as signed), note from accounts order by id")
        .fetch_all(connection)
        .await
        .expect("Failed to read accounts")
}

fn checkpoint() -> CheckpointConfig {
    CheckpointConfig {
        table: "blocks".to_string(),
        column: "block_height".to_string(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn tables_are_reloaded_into_memsql() {
    init_test_tracing();
    if !live_databases_configured() {
        eprintln!("skipping: TESTS_DATABASE_* and TESTS_MEMSQL_* are not set");
        return;
    }

    let source_database = SourceTestDatabase::spawn().await;
    let mut destination_database = DestinationTestDatabase::spawn().await;
    seed_source(&source_database).await;
    seed_destination(&mut destination_database).await;

    for compression in [CompressionMode::None, CompressionMode::Gzip] {
        let keywords = ReservedKeywords::default();
        let source = PostgresSource::connect(source_database.config.clone(), keywords.clone())
            .await
            .unwrap();
        let destination =
            MemSqlDestination::connect(destination_database.config.clone(), keywords)
                .await
                .unwrap();

        let summary = ReplicationOrchestrator::new(
            source,
            destination,
            Catalog::new(vec![
                TableMapping::same_name("accounts"),
                TableMapping::same_name("access_keys"),
            ]),
            compression,
            checkpoint(),
            VerificationReporter::new(true),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(summary.checkpoint.value, "8");
        assert_eq!(summary.tables[0].outcome, VerificationOutcome::Match(3));
        assert_eq!(summary.tables[1].outcome, VerificationOutcome::Match(1));

        assert_eq!(
            accounts(&mut destination_database.connection).await,
            vec![
                (1, 1, Some("tab\there".to_string())),
                (2, 0, None),
                (3, 1, Some("back\\slash".to_string())),
            ]
        );
    }

    source_database.cleanup().await;
    destination_database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_destination_table_fails_before_loading() {
    init_test_tracing();
    if !live_databases_configured() {
        eprintln!("skipping: TESTS_DATABASE_* and TESTS_MEMSQL_* are not set");
        return;
    }

    let source_database = SourceTestDatabase::spawn().await;
    let destination_database = DestinationTestDatabase::spawn().await;
    seed_source(&source_database).await;

    let keywords = ReservedKeywords::default();
    let source = PostgresSource::connect(source_database.config.clone(), keywords.clone())
        .await
        .unwrap();
    let destination = MemSqlDestination::connect(destination_database.config.clone(), keywords)
        .await
        .unwrap();

    let err = ReplicationOrchestrator::new(
        source,
        destination,
        Catalog::new(vec![TableMapping::same_name("accounts")]),
        CompressionMode::None,
        checkpoint(),
        VerificationReporter::default(),
    )
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationTableMissing);

    source_database.cleanup().await;
    destination_database.cleanup().await;
}
