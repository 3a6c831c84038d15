use backfill::catalog::Catalog;
use backfill::compression::CompressionMode;
use backfill::error::{BackfillResult, ErrorKind};
use backfill::failpoints::{PIPELINE_BEFORE_LOAD_WAIT, TRANSACTION_AFTER_DELETE};
use backfill::orchestrator::ReplicationOrchestrator;
use backfill::test_utils::failpoints::CustomFailScenario;
use backfill::test_utils::memory::{
    DestinationOperation, MemoryDestination, MemorySource, MemoryTable, row,
};
use backfill::types::TableMapping;
use backfill::verify::VerificationReporter;
use backfill_config::shared::CheckpointConfig;
use backfill_telemetry::init_test_tracing;

fn setup() -> (MemorySource, MemoryDestination) {
    let source = MemorySource::new();
    source.insert_table(
        "blocks",
        MemoryTable::new(
            &["block_height", "block_hash"],
            vec![row(&["10", "a"]), row(&["11", "b"])],
        ),
    );

    let destination = MemoryDestination::new();
    destination.insert_table(
        "blocks",
        MemoryTable::new(&["block_height", "block_hash"], vec![row(&["1", "stale"])]),
    );

    (source, destination)
}

async fn run(source: &MemorySource, destination: &MemoryDestination) -> BackfillResult<()> {
    ReplicationOrchestrator::new(
        source.clone(),
        destination.clone(),
        Catalog::new(vec![TableMapping::same_name("blocks")]),
        CompressionMode::None,
        CheckpointConfig {
            table: "blocks".to_string(),
            column: "block_height".to_string(),
        },
        VerificationReporter::default(),
    )
    .run()
    .await
    .map(|_| ())
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_before_the_delete_commit_keeps_previous_rows() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(TRANSACTION_AFTER_DELETE, "return")]);
    let (source, destination) = setup();

    let err = run(&source, &destination).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailpointTriggered);
    assert_eq!(destination.table_rows("blocks"), vec![row(&["1", "stale"])]);
    assert_eq!(
        destination.operations(),
        vec![
            DestinationOperation::SetAutocommit(false),
            DestinationOperation::DeleteAllRows("blocks".to_string()),
            DestinationOperation::Rollback,
            DestinationOperation::SetAutocommit(true),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_before_the_load_wait_kills_the_load() {
    init_test_tracing();
    let scenario = CustomFailScenario::setup(&[(PIPELINE_BEFORE_LOAD_WAIT, "return(pipeline)")]);
    let (source, destination) = setup();

    let err = run(&source, &destination).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PipelineStageFailed);
    assert!(destination.table_rows("blocks").is_empty());
    assert!(destination.operations().contains(&DestinationOperation::Rollback));
    assert!(
        !destination
            .operations()
            .contains(&DestinationOperation::Load("blocks".to_string()))
    );

    drop(scenario);
    run(&source, &destination).await.unwrap();
    assert_eq!(
        destination.table_rows("blocks"),
        vec![row(&["10", "a"]), row(&["11", "b"])]
    );
}
