use backfill_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

#[cfg(feature = "test-utils")]
pub mod test_utils;

/// Opens a connection pool to the source database.
///
/// The source is only used for metadata, counts and the checkpoint, so small pools suffice.
pub async fn connect_to_source_database(
    config: &PgConnectionConfig,
    min_connections: u32,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(min_connections)
        .max_connections(max_connections)
        .connect_with(config.with_db())
        .await
}
