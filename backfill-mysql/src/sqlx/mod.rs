use backfill_config::shared::{IntoConnectOptions, MemSqlConnectionConfig};
use sqlx::{Connection, MySqlConnection};

#[cfg(feature = "test-utils")]
pub mod test_utils;

/// Opens the single session used for the truncate and reload transactions.
///
/// A dedicated connection is used instead of a pool because autocommit state and open
/// transactions are per session.
pub async fn connect_to_destination_database(
    config: &MemSqlConnectionConfig,
) -> Result<MySqlConnection, sqlx::Error> {
    MySqlConnection::connect_with(&config.with_db()).await
}
