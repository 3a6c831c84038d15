use backfill_config::shared::{MemSqlConnectionConfig, PgConnectionConfig};
use backfill_mysql::sqlx::test_utils::{create_memsql_database, drop_memsql_database};
use backfill_postgres::sqlx::test_utils::{create_pg_database, drop_pg_database};
use sqlx::{MySqlConnection, PgPool};
use uuid::Uuid;

/// Schema the source test tables are created in.
pub const TEST_SOURCE_SCHEMA: &str = "backfill_test";

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} must be set"))
}

fn port_var(name: &str) -> u16 {
    required_var(name)
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a valid port number"))
}

/// Returns `true` when both live database servers are configured.
pub fn live_databases_configured() -> bool {
    ["TESTS_DATABASE_HOST", "TESTS_MEMSQL_HOST"]
        .iter()
        .all(|name| std::env::var(name).is_ok())
}

/// Builds a source config for a fresh, uniquely named database.
///
/// Reads `TESTS_DATABASE_HOST`, `TESTS_DATABASE_PORT`, `TESTS_DATABASE_USERNAME` and the
/// optional `TESTS_DATABASE_PASSWORD`.
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: required_var("TESTS_DATABASE_HOST"),
        port: port_var("TESTS_DATABASE_PORT"),
        name: Uuid::new_v4().to_string(),
        schema: TEST_SOURCE_SCHEMA.to_string(),
        username: required_var("TESTS_DATABASE_USERNAME"),
        password: std::env::var("TESTS_DATABASE_PASSWORD").ok().map(Into::into),
    }
}

/// Builds a destination config for a fresh, uniquely named database.
///
/// Reads `TESTS_MEMSQL_HOST`, `TESTS_MEMSQL_PORT`, `TESTS_MEMSQL_USERNAME` and the optional
/// `TESTS_MEMSQL_PASSWORD`.
pub fn local_memsql_connection_config() -> MemSqlConnectionConfig {
    MemSqlConnectionConfig {
        host: required_var("TESTS_MEMSQL_HOST"),
        port: port_var("TESTS_MEMSQL_PORT"),
        // MemSQL database names cannot contain dashes.
        name: format!("backfill_{}", Uuid::new_v4().simple()),
        username: required_var("TESTS_MEMSQL_USERNAME"),
        password: std::env::var("TESTS_MEMSQL_PASSWORD").ok().map(Into::into),
    }
}

/// A throwaway source database, dropped with [`SourceTestDatabase::cleanup`].
pub struct SourceTestDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl SourceTestDatabase {
    pub async fn spawn() -> Self {
        let config = local_pg_connection_config();
        let pool = create_pg_database(&config).await;

        Self { config, pool }
    }

    pub async fn cleanup(self) {
        self.pool.close().await;
        drop_pg_database(&self.config).await;
    }
}

/// A throwaway destination database, dropped with [`DestinationTestDatabase::cleanup`].
pub struct DestinationTestDatabase {
    pub config: MemSqlConnectionConfig,
    pub connection: MySqlConnection,
}

impl DestinationTestDatabase {
    pub async fn spawn() -> Self {
        let config = local_memsql_connection_config();
        let connection = create_memsql_database(&config).await;

        Self { config, connection }
    }

    pub async fn cleanup(self) {
        drop(self.connection);
        drop_memsql_database(&self.config).await;
    }
}
