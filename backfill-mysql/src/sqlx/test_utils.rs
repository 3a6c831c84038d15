use backfill_config::shared::{IntoConnectOptions, MemSqlConnectionConfig};
use sqlx::{Connection, Executor, MySqlConnection};

use crate::types::quote_identifier;

/// Creates the database named in `config` and returns a connection to it.
///
/// # Panics
/// Panics if connecting or creating the database fails.
pub async fn create_memsql_database(config: &MemSqlConnectionConfig) -> MySqlConnection {
    let mut connection = MySqlConnection::connect_with(&config.without_db())
        .await
        .expect("Failed to connect to MemSQL");

    connection
        .execute(&*format!(
            "create database {}",
            quote_identifier(&config.name)
        ))
        .await
        .expect("Failed to create database");

    MySqlConnection::connect_with(&config.with_db())
        .await
        .expect("Failed to connect to MemSQL database")
}

/// Drops the database named in `config` if it exists.
///
/// Errors are printed and ignored so that cleanup never fails a test.
pub async fn drop_memsql_database(config: &MemSqlConnectionConfig) {
    let mut connection = match MySqlConnection::connect_with(&config.without_db()).await {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("warning: failed to connect to MemSQL for cleanup: {err}");
            return;
        }
    };

    if let Err(err) = connection
        .execute(&*format!(
            "drop database if exists {}",
            quote_identifier(&config.name)
        ))
        .await
    {
        eprintln!("warning: failed to drop database {}: {err}", config.name);
    }
}
