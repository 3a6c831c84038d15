//! `information_schema` lookups and row counts against the destination database.

use sqlx::{MySqlConnection, Row};
use thiserror::Error;

use crate::types::{BOOLEAN_SURROGATE_TYPE, quote_identifier};

/// Errors returned by destination metadata queries.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("table {0} has no columns or does not exist")]
    TableNotFound(String),
}

/// Returns the loadable column names of `table` in ordinal order.
///
/// Computed columns are skipped since they cannot be loaded.
pub async fn get_table_columns(
    connection: &mut MySqlConnection,
    database: &str,
    table: &str,
) -> Result<Vec<String>, SchemaError> {
    let query = r#"
        select column_name
        from information_schema.columns
        where table_catalog = 'def'
          and table_schema = ?
          and table_name = ?
          and extra != 'computed'
        order by ordinal_position
    "#;

    let rows = sqlx::query(query)
        .bind(database)
        .bind(table)
        .fetch_all(&mut *connection)
        .await?;

    let columns = rows
        .iter()
        .map(|row| row.try_get::<String, _>(0))
        .collect::<Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Err(SchemaError::TableNotFound(format!("{database}.{table}")));
    }

    Ok(columns)
}

/// Returns the columns of `table` stored as the boolean surrogate type, in ordinal order.
pub async fn get_boolean_columns(
    connection: &mut MySqlConnection,
    database: &str,
    table: &str,
) -> Result<Vec<String>, SchemaError> {
    let query = r#"
        select column_name
        from information_schema.columns
        where table_catalog = 'def'
          and table_schema = ?
          and table_name = ?
          and column_type = ?
        order by ordinal_position
    "#;

    let rows = sqlx::query(query)
        .bind(database)
        .bind(table)
        .bind(BOOLEAN_SURROGATE_TYPE)
        .fetch_all(&mut *connection)
        .await?;

    let columns = rows
        .iter()
        .map(|row| row.try_get::<String, _>(0))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(columns)
}

/// Counts the rows of `table`.
pub async fn count_rows(connection: &mut MySqlConnection, table: &str) -> Result<u64, SchemaError> {
    let query = format!("select count(*) from {}", quote_identifier(table));
    let count: i64 = sqlx::query_scalar(&query)
        .fetch_one(&mut *connection)
        .await?;

    Ok(count.max(0) as u64)
}
