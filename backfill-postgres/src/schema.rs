//! Metadata and aggregate queries against the source database.

use pg_escape::quote_identifier;
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::types::TableName;

/// Errors returned by source metadata queries.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("table {0} has no columns or does not exist")]
    TableNotFound(String),
}

/// Returns the column names of `table` in ordinal order.
///
/// Fails with [`SchemaError::TableNotFound`] when `information_schema` knows no columns for it,
/// which covers both missing tables and missing privileges.
pub async fn get_table_columns(
    pool: &PgPool,
    database: &str,
    table: &TableName,
) -> Result<Vec<String>, SchemaError> {
    let query = r#"
        select column_name::text as column_name
        from information_schema.columns
        where table_catalog = $1
          and table_schema = $2
          and table_name = $3
        order by ordinal_position
    "#;

    let rows = sqlx::query(query)
        .bind(database)
        .bind(&table.schema)
        .bind(&table.name)
        .fetch_all(pool)
        .await?;

    let columns = rows
        .iter()
        .map(|row| row.try_get::<String, _>("column_name"))
        .collect::<Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Err(SchemaError::TableNotFound(table.to_string()));
    }

    Ok(columns)
}

/// Counts the rows currently visible in `table`.
pub async fn count_rows(pool: &PgPool, table: &TableName) -> Result<u64, SchemaError> {
    let query = format!("select count(*) from {}", table.as_quoted_identifier());
    let count: i64 = sqlx::query_scalar(&query).fetch_one(pool).await?;

    Ok(count.max(0) as u64)
}

/// Returns `max(column)` of `table` rendered as text, or `0` for an empty table.
pub async fn max_column_value(
    pool: &PgPool,
    table: &TableName,
    column: &str,
) -> Result<String, SchemaError> {
    let query = format!(
        "select coalesce(max({})::text, '0') from {}",
        quote_identifier(column),
        table.as_quoted_identifier()
    );
    let value: String = sqlx::query_scalar(&query).fetch_one(pool).await?;

    Ok(value)
}
