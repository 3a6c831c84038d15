use backfill_config::shared::PgConnectionConfig;
use backfill_postgres::schema::{count_rows, get_table_columns, max_column_value};
use backfill_postgres::sqlx::connect_to_source_database;
use backfill_postgres::types::TableName;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tokio::process::Command;

use crate::backfill_error;
use crate::error::{BackfillResult, ErrorKind};
use crate::identifier::ReservedKeywords;
use crate::source::SourceDatabase;
use crate::types::{ColumnSet, ReplicationJob};

/// Client program used for the export.
const PSQL_PROGRAM: &str = "psql";

/// Text written for SQL `NULL` values, read back as `NULL` by the destination.
pub const NULL_MARKER: &str = "NULL";

/// Postgres source reading metadata through a [`PgPool`] and exporting through `psql`.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
    config: PgConnectionConfig,
    keywords: ReservedKeywords,
}

impl PostgresSource {
    pub fn new(pool: PgPool, config: PgConnectionConfig, keywords: ReservedKeywords) -> Self {
        Self {
            pool,
            config,
            keywords,
        }
    }

    /// Connects a small pool to the configured source database.
    pub async fn connect(
        config: PgConnectionConfig,
        keywords: ReservedKeywords,
    ) -> BackfillResult<Self> {
        let pool = connect_to_source_database(&config, 1, 2)
            .await
            .map_err(|err| {
                backfill_error!(
                    ErrorKind::SourceConnectionFailed,
                    "Failed to connect to the source database",
                    format!("{}:{}/{}", config.host, config.port, config.name),
                    source: err
                )
            })?;

        Ok(Self::new(pool, config, keywords))
    }

    fn table_name(&self, table: &str) -> TableName {
        TableName::new(self.config.schema.clone(), table)
    }

    /// Builds the `\copy` meta-command streaming the job's columns to stdout.
    pub fn copy_statement(&self, job: &ReplicationJob) -> String {
        copy_statement(
            &self.keywords,
            &self.table_name(job.mapping.source_name()),
            &job.columns,
        )
    }
}

/// Renders a `\copy` of `columns` from `table` as tab separated CSV to stdout.
pub fn copy_statement(keywords: &ReservedKeywords, table: &TableName, columns: &ColumnSet) -> String {
    let projection = columns
        .iter()
        .map(|column| keywords.quote_postgres(column))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r"\copy (select {projection} from {}) to stdout with (format csv, delimiter E'\t', null '{NULL_MARKER}')",
        table.as_quoted_identifier()
    )
}

impl SourceDatabase for PostgresSource {
    fn name() -> &'static str {
        "postgres"
    }

    async fn table_columns(&self, table: &str) -> BackfillResult<ColumnSet> {
        let columns =
            get_table_columns(&self.pool, &self.config.name, &self.table_name(table)).await?;

        Ok(ColumnSet::new(columns))
    }

    async fn row_count(&self, table: &str) -> BackfillResult<u64> {
        Ok(count_rows(&self.pool, &self.table_name(table)).await?)
    }

    async fn checkpoint(&self, table: &str, column: &str) -> BackfillResult<String> {
        Ok(max_column_value(&self.pool, &self.table_name(table), column).await?)
    }

    fn export_command(&self, job: &ReplicationJob) -> Command {
        let mut command = Command::new(PSQL_PROGRAM);
        command
            .arg("--no-psqlrc")
            .arg("--quiet")
            .args(["--set", "ON_ERROR_STOP=1"])
            .arg("--host")
            .arg(&self.config.host)
            .arg("--port")
            .arg(self.config.port.to_string())
            .arg("--username")
            .arg(&self.config.username)
            .arg("--dbname")
            .arg(&self.config.name)
            .arg("--command")
            .arg(self.copy_statement(job));

        if let Some(password) = &self.config.password {
            command.env("PGPASSWORD", password.expose_secret());
        }

        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_statement_projects_columns_in_order() {
        let columns: ColumnSet = ["id", "balance", "is_active"].into_iter().collect();

        let statement = copy_statement(
            &ReservedKeywords::default(),
            &TableName::new("public", "accounts"),
            &columns,
        );

        assert_eq!(
            statement,
            r"\copy (select id, balance, is_active from public.accounts) to stdout with (format csv, delimiter E'\t', null 'NULL')"
        );
    }

    #[test]
    fn copy_statement_quotes_reserved_columns() {
        let columns: ColumnSet = ["account_id", "reads", "primary"].into_iter().collect();

        let statement = copy_statement(
            &ReservedKeywords::default(),
            &TableName::new("public", "access_keys"),
            &columns,
        );

        assert!(statement.starts_with(r#"\copy (select account_id, "reads", "primary" from"#));
    }
}
