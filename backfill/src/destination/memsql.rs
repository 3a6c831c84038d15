use std::path::Path;

use backfill_config::shared::MemSqlConnectionConfig;
use backfill_mysql::schema::{count_rows, get_boolean_columns, get_table_columns};
use backfill_mysql::sqlx::connect_to_destination_database;
use backfill_mysql::types::quote_literal;
use secrecy::ExposeSecret;
use sqlx::{Executor, MySqlConnection};
use tokio::process::Command;
use tracing::debug;

use crate::backfill_error;
use crate::destination::DestinationDatabase;
use crate::error::{BackfillResult, ErrorKind, destination_error};
use crate::identifier::ReservedKeywords;
use crate::types::{ColumnSet, ReplicationJob};

/// Client program used for the import.
const MYSQL_PROGRAM: &str = "mysql";

/// MemSQL destination holding the session the reload transaction runs on.
#[derive(Debug)]
pub struct MemSqlDestination {
    connection: MySqlConnection,
    config: MemSqlConnectionConfig,
    keywords: ReservedKeywords,
}

impl MemSqlDestination {
    pub fn new(
        connection: MySqlConnection,
        config: MemSqlConnectionConfig,
        keywords: ReservedKeywords,
    ) -> Self {
        Self {
            connection,
            config,
            keywords,
        }
    }

    /// Opens the destination session.
    pub async fn connect(
        config: MemSqlConnectionConfig,
        keywords: ReservedKeywords,
    ) -> BackfillResult<Self> {
        let connection = connect_to_destination_database(&config)
            .await
            .map_err(|err| {
                backfill_error!(
                    ErrorKind::DestinationConnectionFailed,
                    "Failed to connect to the destination database",
                    format!("{}:{}/{}", config.host, config.port, config.name),
                    source: err
                )
            })?;

        Ok(Self::new(connection, config, keywords))
    }

    /// Builds the `LOAD DATA` statement reading the job's rows from `conduit`.
    pub fn load_statement(&self, conduit: &Path, job: &ReplicationJob) -> String {
        load_statement(
            &self.keywords,
            conduit,
            job.mapping.destination_name(),
            job,
        )
    }

    async fn execute(
        &mut self,
        statement: &str,
        kind: ErrorKind,
        description: &'static str,
    ) -> BackfillResult<()> {
        debug!(statement, "executing destination statement");

        self.connection
            .execute(statement)
            .await
            .map_err(|err| destination_error(kind, description, err))?;

        Ok(())
    }
}

/// Renders a `LOAD DATA LOCAL INFILE` of the job's columns from `conduit` into `table`.
///
/// Boolean columns are bound to user variables and decoded from the `t`/`f` text the source
/// writes. Escaping is disabled so backslashes load verbatim and the bare word `NULL`, which is
/// what the source writes for SQL `NULL`, loads as SQL `NULL`.
pub fn load_statement(
    keywords: &ReservedKeywords,
    conduit: &Path,
    table: &str,
    job: &ReplicationJob,
) -> String {
    let bindings = job
        .columns
        .iter()
        .map(|column| {
            let quoted = keywords.quote_memsql(column);
            if job.is_boolean(column) {
                format!("@{quoted}")
            } else {
                quoted
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut statement = format!(
        r#"LOAD DATA LOCAL INFILE {} INTO TABLE {} ({bindings}) COLUMNS TERMINATED BY '\t' OPTIONALLY ENCLOSED BY '"' ESCAPED BY ''"#,
        quote_literal(&conduit.to_string_lossy()),
        keywords.quote_memsql(table),
    );

    let decodes = job
        .columns
        .iter()
        .filter(|column| job.is_boolean(column))
        .map(|column| {
            let quoted = keywords.quote_memsql(column);
            format!("{quoted} = DECODE(@{quoted}, 't', 1, 'f', 0)")
        })
        .collect::<Vec<_>>();

    if !decodes.is_empty() {
        statement.push_str(" SET ");
        statement.push_str(&decodes.join(", "));
    }

    statement
}

impl DestinationDatabase for MemSqlDestination {
    fn name() -> &'static str {
        "memsql"
    }

    async fn table_columns(&mut self, table: &str) -> BackfillResult<ColumnSet> {
        let columns = get_table_columns(&mut self.connection, &self.config.name, table).await?;

        Ok(ColumnSet::new(columns))
    }

    async fn boolean_columns(&mut self, table: &str) -> BackfillResult<ColumnSet> {
        let columns = get_boolean_columns(&mut self.connection, &self.config.name, table).await?;

        Ok(ColumnSet::new(columns))
    }

    async fn row_count(&mut self, table: &str) -> BackfillResult<u64> {
        Ok(count_rows(&mut self.connection, table).await?)
    }

    async fn set_autocommit(&mut self, enabled: bool) -> BackfillResult<()> {
        let statement = format!("set autocommit = {}", u8::from(enabled));
        self.execute(
            &statement,
            ErrorKind::DestinationTransactionFailed,
            "Failed to change autocommit",
        )
        .await
    }

    async fn delete_all_rows(&mut self, table: &str) -> BackfillResult<()> {
        let statement = format!("delete from {}", self.keywords.quote_memsql(table));
        self.execute(
            &statement,
            ErrorKind::DestinationTransactionFailed,
            "Failed to delete destination rows",
        )
        .await
    }

    async fn commit(&mut self) -> BackfillResult<()> {
        self.execute(
            "commit",
            ErrorKind::DestinationTransactionFailed,
            "Failed to commit the destination transaction",
        )
        .await
    }

    async fn rollback(&mut self) -> BackfillResult<()> {
        self.execute(
            "rollback",
            ErrorKind::DestinationTransactionFailed,
            "Failed to roll back the destination transaction",
        )
        .await
    }

    async fn analyze_table(&mut self, table: &str) -> BackfillResult<()> {
        let statement = format!("analyze table {}", self.keywords.quote_memsql(table));
        self.execute(
            &statement,
            ErrorKind::DestinationQueryFailed,
            "Failed to analyze the destination table",
        )
        .await
    }

    fn import_command(&self, conduit: &Path, job: &ReplicationJob) -> Command {
        let mut command = Command::new(MYSQL_PROGRAM);
        command
            .arg("--batch")
            .arg("--local-infile=1")
            .arg("--host")
            .arg(&self.config.host)
            .arg("--port")
            .arg(self.config.port.to_string())
            .arg("--user")
            .arg(&self.config.username)
            .arg("--database")
            .arg(&self.config.name)
            .arg("--execute")
            .arg(self.load_statement(conduit, job));

        if let Some(password) = &self.config.password {
            command.env("MYSQL_PWD", password.expose_secret());
        }

        command
    }
}
