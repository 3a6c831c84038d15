use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Application name reported to Postgres for the metadata connection.
const PG_APPLICATION_NAME: &str = "backfill_loader";

/// Session settings applied to every Postgres connection.
fn pg_session_options() -> Vec<(String, String)> {
    vec![
        ("datestyle".to_string(), "ISO".to_string()),
        ("intervalstyle".to_string(), "postgres".to_string()),
        ("extra_float_digits".to_string(), "3".to_string()),
        ("client_encoding".to_string(), "UTF8".to_string()),
    ]
}

fn default_pg_schema() -> String {
    "public".to_string()
}

/// Connection settings for the source Postgres database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port the Postgres server listens on.
    pub port: u16,
    /// Name of the database holding the tables.
    pub name: String,
    /// Schema holding the tables.
    #[serde(default = "default_pg_schema")]
    pub schema: String,
    pub username: String,
    /// Redacted in debug output.
    pub password: Option<SerializableSecretString>,
}

impl PgConnectionConfig {
    /// Checks that every required connection parameter is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::MissingField("source.host"));
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort("source.port"));
        }
        if self.name.is_empty() {
            return Err(ValidationError::MissingField("source.name"));
        }
        if self.schema.is_empty() {
            return Err(ValidationError::MissingField("source.schema"));
        }
        if self.username.is_empty() {
            return Err(ValidationError::MissingField("source.username"));
        }

        Ok(())
    }
}

/// Connection settings for the destination MemSQL database.
///
/// MemSQL speaks the MySQL wire protocol, so connections are made through the sqlx MySQL driver
/// and the `mysql` command line client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemSqlConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Name of the destination database.
    pub name: String,
    pub username: String,
    /// Redacted in debug output.
    pub password: Option<SerializableSecretString>,
}

impl MemSqlConnectionConfig {
    /// Checks that every required connection parameter is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::MissingField("destination.host"));
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort("destination.port"));
        }
        if self.name.is_empty() {
            return Err(ValidationError::MissingField("destination.name"));
        }
        if self.username.is_empty() {
            return Err(ValidationError::MissingField("destination.username"));
        }

        Ok(())
    }
}

/// Converts a connection config into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Connect options without a database selected.
    ///
    /// Used for administrative statements such as creating the database in tests.
    fn without_db(&self) -> Output;

    /// Connect options targeting the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .ssl_mode(PgSslMode::Prefer)
            .application_name(PG_APPLICATION_NAME)
            .options(pg_session_options());

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> PgConnectOptions {
        let options: PgConnectOptions = self.without_db();
        options.database(&self.name)
    }
}

impl IntoConnectOptions<MySqlConnectOptions> for MemSqlConnectionConfig {
    fn without_db(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username);

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> MySqlConnectOptions {
        let options: MySqlConnectOptions = self.without_db();
        options.database(&self.name)
    }
}
