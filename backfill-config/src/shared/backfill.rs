use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{MemSqlConnectionConfig, PgConnectionConfig, ValidationError};

fn default_compression() -> String {
    "none".to_string()
}

fn default_reserved_keywords() -> Vec<String> {
    vec!["reads".to_string(), "primary".to_string()]
}

/// Top-level configuration of a backfill run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackfillConfig {
    /// Database the rows are read from.
    pub source: PgConnectionConfig,
    /// Database the rows are loaded into.
    pub destination: MemSqlConnectionConfig,
    /// Tables to load, as `source` or `source:destination` entries.
    ///
    /// An empty list loads the built-in catalog.
    #[serde(default)]
    pub tables: Vec<String>,
    /// Codec applied between the dump and the load: `none`, `lz4` or `gz`.
    #[serde(default = "default_compression")]
    pub compression: String,
    /// Column whose maximum marks where the continuous stream has to resume.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Column names that collide with SQL keywords and must always be quoted.
    #[serde(default = "default_reserved_keywords")]
    pub reserved_keywords: Vec<String>,
    /// Fails the run when row counts differ after a load instead of only warning.
    #[serde(default)]
    pub fail_on_count_mismatch: bool,
}

impl BackfillConfig {
    /// Validates the connection and checkpoint settings, failing on the first problem found.
    ///
    /// `compression` and `tables` are parsed by the engine, which rejects unknown codecs and
    /// malformed entries before connecting.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.destination.validate()?;
        self.checkpoint.validate()
    }
}

impl Config for BackfillConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["tables", "reserved_keywords"];
}

/// Location of the source checkpoint value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CheckpointConfig {
    pub table: String,
    pub column: String,
}

impl CheckpointConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.table.is_empty() {
            return Err(ValidationError::MissingField("checkpoint.table"));
        }
        if self.column.is_empty() {
            return Err(ValidationError::MissingField("checkpoint.column"));
        }

        Ok(())
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            table: "blocks".to_string(),
            column: "block_height".to_string(),
        }
    }
}
