//! Identifier quoting for both sides of the load.

use std::collections::HashSet;

use backfill_mysql::types::{is_plain_identifier, quote_identifier as quote_memsql_identifier};
use pg_escape::quote_identifier as quote_pg_identifier;

/// Column names that collide with SQL keywords.
///
/// Names in this set are always quoted, on top of the quoting each database needs for
/// non-trivial names. Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct ReservedKeywords {
    keywords: HashSet<String>,
}

impl ReservedKeywords {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|keyword| keyword.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.keywords.contains(&name.to_lowercase())
    }

    /// Quotes `name` for use in a Postgres statement.
    pub fn quote_postgres(&self, name: &str) -> String {
        if self.is_reserved(name) {
            return format!("\"{}\"", name.replace('"', "\"\""));
        }

        quote_pg_identifier(name).into_owned()
    }

    /// Quotes `name` for use in a MemSQL statement.
    pub fn quote_memsql(&self, name: &str) -> String {
        if self.is_reserved(name) || !is_plain_identifier(name) {
            return quote_memsql_identifier(name);
        }

        name.to_string()
    }
}

impl Default for ReservedKeywords {
    fn default() -> Self {
        Self::new(["reads", "primary"])
    }
}
