use pg_escape::quote_identifier;
use std::fmt;

/// A schema qualified Postgres table name.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns `schema.name` with both parts quoted when Postgres requires it.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        format!("{quoted_schema}.{quoted_name}")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_left_unquoted() {
        let table = TableName::new("public", "blocks");

        assert_eq!(table.as_quoted_identifier(), "public.blocks");
        assert_eq!(table.to_string(), "public.blocks");
    }

    #[test]
    fn mixed_case_names_are_quoted() {
        let table = TableName::new("Indexer", "Blocks");

        assert_eq!(table.as_quoted_identifier(), r#""Indexer"."Blocks""#);
    }
}
