/// Column type MemSQL uses to store booleans.
pub const BOOLEAN_SURROGATE_TYPE: &str = "tinyint(1)";

/// Quotes `identifier` with backticks, doubling any embedded backtick.
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Returns `true` when `identifier` can be written without quoting.
///
/// Conservative: only lowercase ASCII letters, digits and underscores, not starting with a digit.
pub fn is_plain_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Quotes `value` as a single quoted string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backticks_are_doubled() {
        assert_eq!(quote_identifier("primary"), "`primary`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn plain_identifier_detection() {
        assert!(is_plain_identifier("block_height"));
        assert!(is_plain_identifier("_v2"));
        assert!(!is_plain_identifier("2fa"));
        assert!(!is_plain_identifier("BlockHeight"));
        assert!(!is_plain_identifier("with space"));
        assert!(!is_plain_identifier(""));
    }

    #[test]
    fn literals_escape_quotes_and_backslashes() {
        assert_eq!(quote_literal("/tmp/a'b"), "'/tmp/a''b'");
        assert_eq!(quote_literal(r"C:\x"), r"'C:\\x'");
    }
}
