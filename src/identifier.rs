use std::fmt;

use crate::error::{SyncError, SyncResult};

/// Schemas owned by the server itself. Never listed, never a sync target.
pub const SYSTEM_DATABASES: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

const MAX_IDENTIFIER_LEN: usize = 64;

/// A database name that passed validation and is safe to interpolate.
///
/// Only unquoted-identifier characters are accepted (ASCII letters, digits,
/// `_` and `$`), so the quoting helpers below never have to deal with
/// embedded quotes or escapes in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseName(String);

impl DatabaseName {
    pub fn parse(name: &str) -> SyncResult<Self> {
        let invalid = |why: &str| {
            SyncError::PreconditionFailure(format!("invalid database name '{name}': {why}"))
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if name.len() > MAX_IDENTIFIER_LEN {
            return Err(invalid("longer than 64 characters"));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$'))
        {
            return Err(invalid(&format!("character '{c}' is not allowed")));
        }
        if name.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("name cannot consist only of digits"));
        }
        if is_system_database(name) {
            return Err(invalid("system schemas cannot be synchronized"));
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backtick-quoted form for use as an identifier in SQL.
    pub fn quoted(&self) -> String {
        quote_identifier(&self.0)
    }

    /// Single-quoted form for comparison against metadata columns.
    pub fn literal(&self) -> String {
        quote_literal(&self.0)
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DatabaseName {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn is_system_database(name: &str) -> bool {
    SYSTEM_DATABASES
        .iter()
        .any(|system| system.eq_ignore_ascii_case(name))
}

pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        for name in ["shop", "orders_2024", "app$data", "_tmp", "9lives"] {
            assert!(DatabaseName::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_rejects_injection_attempts() {
        for name in ["shop`; DROP DATABASE x; --", "a b", "x'y", "db-name", "naïve"] {
            let err = DatabaseName::parse(name).unwrap_err();
            assert!(matches!(err, SyncError::PreconditionFailure(_)));
        }
    }

    #[test]
    fn test_rejects_empty_long_and_numeric() {
        assert!(DatabaseName::parse("").is_err());
        assert!(DatabaseName::parse(&"a".repeat(65)).is_err());
        assert!(DatabaseName::parse(&"a".repeat(64)).is_ok());
        assert!(DatabaseName::parse("12345").is_err());
    }

    #[test]
    fn test_rejects_system_schemas() {
        assert!(DatabaseName::parse("mysql").is_err());
        assert!(DatabaseName::parse("INFORMATION_SCHEMA").is_err());
        assert!(is_system_database("sys"));
        assert!(!is_system_database("shop"));
    }

    #[test]
    fn test_quoting() {
        let name = DatabaseName::parse("shop").unwrap();
        assert_eq!(name.quoted(), "`shop`");
        assert_eq!(name.literal(), "'shop'");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(quote_literal("it's"), "'it\\'s'");
    }
}
