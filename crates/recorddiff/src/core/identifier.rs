//! Identifier validation, quoting, and qualified-name parsing.
//!
//! SQL identifiers (table names, column names, schema names) cannot be passed
//! as parameters in prepared statements - only data values can be
//! parameterized. Dynamic SQL built from user-supplied table names therefore
//! goes through validation and database-specific quoting here.

use serde::{Deserialize, Serialize};

use crate::error::{DiffError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DiffError::config("Identifier cannot be empty"));
    }

    if name.contains('\0') {
        return Err(DiffError::Config(format!(
            "Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DiffError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier using backticks.
///
/// Escapes backticks by doubling them and wraps in backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// A parsed `(schema.)?table` reference.
///
/// Both parts are restricted to word characters: ASCII letters, digits, and
/// underscore. Anything else is a configuration error, not a silent
/// non-match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Optional schema qualifier.
    pub schema: Option<String>,

    /// Bare table name.
    pub table: String,
}

impl QualifiedName {
    /// Parse a qualified name from its textual form.
    ///
    /// Accepts `table` or `schema.table` where both identifiers consist only
    /// of word characters.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = input.split('.');
        let first = parts.next().unwrap_or("");
        let second = parts.next();

        if parts.next().is_some() {
            return Err(DiffError::Config(format!(
                "Invalid table name {:?}: at most one schema qualifier is allowed",
                input
            )));
        }

        let (schema, table) = match second {
            Some(table) => (Some(first), table),
            None => (None, first),
        };

        if !is_word_identifier(table) || schema.is_some_and(|s| !is_word_identifier(s)) {
            return Err(DiffError::Config(format!(
                "Invalid table name {:?}: expected (schema.)?table with word characters only",
                input
            )));
        }

        Ok(Self {
            schema: schema.map(str::to_string),
            table: table.to_string(),
        })
    }

    /// Render the name back to `schema.table` form for messages.
    pub fn display_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.clone(),
        }
    }

    /// Quote for PostgreSQL, qualifying with the schema when present.
    pub fn quote_pg(&self) -> Result<String> {
        match &self.schema {
            Some(schema) => Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(&self.table)?)),
            None => quote_pg(&self.table),
        }
    }

    /// Quote for MySQL, qualifying with the schema when present.
    pub fn quote_mysql(&self) -> Result<String> {
        match &self.schema {
            Some(schema) => Ok(format!(
                "{}.{}",
                quote_mysql(schema)?,
                quote_mysql(&self.table)?
            )),
            None => quote_mysql(&self.table),
        }
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name())
    }
}

fn is_word_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
