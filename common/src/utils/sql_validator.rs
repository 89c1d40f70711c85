//! SQL fragment validator.
//!
//! Table and column names are interpolated into statements, so they are
//! restricted to plain identifiers. User-supplied WHERE clauses are screened
//! for statement separators and DDL keywords, and their placeholders are
//! rewritten to the target dialect.

use crate::errors::AppError;

/// Validates SQL fragments for security.
pub struct SqlValidator;

/// Keywords that may not appear in a WHERE clause.
const FORBIDDEN_KEYWORDS: [&str; 10] = [
    "DROP", "TRUNCATE", "ALTER", "CREATE", "GRANT", "REVOKE", "INSERT", "UPDATE", "DELETE",
    "EXEC",
];

/// Token sequences that would end or comment out the statement.
const FORBIDDEN_SEQUENCES: [&str; 3] = [";", "--", "/*"];

const MAX_IDENTIFIER_LEN: usize = 64;

/// Placeholder and quoting conventions of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `?` placeholders, backtick-quoted identifiers.
    MySql,
    /// `$n` placeholders, double-quoted identifiers.
    Postgres,
}

impl SqlValidator {
    /// Validates a table or column name.
    ///
    /// # Errors
    /// Returns `AppError::UnsafeSql` unless the name is 1-64 characters of
    /// `[A-Za-z0-9_]`.
    pub fn validate_identifier(name: &str) -> Result<(), AppError> {
        if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN {
            return Err(AppError::UnsafeSql(format!(
                "identifier must be 1-{MAX_IDENTIFIER_LEN} characters"
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::UnsafeSql(format!("invalid identifier: {name}")));
        }
        Ok(())
    }

    /// Validates a user-supplied WHERE clause.
    ///
    /// # Errors
    /// Returns `AppError::UnsafeSql` if the clause contains a statement
    /// separator, a comment, or a forbidden keyword.
    pub fn validate_where(clause: &str) -> Result<(), AppError> {
        if clause.trim().is_empty() {
            return Err(AppError::UnsafeSql("WHERE clause must not be empty".into()));
        }
        for sequence in FORBIDDEN_SEQUENCES {
            if clause.contains(sequence) {
                return Err(AppError::UnsafeSql(format!("forbidden sequence: {sequence}")));
            }
        }
        let words = clause
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty());
        for word in words {
            let upper = word.to_ascii_uppercase();
            if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                return Err(AppError::UnsafeSql(format!("forbidden operation: {upper}")));
            }
        }
        Ok(())
    }

    /// Quotes a validated identifier for the dialect.
    pub fn quote_identifier(name: &str, dialect: Dialect) -> Result<String, AppError> {
        Self::validate_identifier(name)?;
        Ok(match dialect {
            Dialect::MySql => format!("`{name}`"),
            Dialect::Postgres => format!("\"{name}\""),
        })
    }

    /// Rewrites `%s` and `?` placeholders to the dialect's form.
    ///
    /// Postgres placeholders are numbered from `first_index`. Placeholders
    /// inside single-quoted literals are left alone. Returns the rewritten
    /// clause and the number of placeholders found.
    pub fn rewrite_placeholders(clause: &str, dialect: Dialect, first_index: usize) -> (String, usize) {
        let mut out = String::with_capacity(clause.len() + 8);
        let mut count = 0;
        let mut in_literal = false;
        let mut chars = clause.chars().peekable();

        let mut placeholder = |out: &mut String| {
            match dialect {
                Dialect::MySql => out.push('?'),
                Dialect::Postgres => out.push_str(&format!("${}", first_index + count)),
            }
            count += 1;
        };

        while let Some(c) = chars.next() {
            match c {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(c);
                }
                '?' if !in_literal => placeholder(&mut out),
                '%' if !in_literal && chars.peek() == Some(&'s') => {
                    chars.next();
                    placeholder(&mut out);
                }
                _ => out.push(c),
            }
        }
        (out, count)
    }
}
