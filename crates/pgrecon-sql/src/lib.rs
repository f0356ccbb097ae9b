//! SQL text helpers.
//!
//! Catalog object names cannot be bound as query parameters, so every table
//! or column name that reaches generated SQL goes through [`validate_ident`]
//! first and is then written with [`Ident`], which always double-quotes.

mod clause;
pub use clause::*;

use thiserror::Error;

/// Longest identifier Postgres keeps without truncation (`NAMEDATALEN - 1`).
pub const PG_IDENT_MAX: usize = 63;

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use pgrecon_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use pgrecon_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// A schema-qualified relation name, written as `"schema"."table"`.
///
/// # Example
/// ```
/// use pgrecon_sql::Qualified;
/// assert_eq!(format!("{}", Qualified("public", "user")), "\"public\".\"user\"");
/// ```
pub struct Qualified<S: AsRef<str>, T: AsRef<str>>(pub S, pub T);

impl<S: AsRef<str>, T: AsRef<str>> std::fmt::Display for Qualified<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", Ident(self.0.as_ref()), Ident(self.1.as_ref()))
    }
}

/// Escape a string literal for SQL.
pub fn escape_string(s: &str) -> String {
    format!("{}", Lit(s))
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Why a name was rejected by [`validate_ident`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier '{name}' is longer than 63 bytes")]
    TooLong { name: String },

    #[error("identifier '{name}' must start with a letter or underscore")]
    BadStart { name: String },

    #[error("identifier '{name}' contains '{ch}', only letters, digits, '_' and '$' are allowed")]
    BadChar { name: String, ch: char },
}

/// Check a name coming from configuration before it is interpolated into SQL.
///
/// Accepts the unquoted-identifier alphabet (letters, digits, `_`, `$`, not
/// starting with a digit or `$`) up to [`PG_IDENT_MAX`] bytes. Names that
/// pass are still written quoted, so case is preserved.
///
/// # Example
/// ```
/// use pgrecon_sql::validate_ident;
/// assert!(validate_ident("user_id").is_ok());
/// assert!(validate_ident("id; drop table users").is_err());
/// ```
pub fn validate_ident(name: &str) -> Result<&str, IdentError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(IdentError::Empty);
    };
    if name.len() > PG_IDENT_MAX {
        return Err(IdentError::TooLong {
            name: name.to_string(),
        });
    }
    if !(first.is_alphabetic() || first == '_') {
        return Err(IdentError::BadStart {
            name: name.to_string(),
        });
    }
    if let Some(ch) = chars.find(|c| !(c.is_alphanumeric() || *c == '_' || *c == '$')) {
        return Err(IdentError::BadChar {
            name: name.to_string(),
            ch,
        });
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quote_ident_reserved_word() {
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("MixedCase"), "\"MixedCase\"");
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string(""), "''");
        assert_eq!(escape_string("o'reilly"), "'o''reilly'");
    }

    #[test]
    fn test_validate_ident_accepts() {
        for name in ["id", "_private", "user_id", "Order2", "a$b", "été"] {
            assert_eq!(validate_ident(name), Ok(name));
        }
    }

    #[test]
    fn test_validate_ident_rejects() {
        assert_eq!(validate_ident(""), Err(IdentError::Empty));
        assert!(matches!(
            validate_ident("1abc"),
            Err(IdentError::BadStart { .. })
        ));
        assert!(matches!(
            validate_ident("$abc"),
            Err(IdentError::BadStart { .. })
        ));
        assert!(matches!(
            validate_ident("a\"b"),
            Err(IdentError::BadChar { ch: '"', .. })
        ));
        assert!(matches!(
            validate_ident("a b"),
            Err(IdentError::BadChar { ch: ' ', .. })
        ));
        let long = "a".repeat(PG_IDENT_MAX + 1);
        assert!(matches!(
            validate_ident(&long),
            Err(IdentError::TooLong { .. })
        ));
        assert!(validate_ident(&"a".repeat(PG_IDENT_MAX)).is_ok());
    }

    proptest! {
        #[test]
        fn quoted_ident_round_trips(name in "\\PC{1,20}") {
            let quoted = quote_ident(&name);
            prop_assert!(quoted.starts_with('"') && quoted.ends_with('"'));
            let inner = &quoted[1..quoted.len() - 1];
            prop_assert_eq!(inner.replace("\"\"", "\""), name);
        }

        #[test]
        fn literal_never_leaks_quote(s in "\\PC{0,20}") {
            let lit = escape_string(&s);
            let inner = &lit[1..lit.len() - 1];
            prop_assert_eq!(inner.replace("''", "'"), s);
        }
    }
}
