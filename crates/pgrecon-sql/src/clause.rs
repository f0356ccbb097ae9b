//! Small clause builders for hand-assembled queries.

use crate::{Ident, IdentError, validate_ident};

/// Join predicates into a `where` clause.
///
/// Returns an empty string when there are no predicates, so the result can
/// always be spliced into a query.
///
/// # Example
/// ```
/// use pgrecon_sql::where_clause;
/// assert_eq!(where_clause(&["a = $1", "b is null"]), "where a = $1 and b is null");
/// assert_eq!(where_clause::<&str>(&[]), "");
/// ```
pub fn where_clause<S: AsRef<str>>(predicates: &[S]) -> String {
    if predicates.is_empty() {
        return String::new();
    }
    let parts: Vec<&str> = predicates.iter().map(|p| p.as_ref()).collect();
    format!("where {}", parts.join(" and "))
}

/// Build an `order by` clause from sort keys.
///
/// A leading `-` sorts that key descending. Keys are validated and quoted.
///
/// # Example
/// ```
/// use pgrecon_sql::order_by;
/// assert_eq!(order_by(&["name", "-id"]).unwrap(), "order by \"name\" asc, \"id\" desc");
/// ```
pub fn order_by<S: AsRef<str>>(keys: &[S]) -> Result<String, IdentError> {
    let mut parts = Vec::new();
    for key in keys {
        let key = key.as_ref().trim();
        if key.is_empty() {
            continue;
        }
        let (name, dir) = match key.strip_prefix('-') {
            Some(name) => (name, "desc"),
            None => (key, "asc"),
        };
        parts.push(format!("{} {}", Ident(validate_ident(name)?), dir));
    }
    if parts.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("order by {}", parts.join(", ")))
}

const BIGINT_MAX: u64 = i64::MAX as u64;

/// Build an `offset .. limit ..` clause for 1-based pages.
///
/// Returns an empty string unless both `page` and `limit` are set. Values
/// past the `bigint` range are clamped to it; such a page is simply empty.
///
/// # Example
/// ```
/// use pgrecon_sql::page_limit;
/// assert_eq!(page_limit(Some(1), Some(50)), "limit 50");
/// assert_eq!(page_limit(Some(3), Some(50)), "offset 100 limit 50");
/// assert_eq!(page_limit(None, Some(50)), "");
/// ```
pub fn page_limit(page: Option<u64>, limit: Option<u64>) -> String {
    match (page, limit) {
        (Some(page), Some(limit)) if page > 0 && limit > 0 => {
            let limit = limit.min(BIGINT_MAX);
            if page > 1 {
                let offset = (page - 1).saturating_mul(limit).min(BIGINT_MAX);
                format!("offset {} limit {}", offset, limit)
            } else {
                format!("limit {}", limit)
            }
        }
        _ => String::new(),
    }
}
