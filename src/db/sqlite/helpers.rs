//! Shared SQL-building helpers.

/// Build a `?, ?, ?` placeholder list for IN clauses.
pub(crate) fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 3);
    for i in 0..n {
        if i > 0 {
            s.push_str(", ");
        }
        s.push('?');
    }
    s
}

/// Build a LIMIT/OFFSET clause. SQLite requires LIMIT when OFFSET is used;
/// -1 means "no limit".
pub(crate) fn limit_offset(limit: Option<i64>, offset: Option<i64>) -> String {
    let mut clause = String::new();
    let offset = offset.unwrap_or(0);

    if let Some(limit) = limit {
        clause.push_str(&format!(" LIMIT {}", limit));
    } else if offset > 0 {
        clause.push_str(" LIMIT -1");
    }

    if offset > 0 {
        clause.push_str(&format!(" OFFSET {}", offset));
    }

    clause
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_builds_list() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn limit_offset_requires_limit_with_offset() {
        assert_eq!(limit_offset(None, None), "");
        assert_eq!(limit_offset(Some(10), None), " LIMIT 10");
        assert_eq!(limit_offset(Some(10), Some(5)), " LIMIT 10 OFFSET 5");
        assert_eq!(limit_offset(None, Some(5)), " LIMIT -1 OFFSET 5");
    }
}
