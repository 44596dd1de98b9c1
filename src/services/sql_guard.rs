use thiserror::Error;

/// Keywords that are never allowed anywhere in generated SQL, regardless
/// of position. Checked as case-insensitive substrings, so `EXEC` also
/// catches `EXECUTE` and `SP_` catches any system procedure call.
const DENIED_KEYWORDS: &[&str] = &[
    "DROP", "TRUNCATE", "ALTER", "CREATE", "EXEC", "EXECUTE", "SP_", "XP_", "SHUTDOWN", "BACKUP",
    "RESTORE",
];

/// Statements must begin with one of these verbs to be executable at all.
const ALLOWED_STARTERS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "WITH"];

#[derive(Debug, Error)]
pub enum SqlGuardError {
    #[error("empty SQL statement")]
    Empty,
    #[error("statement must start with one of SELECT, INSERT, UPDATE, DELETE, WITH")]
    DisallowedStarter,
    #[error("statement contains forbidden keyword '{0}'")]
    ForbiddenKeyword(&'static str),
    #[error("unbalanced parentheses in statement")]
    UnbalancedParens,
}

/// Rejects SQL that could reach DDL, system procedures, or server control
/// commands. This gate runs on every statement before execution, whether
/// the statement came from a model or directly from a caller.
pub fn check(sql: &str) -> Result<(), SqlGuardError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(SqlGuardError::Empty);
    }

    let upper = trimmed.to_uppercase();

    if !ALLOWED_STARTERS.iter().any(|s| upper.starts_with(s)) {
        return Err(SqlGuardError::DisallowedStarter);
    }

    for keyword in DENIED_KEYWORDS {
        if upper.contains(keyword) {
            return Err(SqlGuardError::ForbiddenKeyword(keyword));
        }
    }

    let mut depth: i64 = 0;
    for ch in trimmed.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(SqlGuardError::UnbalancedParens);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SqlGuardError::UnbalancedParens);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_select() {
        assert!(check("SELECT id, name FROM customers WHERE active = 1").is_ok());
    }

    #[test]
    fn accepts_cte() {
        assert!(check("WITH recent AS (SELECT * FROM orders) SELECT * FROM recent").is_ok());
    }

    #[test]
    fn accepts_writes() {
        assert!(check("INSERT INTO log (msg) VALUES ('hi')").is_ok());
        assert!(check("UPDATE users SET active = 0 WHERE id = 3").is_ok());
        assert!(check("DELETE FROM sessions WHERE expired = 1").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(check("   "), Err(SqlGuardError::Empty)));
    }

    #[test]
    fn rejects_disallowed_starter() {
        assert!(matches!(
            check("GRANT ALL ON db TO user"),
            Err(SqlGuardError::DisallowedStarter)
        ));
    }

    #[test]
    fn rejects_forbidden_keyword_anywhere() {
        assert!(matches!(
            check("SELECT 1; DROP TABLE users"),
            Err(SqlGuardError::ForbiddenKeyword("DROP"))
        ));
        assert!(matches!(
            check("SELECT * FROM t WHERE x = 'exec me'"),
            Err(SqlGuardError::ForbiddenKeyword("EXEC"))
        ));
    }

    #[test]
    fn rejects_forbidden_keyword_case_insensitive() {
        assert!(check("select * from t where note like '%truncate%'").is_err());
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(matches!(
            check("SELECT * FROM t WHERE id IN (1, 2"),
            Err(SqlGuardError::UnbalancedParens)
        ));
        assert!(matches!(
            check("SELECT * FROM t WHERE id IN 1, 2)"),
            Err(SqlGuardError::UnbalancedParens)
        ));
    }
}
