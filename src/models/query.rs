use serde::Serialize;

/// Classification of a generated SQL statement, by leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl QueryType {
    /// Classifies a statement. `WITH ... SELECT` counts as a read query.
    #[must_use]
    pub fn classify(sql: &str) -> Self {
        let upper = sql.trim_start().to_uppercase();

        if upper.starts_with("SELECT") || upper.starts_with("WITH") {
            Self::Select
        } else if upper.starts_with("INSERT") {
            Self::Insert
        } else if upper.starts_with("UPDATE") {
            Self::Update
        } else if upper.starts_with("DELETE") {
            Self::Delete
        } else {
            Self::Other
        }
    }

    /// Read queries return row data; write queries return an affected-row count.
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Select)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Other => "OTHER",
        }
    }
}

/// A natural-language query request: the question plus the tables it may use.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub question: String,
    pub tables: Vec<String>,
}

impl QueryRequest {
    #[must_use]
    pub fn new(question: impl Into<String>, tables: Vec<String>) -> Self {
        Self {
            question: sanitize_question(&question.into()),
            tables,
        }
    }
}

/// Strips control characters and caps the question length. The cap counts
/// characters, not bytes, so multibyte text never splits mid-character.
#[must_use]
pub fn sanitize_question(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.chars().count() > crate::constants::limits::MAX_QUESTION_LENGTH {
        tracing::warn!(
            "Question truncated to {} characters",
            crate::constants::limits::MAX_QUESTION_LENGTH
        );
        trimmed
            .chars()
            .take(crate::constants::limits::MAX_QUESTION_LENGTH)
            .collect()
    } else {
        trimmed.to_string()
    }
}

/// Schema for one table, reduced to what the SQL generator needs.
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

/// The requested tables' schemas, with unknown tables already dropped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReducedSchema {
    pub tables: Vec<TableSchema>,
}

impl ReducedSchema {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Plain-text rendering used in the generation prompt.
    #[must_use]
    pub fn to_prompt_block(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("- {} ({})\n", table.name, table.columns.join(", ")));
        }
        out
    }
}

/// The stored outcome of one pipeline run, scheduled or ad hoc.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub id: Option<i32>,
    pub question: String,
    pub sql_query: String,
    pub tables_used: Vec<String>,
    pub created_at: Option<String>,
    pub is_successful: bool,
    pub error_message: Option<String>,
    /// Row data, present only for read queries.
    pub query_results: Option<serde_json::Value>,
    /// Affected-row message, present only for write queries.
    pub result_message: Option<String>,
    pub is_scheduled: bool,
}

impl ExecutionRecord {
    #[must_use]
    pub fn success(
        request: &QueryRequest,
        sql_query: String,
        query_results: Option<serde_json::Value>,
        result_message: Option<String>,
    ) -> Self {
        Self {
            id: None,
            question: request.question.clone(),
            sql_query,
            tables_used: request.tables.clone(),
            created_at: None,
            is_successful: true,
            error_message: None,
            query_results,
            result_message,
            is_scheduled: false,
        }
    }

    #[must_use]
    pub fn failure(request: &QueryRequest, sql_query: String, error: String) -> Self {
        Self {
            id: None,
            question: request.question.clone(),
            sql_query,
            tables_used: request.tables.clone(),
            created_at: None,
            is_successful: false,
            error_message: Some(error),
            query_results: None,
            result_message: None,
            is_scheduled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statements() {
        assert_eq!(QueryType::classify("SELECT * FROM users"), QueryType::Select);
        assert_eq!(
            QueryType::classify("with cte as (select 1) select * from cte"),
            QueryType::Select
        );
        assert_eq!(
            QueryType::classify("  INSERT INTO t VALUES (1)"),
            QueryType::Insert
        );
        assert_eq!(QueryType::classify("UPDATE t SET a = 1"), QueryType::Update);
        assert_eq!(QueryType::classify("DELETE FROM t"), QueryType::Delete);
        assert_eq!(QueryType::classify("GRANT ALL ON t TO x"), QueryType::Other);
    }

    #[test]
    fn sanitizes_questions() {
        assert_eq!(sanitize_question("  how many\u{0} users?  "), "how many users?");

        let long = "x".repeat(5000);
        assert_eq!(
            sanitize_question(&long).len(),
            crate::constants::limits::MAX_QUESTION_LENGTH
        );
    }

    #[test]
    fn truncates_multibyte_questions_on_character_boundaries() {
        // 3 bytes per character; a byte-offset cut would land mid-character
        let long = "€".repeat(2000);
        let sanitized = sanitize_question(&long);
        assert_eq!(
            sanitized.chars().count(),
            crate::constants::limits::MAX_QUESTION_LENGTH
        );
        assert!(sanitized.chars().all(|c| c == '€'));

        let short = "satış toplamı nedir?";
        assert_eq!(sanitize_question(short), short);
    }

    #[test]
    fn prompt_block_lists_tables() {
        let schema = ReducedSchema {
            tables: vec![TableSchema {
                name: "orders".to_string(),
                columns: vec!["id".to_string(), "total".to_string()],
            }],
        };
        assert_eq!(schema.to_prompt_block(), "- orders (id, total)\n");
    }
}
