use crate::models::query::ReducedSchema;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("SQL generation failed: {0}")]
pub struct GeneratorError(pub String);

/// Turns a natural language question plus a reduced schema into a single
/// SQL statement. Implementations call out to a model provider; tests use
/// canned responses.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(
        &self,
        question: &str,
        schema: &ReducedSchema,
    ) -> Result<String, GeneratorError>;
}
