use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::constants::limits;
use crate::credentials::CredentialError;
use crate::models::query::{
    ExecutionRecord, QueryRequest, QueryType, ReducedSchema, TableSchema,
};
use crate::services::generator::SqlGenerator;
use crate::services::sql_guard;
use crate::target::{QueryTarget, SqlOutcome, TargetError};

/// Errors that abort a pipeline run before any result exists. Failures
/// of the generated SQL itself (unsafe statement, execution error) do not
/// appear here; those are captured inside a failed [`ExecutionRecord`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("could not reach target database: {0}")]
    Connection(String),

    #[error("SQL generation failed: {0}")]
    Upstream(String),
}

/// Runs one question end to end: validate, reduce the schema, generate
/// SQL, gate it for safety, execute it, and report the outcome.
pub struct ExecutionPipeline {
    target: Arc<dyn QueryTarget>,
    generator: Arc<dyn SqlGenerator>,
}

impl ExecutionPipeline {
    #[must_use]
    pub fn new(target: Arc<dyn QueryTarget>, generator: Arc<dyn SqlGenerator>) -> Self {
        Self { target, generator }
    }

    /// Executes the full pipeline for one request.
    ///
    /// Returns `Ok` with a failed record when the generated SQL is unsafe
    /// or the statement itself errors, and `Err` only for problems that
    /// precede execution (bad request, unreachable database, generation
    /// failure).
    pub async fn run(&self, request: &QueryRequest) -> Result<ExecutionRecord, PipelineError> {
        self.validate(request)?;

        let schema = self.reduce_schema(request).await?;

        let sql = self
            .generator
            .generate_sql(&request.question, &schema)
            .await
            .map_err(|e| PipelineError::Upstream(e.0))?;

        if let Err(e) = sql_guard::check(&sql) {
            warn!(error = %e, "Rejected generated SQL");
            metrics::counter!("pipeline_unsafe_sql_total").increment(1);
            return Ok(ExecutionRecord::failure(request, sql, e.to_string()));
        }

        let kind = QueryType::classify(&sql);
        if kind == QueryType::Other {
            return Ok(ExecutionRecord::failure(
                request,
                sql,
                format!("Refusing to execute statement of type {}", kind.as_str()),
            ));
        }

        info!(kind = kind.as_str(), "Executing generated SQL");
        match self.target.run_sql(&sql, kind).await {
            Ok(SqlOutcome::Rows(rows)) => {
                metrics::counter!("pipeline_runs_total", "outcome" => "success").increment(1);
                Ok(ExecutionRecord::success(
                    request,
                    sql,
                    Some(serde_json::Value::Array(rows)),
                    None,
                ))
            }
            Ok(SqlOutcome::RowsAffected(count)) => {
                metrics::counter!("pipeline_runs_total", "outcome" => "success").increment(1);
                Ok(ExecutionRecord::success(
                    request,
                    sql,
                    None,
                    Some(format!("{count} rows affected.")),
                ))
            }
            Err(TargetError::Execute(msg)) => {
                metrics::counter!("pipeline_runs_total", "outcome" => "error").increment(1);
                warn!(error = %msg, "Statement execution failed");
                Ok(ExecutionRecord::failure(request, sql, msg))
            }
            Err(TargetError::Connect(msg)) => Err(PipelineError::Connection(msg)),
            Err(TargetError::Credential(e)) => Err(PipelineError::Credential(e)),
        }
    }

    fn validate(&self, request: &QueryRequest) -> Result<(), PipelineError> {
        if request.question.trim().is_empty() {
            return Err(PipelineError::Validation("question cannot be empty".into()));
        }
        if request.tables.is_empty() {
            return Err(PipelineError::Validation(
                "at least one table must be specified".into(),
            ));
        }
        if request.tables.len() > limits::MAX_TABLES_PER_QUERY {
            return Err(PipelineError::Validation(format!(
                "at most {} tables per query",
                limits::MAX_TABLES_PER_QUERY
            )));
        }
        Ok(())
    }

    /// Resolves column lists for the requested tables, dropping ones the
    /// target does not know about. An empty result is a validation error:
    /// generating SQL against nothing would only hallucinate.
    async fn reduce_schema(&self, request: &QueryRequest) -> Result<ReducedSchema, PipelineError> {
        let mut schema = ReducedSchema::default();

        for table in &request.tables {
            match self.target.table_columns(table).await {
                Ok(columns) if columns.is_empty() => {
                    warn!(table = %table, "Table not found in target schema, skipping");
                }
                Ok(columns) => schema.tables.push(TableSchema {
                    name: table.clone(),
                    columns,
                }),
                Err(TargetError::Execute(msg)) => {
                    warn!(table = %table, error = %msg, "Could not describe table, skipping");
                }
                Err(TargetError::Connect(msg)) => return Err(PipelineError::Connection(msg)),
                Err(TargetError::Credential(e)) => return Err(PipelineError::Credential(e)),
            }
        }

        if schema.is_empty() {
            return Err(PipelineError::Validation(
                "none of the requested tables exist in the target database".into(),
            ));
        }

        Ok(schema)
    }
}
