use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AiConfig;
use crate::models::query::ReducedSchema;
use crate::services::generator::{GeneratorError, SqlGenerator};

const MAX_COMPLETION_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.1;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiClient {
    #[must_use]
    pub fn new(config: &AiConfig, api_key: String) -> Self {
        Self {
            client: Client::builder()
                .user_agent("SqlPilot/1.0")
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let request_body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("chat completion returned {status}: {body}"));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("could not parse chat completion response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| anyhow!("chat completion returned no content"))
    }

    fn build_prompt(question: &str, schema: &ReducedSchema) -> String {
        format!(
            "You are an expert SQL developer. Convert the question below into a \
             single SQL statement.\n\n\
             Database schema:\n{}\n\
             Instructions:\n\
             1. Use ONLY the tables and columns listed above\n\
             2. Use proper JOINs when multiple tables are involved\n\
             3. Return ONLY the SQL statement, no explanations or markdown\n\n\
             Question: {question}\n\nSQL:",
            schema.to_prompt_block()
        )
    }
}

/// Strips markdown code fences the model sometimes wraps around SQL.
fn strip_code_fences(text: &str) -> String {
    text.replace("```sql", "").replace("```", "").trim().to_string()
}

#[async_trait]
impl SqlGenerator for OpenAiClient {
    async fn generate_sql(
        &self,
        question: &str,
        schema: &ReducedSchema,
    ) -> Result<String, GeneratorError> {
        let prompt = Self::build_prompt(question, schema);

        let raw = self
            .complete(&prompt)
            .await
            .map_err(|e| GeneratorError(e.to_string()))?;

        let sql = strip_code_fences(&raw);
        if sql.is_empty() {
            return Err(GeneratorError("model returned an empty statement".into()));
        }

        debug!(sql = %sql, "Generated SQL");
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query::TableSchema;

    #[test]
    fn strips_fences() {
        assert_eq!(
            strip_code_fences("```sql\nSELECT 1\n```"),
            "SELECT 1"
        );
        assert_eq!(strip_code_fences("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn prompt_includes_schema_and_question() {
        let schema = ReducedSchema {
            tables: vec![TableSchema {
                name: "orders".to_string(),
                columns: vec!["id".to_string(), "total".to_string()],
            }],
        };
        let prompt = OpenAiClient::build_prompt("total sales?", &schema);
        assert!(prompt.contains("- orders (id, total)"));
        assert!(prompt.contains("Question: total sales?"));
    }
}
