use crate::db::repositories::schedule::{join_tables, split_tables};
use crate::entities::{prelude::*, saved_queries};
use crate::models::query::ExecutionRecord;
use anyhow::Result;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, QuerySelect, Set};

/// Repository for execution records (the run history).
pub struct RecordRepository {
    conn: DatabaseConnection,
}

impl RecordRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(m: saved_queries::Model) -> ExecutionRecord {
        ExecutionRecord {
            id: Some(m.id),
            question: m.question,
            sql_query: m.sql_query,
            tables_used: split_tables(&m.tables_used),
            created_at: m.created_at,
            is_successful: m.is_successful,
            error_message: m.error_message,
            query_results: m
                .query_results
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            result_message: m.result_message,
            is_scheduled: m.is_scheduled,
        }
    }

    pub async fn save(&self, record: &ExecutionRecord) -> Result<i32> {
        let query_results = record
            .query_results
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let active_model = saved_queries::ActiveModel {
            question: Set(record.question.clone()),
            sql_query: Set(record.sql_query.clone()),
            tables_used: Set(join_tables(&record.tables_used)),
            is_successful: Set(record.is_successful),
            error_message: Set(record.error_message.clone()),
            query_results: Set(query_results),
            result_message: Set(record.result_message.clone()),
            is_scheduled: Set(record.is_scheduled),
            ..Default::default()
        };

        let res = SavedQueries::insert(active_model).exec(&self.conn).await?;
        Ok(res.last_insert_id)
    }

    pub async fn list(&self, limit: u64, offset: u64) -> Result<Vec<ExecutionRecord>> {
        let rows = SavedQueries::find()
            .order_by_desc(saved_queries::Column::CreatedAt)
            .order_by_desc(saved_queries::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(Self::map_model).collect())
    }

    pub async fn get(&self, id: i32) -> Result<Option<ExecutionRecord>> {
        let row = SavedQueries::find_by_id(id).one(&self.conn).await?;
        Ok(row.map(Self::map_model))
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = SavedQueries::delete_by_id(id).exec(&self.conn).await?;
        Ok(result.rows_affected > 0)
    }
}
