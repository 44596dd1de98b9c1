use crate::entities::{prelude::*, scheduled_queries};
use crate::models::schedule::{RunStatus, ScheduleDefinition, ScheduleSpec};
use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::info;

const TABLE_DELIMITER: &str = ",";

/// Repository for scheduled query definitions.
pub struct ScheduleRepository {
    conn: DatabaseConnection,
}

impl ScheduleRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(m: scheduled_queries::Model) -> ScheduleDefinition {
        ScheduleDefinition {
            id: m.id,
            question: m.question,
            tables_used: split_tables(&m.tables_used),
            schedule_type: m.schedule_type,
            schedule_time: m.schedule_time,
            schedule_day: m.schedule_day,
            cron_expression: m.cron_expression,
            is_active: m.is_active,
            created_at: m.created_at,
            last_run_at: m.last_run_at,
            last_run_status: m.last_run_status,
            run_count: m.run_count,
        }
    }

    pub async fn save(
        &self,
        question: &str,
        tables: &[String],
        spec: &ScheduleSpec,
        is_active: bool,
    ) -> Result<i32> {
        let (schedule_type, schedule_time, schedule_day, cron_expression) = spec.to_parts();

        let active_model = scheduled_queries::ActiveModel {
            question: Set(question.to_string()),
            tables_used: Set(join_tables(tables)),
            schedule_type: Set(schedule_type.to_string()),
            schedule_time: Set(schedule_time),
            schedule_day: Set(schedule_day),
            cron_expression: Set(cron_expression),
            is_active: Set(is_active),
            run_count: Set(0),
            ..Default::default()
        };

        let res = ScheduledQueries::insert(active_model).exec(&self.conn).await?;
        info!("Saved scheduled query {} ({})", res.last_insert_id, schedule_type);
        Ok(res.last_insert_id)
    }

    pub async fn get(&self, id: i32) -> Result<Option<ScheduleDefinition>> {
        let row = ScheduledQueries::find_by_id(id).one(&self.conn).await?;
        Ok(row.map(Self::map_model))
    }

    pub async fn list_all(&self) -> Result<Vec<ScheduleDefinition>> {
        let rows = ScheduledQueries::find()
            .order_by_asc(scheduled_queries::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(Self::map_model).collect())
    }

    pub async fn list_active(&self) -> Result<Vec<ScheduleDefinition>> {
        let rows = ScheduledQueries::find()
            .filter(scheduled_queries::Column::IsActive.eq(true))
            .order_by_asc(scheduled_queries::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(Self::map_model).collect())
    }

    pub async fn update(
        &self,
        id: i32,
        question: &str,
        tables: &[String],
        spec: &ScheduleSpec,
        is_active: bool,
    ) -> Result<bool> {
        let (schedule_type, schedule_time, schedule_day, cron_expression) = spec.to_parts();

        let result = ScheduledQueries::update_many()
            .col_expr(scheduled_queries::Column::Question, Expr::value(question))
            .col_expr(
                scheduled_queries::Column::TablesUsed,
                Expr::value(join_tables(tables)),
            )
            .col_expr(
                scheduled_queries::Column::ScheduleType,
                Expr::value(schedule_type),
            )
            .col_expr(
                scheduled_queries::Column::ScheduleTime,
                Expr::value(schedule_time),
            )
            .col_expr(
                scheduled_queries::Column::ScheduleDay,
                Expr::value(schedule_day),
            )
            .col_expr(
                scheduled_queries::Column::CronExpression,
                Expr::value(cron_expression),
            )
            .col_expr(scheduled_queries::Column::IsActive, Expr::value(is_active))
            .filter(scheduled_queries::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn set_active(&self, id: i32, is_active: bool) -> Result<bool> {
        let result = ScheduledQueries::update_many()
            .col_expr(scheduled_queries::Column::IsActive, Expr::value(is_active))
            .filter(scheduled_queries::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = ScheduledQueries::delete_by_id(id).exec(&self.conn).await?;
        Ok(result.rows_affected > 0)
    }

    /// Updates the run bookkeeping after one firing: stamps `last_run_at`,
    /// sets the status, and bumps `run_count` by one.
    pub async fn record_run(&self, id: i32, status: RunStatus) -> Result<bool> {
        let result = ScheduledQueries::update_many()
            .col_expr(
                scheduled_queries::Column::LastRunAt,
                Expr::value(Utc::now().to_rfc3339()),
            )
            .col_expr(
                scheduled_queries::Column::LastRunStatus,
                Expr::value(status.as_str()),
            )
            .col_expr(
                scheduled_queries::Column::RunCount,
                Expr::col(scheduled_queries::Column::RunCount).add(1),
            )
            .filter(scheduled_queries::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }
}

pub(crate) fn join_tables(tables: &[String]) -> String {
    tables.join(TABLE_DELIMITER)
}

pub(crate) fn split_tables(joined: &str) -> Vec<String> {
    joined
        .split(TABLE_DELIMITER)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}
