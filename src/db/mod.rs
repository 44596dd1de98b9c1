use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::models::query::ExecutionRecord;
use crate::models::schedule::{RunStatus, ScheduleDefinition, ScheduleSpec};

pub mod migrator;
pub mod repositories;

/// The engine's own bookkeeping database: schedule definitions and run
/// history. Not to be confused with the target database queries run against.
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Store connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn schedule_repo(&self) -> repositories::schedule::ScheduleRepository {
        repositories::schedule::ScheduleRepository::new(self.conn.clone())
    }

    fn record_repo(&self) -> repositories::record::RecordRepository {
        repositories::record::RecordRepository::new(self.conn.clone())
    }

    // ========== Schedule definitions ==========

    pub async fn save_definition(
        &self,
        question: &str,
        tables: &[String],
        spec: &ScheduleSpec,
        is_active: bool,
    ) -> Result<i32> {
        self.schedule_repo().save(question, tables, spec, is_active).await
    }

    pub async fn get_definition(&self, id: i32) -> Result<Option<ScheduleDefinition>> {
        self.schedule_repo().get(id).await
    }

    pub async fn list_definitions(&self) -> Result<Vec<ScheduleDefinition>> {
        self.schedule_repo().list_all().await
    }

    pub async fn list_active_definitions(&self) -> Result<Vec<ScheduleDefinition>> {
        self.schedule_repo().list_active().await
    }

    pub async fn update_definition(
        &self,
        id: i32,
        question: &str,
        tables: &[String],
        spec: &ScheduleSpec,
        is_active: bool,
    ) -> Result<bool> {
        self.schedule_repo()
            .update(id, question, tables, spec, is_active)
            .await
    }

    pub async fn set_definition_active(&self, id: i32, is_active: bool) -> Result<bool> {
        self.schedule_repo().set_active(id, is_active).await
    }

    pub async fn delete_definition(&self, id: i32) -> Result<bool> {
        self.schedule_repo().delete(id).await
    }

    pub async fn record_run(&self, id: i32, status: RunStatus) -> Result<bool> {
        self.schedule_repo().record_run(id, status).await
    }

    // ========== Execution records ==========

    pub async fn save_record(&self, record: &ExecutionRecord) -> Result<i32> {
        self.record_repo().save(record).await
    }

    pub async fn list_records(&self, limit: u64, offset: u64) -> Result<Vec<ExecutionRecord>> {
        self.record_repo().list(limit, offset).await
    }

    pub async fn get_record(&self, id: i32) -> Result<Option<ExecutionRecord>> {
        self.record_repo().get(id).await
    }

    pub async fn delete_record(&self, id: i32) -> Result<bool> {
        self.record_repo().delete(id).await
    }
}
