pub mod trigger;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::constants::schedule::{MISFIRE_GRACE_SECS, TIMEZONE};
use crate::db::Store;
use crate::models::query::{ExecutionRecord, QueryRequest};
use crate::models::schedule::{RunStatus, ScheduleDefinition, ScheduleError, ScheduleSpec};
use crate::services::pipeline::ExecutionPipeline;

/// Snapshot of one registered job for status reporting.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub schedule_id: i32,
    pub next_fire: Option<DateTime<Tz>>,
    pub seconds_until_fire: Option<i64>,
}

struct Inner {
    scheduler: JobScheduler,
    store: Store,
    pipeline: RwLock<Option<Arc<ExecutionPipeline>>>,
    /// schedule id -> job uuid for the currently registered jobs
    jobs: Mutex<HashMap<i32, Uuid>>,
    /// Per-schedule locks so two firings of the same definition never
    /// overlap, even when a manual run races a cron fire.
    fire_locks: Mutex<HashMap<i32, Arc<Mutex<()>>>>,
    running: RwLock<bool>,
}

/// Owns the cron runtime and the mapping from schedule definitions to
/// live jobs. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

impl JobRegistry {
    pub async fn new(store: Store) -> Result<Self, ScheduleError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| ScheduleError::Scheduler(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                scheduler,
                store,
                pipeline: RwLock::new(None),
                jobs: Mutex::new(HashMap::new()),
                fire_locks: Mutex::new(HashMap::new()),
                running: RwLock::new(false),
            }),
        })
    }

    /// Wires in the pipeline jobs execute through. Jobs that fire before
    /// this is called log an error and skip.
    pub async fn set_pipeline(&self, pipeline: Arc<ExecutionPipeline>) {
        *self.inner.pipeline.write().await = Some(pipeline);
    }

    /// Starts the cron runtime. Calling twice is a no-op.
    pub async fn start(&self) -> Result<(), ScheduleError> {
        let mut running = self.inner.running.write().await;
        if *running {
            return Ok(());
        }
        self.inner
            .scheduler
            .start()
            .await
            .map_err(|e| ScheduleError::Scheduler(e.to_string()))?;
        *running = true;
        info!("Job scheduler started");
        Ok(())
    }

    /// Stops the cron runtime. Calling twice, or before start, is a no-op.
    pub async fn shutdown(&self) -> Result<(), ScheduleError> {
        let mut running = self.inner.running.write().await;
        if !*running {
            return Ok(());
        }
        let mut scheduler = self.inner.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| ScheduleError::Scheduler(e.to_string()))?;
        *running = false;
        info!("Job scheduler stopped");
        Ok(())
    }

    /// Registers a job for a schedule, replacing any job already registered
    /// under the same id. Returns whether a previous job was replaced, so
    /// repeated registration of the same definition stays idempotent.
    pub async fn register_or_replace(
        &self,
        id: i32,
        spec: &ScheduleSpec,
    ) -> Result<bool, ScheduleError> {
        let trigger = trigger::compile(spec)?;

        let mut jobs = self.inner.jobs.lock().await;

        let replaced = if let Some(old) = jobs.remove(&id) {
            if let Err(e) = self.inner.scheduler.remove(&old).await {
                warn!(schedule_id = id, error = %e, "Could not remove stale job");
            }
            true
        } else {
            false
        };

        let registry = self.clone();
        let job = Job::new_async_tz(trigger.pattern(), TIMEZONE, move |_uuid, _lock| {
            let registry = registry.clone();
            Box::pin(async move {
                registry.fire(id).await;
            })
        })
        .map_err(|e| ScheduleError::Scheduler(e.to_string()))?;

        let uuid = self
            .inner
            .scheduler
            .add(job)
            .await
            .map_err(|e| ScheduleError::Scheduler(e.to_string()))?;

        jobs.insert(id, uuid);
        info!(schedule_id = id, pattern = trigger.pattern(), "Registered job");
        Ok(replaced)
    }

    /// Removes the job for a schedule. Returns false when no job was
    /// registered under that id.
    pub async fn unregister(&self, id: i32) -> bool {
        let mut jobs = self.inner.jobs.lock().await;
        let Some(uuid) = jobs.remove(&id) else {
            return false;
        };
        if let Err(e) = self.inner.scheduler.remove(&uuid).await {
            warn!(schedule_id = id, error = %e, "Could not remove job");
        }
        info!(schedule_id = id, "Unregistered job");
        true
    }

    /// Registers jobs for every active definition in the store. A bad
    /// definition is logged and skipped so one corrupt row cannot keep the
    /// rest of the schedules from loading. Fires missed within the grace
    /// window while the process was down are caught up immediately.
    pub async fn load_all(&self) -> Result<usize, ScheduleError> {
        let definitions = self
            .inner
            .store
            .list_active_definitions()
            .await
            .map_err(|e| ScheduleError::Scheduler(e.to_string()))?;

        let mut loaded = 0usize;
        for definition in definitions {
            let spec = match definition.spec() {
                Ok(spec) => spec,
                Err(e) => {
                    error!(schedule_id = definition.id, error = %e, "Skipping definition with invalid schedule");
                    continue;
                }
            };

            if let Err(e) = self.register_or_replace(definition.id, &spec).await {
                error!(schedule_id = definition.id, error = %e, "Could not register job");
                continue;
            }
            loaded += 1;

            if let Some(missed_at) = missed_fire(&definition, &spec) {
                info!(
                    schedule_id = definition.id,
                    missed_at = %missed_at,
                    "Catching up missed fire within grace window"
                );
                self.fire(definition.id).await;
            }
        }

        info!(count = loaded, "Loaded scheduled queries");
        Ok(loaded)
    }

    /// Runs a schedule immediately, outside its cron trigger. Execution
    /// failures end up in the run history like any scheduled fire; only a
    /// missing definition is an error here.
    pub async fn execute_now(&self, id: i32) -> Result<(), ScheduleError> {
        match self.fire(id).await {
            FireOutcome::SkippedMissing => Err(ScheduleError::NotFound(id)),
            FireOutcome::StoreUnavailable(msg) => Err(ScheduleError::Scheduler(msg)),
            _ => Ok(()),
        }
    }

    /// Whether the cron runtime is currently running.
    pub async fn is_running(&self) -> bool {
        *self.inner.running.read().await
    }

    /// Next fire times for all registered jobs, in the fixed scheduler
    /// timezone, ordered by schedule id.
    pub async fn status(&self) -> Vec<JobStatus> {
        let jobs: Vec<(i32, Uuid)> = {
            let map = self.inner.jobs.lock().await;
            let mut pairs: Vec<_> = map.iter().map(|(id, uuid)| (*id, *uuid)).collect();
            pairs.sort_unstable_by_key(|(id, _)| *id);
            pairs
        };

        let mut scheduler = self.inner.scheduler.clone();
        let now = Utc::now();

        let mut statuses = Vec::with_capacity(jobs.len());
        for (schedule_id, uuid) in jobs {
            let next_utc = scheduler.next_tick_for_job(uuid).await.ok().flatten();
            statuses.push(JobStatus {
                schedule_id,
                next_fire: next_utc.map(|t| t.with_timezone(&TIMEZONE)),
                seconds_until_fire: next_utc.map(|t| (t - now).num_seconds().max(0)),
            });
        }
        statuses
    }

    async fn fire_lock(&self, id: i32) -> Arc<Mutex<()>> {
        let mut locks = self.inner.fire_locks.lock().await;
        Arc::clone(locks.entry(id).or_default())
    }

    /// The fire path, shared by timer fires and manual runs. Never
    /// propagates an error: every failure past this point is logged and,
    /// where the pipeline produced anything, persisted as a failed run.
    /// The outcome only tells the caller which skip branch was taken.
    async fn fire(&self, id: i32) -> FireOutcome {
        let lock = self.fire_lock(id).await;
        let _guard = lock.lock().await;

        let definition = match self.inner.store.get_definition(id).await {
            Ok(Some(definition)) => definition,
            Ok(None) => {
                warn!(schedule_id = id, "Definition no longer exists, skipping fire");
                return FireOutcome::SkippedMissing;
            }
            Err(e) => {
                error!(schedule_id = id, error = %e, "Could not load definition for fire");
                return FireOutcome::StoreUnavailable(e.to_string());
            }
        };

        if !definition.is_active {
            info!(schedule_id = id, "Definition is inactive, skipping fire");
            return FireOutcome::SkippedInactive;
        }

        let Some(pipeline) = self.inner.pipeline.read().await.clone() else {
            error!(schedule_id = id, "No pipeline configured, skipping fire");
            return FireOutcome::SkippedUnconfigured;
        };

        info!(schedule_id = id, question = %definition.question, "Firing scheduled query");
        metrics::counter!("scheduler_fires_total").increment(1);
        let start = std::time::Instant::now();

        let request = QueryRequest::new(definition.question.clone(), definition.tables_used.clone());

        let mut record = match pipeline.run(&request).await {
            Ok(record) => record,
            Err(e) => {
                error!(schedule_id = id, error = %e, "Scheduled pipeline run failed");
                ExecutionRecord::failure(&request, String::new(), e.to_string())
            }
        };
        record.is_scheduled = true;

        let status = if record.is_successful {
            RunStatus::Success
        } else {
            RunStatus::Error
        };

        if let Err(e) = self.inner.store.save_record(&record).await {
            error!(schedule_id = id, error = %e, "Could not persist execution record");
        }
        if let Err(e) = self.inner.store.record_run(id, status).await {
            error!(schedule_id = id, error = %e, "Could not update run bookkeeping");
        }

        info!(
            schedule_id = id,
            status = status.as_str(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Scheduled query finished"
        );
        FireOutcome::Completed
    }
}

/// How one call to the fire path ended. Skips are normal operation; only
/// `execute_now` turns them into caller-visible errors.
enum FireOutcome {
    Completed,
    SkippedMissing,
    SkippedInactive,
    SkippedUnconfigured,
    StoreUnavailable(String),
}

/// Returns the fire time a definition missed while the process was down,
/// if it falls inside the grace window, postdates the definition's creation,
/// and postdates the last recorded run.
fn missed_fire(definition: &ScheduleDefinition, spec: &ScheduleSpec) -> Option<DateTime<Tz>> {
    let trigger = trigger::compile(spec).ok()?;
    let now = Utc::now().with_timezone(&TIMEZONE);
    let window_start = now - Duration::seconds(MISFIRE_GRACE_SECS);

    let due = trigger.occurrence_from(window_start)?;
    if due > now {
        return None;
    }
    let due_utc = due.with_timezone(&Utc);

    // a definition created at or after the slot never missed it
    let predates_definition = definition
        .created_at
        .as_deref()
        .and_then(parse_timestamp)
        .is_some_and(|created| due_utc <= created);
    if predates_definition {
        return None;
    }

    let already_ran = definition
        .last_run_at
        .as_deref()
        .and_then(parse_timestamp)
        .is_some_and(|last| last >= due_utc);

    (!already_ran).then_some(due)
}

/// Timestamps come in two shapes: RFC 3339 where this crate writes them
/// (`last_run_at`) and the database's `CURRENT_TIMESTAMP` format for
/// `created_at`. Both are UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|t| t.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schedule::TimeOfDay;
    use chrono::Timelike;

    fn definition(last_run_at: Option<String>) -> ScheduleDefinition {
        ScheduleDefinition {
            id: 1,
            question: "how many orders today?".to_string(),
            tables_used: vec!["orders".to_string()],
            schedule_type: "hourly".to_string(),
            schedule_time: None,
            schedule_day: None,
            cron_expression: None,
            is_active: true,
            // the database's CURRENT_TIMESTAMP shape, long in the past
            created_at: Some("2020-01-01 00:00:00".to_string()),
            last_run_at,
            last_run_status: None,
            run_count: 0,
        }
    }

    #[test]
    fn missed_fire_detected_for_stale_hourly_run() {
        // hourly fires at minute 0; the top of the current hour is always
        // inside the one hour grace window
        let def = definition(None);
        assert!(missed_fire(&def, &ScheduleSpec::Hourly).is_some());
    }

    #[test]
    fn missed_fire_skipped_when_already_ran() {
        let def = definition(Some(Utc::now().to_rfc3339()));
        assert!(missed_fire(&def, &ScheduleSpec::Hourly).is_none());
    }

    #[test]
    fn missed_fire_skipped_for_definition_created_after_slot() {
        // created after every slot in the grace window: nothing was missed
        let mut def = definition(None);
        def.created_at = Some((Utc::now() + Duration::seconds(5)).to_rfc3339());
        assert!(missed_fire(&def, &ScheduleSpec::Hourly).is_none());
    }

    #[test]
    fn parses_both_timestamp_shapes() {
        let rfc = parse_timestamp("2026-03-10T09:00:00+00:00").unwrap();
        let db = parse_timestamp("2026-03-10 09:00:00").unwrap();
        assert_eq!(rfc, db);
        assert!(parse_timestamp("not a time").is_none());
    }

    #[test]
    fn missed_fire_none_outside_grace_window() {
        // daily at a time more than an hour away in both directions
        let now = Utc::now().with_timezone(&TIMEZONE);
        let far = TimeOfDay {
            hour: ((now.hour() + 12) % 24) as u8,
            minute: 30,
        };
        let def = definition(None);
        assert!(missed_fire(&def, &ScheduleSpec::Daily { time: far }).is_none());
    }
}
