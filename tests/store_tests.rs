//! Persistence round-trips for schedule definitions and execution history.

use sqlpilot::db::Store;
use sqlpilot::models::query::{ExecutionRecord, QueryRequest};
use sqlpilot::models::schedule::{RunStatus, ScheduleSpec, TimeOfDay};

async fn temp_store() -> Store {
    let db_path =
        std::env::temp_dir().join(format!("sqlpilot-store-test-{}.db", uuid::Uuid::new_v4()));
    Store::new(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("failed to open store")
}

fn daily_nine() -> ScheduleSpec {
    ScheduleSpec::Daily {
        time: TimeOfDay { hour: 9, minute: 0 },
    }
}

#[tokio::test]
async fn definition_round_trip() {
    let store = temp_store().await;

    let spec = ScheduleSpec::Weekly {
        weekday: 0,
        time: TimeOfDay {
            hour: 8,
            minute: 30,
        },
    };
    let id = store
        .save_definition(
            "weekly revenue summary",
            &["orders".to_string(), "customers".to_string()],
            &spec,
            true,
        )
        .await
        .expect("save failed");

    let definition = store
        .get_definition(id)
        .await
        .expect("get failed")
        .expect("definition missing");

    assert_eq!(definition.question, "weekly revenue summary");
    assert_eq!(definition.tables_used, vec!["orders", "customers"]);
    assert_eq!(definition.schedule_type, "weekly");
    assert_eq!(definition.schedule_time.as_deref(), Some("08:30"));
    assert_eq!(definition.schedule_day, Some(0));
    assert!(definition.is_active);
    assert_eq!(definition.run_count, 0);
    assert!(definition.last_run_at.is_none());

    // the stored fields re-validate into the same spec
    assert_eq!(definition.spec().expect("invalid stored spec"), spec);
}

#[tokio::test]
async fn update_and_toggle_and_delete() {
    let store = temp_store().await;

    let id = store
        .save_definition("old question", &["t".to_string()], &daily_nine(), true)
        .await
        .expect("save failed");

    let updated = store
        .update_definition(
            id,
            "new question",
            &["t2".to_string()],
            &ScheduleSpec::Hourly,
            true,
        )
        .await
        .expect("update failed");
    assert!(updated);

    let definition = store.get_definition(id).await.unwrap().unwrap();
    assert_eq!(definition.question, "new question");
    assert_eq!(definition.schedule_type, "hourly");
    assert!(definition.schedule_time.is_none());

    assert!(store.set_definition_active(id, false).await.unwrap());
    assert!(!store.get_definition(id).await.unwrap().unwrap().is_active);

    assert!(store.delete_definition(id).await.unwrap());
    assert!(store.get_definition(id).await.unwrap().is_none());
    assert!(!store.delete_definition(id).await.unwrap());
}

#[tokio::test]
async fn list_active_filters_paused_definitions() {
    let store = temp_store().await;

    let active = store
        .save_definition("active one", &["t".to_string()], &daily_nine(), true)
        .await
        .unwrap();
    let paused = store
        .save_definition("paused one", &["t".to_string()], &daily_nine(), false)
        .await
        .unwrap();

    let all = store.list_definitions().await.unwrap();
    assert_eq!(all.len(), 2);

    let active_only = store.list_active_definitions().await.unwrap();
    assert_eq!(active_only.len(), 1);
    assert_eq!(active_only[0].id, active);
    assert_ne!(active_only[0].id, paused);
}

#[tokio::test]
async fn record_run_stamps_status_and_counts() {
    let store = temp_store().await;

    let id = store
        .save_definition("counted", &["t".to_string()], &daily_nine(), true)
        .await
        .unwrap();

    assert!(store.record_run(id, RunStatus::Success).await.unwrap());
    assert!(store.record_run(id, RunStatus::Error).await.unwrap());

    let definition = store.get_definition(id).await.unwrap().unwrap();
    assert_eq!(definition.run_count, 2);
    assert_eq!(definition.last_run_status.as_deref(), Some("error"));
    assert!(definition.last_run_at.is_some());

    // unknown id is reported, not an error
    assert!(!store.record_run(9999, RunStatus::Success).await.unwrap());
}

#[tokio::test]
async fn execution_history_round_trip() {
    let store = temp_store().await;

    let request = QueryRequest::new("how many orders?", vec!["orders".to_string()]);

    let ok = ExecutionRecord::success(
        &request,
        "SELECT COUNT(*) AS n FROM orders".to_string(),
        Some(serde_json::json!([{"n": 12}])),
        None,
    );
    let failed = ExecutionRecord::failure(
        &request,
        "SELECT nope FROM orders".to_string(),
        "no such column: nope".to_string(),
    );

    let ok_id = store.save_record(&ok).await.unwrap();
    let failed_id = store.save_record(&failed).await.unwrap();
    assert_ne!(ok_id, failed_id);

    let fetched = store.get_record(ok_id).await.unwrap().unwrap();
    assert!(fetched.is_successful);
    assert_eq!(fetched.query_results, Some(serde_json::json!([{"n": 12}])));
    assert!(!fetched.is_scheduled);

    let fetched_failed = store.get_record(failed_id).await.unwrap().unwrap();
    assert!(!fetched_failed.is_successful);
    assert_eq!(
        fetched_failed.error_message.as_deref(),
        Some("no such column: nope")
    );

    let records = store.list_records(10, 0).await.unwrap();
    assert_eq!(records.len(), 2);
    // newest first
    assert_eq!(records[0].id, Some(failed_id));

    let limited = store.list_records(1, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, Some(ok_id));

    assert!(store.delete_record(ok_id).await.unwrap());
    assert!(store.get_record(ok_id).await.unwrap().is_none());
}
