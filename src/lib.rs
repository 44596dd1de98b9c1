pub mod clients;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod db;
pub mod entities;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod target;

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use clients::openai::OpenAiClient;
pub use config::Config;
use constants::limits::DEFAULT_HISTORY_LIMIT;
use constants::schedule::TIMEZONE;
use credentials::{ConnSpec, CredentialResolver, KeyringStore, mask_dsn};
use db::Store;
use models::query::QueryRequest;
use models::schedule::ScheduleSpec;
use scheduler::JobRegistry;
use services::pipeline::ExecutionPipeline;
use target::{LiveTarget, QueryTarget};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "daemon" | "-d" | "--daemon" => run_daemon(config).await,

        "ask" | "a" => {
            if args.len() < 4 {
                println!("Usage: sqlpilot ask <table,table,...> <question>");
                println!("Example: sqlpilot ask orders \"total sales this month\"");
                return Ok(());
            }
            let tables = split_tables(&args[2]);
            let question = args[3..].join(" ");
            cmd_ask(&config, &question, tables).await
        }

        "schedules" | "sched" => cmd_schedules(&config, &args[2..]).await,

        "history" | "h" => {
            let limit = args
                .get(2)
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_HISTORY_LIMIT);
            cmd_history(&config, limit).await
        }

        "run" | "r" => {
            if args.len() < 3 {
                println!("Usage: sqlpilot run <schedule_id>");
                return Ok(());
            }
            let id: i32 = args[2].parse()?;
            cmd_run(&config, id).await
        }

        "connect" => {
            if args.len() < 3 {
                println!("Usage: sqlpilot connect \"<DSN>\"");
                println!(
                    "Example: sqlpilot connect \"DRIVER=mysql;SERVER=db;DATABASE=sales;UID=app;PWD=secret\""
                );
                return Ok(());
            }
            cmd_connect(&config, &args[2]).await
        }

        "forget" => cmd_forget(&config),

        "init" | "--init" => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        _ => {
            println!("Unknown command: {}", args[1]);
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("SqlPilot - scheduled natural language queries");
    println!();
    println!("USAGE:");
    println!("  sqlpilot <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("  ask <tables> <question>   Run a question once, right now");
    println!("  schedules <subcommand>    Manage recurring queries");
    println!("  run <id>                  Fire a scheduled query immediately");
    println!("  history [n]               Show recent executions (default: {DEFAULT_HISTORY_LIMIT})");
    println!("  connect \"<DSN>\"           Store target connection, password goes to the OS keyring");
    println!("  forget                    Remove the stored password from the keyring");
    println!("  daemon                    Run the scheduler in the foreground");
    println!("  init                      Create default config file");
    println!("  help                      Show this help message");
    println!();
    println!("SCHEDULES SUBCOMMANDS:");
    println!("  schedules list");
    println!("  schedules add <type> <tables> <question> [--time HH:MM] [--day N] [--cron EXPR]");
    println!("  schedules remove <id>");
    println!("  schedules enable <id> | disable <id>");
    println!("  schedules status");
    println!();
    println!("EXAMPLES:");
    println!("  sqlpilot ask orders,customers \"top 10 customers by revenue\"");
    println!("  sqlpilot schedules add daily orders \"yesterday's order count\" --time 09:00");
    println!("  sqlpilot schedules add weekly sales \"weekly summary\" --day 0 --time 08:30");
    println!("  sqlpilot schedules add custom logs \"error count\" --cron \"*/15 * * * *\"");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml for the target database and model settings.");
    println!("  Set OPENAI_API_KEY in the environment (or a .env file).");
}

fn split_tables(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

async fn build_store(config: &Config) -> anyhow::Result<Store> {
    Store::new(&config.general.database_path).await
}

fn build_pipeline(config: &Config) -> anyhow::Result<Arc<ExecutionPipeline>> {
    let api_key = Config::api_key()?;
    let resolver = CredentialResolver::new(Arc::new(KeyringStore));
    let target: Arc<dyn QueryTarget> = Arc::new(LiveTarget::new(
        config.target.conn_spec(),
        resolver,
        Duration::from_secs(config.target.connection_timeout_seconds),
    ));
    let generator = Arc::new(OpenAiClient::new(&config.ai, api_key));
    Ok(Arc::new(ExecutionPipeline::new(target, generator)))
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    info!(
        "SqlPilot v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    if !config.scheduler.enabled {
        warn!("Scheduler is disabled in config, nothing to do");
        return Ok(());
    }

    let store = build_store(&config).await?;
    let pipeline = build_pipeline(&config)?;

    let registry = JobRegistry::new(store).await?;
    registry.set_pipeline(pipeline).await;
    registry.start().await?;

    let loaded = registry.load_all().await?;
    info!("Daemon running with {loaded} schedules. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }

    registry.shutdown().await?;
    info!("Daemon stopped");
    Ok(())
}

async fn cmd_ask(config: &Config, question: &str, tables: Vec<String>) -> anyhow::Result<()> {
    let store = build_store(config).await?;
    let pipeline = build_pipeline(config)?;

    let request = QueryRequest::new(question, tables);
    let record = pipeline.run(&request).await?;
    let record_id = store.save_record(&record).await?;

    println!("SQL: {}", record.sql_query);
    if record.is_successful {
        if let Some(results) = &record.query_results {
            println!("{}", serde_json::to_string_pretty(results)?);
        }
        if let Some(message) = &record.result_message {
            println!("{message}");
        }
        println!("✓ Saved as execution #{record_id}");
    } else {
        println!(
            "✗ {}",
            record.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn cmd_schedules(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let Some(sub) = args.first() else {
        println!("Usage: sqlpilot schedules <list|add|remove|enable|disable|status>");
        return Ok(());
    };

    let store = build_store(config).await?;

    match sub.as_str() {
        "list" | "ls" => {
            let definitions = store.list_definitions().await?;
            if definitions.is_empty() {
                println!("No scheduled queries.");
                return Ok(());
            }
            for d in definitions {
                let state = if d.is_active { "active" } else { "paused" };
                println!(
                    "[{}] ({state}, {}, runs: {}, last: {}) {}",
                    d.id,
                    d.schedule_type,
                    d.run_count,
                    d.last_run_status.as_deref().unwrap_or("never"),
                    d.question
                );
            }
            Ok(())
        }

        "add" => {
            if args.len() < 4 {
                println!(
                    "Usage: sqlpilot schedules add <type> <tables> <question> [--time HH:MM] [--day N] [--cron EXPR]"
                );
                println!("Types: hourly, daily, weekly, monthly, custom");
                return Ok(());
            }
            let schedule_type = &args[1];
            let tables = split_tables(&args[2]);

            let mut question_parts: Vec<&str> = Vec::new();
            let mut time: Option<&str> = None;
            let mut day: Option<i32> = None;
            let mut cron: Option<&str> = None;

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "--time" => {
                        time = args.get(i + 1).map(String::as_str);
                        i += 2;
                    }
                    "--day" => {
                        day = args.get(i + 1).and_then(|s| s.parse().ok());
                        i += 2;
                    }
                    "--cron" => {
                        cron = args.get(i + 1).map(String::as_str);
                        i += 2;
                    }
                    other => {
                        question_parts.push(other);
                        i += 1;
                    }
                }
            }
            let question = question_parts.join(" ");
            if question.trim().is_empty() {
                println!("A question is required.");
                return Ok(());
            }

            let spec = ScheduleSpec::from_parts(schedule_type, time, day, cron)?;
            let id = store.save_definition(&question, &tables, &spec, true).await?;
            println!("✓ Scheduled query #{id} created ({schedule_type})");
            println!("  Restart the daemon (or wait for it) to pick up the new schedule.");
            Ok(())
        }

        "remove" | "rm" => {
            let Some(id) = args.get(1).and_then(|s| s.parse::<i32>().ok()) else {
                println!("Usage: sqlpilot schedules remove <id>");
                return Ok(());
            };
            if store.delete_definition(id).await? {
                println!("✓ Scheduled query #{id} removed");
            } else {
                println!("Scheduled query #{id} not found");
            }
            Ok(())
        }

        "enable" | "disable" => {
            let Some(id) = args.get(1).and_then(|s| s.parse::<i32>().ok()) else {
                println!("Usage: sqlpilot schedules {sub} <id>");
                return Ok(());
            };
            let active = sub == "enable";
            if store.set_definition_active(id, active).await? {
                println!("✓ Scheduled query #{id} {}", if active { "enabled" } else { "disabled" });
            } else {
                println!("Scheduled query #{id} not found");
            }
            Ok(())
        }

        "status" => {
            let definitions = store.list_active_definitions().await?;
            if definitions.is_empty() {
                println!("No active schedules.");
                return Ok(());
            }
            let now = chrono::Utc::now().with_timezone(&TIMEZONE);
            for d in definitions {
                match d.spec().and_then(|s| scheduler::trigger::compile(&s)) {
                    Ok(trigger) => match trigger.next_occurrence(now) {
                        Some(next) => {
                            let seconds = (next - now).num_seconds().max(0);
                            println!(
                                "[{}] next fire {} (in {}) - {}",
                                d.id,
                                next.format("%Y-%m-%d %H:%M %Z"),
                                format_countdown(seconds),
                                d.question
                            );
                        }
                        None => println!("[{}] no upcoming fire - {}", d.id, d.question),
                    },
                    Err(e) => println!("[{}] invalid schedule: {e}", d.id),
                }
            }
            Ok(())
        }

        other => {
            println!("Unknown schedules subcommand: {other}");
            println!("Use: list, add, remove, enable, disable, status");
            Ok(())
        }
    }
}

fn format_countdown(total_seconds: i64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours}h{minutes}m{seconds}s")
}

async fn cmd_history(config: &Config, limit: u64) -> anyhow::Result<()> {
    let store = build_store(config).await?;
    let records = store.list_records(limit, 0).await?;

    if records.is_empty() {
        println!("No executions yet.");
        return Ok(());
    }

    for r in records {
        let status = if r.is_successful { "✓" } else { "✗" };
        let kind = if r.is_scheduled { "scheduled" } else { "ad hoc" };
        println!(
            "{status} [{}] {} ({kind}) {}",
            r.id.unwrap_or_default(),
            r.created_at.as_deref().unwrap_or("-"),
            r.question
        );
        if let Some(err) = &r.error_message {
            println!("    error: {err}");
        }
    }
    Ok(())
}

async fn cmd_run(config: &Config, id: i32) -> anyhow::Result<()> {
    let store = build_store(config).await?;
    let pipeline = build_pipeline(config)?;

    let registry = JobRegistry::new(store.clone()).await?;
    registry.set_pipeline(pipeline).await;
    registry.execute_now(id).await?;

    if let Some(definition) = store.get_definition(id).await? {
        println!(
            "✓ Fired schedule #{id}, last status: {}",
            definition.last_run_status.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

async fn cmd_connect(config: &Config, dsn: &str) -> anyhow::Result<()> {
    let (spec, password) = ConnSpec::parse_dsn(dsn)?;
    println!("Connection: {}", mask_dsn(dsn));

    let resolver = CredentialResolver::new(Arc::new(KeyringStore));
    if let Some(password) = &password {
        resolver.store(&spec, password)?;
        println!("✓ Password stored in the OS keyring");
    }

    let target = LiveTarget::new(
        spec.clone(),
        resolver,
        Duration::from_secs(config.target.connection_timeout_seconds),
    );
    match target.test_connection().await {
        Ok(()) => println!("✓ Connection test succeeded"),
        Err(e) => println!("✗ Connection test failed: {e}"),
    }

    let mut updated = config.clone();
    updated.target.driver = spec.driver.clone();
    updated.target.server = spec.server.clone();
    updated.target.database = spec.database.clone();
    updated.target.uid = spec.uid;
    updated.save_to_path(std::path::Path::new("config.toml"))?;
    println!("✓ Target settings written to config.toml (no password)");
    Ok(())
}

fn cmd_forget(config: &Config) -> anyhow::Result<()> {
    let resolver = CredentialResolver::new(Arc::new(KeyringStore));
    resolver.forget(&config.target.conn_spec())?;
    println!("✓ Stored password removed from the OS keyring");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_table_lists() {
        assert_eq!(split_tables("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(split_tables("orders"), vec!["orders"]);
        assert!(split_tables(" , ").is_empty());
    }

    #[test]
    fn formats_countdowns() {
        assert_eq!(format_countdown(0), "0h0m0s");
        assert_eq!(format_countdown(3_725), "1h2m5s");
        assert_eq!(format_countdown(86_400), "24h0m0s");
    }
}
