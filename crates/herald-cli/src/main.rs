//! herald - in-memory reminder service
//!
//! `herald demo` はタスクを 1 件登録し、reminder が購読者に届くまでを見せる。
//! `herald run` は空のストレージで worker を回し、Ctrl-C で止める。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use herald_core::HeraldConfig;
use herald_core::app::AppBuilder;
use herald_core::domain::{Task, TaskId, User, UserId};
use herald_core::impls::InMemoryTaskStorage;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "herald", version, about = "Task due-date reminder scheduler")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Schedule one task and wait for its reminder.
    Demo {
        /// Seconds until the reminder fires.
        #[arg(long, default_value_t = 3)]
        fire_in_secs: u64,

        /// Also schedule a second task and delete it before it fires.
        #[arg(long)]
        with_cancelled: bool,
    },
    /// Run the workers until Ctrl-C.
    Run,
    /// Print the effective configuration as JSON.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = HeraldConfig::load_or_default(cli.config.as_deref())
        .context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Command::Demo {
        fire_in_secs: 3,
        with_cancelled: false,
    }) {
        Command::Demo {
            fire_in_secs,
            with_cancelled,
        } => demo(config, fire_in_secs, with_cancelled).await,
        Command::Run => run(config).await,
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn demo(mut config: HeraldConfig, fire_in_secs: u64, with_cancelled: bool) -> Result<()> {
    // the demo should not wait a full production poll interval
    config.poll_interval_secs = 1;

    let storage = Arc::new(InMemoryTaskStorage::new());
    let user = UserId::new(1);
    storage.put_user(User::new(user, "ada@example.com", "Ada")).await;

    let mut app = AppBuilder::new(config.clone())
        .task_store(storage.clone())
        .build()?;
    let running = app.start();
    let mut subscription = app.bridge().subscribe(Some(user.to_string().as_str()))?;

    let fire_in = chrono::Duration::seconds(i64::try_from(fire_in_secs)?);
    let due_date = chrono::Utc::now() + config.reminder_lead_time() + fire_in;
    let task = Task::new(TaskId::new(1), user, "Submit expense report")
        .with_description("Receipts are in the shared folder")
        .with_due_date(due_date);
    storage.put_task(task.clone()).await;
    let outcome = app.scheduler().on_task_upserted(&task).await;
    tracing::info!(?outcome, %due_date, "demo task created");

    if with_cancelled {
        let doomed = Task::new(TaskId::new(2), user, "Cancelled errand").with_due_date(due_date);
        storage.put_task(doomed.clone()).await;
        app.scheduler().on_task_upserted(&doomed).await;
        storage.remove_task(doomed.id).await;
        let outcome = app.scheduler().on_task_deleted(doomed.id).await;
        tracing::info!(?outcome, "demo task deleted before its reminder");
    }

    let wait = Duration::from_secs(fire_in_secs + config.poll_interval_secs * 3);
    let received = tokio::time::timeout(wait, subscription.recv()).await;
    running.shutdown().await;

    match received {
        Ok(Some(event)) => {
            println!("{}", event.to_payload()?);
            Ok(())
        }
        Ok(None) => anyhow::bail!("subscription closed before a reminder arrived"),
        Err(_) => anyhow::bail!("no reminder within {}s", wait.as_secs()),
    }
}

async fn run(config: HeraldConfig) -> Result<()> {
    let storage = Arc::new(InMemoryTaskStorage::new());
    let mut app = AppBuilder::new(config).task_store(storage).build()?;
    let running = app.start();

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("shutdown requested");
    running.shutdown().await;
    Ok(())
}
