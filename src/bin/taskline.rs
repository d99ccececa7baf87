//! taskline CLI: run the producer, the worker, or both; inspect tasks.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use taskline::admission::AdmissionController;
use taskline::config::secrets::ExposeSecret;
use taskline::config::{Config, PipelineConfig};
use taskline::db::Db;
use taskline::dispatch::{HttpDispatch, LocalDispatch};
use taskline::generator::TaskGenerator;
use taskline::limiter::RateLimiter;
use taskline::model::{State, Task, TaskId};
use taskline::store::{self, MemoryStore, StateStore};
use taskline::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use taskline::worker::{TaskProcessor, server, work_per_value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "taskline", version, about = "Point-to-point task dispatch pipeline")]
struct Cli {
    /// Pipeline TOML file (backlog, cadence, rate limits); overrides TASKLINE_CONFIG
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate tasks and dispatch them to a remote worker
    Produce {
        /// Worker base URL (overrides generator.worker_url)
        #[arg(long)]
        worker_url: Option<String>,
        /// Stop after creating this many tasks
        #[arg(long)]
        count: Option<u64>,
    },
    /// Serve the worker endpoint
    Consume {
        /// Listen address (overrides worker.listen_addr)
        #[arg(long)]
        listen: Option<String>,
    },
    /// Run generator and worker in one process
    Run {
        /// Keep tasks in memory instead of Postgres
        #[arg(long)]
        memory: bool,
        /// Stop after creating this many tasks
        #[arg(long)]
        count: Option<u64>,
    },
    /// Task inspection
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Show one task
    Show {
        /// Task ID
        id: TaskId,
    },
    /// List tasks in a state
    List {
        /// received | processing | done
        #[arg(long)]
        state: State,
        /// Maximum tasks to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List tasks stuck in received or processing
    Stranded {
        /// Only tasks not updated for at least this many seconds
        #[arg(long, default_value_t = 60)]
        older_than_secs: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let pipeline = match cli.config.as_deref() {
        Some(path) => PipelineConfig::load(path)?,
        None => config.pipeline()?,
    };

    match cli.command {
        Command::Produce { worker_url, count } => {
            cmd_produce(&config, pipeline, worker_url, count).await
        }
        Command::Consume { listen } => cmd_consume(&config, pipeline, listen).await,
        Command::Run { memory, count } => cmd_run(&config, pipeline, memory, count).await,
        Command::Task { action } => {
            let db = connect_db(&config).await?;
            match action {
                TaskAction::Show { id } => cmd_task_show(&db, id).await,
                TaskAction::List { state, limit } => cmd_task_list(&db, state, limit).await,
                TaskAction::Stranded { older_than_secs } => {
                    cmd_task_stranded(&db, older_than_secs).await
                }
            }
        }
    }
}

fn telemetry(config: &Config, service: &str) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: service.to_string(),
        log_level: config.log_level.clone(),
    })?)
}

async fn connect_db(config: &Config) -> anyhow::Result<Db> {
    let db = Db::connect(config.database_url()?.expose_secret()).await?;
    db.migrate().await?;
    Ok(db)
}

/// Cancelled on ctrl-c.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        token.cancel();
    });
    shutdown
}

fn processor(store: Arc<dyn StateStore>, pipeline: &PipelineConfig) -> anyhow::Result<TaskProcessor> {
    let limiter = RateLimiter::new(pipeline.limiter.tasks_per_second, pipeline.limiter.burst)?;
    Ok(TaskProcessor::new(store, Arc::new(limiter))
        .with_work_duration(work_per_value(pipeline.worker.ms_per_value)))
}

async fn cmd_produce(
    config: &Config,
    mut pipeline: PipelineConfig,
    worker_url: Option<String>,
    count: Option<u64>,
) -> anyhow::Result<()> {
    let _guard = telemetry(config, "taskline-producer")?;
    if let Some(url) = worker_url {
        pipeline.generator.worker_url = url;
    }

    let store: Arc<dyn StateStore> = Arc::new(connect_db(config).await?);
    let channel = Arc::new(HttpDispatch::new(&pipeline.generator.worker_url)?);
    let admission = Arc::new(AdmissionController::new(pipeline.max_backlog));
    tracing::info!(worker = channel.endpoint(), "producer starting");

    let generator = TaskGenerator::new(store, channel, admission, pipeline.generator)?;
    let report = generator.run(shutdown_on_ctrl_c(), count).await;
    println!(
        "created: {}  dispatched: {}  refused: {}  create failures: {}  dispatch failures: {}",
        report.created,
        report.dispatched,
        report.refused,
        report.create_failures,
        report.dispatch_failures
    );
    Ok(())
}

async fn cmd_consume(
    config: &Config,
    mut pipeline: PipelineConfig,
    listen: Option<String>,
) -> anyhow::Result<()> {
    let _guard = telemetry(config, "taskline-consumer")?;
    if let Some(addr) = listen {
        pipeline.worker.listen_addr = addr;
    }
    let addr = pipeline.worker.listen_addr()?;

    let store: Arc<dyn StateStore> = Arc::new(connect_db(config).await?);
    let processor = Arc::new(processor(store, &pipeline)?);
    let listener = TcpListener::bind(addr).await?;

    server::serve(listener, processor, shutdown_on_ctrl_c()).await?;
    Ok(())
}

async fn cmd_run(
    config: &Config,
    pipeline: PipelineConfig,
    memory: bool,
    count: Option<u64>,
) -> anyhow::Result<()> {
    let _guard = telemetry(config, "taskline")?;

    let store: Arc<dyn StateStore> = if memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(connect_db(config).await?)
    };
    let shutdown = shutdown_on_ctrl_c();
    let processor = Arc::new(processor(Arc::clone(&store), &pipeline)?);
    let channel = Arc::new(LocalDispatch::new(Arc::clone(&processor), shutdown.clone()));
    let admission = Arc::new(AdmissionController::new(pipeline.max_backlog));

    let generator = TaskGenerator::new(store, channel, admission, pipeline.generator)?;
    let report = generator.run(shutdown, count).await;

    println!(
        "created: {}  dispatched: {}  refused: {}  create failures: {}  dispatch failures: {}",
        report.created,
        report.dispatched,
        report.refused,
        report.create_failures,
        report.dispatch_failures
    );
    println!("{:<6} {:>8} {:>10}", "TYPE", "COUNT", "SUM");
    for (task_type, total) in processor.totals().snapshot() {
        println!("{task_type:<6} {:>8} {:>10}", total.count, total.sum);
    }
    Ok(())
}

async fn cmd_task_show(db: &Db, id: TaskId) -> anyhow::Result<()> {
    let task = db.get(id).await?;
    println!("ID:          {}", task.id);
    println!("Type:        {}", task.task_type);
    println!("Value:       {}", task.value);
    println!("State:       {}", task.state);
    println!("Created:     {}", task.creation_time);
    println!("Updated:     {}", task.last_update_time);
    Ok(())
}

async fn cmd_task_list(db: &Db, state: State, limit: usize) -> anyhow::Result<()> {
    let tasks = db.list_by_state(state).await?;
    print_tasks(tasks.iter().take(limit));
    if tasks.len() > limit {
        println!("... {} more", tasks.len() - limit);
    }
    Ok(())
}

async fn cmd_task_stranded(db: &Db, older_than_secs: i64) -> anyhow::Result<()> {
    let older_than = chrono::TimeDelta::try_seconds(older_than_secs)
        .ok_or_else(|| anyhow::anyhow!("--older-than-secs {older_than_secs} is out of range"))?;
    let tasks = store::stranded(db, older_than).await?;
    if tasks.is_empty() {
        println!("No stranded tasks.");
        return Ok(());
    }
    print_tasks(tasks.iter());
    Ok(())
}

fn print_tasks<'a>(tasks: impl Iterator<Item = &'a Task>) {
    println!(
        "{:<10} {:<6} {:<6} {:<12} UPDATED",
        "ID", "TYPE", "VALUE", "STATE"
    );
    for task in tasks {
        println!(
            "{:<10} {:<6} {:<6} {:<12} {}",
            task.id, task.task_type, task.value, task.state, task.last_update_time
        );
    }
}
