//! autoqueue - drive the task queue against a simulated agent manager.
//!
//! Seeds one project with backlog tasks of random priority, enables its queue
//! through the manager (rejecting an out-of-range `--max-concurrent`) and prints every `queue-status-update` as a JSON line until the backlog is
//! drained, the run time elapses, or Ctrl-C is pressed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use autoqueue_core::app::ManagerConfig;
use autoqueue_core::domain::{Project, ProjectId, QueueEvent, QueueSettings, Task, TaskPriority};
use autoqueue_core::impls::{BroadcastEventSink, InMemoryProjectStore, SimulatedAgentManager};
use autoqueue_core::observability::init_tracing;
use autoqueue_core::ports::{AgentManager, IdGenerator, ProjectStore, SystemClock, UlidGenerator};
use autoqueue_core::QueueManagerBuilder;
use chrono::{TimeDelta, Utc};
use clap::Parser;
use rand::Rng;
use rand::seq::SliceRandom;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::sleep;

const PRIORITIES: [TaskPriority; 4] = [
    TaskPriority::Urgent,
    TaskPriority::High,
    TaskPriority::Medium,
    TaskPriority::Low,
];

#[derive(Debug, Parser)]
#[command(name = "autoqueue", version, about = "Run the task queue against simulated agents")]
struct Args {
    /// TOML file with manager settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Queue concurrency limit for the demo project (1..=3).
    #[arg(long, default_value_t = 2)]
    max_concurrent: usize,

    /// Number of backlog tasks to seed.
    #[arg(long, default_value_t = 8)]
    tasks: usize,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 30)]
    run_secs: u64,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log: String,

    /// Simulated agent start latency in milliseconds.
    #[arg(long, default_value_t = 150)]
    start_latency_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log);

    let config = match &args.config {
        Some(path) => ManagerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ManagerConfig::default(),
    }
    .apply_env_overrides()
    .context("applying environment overrides")?;

    let store = Arc::new(InMemoryProjectStore::new());
    let project_id = seed_project(&store, &args)?;

    let agents = Arc::new(
        SimulatedAgentManager::new(store.clone())
            .with_start_latency(Duration::from_millis(args.start_latency_ms)),
    );
    let events = Arc::new(BroadcastEventSink::new(config.status_channel_capacity));
    let mut updates = events.subscribe();

    let manager = QueueManagerBuilder::new()
        .store(store.clone())
        .agents(agents.clone())
        .events(events.clone())
        .config(config)
        .build()?;
    manager.start();

    // Enabling validates the limit and starts the first cycle.
    let queue = manager
        .update_queue_config(&project_id, true, args.max_concurrent)
        .await
        .context("enabling the demo queue")?;
    tracing::info!(max_concurrent = queue.max_concurrent, "queue enabled");

    let finisher = tokio::spawn(finish_runs(agents.clone()));

    let deadline = sleep(Duration::from_secs(args.run_secs));
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!(run_secs = args.run_secs, "run time elapsed; stopping");
                break;
            }
            _ = &mut ctrl_c => {
                tracing::info!("interrupted; stopping");
                break;
            }
            update = updates.recv() => match update {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    let QueueEvent::QueueStatusUpdate { status, .. } = &event;
                    if status.running_count == 0 && status.backlog_count == 0 {
                        tracing::info!("backlog drained");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "status updates dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.stop().await;
    finisher.abort();
    agents.kill_all().await?;

    let status = manager.get_queue_status(&project_id);
    println!("{}", serde_json::to_string(&status)?);
    Ok(())
}

fn seed_project(store: &InMemoryProjectStore, args: &Args) -> anyhow::Result<ProjectId> {
    let ids = UlidGenerator::new(SystemClock);
    let project_id = ids.generate_project_id();
    let path = std::env::current_dir().context("resolving project path")?;

    store.insert_project(
        Project::new(project_id.clone(), path).with_queue_settings(QueueSettings {
            enabled: Some(false),
            max_concurrent: None,
        }),
    );

    let now = Utc::now();
    let mut rng = rand::thread_rng();
    for i in 0..args.tasks {
        let priority = *PRIORITIES.choose(&mut rng).unwrap_or(&TaskPriority::Medium);
        let created_at = now - TimeDelta::minutes((args.tasks - i) as i64);
        let task = Task::new(ids.generate_task_id(), project_id.clone(), created_at)
            .with_spec_id(ids.generate_spec_id())
            .with_title(format!("demo task {}", i + 1))
            .with_priority(priority);
        store.set_task(&project_id, task)?;
    }
    tracing::info!(project_id = %project_id, tasks = args.tasks, "seeded demo project");
    Ok(project_id)
}

/// End a random running task every so often; one in five fails.
async fn finish_runs(agents: Arc<SimulatedAgentManager>) {
    loop {
        let pause = rand::thread_rng().gen_range(300..1200);
        sleep(Duration::from_millis(pause)).await;

        let running = agents.running_tasks();
        let picked = {
            let mut rng = rand::thread_rng();
            running
                .choose(&mut rng)
                .map(|task_id| (task_id.clone(), if rng.gen_bool(0.8) { 0 } else { 1 }))
        };
        if let Some((task_id, exit_code)) = picked {
            agents.finish(&task_id, Some(exit_code));
        }
    }
}
