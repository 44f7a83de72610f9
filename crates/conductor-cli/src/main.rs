mod cli;
mod nodes;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use conductor_core::app::SubTasksOnly;
use conductor_core::config::{ConfigError, LoggingConfig};
use conductor_core::domain::{NodeState, OperationType, TaskId, TaskState, UniverseId};
use conductor_core::{ConductorConfig, ConductorError, ExecutorBuilder, TaskExecutor};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, RunArgs};
use nodes::Node;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Build(#[from] conductor_core::app::BuildError),
    #[error(transparent)]
    Conductor(#[from] ConductorError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };
    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = Cli::parse();
    let cfg = ConductorConfig::load(args.config.as_deref())?;
    init_tracing(&cfg.logging, args.json_logs);

    match args.command {
        Command::Run(run) => run_operation(cfg, run).await,
        Command::Operations => print_operations(),
        Command::NodeActions => print_node_actions(),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(0)
        }
    }
}

// 0: success
// 1: task ended in Failure or Aborted
// 2: usage
// 11: config error
// 40: admission denied
// 50: internal
fn exit_code_for_error(e: &CliError) -> i32 {
    match e {
        CliError::Config(_) | CliError::Build(_) => 11,
        CliError::Usage(_) => 2,
        CliError::Conductor(ConductorError::AdmissionDenied { .. }) => 40,
        CliError::Conductor(_) | CliError::Json(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig, json: bool) {
    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json || logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_operation(cfg: ConductorConfig, args: RunArgs) -> Result<i32, CliError> {
    let operation: OperationType = args
        .operation
        .parse()
        .map_err(|e: conductor_core::domain::UnknownOperation| CliError::Usage(e.to_string()))?;
    if args.nodes == 0 {
        return Err(CliError::Usage("--nodes must be at least 1".into()));
    }

    let executor = ExecutorBuilder::new().with_config(cfg).build()?;
    let recovered = executor.recover().await?;
    if !recovered.is_empty() {
        warn!(failed = recovered.failed.len(), aborted = recovered.aborted.len(), "reconciled stale tasks");
    }
    for record in executor.admission().frozen_universes().await? {
        warn!(universe_id = %record.universe_id, blocking_task_id = ?record.blocking_task_id, "universe is frozen");
    }

    let universe = UniverseId::generate();
    let nodes: Vec<Arc<Node>> = (1..=args.nodes).map(|i| Node::live(format!("n{i}"))).collect();
    let work = Duration::from_millis(args.step_ms);

    executor.admission().can_admit(universe, operation).await?;
    let (first_id, mut state) = run_once(&executor, operation, universe, &nodes, work, args.fail_node, args.abort_after_ms).await?;

    if args.rerun && state != TaskState::Success {
        executor.admission().can_rerun(universe, operation, first_id).await?;
        info!(blocking_task_id = %first_id, %operation, "re-running blocking task");
        (_, state) = run_once(&executor, operation, universe, &nodes, work, None, None).await?;
    }

    let allowed = executor.admission().allowed_tasks(universe).await?;
    println!("{}", serde_json::to_string_pretty(&allowed)?);
    for node in &nodes {
        info!(node = %node.name, state = %node.state(), "final node state");
    }

    let report = executor.shutdown_default().await;
    info!(drained = report.drained.len(), interrupted = report.interrupted.len(), "done");
    Ok(if state == TaskState::Success { 0 } else { 1 })
}

async fn run_once(
    executor: &TaskExecutor,
    operation: OperationType,
    universe: UniverseId,
    nodes: &[Arc<Node>],
    work: Duration,
    fail_node: Option<usize>,
    abort_after_ms: Option<u64>,
) -> Result<(TaskId, TaskState), CliError> {
    let params = serde_json::json!({ "nodes": nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>() });
    let task = executor
        .create_runnable_task(operation, universe, params, Arc::new(SubTasksOnly))
        .await?;
    for group in nodes::rolling_restart(nodes, work, fail_node) {
        task.add_sub_task_group(group).await?;
    }

    let task_id = executor.submit(Arc::clone(&task)).await?;
    if let Some(ms) = abort_after_ms {
        let executor = executor.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            match executor.abort_default(task_id).await {
                Ok(state) => info!(%task_id, %state, "abort confirmed"),
                Err(e) => warn!(%task_id, error = %e, "abort did not complete"),
            }
        });
    }

    let state = task.wait_for_completion().await;
    let status = executor.task_status(task_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok((task_id, state))
}

#[derive(Serialize)]
struct OperationRow {
    operation: OperationType,
    placement_modification: bool,
    safe_if_frozen: bool,
    rerunnable: bool,
    skips_consistency_check: bool,
}

fn print_operations() -> Result<i32, CliError> {
    let rows: Vec<OperationRow> = OperationType::ALL
        .iter()
        .map(|op| OperationRow {
            operation: *op,
            placement_modification: op.is_placement_modification(),
            safe_if_frozen: op.is_safe_if_frozen(),
            rerunnable: op.is_rerunnable(),
            skips_consistency_check: op.skips_consistency_check(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(0)
}

fn print_node_actions() -> Result<i32, CliError> {
    let table: Vec<_> = NodeState::ALL
        .iter()
        .map(|s| serde_json::json!({ "state": s, "actions": s.allowed_actions() }))
        .collect();
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(0)
}
