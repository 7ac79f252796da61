use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use nodeflow::engine::{EngineServices, ExecutionEngine, HttpAgentClient, WorkflowRunner};
use nodeflow::nodes::{NodeRegistry, WebhookNode};
use nodeflow::storage::{MemoryStore, MemoryTaskService, WorkflowStore};
use nodeflow::triggers::{format_next_run, parse_pattern, ScheduleConfig, Scheduler};
use nodeflow::workflow::{
    export_workflow, import_multiple, import_workflow, parse_export_file, parse_workflow,
    validate_export, ImportOptions, Workflow,
};
use nodeflow::{telemetry, Config};

#[derive(Parser)]
#[command(name = "nodeflow")]
#[command(about = "Node-graph workflow automation engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/nodeflow/config.toml)
    #[arg(long, global = true, env = "NODEFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an export document
    Validate {
        /// Path to export JSON
        file: PathBuf,
    },
    /// Import an export document (single or batch) and print the stored workflow(s)
    Import {
        file: PathBuf,
        /// Creator recorded on the imported workflow
        #[arg(long, default_value = "cli")]
        creator: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Keep node and edge IDs from the document
        #[arg(long)]
        keep_ids: bool,
        #[arg(long)]
        no_validate: bool,
    },
    /// Export a stored workflow definition to its portable form
    Export {
        /// Path to workflow JSON
        file: PathBuf,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import an export document and run it once
    Run {
        file: PathBuf,
        /// JSON object merged into the workflow variables
        #[arg(short, long)]
        context: Option<String>,
        #[arg(long, default_value = "cli")]
        triggered_by: String,
    },
    /// Show when a schedule pattern would next fire, or run a workflow on it
    Schedule {
        /// Interval pattern such as 5m, 2h or 1d
        pattern: String,
        /// Export document to run on the schedule until Ctrl-C
        #[arg(short, long)]
        workflow: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    telemetry::init_logging(&config.logging)?;

    match cli.command {
        Commands::Validate { file } => cmd_validate(&file)?,
        Commands::Import {
            file,
            creator,
            name,
            description,
            keep_ids,
            no_validate,
        } => {
            let mut options = ImportOptions::default();
            if keep_ids {
                options = options.keep_ids();
            }
            if no_validate {
                options = options.without_validation();
            }
            if let Some(name) = name {
                options = options.with_name(name);
            }
            if let Some(description) = description {
                options = options.with_description(description);
            }
            cmd_import(&file, &creator, &options)?
        }
        Commands::Export { file, output } => cmd_export(&file, output.as_deref())?,
        Commands::Run {
            file,
            context,
            triggered_by,
        } => cmd_run(&config, &file, context.as_deref(), &triggered_by).await?,
        Commands::Schedule { pattern, workflow } => {
            cmd_schedule(&config, &pattern, workflow.as_deref()).await?
        }
    }

    Ok(())
}

fn cmd_validate(file: &std::path::Path) -> anyhow::Result<()> {
    let document = parse_export_file(file)?;
    let report = validate_export(&document);

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    for error in &report.errors {
        println!("error: {}", error);
    }

    if !report.valid {
        anyhow::bail!("{} validation error(s)", report.errors.len());
    }
    println!("✓ Export is valid");
    Ok(())
}

fn cmd_import(file: &std::path::Path, creator: &str, options: &ImportOptions) -> anyhow::Result<()> {
    let document = parse_export_file(file)?;

    if document.get("workflows").is_some() {
        let mut imported = Vec::new();
        let mut failures = 0;
        for (index, result) in import_multiple(&document, creator, options)?
            .into_iter()
            .enumerate()
        {
            match result {
                Ok(workflow) => imported.push(workflow),
                Err(e) => {
                    failures += 1;
                    eprintln!("workflow #{}: {}", index, e);
                }
            }
        }
        println!("{}", serde_json::to_string_pretty(&imported)?);
        if failures > 0 {
            anyhow::bail!("{} workflow(s) failed to import", failures);
        }
        return Ok(());
    }

    let workflow = import_workflow(&document, creator, options)?;
    println!("{}", serde_json::to_string_pretty(&workflow)?);
    Ok(())
}

fn cmd_export(file: &std::path::Path, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)?;
    let workflow = parse_workflow(&content)?;
    let exported = serde_json::to_string_pretty(&export_workflow(&workflow))?;

    match output {
        Some(path) => {
            std::fs::write(path, exported)?;
            println!("✓ Exported '{}' to {}", workflow.name, path.display());
        }
        None => println!("{}", exported),
    }
    Ok(())
}

async fn cmd_run(
    config: &Config,
    file: &std::path::Path,
    context: Option<&str>,
    triggered_by: &str,
) -> anyhow::Result<()> {
    let context: Map<String, Value> = match context {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("--context must be a JSON object: {}", e))?,
        None => Map::new(),
    };

    let (runner, tasks) = build_runner(config);
    let workflow = store_workflow(&runner, file, triggered_by).await?;

    println!("Running workflow '{}'...", workflow.name);
    let execution = runner.run(&workflow, triggered_by, context).await?;

    println!();
    println!("Execution ID: {}", execution.id);
    println!("Status: {}", execution.status);
    if let Some(error) = &execution.error {
        println!("Error: {:?}: {}", error.kind, error.message);
        if let Some(node_id) = &error.node_id {
            println!("  at node: {}", node_id);
        }
    }
    if let Some(duration) = execution.duration {
        println!("Duration: {}ms", duration);
    }

    let created = tasks.created().await;
    if !created.is_empty() {
        println!("Tasks created: {}", created.len());
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&execution.logs)?);

    if !execution.is_success() {
        anyhow::bail!("Workflow execution failed");
    }
    Ok(())
}

async fn cmd_schedule(
    config: &Config,
    pattern: &str,
    workflow_file: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let interval = parse_pattern(pattern)
        .ok_or_else(|| anyhow::anyhow!("Invalid schedule pattern: {}", pattern))?;

    println!("Every {} seconds", interval.num_seconds());

    let Some(file) = workflow_file else {
        println!(
            "Next run: {}",
            format_next_run(Some(chrono::Utc::now() + interval))
        );
        return Ok(());
    };

    let (runner, _tasks) = build_runner(config);
    let workflow = store_workflow(&runner, file, "system").await?;

    let mut scheduler =
        Scheduler::new(Arc::new(runner)).with_tick_interval(config.engine.tick_ms);
    let next_run = scheduler
        .schedule(&workflow.id, ScheduleConfig::new(pattern))
        .await;
    println!("Scheduled '{}': {}", workflow.name, format_next_run(next_run));

    scheduler.start();
    tokio::signal::ctrl_c().await?;
    scheduler.stop().await;
    Ok(())
}

/// Runner over an in-memory store, wired to the configured collaborators.
fn build_runner(config: &Config) -> (WorkflowRunner, Arc<MemoryTaskService>) {
    let tasks = Arc::new(MemoryTaskService::new());
    let services = EngineServices::new()
        .with_agent(Arc::new(HttpAgentClient::from_config(&config.agent)))
        .with_tasks(tasks.clone());

    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(WebhookNode::from_config(&config.webhook)));

    let mut engine = ExecutionEngine::new()
        .with_registry(registry)
        .with_services(services);
    if let Some(timeout_ms) = config.engine.default_timeout_ms {
        engine = engine.with_default_timeout(timeout_ms);
    }

    let store: Arc<dyn WorkflowStore> = Arc::new(MemoryStore::new());
    (WorkflowRunner::new(store, Arc::new(engine)), tasks)
}

/// Import an export document as an active workflow in the runner's store.
async fn store_workflow(
    runner: &WorkflowRunner,
    file: &std::path::Path,
    creator: &str,
) -> anyhow::Result<Workflow> {
    let document = parse_export_file(file)?;
    let mut workflow = import_workflow(&document, creator, &ImportOptions::default())?;
    workflow.activate();
    runner.store().create_workflow(&workflow).await?;
    Ok(workflow)
}
