use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dotmac_config::WorkflowDef;
use dotmac_workflow::{Workflow, WorkflowResult, WorkflowSnapshot};
use dotmac_workflow_store::{FsStateStore, StateStore, load_workflow, save_workflow};

mod scripted;

use scripted::ScriptedExecutor;

/// Dotmac - run and resume approval-gated business workflows
#[derive(Parser)]
#[command(name = "dotmac")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.dotmac)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Execute a workflow definition and store its state
  Run {
    /// Path to the workflow definition (JSON)
    definition: PathBuf,
  },

  /// Approve the pending step of a suspended workflow and continue
  Approve {
    workflow_id: String,

    /// Path to the workflow definition the workflow was started from
    #[arg(long)]
    definition: PathBuf,

    /// Approval data as a JSON object
    #[arg(long)]
    data: Option<String>,
  },

  /// Reject the pending step of a suspended workflow and cancel it
  Reject {
    workflow_id: String,

    #[arg(long)]
    reason: Option<String>,
  },

  /// Print the stored state of a workflow
  Status { workflow_id: String },

  /// Delete the stored state of a workflow
  Delete { workflow_id: String },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".dotmac"),
  };
  let store = FsStateStore::new(data_dir.join("workflows"));

  let Some(command) = cli.command else {
    println!("dotmac - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Run { definition } => run(&store, &definition).await,
      Commands::Approve {
        workflow_id,
        definition,
        data,
      } => approve(&store, &workflow_id, &definition, data.as_deref()).await,
      Commands::Reject {
        workflow_id,
        reason,
      } => reject(&store, &workflow_id, reason.as_deref()).await,
      Commands::Status { workflow_id } => status(&store, &workflow_id).await,
      Commands::Delete { workflow_id } => delete(&store, &workflow_id).await,
    }
  })
}

async fn run(store: &FsStateStore, definition: &Path) -> Result<()> {
  let def = read_definition(definition).await?;
  eprintln!("Loaded workflow with {} steps", def.steps.len());

  let mut workflow = Workflow::new(ScriptedExecutor::new(def.clone()))
    .with_steps(def.step_names())
    .with_metadata(def.metadata.clone());
  if let Some(workflow_id) = def.workflow_id {
    workflow = workflow.with_id(workflow_id);
  }
  workflow.set_failure_policy(def.failure_policy);
  workflow.set_require_approval(def.require_approval);

  let results = workflow.execute().await;
  save_workflow(store, &workflow)
    .await
    .context("failed to save workflow state")?;
  let results = results.context("workflow execution failed")?;

  report(&workflow.to_snapshot());
  print_results(&results)
}

async fn approve(
  store: &FsStateStore,
  workflow_id: &str,
  definition: &Path,
  data: Option<&str>,
) -> Result<()> {
  let def = read_definition(definition).await?;
  let approval_data = match data {
    Some(raw) => Some(
      serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw)
        .context("approval data must be a JSON object")?,
    ),
    None => None,
  };

  let mut workflow = load_workflow(store, workflow_id, ScriptedExecutor::new(def))
    .await
    .context("failed to load workflow state")?
    .with_context(|| format!("workflow '{}' not found", workflow_id))?;

  let results = workflow.approve_and_continue(approval_data).await;
  save_workflow(store, &workflow)
    .await
    .context("failed to save workflow state")?;
  let results = results.context("approval failed")?;

  report(&workflow.to_snapshot());
  print_results(&results)
}

async fn reject(store: &FsStateStore, workflow_id: &str, reason: Option<&str>) -> Result<()> {
  let snapshot = load_snapshot(store, workflow_id).await?;

  // Rejection runs no steps, so the stored step names are enough.
  let def = WorkflowDef {
    workflow_id: Some(snapshot.workflow_id.clone()),
    steps: Vec::new(),
    metadata: snapshot.metadata.clone(),
    failure_policy: snapshot.failure_policy,
    require_approval: snapshot.require_approval,
  };
  let mut workflow = Workflow::from_snapshot(snapshot, ScriptedExecutor::new(def))
    .context("stored workflow state is invalid")?;

  let results = workflow
    .reject_and_cancel(reason)
    .await
    .context("rejection failed")?;
  save_workflow(store, &workflow)
    .await
    .context("failed to save workflow state")?;

  report(&workflow.to_snapshot());
  print_results(&results)
}

async fn status(store: &FsStateStore, workflow_id: &str) -> Result<()> {
  let snapshot = load_snapshot(store, workflow_id).await?;
  report(&snapshot);
  println!("{}", serde_json::to_string_pretty(&snapshot)?);
  Ok(())
}

async fn delete(store: &FsStateStore, workflow_id: &str) -> Result<()> {
  if !store.delete(workflow_id).await? {
    bail!("workflow '{}' not found", workflow_id);
  }
  eprintln!("Deleted workflow {}", workflow_id);
  Ok(())
}

async fn read_definition(path: &Path) -> Result<WorkflowDef> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read workflow definition: {}", path.display()))?;

  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow definition: {}", path.display()))
}

async fn load_snapshot(store: &FsStateStore, workflow_id: &str) -> Result<WorkflowSnapshot> {
  store
    .load(workflow_id)
    .await
    .context("failed to load workflow state")?
    .with_context(|| format!("workflow '{}' not found", workflow_id))
}

fn report(snapshot: &WorkflowSnapshot) {
  let failed = snapshot.results.iter().filter(|r| !r.is_success()).count();
  eprintln!(
    "Workflow {}: {} (step {}/{}, {} failed results)",
    snapshot.workflow_id,
    snapshot.status,
    snapshot.current_step_index,
    snapshot.steps.len(),
    failed
  );
  if let Some(step) = &snapshot.pending_approval_step {
    eprintln!("Waiting for approval of step '{}'", step);
  }
}

fn print_results(results: &[WorkflowResult]) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(results)?);
  Ok(())
}
