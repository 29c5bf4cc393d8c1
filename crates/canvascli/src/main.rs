mod answers;

use anyhow::{Context, Result};
use answers::AnswerResolver;
use canvascore::{
    DefinitionResolver, ExecutionEvent, InputRequestStatus, NodeEvent, NodeId, NodeSpec,
    NodeStatus, RunStatus, StatusSnapshot, Workflow,
};
use canvasengine::{DependencyGraph, NodeRegistry, Runtime, RuntimeConfig};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "canvas")]
#[command(about = "Canvas workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// JSON file answering input requests, keyed by node id or name
        #[arg(short, long)]
        answers: Option<PathBuf>,

        /// Prompt on stdin for inputs the answers file does not cover
        #[arg(short, long)]
        interactive: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            answers,
            interactive,
            verbose,
        } => {
            init_logging(verbose);
            run_workflow(file, answers, interactive).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

/// `CANVAS_LOG` takes precedence over `--verbose`
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("CANVAS_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn registry() -> NodeRegistry {
    canvasnodes::standard_registry()
}

/// Nothing left the engine can do on its own
fn settled(snapshot: &StatusSnapshot) -> bool {
    match snapshot.run_status {
        RunStatus::Stopped | RunStatus::Paused => true,
        RunStatus::Progressing => {
            snapshot.count(NodeStatus::Progressing) == 0
                && !snapshot.pending_inputs.is_empty()
                && snapshot
                    .pending_inputs
                    .iter()
                    .all(|p| p.status == InputRequestStatus::Waiting)
        }
    }
}

async fn run_workflow(file: PathBuf, answers: Option<PathBuf>, interactive: bool) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let workflow = Workflow::load(&file)?;

    println!("📋 Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Links: {}", workflow.links.len());
    println!();

    let answers = match answers {
        Some(path) => AnswerResolver::load(&path, &workflow)?,
        None => HashMap::new(),
    };
    let names: HashMap<NodeId, String> = workflow
        .nodes
        .iter()
        .map(|n| (n.id, n.label()))
        .collect();

    let runtime = Runtime::new(Arc::new(registry()), RuntimeConfig::from_env());

    // Subscribe to events for real-time output
    let mut events = runtime.subscribe_events();
    let labels = names.clone();
    let event_task = tokio::spawn(async move {
        let name = |id: &NodeId| labels.get(id).cloned().unwrap_or_else(|| id.to_string());
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { nodes, .. } => {
                    println!("▶️  Run started ({} nodes)", nodes);
                }
                ExecutionEvent::NodeStatusChanged {
                    node_id,
                    status: NodeStatus::Progressing,
                    ..
                } => {
                    println!("  ⚡ Starting node: {}", name(&node_id));
                }
                ExecutionEvent::NodeCompleted {
                    node_id,
                    duration_ms,
                    ..
                } => {
                    println!("  ✅ Node {} completed in {}ms", name(&node_id), duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", name(&node_id), error);
                }
                ExecutionEvent::InputRequested { node_id, .. } => {
                    println!("  ⏸️  Node {} is waiting for input", name(&node_id));
                }
                ExecutionEvent::InputRejected { node_id, error, .. } => {
                    println!("  ⚠️  Input for {} rejected: {}", name(&node_id), error);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", name(&node_id), message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", name(&node_id), message);
                    }
                    NodeEvent::Progress { percent, message } => {
                        if let Some(msg) = message {
                            println!("     📊 [{}] {}% - {}", name(&node_id), percent, msg);
                        } else {
                            println!("     📊 [{}] {}%", name(&node_id), percent);
                        }
                    }
                    NodeEvent::Data { .. } => {}
                },
                ExecutionEvent::RunCompleted {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("✨ Run completed successfully in {}ms", duration_ms);
                    } else {
                        println!("💥 Run finished with failures after {}ms", duration_ms);
                    }
                }
                ExecutionEvent::RunStatusChanged { .. } | ExecutionEvent::NodeStatusChanged { .. } => {}
            }
        }
    });

    let inputs = Arc::new(AnswerResolver::new(answers, interactive));
    let engine = runtime.spawn_engine(Arc::new(workflow), inputs);
    engine.run().await?;
    let snapshot = engine.wait_for(settled).await?;
    engine.shutdown().await?;

    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("📊 Execution Summary:");
    if let Some(run_id) = snapshot.run_id {
        println!("   Run ID: {}", run_id);
    }
    println!(
        "   Completed: {}/{} nodes",
        snapshot.count(NodeStatus::Done),
        snapshot.nodes.len()
    );

    let outputs: Vec<_> = snapshot
        .nodes
        .iter()
        .filter_map(|n| n.output.as_ref().map(|o| (n.node_id, o)))
        .collect();
    if !outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        for (node_id, output) in outputs {
            let label = names.get(&node_id).cloned().unwrap_or_else(|| node_id.to_string());
            println!("   {}: {}", label, output.to_plain_json());
        }
    }

    let unfinished: Vec<String> = snapshot
        .nodes
        .iter()
        .filter(|n| n.status != NodeStatus::Done)
        .map(|n| {
            let label = names.get(&n.node_id).cloned().unwrap_or_else(|| n.node_id.to_string());
            format!("{} ({})", label, n.status)
        })
        .collect();
    if !unfinished.is_empty() {
        anyhow::bail!("run did not finish: {}", unfinished.join(", "));
    }

    Ok(())
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = Workflow::load(&file)?;
    let registry = registry();

    let mut slots = Vec::with_capacity(workflow.nodes.len());
    let mut unknown = Vec::new();
    for node in &workflow.nodes {
        match registry.resolve(&node.definition_ref) {
            Some(definition) => slots.push((node.id, definition.inputs.len())),
            None => unknown.push(format!("{} ({})", node.label(), node.definition_ref)),
        }
    }
    if !unknown.is_empty() {
        anyhow::bail!("unknown node types: {}", unknown.join(", "));
    }

    let deps = DependencyGraph::build(&slots, &workflow.links);
    if deps.has_cycle() {
        anyhow::bail!("workflow contains a cycle");
    }

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Links: {}", workflow.links.len());
    if !deps.ignored_links().is_empty() {
        println!(
            "   ⚠️  {} link(s) will be ignored (dangling or replaced)",
            deps.ignored_links().len()
        );
    }

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = registry();
    for node_type in registry.list_node_types() {
        if let Some(definition) = registry.get_definition(&node_type) {
            println!("  • {} ({})", node_type, definition.category);
            println!("    {}", definition.description);
            for port in &definition.inputs {
                let required = if port.required { ", required" } else { "" };
                println!("      ← {} ({:?}{})", port.name, port.kind, required);
            }
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = Workflow::new("Example Input Workflow");
    workflow.description = Some("Asks for a JSON document, parses it and logs the result".to_string());

    let ask = workflow.add_node(
        NodeSpec::new("input.text")
            .with_name("Ask for JSON")
            .with_position(100.0, 100.0),
    );
    let parse = workflow.add_node(
        NodeSpec::new("transform.json_parse")
            .with_name("Parse")
            .with_position(300.0, 100.0),
    );
    let wait = workflow.add_node(
        NodeSpec::new("time.delay")
            .with_name("Wait")
            .with_property("delay_ms", 250.0)
            .with_position(500.0, 100.0),
    );
    let log = workflow.add_node(
        NodeSpec::new("debug.log")
            .with_name("Log Result")
            .with_position(700.0, 100.0),
    );

    workflow.connect(ask, 0, parse, 0);
    workflow.connect(parse, 0, wait, 0);
    workflow.connect(wait, 0, log, 0);

    workflow
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  canvas run --file {} --interactive", output.display());

    Ok(())
}
