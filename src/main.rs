use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use cadence::agent::{AgentRegistry, MockAgent};
use cadence::backend::{BoardBackend, MemoryBackend, NewSprint, WorkflowBackend};
use cadence::execution::gates::default_gates;
use cadence::execution::{HookRegistry, RunConfig, SprintRunner};
use cadence::workflow::{AgentResult, Sprint, TaskPlan};

/// Durable sprint automation over a kanban board
#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Run sprints against a kanban board with enforcement gates", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Kanban board directory
    #[arg(long, default_value = "board", global = true)]
    board_dir: PathBuf,

    /// Use an in-memory backend with mock agents (seeds a demo sprint)
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a sprint end to end
    Run {
        sprint_id: String,

        /// Retries per step after the first attempt
        #[arg(long, default_value = "2")]
        max_retries: u32,

        /// Fixed delay between retries, in seconds
        #[arg(long, default_value = "1.0")]
        retry_delay_secs: f64,

        /// Stop at the review column instead of completing directly
        #[arg(long)]
        review: bool,
    },
    /// Continue a blocked or in-progress sprint from its first unfinished step
    Resume { sprint_id: String },
    /// Cancel a sprint, recording the reason
    Cancel { sprint_id: String, reason: String },
    /// Show step-level progress for a sprint
    Status { sprint_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("cadence started with verbosity level: {}", cli.verbose);

    let result = match &cli.command {
        Commands::Run {
            sprint_id,
            max_retries,
            retry_delay_secs,
            review,
        } => {
            let config = RunConfig {
                max_retries: *max_retries,
                retry_delay: Duration::from_secs_f64(*retry_delay_secs),
                review_checkpoint: *review,
                ..RunConfig::default()
            };
            run_sprint(&cli, sprint_id.clone(), config).await
        }
        Commands::Resume { sprint_id } => resume_sprint(&cli, sprint_id.clone()).await,
        Commands::Cancel { sprint_id, reason } => cancel_sprint(&cli, sprint_id, reason).await,
        Commands::Status { sprint_id } => show_status(&cli, sprint_id).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn open_backend(cli: &Cli) -> anyhow::Result<Arc<dyn WorkflowBackend>> {
    if cli.memory {
        Ok(Arc::new(MemoryBackend::new()))
    } else {
        Ok(Arc::new(BoardBackend::new(&cli.board_dir)?))
    }
}

/// A demo sprint for `--memory` runs: three steps including an automated
/// review.
async fn seed_demo(backend: &dyn WorkflowBackend) -> anyhow::Result<String> {
    let epic = backend.create_epic("Demo epic", "Seeded for the demo run").await?;
    let sprint = backend
        .create_sprint(NewSprint {
            goal: "Demo sprint".into(),
            epic_id: Some(epic.id),
            kind: Some("fullstack".into()),
            tasks: vec![
                TaskPlan::new("design", "product_engineer"),
                TaskPlan::new("implement", "product_engineer"),
                TaskPlan::new("review", "reviewer"),
            ],
            dependencies: vec![],
        })
        .await?;
    info!(sprint = %sprint.id, "seeded demo sprint");
    Ok(sprint.id)
}

/// Mock agents for every agent label the sprint references.
fn mock_agents(sprint: &Sprint) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    let labels: std::collections::BTreeSet<String> = sprint
        .tasks
        .iter()
        .map(|t| t.agent_label().to_string())
        .chain(sprint.steps.iter().map(|s| s.agent.clone()))
        .collect();
    for label in labels {
        let agent = MockAgent::new(label.clone());
        if label == "reviewer" {
            let mut approval = AgentResult::ok("looks good");
            approval.review_verdict = Some("approve".into());
            agent.push_result(approval);
        }
        registry.register(label, Arc::new(agent));
    }
    registry
}

async fn make_runner(
    cli: &Cli,
    sprint_id: String,
    config: RunConfig,
) -> anyhow::Result<(SprintRunner, String)> {
    let backend = open_backend(cli)?;
    let sprint_id = if cli.memory {
        seed_demo(backend.as_ref()).await?
    } else {
        sprint_id
    };
    let sprint = backend.get_sprint(&sprint_id).await?;

    let mut hooks = HookRegistry::new();
    for gate in default_gates(&sprint.kind) {
        hooks.register(gate);
    }

    let runner = SprintRunner::new(
        backend,
        mock_agents(&sprint),
        hooks,
        config,
        std::env::current_dir()?,
    );
    Ok((runner, sprint_id))
}

async fn run_sprint(cli: &Cli, sprint_id: String, config: RunConfig) -> anyhow::Result<()> {
    let (runner, sprint_id) = make_runner(cli, sprint_id, config).await?;
    let result = runner.run(&sprint_id).await?;
    report(runner.backend().as_ref(), &sprint_id, result.success).await
}

async fn resume_sprint(cli: &Cli, sprint_id: String) -> anyhow::Result<()> {
    let (runner, sprint_id) = make_runner(cli, sprint_id, RunConfig::default()).await?;
    let result = runner.resume(&sprint_id).await?;
    report(runner.backend().as_ref(), &sprint_id, result.success).await
}

async fn cancel_sprint(cli: &Cli, sprint_id: &str, reason: &str) -> anyhow::Result<()> {
    let backend = open_backend(cli)?;
    let runner = SprintRunner::new(
        backend,
        AgentRegistry::new(),
        HookRegistry::new(),
        RunConfig::default(),
        std::env::current_dir()?,
    );
    let sprint = runner.cancel(sprint_id, reason).await?;
    println!("Sprint {} is now {}", sprint.id, sprint.status);
    Ok(())
}

async fn show_status(cli: &Cli, sprint_id: &str) -> anyhow::Result<()> {
    let backend = open_backend(cli)?;
    print_progress(backend.as_ref(), sprint_id).await
}

async fn report(
    backend: &dyn WorkflowBackend,
    sprint_id: &str,
    success: bool,
) -> anyhow::Result<()> {
    print_progress(backend, sprint_id).await?;
    if success {
        println!("Sprint {sprint_id} finished successfully");
        Ok(())
    } else {
        let sprint = backend.get_sprint(sprint_id).await?;
        if let Some(blocker) = &sprint.blocker {
            println!("Sprint {sprint_id} is blocked: {blocker}");
        } else {
            println!("Sprint {sprint_id} did not finish");
        }
        Ok(())
    }
}

async fn print_progress(backend: &dyn WorkflowBackend, sprint_id: &str) -> anyhow::Result<()> {
    let sprint = backend.get_sprint(sprint_id).await?;
    let report = backend.get_step_status(sprint_id).await?;

    println!("Sprint {} [{}] - {}", sprint.id, sprint.status, sprint.goal);
    println!(
        "Progress: {}/{} steps ({:.1}%)",
        report.completed_steps, report.total_steps, report.progress_pct
    );
    for step in &report.steps {
        let marker = match step.status {
            cadence::workflow::StepStatus::Done => "x",
            cadence::workflow::StepStatus::InProgress => ">",
            cadence::workflow::StepStatus::Skipped => "-",
            cadence::workflow::StepStatus::Failed => "!",
            cadence::workflow::StepStatus::Todo => " ",
        };
        println!("  [{marker}] {} ({})", step.name, step.id);
    }
    if let Some(reason) = &report.last_block_reason {
        println!("Last block reason: {reason}");
    }
    Ok(())
}
