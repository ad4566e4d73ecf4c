use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use workflow_harness::client::types::{WorkflowDef, WorkflowStatus};
use workflow_harness::config::AppConfig;
use workflow_harness::monitor::ExpectedOutcome;
use workflow_harness::{logging, validation, HarnessContext};

#[derive(Parser)]
#[command(name = "workflow-harness", about = "Drive and validate workflows on an orchestration server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Query the server health endpoint
    Health,
    /// Register a workflow definition with retry
    Register {
        /// JSON workflow definition
        definition: PathBuf,
    },
    /// Run one instance and check its terminal status
    Validate {
        definition: PathBuf,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
        #[arg(long, default_value = "COMPLETED")]
        expected_status: String,
        /// JSON file with the expected output document
        #[arg(long)]
        expected_output: Option<PathBuf>,
    },
    /// Run many instances concurrently; all must complete
    Bulk {
        definition: PathBuf,
        #[arg(long, default_value_t = 10)]
        amount: usize,
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Start instances without monitoring them
    Start {
        name: String,
        #[arg(long, default_value_t = 1)]
        quantity: usize,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    logging::init(&config.logging)?;

    tracing::info!(base_url = %config.server.base_url, "Connecting to orchestration server");

    let ctx = HarnessContext::from_config(&config)?;

    match cli.command {
        Command::Health => {
            let health = ctx.client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if !health.healthy {
                anyhow::bail!("server reports unhealthy");
            }
        }
        Command::Register { definition } => {
            let def: WorkflowDef = read_json(&definition)?;
            validation::validate_workflow_registration(&ctx, &def).await?;
            println!("registered {}", def.label());
        }
        Command::Validate {
            definition,
            timeout_secs,
            expected_status,
            expected_output,
        } => {
            let def: WorkflowDef = read_json(&definition)?;
            let status: WorkflowStatus = serde_json::from_value(serde_json::Value::String(
                expected_status.to_uppercase(),
            ))
            .with_context(|| format!("Unknown workflow status {expected_status}"))?;

            let mut expected = ExpectedOutcome::from(status);
            if let Some(path) = expected_output {
                expected = expected.with_output(read_json(&path)?);
            }

            validation::validate_workflow(&ctx, &def, Duration::from_secs(timeout_secs), expected)
                .await?;
            println!("{} finished as expected", def.label());
        }
        Command::Bulk {
            definition,
            amount,
            timeout_secs,
        } => {
            let def: WorkflowDef = read_json(&definition)?;
            let outcome = ctx
                .bulk()
                .run(&def, amount, Duration::from_secs(timeout_secs))
                .await?;

            for result in &outcome.results {
                let status = result
                    .status()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "#{:<4} {:<40} {}",
                    result.index,
                    result.workflow_id.as_deref().unwrap_or("<not started>"),
                    status
                );
            }
            outcome.verdict()?;
            println!("all {amount} instances of {} completed", def.label());
        }
        Command::Start { name, quantity } => {
            for workflow_id in validation::start_workflows(&ctx, quantity, &name).await? {
                println!("{workflow_id}");
            }
        }
    }

    Ok(())
}
