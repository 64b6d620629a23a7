//! Kallipolis crisis simulation CLI.
//!
//! Commands:
//! - single: Run one crisis cycle from a description
//! - batch: Run the predefined crisis scenarios
//! - scenarios: List the predefined scenarios

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crisis_experiment::batch::{BatchRunner, BatchRunnerConfig};
use crisis_experiment::chat_client::{ChatClient, ChatClientConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crisis_experiment::results::{format_duration, BatchMetadata, BatchReport, ScenarioOutcome, ScenarioStatus};
use crisis_experiment::scenarios::{self, SCENARIOS};
use kallipolis_kernel::{CrisisSeed, CycleConfig, Orchestrator, SocietyConfig};

/// Generate a timestamped output path from the given path.
/// e.g., "batch-summary.json" -> "batch-summary-20260108-010530.json"
fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("batch-summary");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

#[derive(Parser)]
#[command(name = "kallipolis")]
#[command(version)]
#[command(about = "Crisis-resolution simulation of a hierarchical society of LLM agents")]
struct Cli {
    /// Chat completions server URL
    #[arg(long, env = "KALLIPOLIS_LLM_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Model name as known to the server
    #[arg(long, env = "KALLIPOLIS_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature
    #[arg(long, default_value = "0.7")]
    temperature: f32,

    /// Completion length limit (server default when unset)
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Timeout for a single generation call, in seconds
    #[arg(long, default_value = "180")]
    timeout_secs: u64,

    /// Retries after a failed generation call
    #[arg(long, default_value = "2")]
    retries: u32,

    /// Ruler consultations before a directive is demanded
    #[arg(long, default_value = "10")]
    max_consultations: usize,

    /// Salary budget for the allocation
    #[arg(long, default_value = "700")]
    budget: u32,

    /// Directory for JSONL transcripts
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Society configuration JSON (overrides --prompt-version)
    #[arg(long)]
    society: Option<PathBuf>,

    /// Built-in prompt configuration
    #[arg(long, default_value = "v2", value_parser = clap::builder::PossibleValuesParser::new(SocietyConfig::BUILTIN_VERSIONS))]
    prompt_version: String,

    /// Write the active society configuration to this path
    #[arg(long)]
    dump_society: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one crisis cycle
    Single {
        /// Crisis description (a prompt for God, or the crisis itself with --fixed)
        description: String,

        /// Use the description verbatim as God's crisis
        #[arg(long)]
        fixed: bool,
    },

    /// Run the predefined scenarios
    Batch {
        /// Scenarios to run concurrently
        #[arg(long, default_value = "1")]
        parallel: usize,

        /// Only these scenarios (comma-separated names)
        #[arg(long, value_delimiter = ',')]
        only: Option<Vec<String>>,

        /// Pause between scenarios, in seconds
        #[arg(long, default_value = "2")]
        cooldown_secs: u64,

        /// Output file for the batch summary
        #[arg(long, default_value = "batch-summary.json")]
        output: PathBuf,
    },

    /// List the predefined scenarios
    Scenarios,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    if let Commands::Scenarios = cli.command {
        for (i, scenario) in SCENARIOS.iter().enumerate() {
            println!("{:>2}. {:<16} {}", i + 1, scenario.name, scenario.prompt);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let society = load_society(&cli)?;
    if let Some(path) = &cli.dump_society {
        society
            .save(path)
            .with_context(|| format!("Failed to write society config to {}", path.display()))?;
        info!(path = %path.display(), version = %society.version, "Wrote society config");
    }

    let cycle_config = CycleConfig {
        max_consultations: cli.max_consultations,
        budget: cli.budget,
        generation_retries: cli.retries,
        generation_timeout: Duration::from_secs(cli.timeout_secs),
        ..Default::default()
    };

    let client = ChatClient::new(ChatClientConfig {
        base_url: cli.base_url.clone(),
        model: cli.model.clone(),
        temperature: cli.temperature,
        max_tokens: cli.max_tokens,
        request_timeout_secs: cli.timeout_secs,
    })?;

    if !client.health_check().await {
        warn!(base_url = %client.base_url(), "Chat server did not answer /v1/models; continuing anyway");
    }

    info!(
        model = %cli.model,
        society = %society.version,
        budget = cycle_config.budget,
        max_consultations = cycle_config.max_consultations,
        "Configuration loaded"
    );

    let society_version = society.version.clone();
    let orchestrator = Orchestrator::new(Arc::new(client), Arc::new(society), cycle_config);

    match cli.command {
        Commands::Single { description, fixed } => {
            let seed = if fixed {
                CrisisSeed::Fixed(description)
            } else {
                CrisisSeed::Prompt(description)
            };

            let runner = BatchRunner::new(
                orchestrator,
                BatchRunnerConfig {
                    log_dir: cli.log_dir,
                    parallelism: 1,
                    cooldown: Duration::ZERO,
                },
            );
            let outcome = runner.run_one(1, "single", &seed).await;

            println!("\n=== Crisis Cycle Result ===");
            print_outcome(&outcome);

            Ok(exit_code(outcome.status != ScenarioStatus::Error))
        }

        Commands::Batch {
            parallel,
            only,
            cooldown_secs,
            output,
        } => {
            let selected = match only {
                Some(names) => scenarios::select(&names)
                    .map_err(|name| anyhow::anyhow!("Unknown scenario: {}. Run `kallipolis scenarios` for the list", name))?,
                None => SCENARIOS.to_vec(),
            };

            let metadata = BatchMetadata {
                model: cli.model.clone(),
                base_url: cli.base_url.clone(),
                society_version,
                budget: orchestrator.config().budget,
                max_consultations: orchestrator.config().max_consultations,
                parallelism: parallel.max(1),
            };

            let runner = BatchRunner::new(
                orchestrator,
                BatchRunnerConfig {
                    log_dir: cli.log_dir,
                    parallelism: parallel,
                    cooldown: Duration::from_secs(cooldown_secs),
                },
            );

            let mut report = BatchReport::new(metadata);
            for outcome in runner.run(&selected).await {
                report.add(outcome);
            }
            report.compute_summary();

            let output_path = timestamped_path(&output);
            report.save(&output_path)?;

            println!("\n=== Batch Complete ===");
            println!("Results saved to: {}", output_path.display());
            println!("\nScenarios:");
            for outcome in &report.outcomes {
                println!(
                    "  {:<16} {:<10} turns={:<3} consulted={:<2} {}",
                    outcome.scenario,
                    format!("{:?}", outcome.status).to_lowercase(),
                    outcome.turns,
                    outcome.consulted.len(),
                    outcome
                        .budget_audit()
                        .or_else(|| outcome.error.clone())
                        .unwrap_or_default()
                );
            }

            let s = &report.summary;
            println!("\nSummary:");
            println!("  Allocated: {}/{}", s.allocated, s.scenarios);
            println!("  Rejected: {}", s.rejected);
            println!("  Errors: {}", s.errors);
            println!("  Approval rate: {:.1}%", s.approval_rate * 100.0);
            println!("  Mean consultations: {:.2}", s.mean_consultations);
            println!("  Over budget: {}", s.over_budget);
            println!("  Total time: {}", format_duration(s.total_duration_ms));

            Ok(exit_code(s.errors == 0))
        }

        Commands::Scenarios => Ok(ExitCode::SUCCESS),
    }
}

fn load_society(cli: &Cli) -> Result<SocietyConfig> {
    match &cli.society {
        Some(path) => SocietyConfig::load(path)
            .with_context(|| format!("Failed to load society config from {}", path.display())),
        None => SocietyConfig::builtin(&cli.prompt_version)
            .with_context(|| format!("Unknown prompt version: {}", cli.prompt_version)),
    }
}

fn print_outcome(outcome: &ScenarioOutcome) {
    println!("Status: {:?}", outcome.status);
    println!("Transcript: {}", outcome.transcript.display());
    println!("Turns: {}", outcome.turns);
    if let Some(crisis) = &outcome.crisis {
        println!("\nCrisis:\n  {}", crisis);
    }
    if !outcome.consulted.is_empty() {
        println!("\nConsulted: {}", outcome.consulted.join(", "));
    }
    if let Some(directive) = &outcome.directive {
        println!("\nDirective:\n  {}", directive);
    }
    if let Some(verdict) = &outcome.verdict {
        println!("\nVerdict: {:?}", verdict);
        if let Some(reason) = &outcome.reason {
            println!("  {}", reason);
        }
    }
    if let Some(allocation) = &outcome.allocation {
        println!("\nSalaries:");
        for (name, amount) in allocation {
            println!("  {:<18} {:>5}", name, amount);
        }
    }
    if let Some(audit) = outcome.budget_audit() {
        println!("  Budget: {}", audit);
    }
    if let Some(error) = &outcome.error {
        println!("\nError: {}", error);
    }
    println!("\nDuration: {}", format_duration(outcome.duration_ms));
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
