use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "anvil")]
#[command(version, about = "Phase-by-phase feature implementation with citation-backed memory")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .anvil/anvil.toml and the plans directory
    Init {
        /// rust, typescript, python, go or generic
        #[arg(long)]
        project_type: Option<String>,
    },
    /// Create, inspect and check implementation plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Run a plan through the full workflow
    Run {
        /// Plan id (defaults to the repository's current plan)
        #[arg(long)]
        plan: Option<String>,

        /// UI output mode: full, minimal, json
        #[arg(long, default_value = "full")]
        ui: String,

        /// Skip a failed phase or stage instead of stopping
        #[arg(long)]
        skip_failed: bool,

        /// Retry a failed step up to this many times before stopping
        #[arg(long, default_value = "0")]
        retries: u32,
    },
    /// Manage citation-backed memories for this repository
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum PlanCommands {
    /// Create a plan from a JSON draft and make it current
    Create { draft: PathBuf },
    /// Show a plan (defaults to the current plan)
    Show {
        id: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List plans for this repository
    List,
    /// Check plan structure without running it
    Check { id: Option<String> },
}

#[derive(Subcommand, Clone)]
pub enum MemoryCommands {
    /// Record a new memory
    Add {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        fact: String,
        #[arg(long, default_value = "")]
        reason: String,
        /// Citation as path or path:line (repeatable)
        #[arg(long = "cite")]
        citations: Vec<String>,
        /// Snippet for the first citation
        #[arg(long)]
        snippet: Option<String>,
    },
    /// Search memories by relevance
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List memories for this repository
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one memory
    Show { id: String },
    /// Validate one memory, or every memory in the repository
    Validate { id: Option<String> },
    /// Reset a memory's expiry clock without validating
    Refresh { id: String },
    /// Remove expired memories
    Prune,
    /// Summary statistics for this repository
    Stats,
    /// Delete a memory
    Delete { id: String },
    /// Mark one memory as superseded by another
    Supersede { old_id: String, new_id: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default anvil.toml file
    Init,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "anvil=debug" } else { "anvil=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_target(false).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init { project_type } => {
            cmd::cmd_init(&project_dir, project_type.as_deref())?;
        }
        Commands::Plan { command } => cmd::cmd_plan(&project_dir, command.clone(), cli.verbose)?,
        Commands::Run {
            plan,
            ui,
            skip_failed,
            retries,
        } => {
            let options = cmd::RunOptions {
                plan_id: plan.clone(),
                ui: ui.parse().unwrap_or_default(),
                skip_failed: *skip_failed,
                retries: *retries,
            };
            cmd::cmd_run(&project_dir, options, cli.verbose).await?;
        }
        Commands::Memory { command } => {
            cmd::cmd_memory(&project_dir, command.clone(), cli.verbose).await?
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
