use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::compiler;
use crate::config::{Config, CONFIG_PATH_ENV};
use crate::ir::{schema, Ir};

#[derive(Parser)]
#[command(name = "stanzaflow")]
#[command(version)]
#[command(about = "StanzaFlow - write workflows the way you write stanzas", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a .sf.md workflow to IR JSON
    Compile {
        /// Workflow source file
        file: PathBuf,

        /// Write the IR here instead of stdout
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Replace the output file if it exists
        #[arg(long)]
        overwrite: bool,
    },

    /// Parse and validate a workflow, printing a summary
    Check {
        /// Workflow source file
        file: PathBuf,
    },

    /// Validate an IR JSON document against the IR schema
    Validate {
        /// IR JSON file
        file: PathBuf,
    },
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

/// Run the CLI with provided arguments
pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli)
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Apply CLI overrides to environment before anything reads configuration
    if let Some(config_path) = &cli.config {
        std::env::set_var(CONFIG_PATH_ENV, config_path);
    }

    // Eagerly load configuration so config errors surface before any output
    let config = Config::load()?;
    init_tracing(&config);

    match cli.command {
        Commands::Compile {
            file,
            output,
            overwrite,
        } => {
            let ir = compiler::compile_file(&file)?;
            let json = ir.to_json_pretty();

            match output {
                Some(path) => {
                    ensure_writable(&path, overwrite)?;
                    std::fs::write(&path, format!("{}\n", json))
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("✓ IR written to {}", path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::Check { file } => {
            let ir = compiler::compile_file(&file)?;
            print_summary(&file, &ir);
        }

        Commands::Validate { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;

            schema::validate_value(&value)?;
            println!("✓ {} is valid IR {}", file.display(), crate::ir::IR_VERSION);
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    // A subscriber may already be installed by an embedding host
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn ensure_writable(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        anyhow::bail!(
            "File {} already exists. Use --overwrite to replace it, \
             or choose a different output path.",
            path.display()
        );
    }
    Ok(())
}

fn print_summary(file: &Path, ir: &Ir) {
    let workflow = &ir.workflow;
    let steps: usize = workflow.agents.iter().map(|agent| agent.steps.len()).sum();

    println!("✓ {} is valid", file.display());
    println!("Title: {}", workflow.title);
    println!("Agents: {}", workflow.agents.len());
    for agent in &workflow.agents {
        println!("  {} ({} step(s))", agent.name, agent.steps.len());
    }
    println!("Steps: {}", steps);
    println!("Escape blocks: {}", workflow.escape_blocks.len());
    println!("Secrets: {}", workflow.secrets.len());
}
