//! choreo - action grounding and motion timelines for robot arms
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use choreo::cli::config_cmd::{ConfigCommand, ConfigOptions};
use choreo::cli::plan::{PlanCommand, PlanOptions};
use choreo::cli::resolve::{ResolveCommand, ResolveOptions};
use choreo::config::{choreo_home, Config};
use choreo::storage::FileKnowledgeStore;

const EXIT_SUCCESS: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_CRASH: i32 = 3;

// =============================================================================
// CLI Definition
// =============================================================================

/// choreo - action grounding and motion timelines for robot arms
#[derive(Parser)]
#[command(name = "choreo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ground an action from a program document into primitive calls
    Resolve {
        /// Program document (JSON)
        program: PathBuf,
        /// Action name or id
        #[arg(long, short)]
        action: String,
        /// Resolve against a stored knowledge base instead of the document's
        #[arg(long)]
        kb: Option<String>,
        /// Store the document's knowledge base under this name first
        #[arg(long)]
        save_as: Option<String>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Drive a deployment's timeline on a manual clock
    Plan {
        /// Deployment file (TOML or JSON)
        deployment: PathBuf,
        /// Scripted action to start at time zero
        #[arg(long, short)]
        action: Option<String>,
        /// Seconds to advance before sampling
        #[arg(long, default_value = "0")]
        at: f64,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show the effective layered configuration
    Config {
        /// Write the effective configuration to .choreo/config.toml
        #[arg(long)]
        save: bool,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();
    setup_tracing();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("choreo error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("choreo panic: {}", info);

        if let Some(home) = choreo_home() {
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(EXIT_CRASH);
    }));
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Resolve {
            program,
            action,
            kb,
            save_as,
            json,
            quiet,
        } => {
            let options = ResolveOptions {
                program,
                action,
                knowledge_base: kb,
                save_as,
                json,
                quiet,
            };
            run_resolve(&options)
        }
        Commands::Plan {
            deployment,
            action,
            at,
            json,
            quiet,
        } => {
            let options = PlanOptions {
                deployment,
                action,
                at,
                json,
                quiet,
            };
            run_plan(&options)
        }
        Commands::Config { save, json, quiet } => {
            let options = ConfigOptions {
                cwd,
                save,
                json,
                quiet,
            };
            run_config(&options)
        }
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

/// Print the formatted output. Failures go to stderr unless JSON was asked for.
fn finish(success: bool, json: bool, formatted: String, error: Option<&str>) -> ExitCode {
    if (success || json) && !formatted.is_empty() {
        println!("{}", formatted);
    }
    if success {
        return ExitCode::from(EXIT_SUCCESS);
    }
    eprintln!("choreo error: {}", error.unwrap_or("unknown error"));
    ExitCode::from(EXIT_ERROR)
}

fn run_resolve(options: &ResolveOptions) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = Config::load();
    let store = FileKnowledgeStore::new()?;
    let cmd = ResolveCommand::new(store, config.engine);

    let output = cmd.run(options);
    let formatted = cmd.format_output(&output, options);
    Ok(finish(output.success, options.json, formatted, output.error.as_deref()))
}

fn run_plan(options: &PlanOptions) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = PlanCommand::new(Config::load());

    let output = cmd.run(options);
    let formatted = cmd.format_output(&output, options);
    Ok(finish(output.success, options.json, formatted, output.error.as_deref()))
}

fn run_config(options: &ConfigOptions) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = ConfigCommand::new();

    let output = cmd.run(options);
    let formatted = cmd.format_output(&output, options);
    Ok(finish(output.success, options.json, formatted, output.error.as_deref()))
}
