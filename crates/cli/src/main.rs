mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rtforge_lib::verify::RecordFormat;

use crate::output::OutputFormat;

/// rtforge - build portable interpreter runtimes for several targets at once
#[derive(Parser)]
#[command(name = "rtforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build every selected target and hand off the verified trees
  Build {
    /// Path to the configuration file (default: ./rtforge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only build these targets (repeatable; default: all)
    #[arg(short = 't', long = "target")]
    targets: Vec<String>,

    /// Maximum concurrent build procedures across all targets
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Rebuild every node even when a matching prefix exists
    #[arg(long)]
    no_reuse: bool,

    /// Keep the scratch tree of failed steps for inspection
    #[arg(long)]
    keep_failed: bool,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Show the resolved build order and waves without building
  Plan {
    /// Path to the configuration file (default: ./rtforge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only plan these targets (repeatable; default: all)
    #[arg(short = 't', long = "target")]
    targets: Vec<String>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Print the environment a node's build procedure would receive
  ///
  /// TMPDIR is shown with a placeholder suffix; each real step gets a fresh
  /// scratch directory under <work_dir>/<target>/work.
  Env {
    /// Target variant
    #[arg(short, long)]
    target: String,

    /// Dependency node
    #[arg(short, long)]
    node: String,

    /// Path to the configuration file (default: ./rtforge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
  },

  /// Check an existing configuration record against the declared capabilities
  Verify {
    /// Target variant whose severities apply
    #[arg(short, long)]
    target: String,

    /// Configuration record to check
    #[arg(long)]
    record: PathBuf,

    /// Record layout: header, json or env
    #[arg(long, default_value = "header")]
    format: RecordFormat,

    /// Path to the configuration file (default: ./rtforge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
  },

  /// List declared target variants
  Targets {
    /// Path to the configuration file (default: ./rtforge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build {
      config,
      targets,
      jobs,
      no_reuse,
      keep_failed,
      format,
    } => {
      let options = cmd::BuildOptions {
        targets,
        jobs,
        no_reuse,
        keep_failed,
        format,
      };
      cmd::cmd_build(config.as_deref(), &options, cli.verbose)
    }
    Commands::Plan {
      config,
      targets,
      format,
    } => cmd::cmd_plan(config.as_deref(), &targets, format),
    Commands::Env { target, node, config } => cmd::cmd_env(config.as_deref(), &target, &node),
    Commands::Verify {
      target,
      record,
      format,
      config,
    } => cmd::cmd_verify(config.as_deref(), &target, &record, format),
    Commands::Targets { config, format } => cmd::cmd_targets(config.as_deref(), format),
  }
}
