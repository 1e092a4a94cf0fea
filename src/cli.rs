//! Command-line interface for factgraph.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::report;
use crate::runner::Runner;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 2;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "FACTGRAPH_LOG";

/// Extract an architecture fact graph from a JavaScript/TypeScript codebase.
///
/// Factgraph statically scans a source tree for services, HTTP routes,
/// database models, auth policies, payload shapes and business flows, and
/// emits them as one deterministic JSON document.
#[derive(Parser)]
#[command(name = "factgraph")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose logging (debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a source tree and emit its fact graph
    Scan(ScanArgs),
    /// Write a default configuration file
    Init(InitArgs),
}

/// Output format for the scan command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Root of the source tree
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum entries per output category
    #[arg(short, long)]
    pub limit: Option<i64>,

    /// Write the JSON graph to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Maximum concurrent file reads
    #[arg(long)]
    pub max_in_flight: Option<i64>,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "factgraph.yaml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Install the stderr log subscriber. `-q` and `-v` take precedence over
/// the environment filter.
pub fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // A second initialization (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Load the configuration for `args` and apply command-line overrides.
fn resolve_config(args: &ScanArgs) -> anyhow::Result<Config> {
    let mut config = Config::load(&args.path, args.config.as_deref()).with_context(|| {
        match &args.config {
            Some(path) => format!("loading config {}", path.display()),
            None => "loading config".to_string(),
        }
    })?;

    if let Some(limit) = args.limit {
        config.limit = limit;
    }
    if let Some(max_in_flight) = args.max_in_flight {
        config.max_in_flight = max_in_flight;
    }
    for problem in config.sanitize() {
        tracing::warn!("{}, using the default", problem);
    }
    Ok(config)
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    if !args.path.is_dir() {
        anyhow::bail!("cannot read {}: not a directory", args.path.display());
    }

    let config = resolve_config(args)?;
    let outcome = Runner::new(&args.path, config).run()?;
    info!(
        scanned = outcome.stats.scanned,
        failed = outcome.stats.failures.len(),
        conflicts = outcome.stats.conflicts,
        "scan complete"
    );

    match args.format {
        OutputFormat::Json => report::write_json(&outcome.graph, args.output.as_deref())?,
        OutputFormat::Pretty => {
            if let Some(output) = args.output.as_deref() {
                report::write_json(&outcome.graph, Some(output))?;
            }
            report::write_pretty(&args.path.display().to_string(), &outcome);
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() && !args.force {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Use --force to overwrite it");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    std::fs::write(&args.output, Config::template()?)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to customize the scan", args.output.display());
    println!("  2. Run: factgraph scan . --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_args() {
        let cli = Cli::parse_from([
            "factgraph", "scan", "app", "-l", "10", "-f", "pretty", "--max-in-flight", "8", "-v",
        ]);
        assert!(cli.verbose);
        let Commands::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.path, PathBuf::from("app"));
        assert_eq!(args.limit, Some(10));
        assert_eq!(args.format, OutputFormat::Pretty);
        assert_eq!(args.max_in_flight, Some(8));
    }

    #[test]
    fn test_scan_defaults() {
        let cli = Cli::parse_from(["factgraph", "scan"]);
        let Commands::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.path, PathBuf::from("."));
        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.output.is_none());
    }

    #[test]
    fn test_overrides_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let args = ScanArgs {
            path: dir.path().to_path_buf(),
            config: None,
            limit: Some(0),
            output: None,
            format: OutputFormat::Json,
            max_in_flight: Some(4),
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.limit(), 100);
        assert_eq!(config.max_in_flight(), 4);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("conf/factgraph.yaml");
        let args = InitArgs {
            output: output.clone(),
            force: false,
        };
        assert_eq!(run_init(&args).unwrap(), EXIT_SUCCESS);
        assert!(Config::parse_file(&output).is_ok());
        assert_eq!(run_init(&args).unwrap(), EXIT_ERROR);

        let forced = InitArgs {
            output,
            force: true,
        };
        assert_eq!(run_init(&forced).unwrap(), EXIT_SUCCESS);
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let args = ScanArgs {
            path: dir.path().join("missing"),
            config: None,
            limit: None,
            output: None,
            format: OutputFormat::Json,
            max_in_flight: None,
        };
        assert!(run_scan(&args).is_err());
    }
}
