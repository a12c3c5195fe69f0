//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "logtune",
    version,
    author = "tyronevb",
    about = "Grid-search tuning for log parsing algorithms",
    long_about = "Logtune finds the optimal hyperparameters for a log parsing method by \
                  exhaustively evaluating a declared parameter grid against a representative \
                  log file, scoring each combination, and reporting the best configuration \
                  alongside a full leaderboard."
)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Tune a log parsing method over its declared parameter grid
    Tune {
        /// Tuning configuration file (log format, method, parameter ranges)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Raw log file to tune on
        #[arg(short, long, value_name = "FILE")]
        log_file: PathBuf,

        /// Ground truth template labels, one per parsed record
        #[arg(short, long, value_name = "FILE")]
        ground_truth: Option<PathBuf>,

        /// Directory for the tuning record, tuning log and emitted configs
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Override the configured worker count
        #[arg(long)]
        workers: Option<usize>,

        /// Override the configured per-point timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Write a new config file with the optimal parameters pinned
        #[arg(short = 'n', long)]
        emit_config: bool,

        /// Leaderboard entries to print
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Parse a log file once using fixed (pinned) parameters
    Parse {
        /// Configuration file with every parameter pinned (min == max)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Raw log file to parse
        #[arg(short, long, value_name = "FILE")]
        log_file: PathBuf,

        /// Directory for the structured log and template outputs
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Evaluate the result against ground truth labels
        #[arg(short, long, value_name = "FILE")]
        ground_truth: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show a configuration
    Show {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize a template configuration
    Init {
        /// Where to write the config (defaults to standard location)
        path: Option<PathBuf>,

        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_tune_arguments() {
        let cli = Cli::try_parse_from([
            "logtune", "tune", "-c", "cfg.toml", "-l", "app.log", "-o", "out/", "--workers", "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Tune {
                workers, top, ..
            } => {
                assert_eq!(workers, Some(4));
                assert_eq!(top, 10);
            }
            other => panic!("expected tune, got {:?}", other),
        }
    }
}
