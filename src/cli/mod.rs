use crate::config::DEFAULT_CONFIG_FILE;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CheXNet: multi-label chest X-ray classifier training
#[derive(Parser, Debug)]
#[command(name = "chexnet")]
#[command(about = "Train a multi-label chest X-ray classifier from an INI config")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prepare the output directory and train a model
    Train(TrainArgs),

    /// Print sample counts, step counts and class weights
    Stats(StatsArgs),
}

/// Training arguments
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Stop after the model and image sequences are built
    #[arg(long)]
    pub dry_run: bool,
}

/// Statistics arguments
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity
///
/// `RUST_LOG` is ignored; verbosity is the only switch.
pub fn setup_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_defaults() {
        let cli = Cli::parse_from(["chexnet", "train"]);
        assert!(!cli.verbose);

        match cli.command {
            Commands::Train(args) => {
                assert_eq!(args.config, PathBuf::from("./sample_config.ini"));
                assert!(!args.dry_run);
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_train_args() {
        let cli = Cli::parse_from(["chexnet", "-v", "train", "-c", "exp.ini", "--dry-run"]);
        assert!(cli.verbose);

        match cli.command {
            Commands::Train(args) => {
                assert_eq!(args.config, PathBuf::from("exp.ini"));
                assert!(args.dry_run);
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_stats_args() {
        let cli = Cli::parse_from(["chexnet", "stats", "--config", "exp.ini", "--verbose"]);
        assert!(cli.verbose);

        match cli.command {
            Commands::Stats(args) => assert_eq!(args.config, PathBuf::from("exp.ini")),
            _ => panic!("Expected Stats command"),
        }
    }
}
