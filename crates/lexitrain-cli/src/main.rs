use clap::{Parser, Subcommand};
use lexitrain_core::Config;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "lexitrain-cli", version, about = "Lexitrain vocabulary trainer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a session plan and print it as JSON
    Plan {
        /// Session length in minutes (defaults to training.session_duration_minutes)
        #[arg(long)]
        minutes: Option<u32>,
        /// full, quick or review-only
        #[arg(long, default_value = "full")]
        mode: String,
    },
    /// Run an interactive training session
    Train {
        /// Session length in minutes (defaults to training.session_duration_minutes)
        #[arg(long)]
        minutes: Option<u32>,
        /// full, quick or review-only
        #[arg(long, default_value = "full")]
        mode: String,
    },
    /// Show tier progress
    Tiers,
    /// Learning statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();
    let log_level = Config::load_or_default().logging.level;
    let _log_guard = logging::init_tracing(&log_level);

    let result = match cli.command {
        Commands::Plan { minutes, mode } => commands::plan::run(minutes, &mode),
        Commands::Train { minutes, mode } => commands::train::run(minutes, &mode),
        Commands::Tiers => commands::tiers::run(),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
