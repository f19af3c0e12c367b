use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, warn};

use lifetime_review::commands::{self, CommandStatus, EXIT_FAILURE, EXIT_INTERRUPTED};
use lifetime_review::error::AppResult;
use lifetime_review::models::settings::AppConfig;
use lifetime_review::utils::logger::init_logging;

#[derive(Parser, Debug)]
#[command(name = "lifetime-review", version, about = "Xbox lifetime review")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with a Microsoft account and store Xbox Live tokens.
    Authenticate,
    /// Fetch library, playtime and achievements into a snapshot file.
    Snapshot {
        /// XUID (all digits) or gamertag; defaults to the signed-in player.
        #[arg(value_name = "TARGET")]
        target: Option<String>,
        /// Games whose achievements are fetched, in playtime order.
        #[arg(long, value_name = "N")]
        max_games: Option<usize>,
    },
    /// Render the HTML review and SVG share card from a snapshot.
    Report {
        /// Snapshot path, or a file name inside the output directory.
        #[arg(value_name = "SNAPSHOT")]
        snapshot: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    if let Err(err) = init_logging(&config.log_dir) {
        eprintln!("warning: file logging disabled: {err}");
    }

    tokio::select! {
        result = dispatch(&config, cli.command) => match result {
            Ok(status) => ExitCode::from(status.exit_code()),
            Err(err) => {
                error!(target: "app::cli", error = %err, "command failed");
                eprintln!("error: {err}");
                ExitCode::from(EXIT_FAILURE)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!(target: "app::cli", "interrupted, nothing persisted");
            eprintln!("\nCancelled");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn dispatch(config: &AppConfig, command: Command) -> AppResult<CommandStatus> {
    config.ensure_dirs()?;
    match command {
        Command::Authenticate => commands::authenticate::run(config).await,
        Command::Snapshot { target, max_games } => {
            commands::snapshot::run(config, target.as_deref(), max_games).await
        }
        Command::Report { snapshot } => commands::report::run(config, &snapshot).await,
    }
}
