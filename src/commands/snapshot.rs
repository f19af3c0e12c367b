use crate::error::AppResult;
use crate::models::settings::AppConfig;
use crate::models::snapshot::{SnapshotOutcome, TargetUser};
use crate::services::snapshot_service::SnapshotService;
use crate::utils::format::{format_hours, format_number};

use super::CommandStatus;

pub async fn run(
    config: &AppConfig,
    target: Option<&str>,
    max_games: Option<usize>,
) -> AppResult<CommandStatus> {
    let target = TargetUser::parse(target);
    let max_games = max_games.unwrap_or(config.max_games);
    let service = SnapshotService::from_config(config)?;

    match service.create_snapshot(&target, max_games).await? {
        SnapshotOutcome::Created { snapshot, files } => {
            let stats = &snapshot.statistics;
            println!("Snapshot for {}", snapshot.gamertag());
            println!("  games:        {}", stats.total_games);
            println!("  hours:        {}", format_hours(stats.total_hours));
            println!("  achievements: {}", format_number(stats.total_achievements));
            println!("  completed:    {}", stats.completed_games);
            println!("Saved {}", files.timestamped.display());
            println!("Saved {}", files.latest.display());
            Ok(CommandStatus::Success)
        }
        SnapshotOutcome::UserNotFound { gamertag } => {
            eprintln!("User '{gamertag}' not found");
            Ok(CommandStatus::UserNotFound)
        }
        SnapshotOutcome::LookupUnavailable { gamertag } => {
            eprintln!("Could not look up '{gamertag}': Xbox Live profile service unavailable");
            Ok(CommandStatus::LookupUnavailable)
        }
    }
}
