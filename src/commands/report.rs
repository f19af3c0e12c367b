use crate::error::AppResult;
use crate::models::settings::AppConfig;
use crate::services::report_service::ReportService;

use super::CommandStatus;

pub async fn run(config: &AppConfig, snapshot_name: &str) -> AppResult<CommandStatus> {
    let files = ReportService::new(config)?.generate(snapshot_name).await?;
    println!("HTML: {}", files.html.display());
    println!("SVG:  {}", files.svg.display());
    Ok(CommandStatus::Success)
}
