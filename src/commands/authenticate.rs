use crate::error::AppResult;
use crate::models::settings::AppConfig;
use crate::services::auth_service::{AuthOutcome, Authenticator};

use super::CommandStatus;

pub async fn run(config: &AppConfig) -> AppResult<CommandStatus> {
    let authenticator = Authenticator::new(config)?;
    let outcome = authenticator
        .authenticate(|url| {
            println!("Open this URL:\n{url}\n");
            println!("Waiting for the sign-in callback...");
        })
        .await?;

    match outcome {
        AuthOutcome::Authenticated(tokens) => println!("Authenticated as {}", tokens.gamertag),
        AuthOutcome::AlreadyAuthenticated => println!(
            "Tokens already exist at {}",
            authenticator.tokens_file().display()
        ),
    }
    Ok(CommandStatus::Success)
}
