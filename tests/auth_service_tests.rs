use httpmock::prelude::*;
use lifetime_review::error::AppError;
use lifetime_review::models::settings::{ApiEndpoints, AppConfig};
use lifetime_review::models::xbox::{StoredTokens, XboxCredentials};
use lifetime_review::services::auth_service::{AuthOutcome, Authenticator};
use serde_json::json;
use std::time::Duration as StdDuration;
use tempfile::tempdir;

fn config_in(dir: &std::path::Path, server: Option<&MockServer>) -> AppConfig {
    let mut config = AppConfig::with_base_dir(dir);
    if let Some(server) = server {
        config.endpoints = ApiEndpoints::single_host(&server.base_url());
    }
    config.oauth.client_id = Some("client-abc".into());
    config.oauth.client_secret = Some("secret-xyz".into());
    config.oauth.redirect_uri = "http://127.0.0.1:0/auth/callback".into();
    config
}

#[tokio::test]
async fn complete_exchanges_code_and_saves_tokens() {
    let server = MockServer::start_async().await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth20_token.srf")
                .body_contains("grant_type=authorization_code")
                .body_contains("code=the-code")
                .body_contains("client_secret=secret-xyz");
            then.status(200).json_body(json!({
                "access_token": "access-123",
                "refresh_token": "refresh-456",
                "token_type": "bearer"
            }));
        })
        .await;
    let user = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/user/authenticate")
                .header("x-xbl-contract-version", "1")
                .body_contains("\"RpsTicket\":\"d=access-123\"");
            then.status(200).json_body(json!({
                "Token": "user-token",
                "DisplayClaims": {"xui": [{"uhs": "hash-1"}]}
            }));
        })
        .await;
    let xsts = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/xsts/authorize")
                .body_contains("\"SandboxId\":\"RETAIL\"")
                .body_contains("user-token");
            then.status(200).json_body(json!({
                "Token": "xsts-token",
                "DisplayClaims": {"xui": [{"uhs": "hash-1", "xid": "2533", "gtg": "MockPlayer"}]}
            }));
        })
        .await;

    let dir = tempdir().unwrap();
    let config = config_in(dir.path(), Some(&server));
    let auth = Authenticator::new(&config).unwrap();
    let tokens = auth.complete("the-code").await.unwrap();

    token.assert_async().await;
    user.assert_async().await;
    xsts.assert_async().await;

    assert_eq!(tokens.gamertag, "MockPlayer");
    assert_eq!(tokens.oauth.refresh_token.as_deref(), Some("refresh-456"));

    let raw = std::fs::read_to_string(&config.tokens_file).unwrap();
    let stored: StoredTokens = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored, tokens);

    let credentials = XboxCredentials::load(&config.tokens_file).unwrap();
    assert_eq!(credentials.auth_header(), "XBL3.0 x=hash-1;xsts-token");
    assert_eq!(credentials.xuid, "2533");
}

#[tokio::test]
async fn rejected_code_is_auth_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth20_token.srf");
            then.status(400).json_body(json!({"error": "invalid_grant"}));
        })
        .await;

    let dir = tempdir().unwrap();
    let config = config_in(dir.path(), Some(&server));
    let auth = Authenticator::new(&config).unwrap();

    let err = auth.complete("expired").await.unwrap_err();
    assert!(matches!(err, AppError::Auth { .. }));
    assert!(!config.tokens_file.exists());
}

#[tokio::test]
async fn existing_tokens_skip_the_handshake() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path(), None);
    config.ensure_dirs().unwrap();
    std::fs::write(&config.tokens_file, "{}").unwrap();

    let auth = Authenticator::new(&config).unwrap();
    let mut prompted = false;
    let outcome = auth.authenticate(|_| prompted = true).await.unwrap();

    assert_eq!(outcome, AuthOutcome::AlreadyAuthenticated);
    assert!(!prompted);
}

#[tokio::test]
async fn missing_client_id_fails_before_listening() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path(), None);
    config.oauth.client_id = None;

    let auth = Authenticator::new(&config).unwrap();
    let err = auth.authenticate(|_| {}).await.unwrap_err();
    assert!(err.is_config());
}

#[tokio::test]
async fn callback_listener_captures_code() {
    let dir = tempdir().unwrap();
    let auth = Authenticator::new(&config_in(dir.path(), None)).unwrap();
    let listener = auth.bind_callback().await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let waiter = tokio::spawn(listener.wait_for_code(StdDuration::from_secs(5)));

    let client = reqwest::Client::new();
    let favicon = client
        .get(format!("http://127.0.0.1:{port}/favicon.ico"))
        .send()
        .await
        .unwrap();
    assert_eq!(favicon.status().as_u16(), 404);

    let callback = client
        .get(format!("http://127.0.0.1:{port}/auth/callback?code=M.C123%2Fabc&state=x"))
        .send()
        .await
        .unwrap();
    assert_eq!(callback.status().as_u16(), 200);

    let code = waiter.await.unwrap().unwrap();
    assert_eq!(code, "M.C123/abc");
}

#[tokio::test]
async fn callback_error_is_reported() {
    let dir = tempdir().unwrap();
    let auth = Authenticator::new(&config_in(dir.path(), None)).unwrap();
    let listener = auth.bind_callback().await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let waiter = tokio::spawn(listener.wait_for_code(StdDuration::from_secs(5)));
    let response = reqwest::get(format!(
        "http://127.0.0.1:{port}/auth/callback?error=access_denied"
    ))
    .await
    .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, AppError::Auth { .. }));
}

#[tokio::test]
async fn callback_wait_times_out() {
    let dir = tempdir().unwrap();
    let auth = Authenticator::new(&config_in(dir.path(), None)).unwrap();
    let listener = auth.bind_callback().await.unwrap();

    let err = listener
        .wait_for_code(StdDuration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Auth { .. }));
}
