use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::settings::{ApiEndpoints, AppConfig, OAuthSettings};
use crate::models::xbox::{OAuthTokens, StoredTokens};
use crate::utils::format::truncate_chars;

const XBOX_AUTH_CONTRACT: &str = "1";
const CALLBACK_OK: &str = "<html><body>OK - close this window</body></html>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(StoredTokens),
    AlreadyAuthenticated,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// User and XSTS token responses share this shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XboxTokenResponse {
    pub token: String,
    #[serde(default)]
    pub display_claims: DisplayClaims,
}

#[derive(Debug, Default, Deserialize)]
pub struct DisplayClaims {
    #[serde(default)]
    pub xui: Vec<XboxUserClaims>,
}

#[derive(Debug, Default, Deserialize)]
pub struct XboxUserClaims {
    #[serde(default)]
    pub uhs: String,
    #[serde(default)]
    pub xid: String,
    #[serde(default)]
    pub gtg: String,
}

/// Microsoft account sign-in followed by the Xbox Live user and XSTS token
/// exchanges.
pub struct Authenticator {
    client: reqwest::Client,
    endpoints: ApiEndpoints,
    oauth: OAuthSettings,
    tokens_file: PathBuf,
}

impl Authenticator {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|err| AppError::other(format!("cannot build auth HTTP client: {err}")))?;

        Ok(Self {
            client,
            endpoints: config.endpoints.clone(),
            oauth: config.oauth.clone(),
            tokens_file: config.tokens_file.clone(),
        })
    }

    pub fn tokens_file(&self) -> &Path {
        &self.tokens_file
    }

    pub fn tokens_exist(&self) -> bool {
        self.tokens_file.is_file()
    }

    fn client_id(&self) -> AppResult<&str> {
        self.oauth
            .client_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AppError::config("XBOX_CLIENT_ID is not set"))
    }

    pub fn auth_url(&self) -> AppResult<String> {
        let client_id = self.client_id()?;
        Ok(format!(
            "{}?client_id={}&response_type=code&approval_prompt=auto&scope={}&redirect_uri={}",
            self.endpoints.oauth_authorize,
            urlencoding::encode(client_id),
            urlencoding::encode(&self.oauth.scopes),
            urlencoding::encode(&self.oauth.redirect_uri)
        ))
    }

    /// Binds the local listener the redirect URI points at.
    pub async fn bind_callback(&self) -> AppResult<CallbackListener> {
        let redirect = Url::parse(&self.oauth.redirect_uri).map_err(|err| {
            AppError::config(format!("invalid redirect_uri `{}`: {err}", self.oauth.redirect_uri))
        })?;
        let port = redirect.port_or_known_default().unwrap_or(80);
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        debug!(target: "app::auth", port, "callback listener bound");

        Ok(CallbackListener {
            listener,
            path: redirect.path().to_string(),
        })
    }

    pub async fn exchange_code(&self, code: &str) -> AppResult<OAuthTokens> {
        let client_id = self.client_id()?;
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("redirect_uri", self.oauth.redirect_uri.as_str()),
            ("scope", self.oauth.scopes.as_str()),
        ];
        if let Some(secret) = self.oauth.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let request = self.client.post(&self.endpoints.oauth_token).form(&form);
        let response: OAuthTokenResponse = send_json(request, "code exchange").await?;
        Ok(OAuthTokens {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        })
    }

    pub async fn get_user_token(&self, access_token: &str) -> AppResult<XboxTokenResponse> {
        let body = json!({
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT",
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": format!("d={access_token}")
            }
        });
        send_json(self.xbox_auth_request(&self.endpoints.user_auth, &body), "user token").await
    }

    pub async fn get_xsts_token(&self, user_token: &str) -> AppResult<XboxTokenResponse> {
        let body = json!({
            "RelyingParty": "http://xboxlive.com",
            "TokenType": "JWT",
            "Properties": {
                "UserTokens": [user_token],
                "SandboxId": "RETAIL"
            }
        });
        send_json(self.xbox_auth_request(&self.endpoints.xsts_auth, &body), "XSTS token").await
    }

    fn xbox_auth_request(&self, url: &str, body: &serde_json::Value) -> RequestBuilder {
        self.client
            .post(url)
            .header("x-xbl-contract-version", XBOX_AUTH_CONTRACT)
            .header(ACCEPT, "application/json")
            .json(body)
    }

    /// Runs the token exchanges for an authorization code and persists the
    /// result.
    pub async fn complete(&self, code: &str) -> AppResult<StoredTokens> {
        let oauth = self.exchange_code(code).await?;
        let user = self.get_user_token(&oauth.access_token).await?;
        let xsts = self.get_xsts_token(&user.token).await?;

        let claims = xsts
            .display_claims
            .xui
            .into_iter()
            .next()
            .filter(|claims| !claims.uhs.is_empty())
            .ok_or_else(|| AppError::auth("XSTS response carries no user claims"))?;

        let tokens = StoredTokens {
            oauth,
            user_token: user.token,
            xsts_token: xsts.token,
            user_hash: claims.uhs,
            xuid: claims.xid,
            gamertag: claims.gtg,
        };
        self.save_tokens(&tokens)?;
        info!(target: "app::auth", gamertag = %tokens.gamertag, "authenticated");
        Ok(tokens)
    }

    pub fn save_tokens(&self, tokens: &StoredTokens) -> AppResult<()> {
        if let Some(parent) = self.tokens_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.tokens_file, serde_json::to_vec_pretty(tokens)?)?;
        debug!(target: "app::auth", path = %self.tokens_file.display(), "tokens saved");
        Ok(())
    }

    /// Full interactive flow. `prompt` receives the sign-in URL to show the
    /// user. Existing tokens short-circuit the handshake.
    pub async fn authenticate<F>(&self, prompt: F) -> AppResult<AuthOutcome>
    where
        F: FnOnce(&str),
    {
        if self.tokens_exist() {
            info!(target: "app::auth", path = %self.tokens_file.display(), "tokens already present");
            return Ok(AuthOutcome::AlreadyAuthenticated);
        }

        let url = self.auth_url()?;
        let listener = self.bind_callback().await?;
        prompt(&url);

        let code = listener
            .wait_for_code(Duration::from_secs(self.oauth.callback_timeout_secs))
            .await?;
        info!(target: "app::auth", "authorization code received");

        let tokens = self.complete(&code).await?;
        Ok(AuthOutcome::Authenticated(tokens))
    }
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder, step: &str) -> AppResult<T> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::auth(format!(
            "{step} failed with status {}: {}",
            status.as_u16(),
            truncate_chars(&body, 200)
        )));
    }
    Ok(response.json::<T>().await?)
}

/// One-shot HTTP listener for the OAuth redirect.
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Answers requests until one hits the callback path with a `code` or an
    /// `error` parameter.
    pub async fn wait_for_code(self, timeout: Duration) -> AppResult<String> {
        match tokio::time::timeout(timeout, self.accept_until_code()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::auth("timed out waiting for the authorization callback")),
        }
    }

    async fn accept_until_code(&self) -> AppResult<String> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(target: "app::auth", %peer, "callback connection");
            match self.handle(stream).await {
                Ok(Some(code)) => return Ok(code),
                Ok(None) => continue,
                Err(err @ AppError::Auth { .. }) => return Err(err),
                Err(err) => warn!(target: "app::auth", error = %err, "callback request dropped"),
            }
        }
    }

    async fn handle(&self, mut stream: TcpStream) -> AppResult<Option<String>> {
        let mut reader = BufReader::new(&mut stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;
        loop {
            let mut header = String::new();
            let read = reader.read_line(&mut header).await?;
            if read == 0 || header == "\r\n" || header == "\n" {
                break;
            }
        }

        let target = request_line.split_whitespace().nth(1).unwrap_or("/");
        let url = Url::parse(&format!("http://localhost{target}"))
            .map_err(|err| AppError::other(format!("malformed callback request: {err}")))?;

        if url.path() != self.path {
            respond(&mut stream, "404 Not Found", "Not found").await?;
            return Ok(None);
        }

        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        if let Some(error) = param("error") {
            respond(&mut stream, "400 Bad Request", "Error").await?;
            let description = param("error_description").unwrap_or_default();
            return Err(AppError::auth(format!("authorization denied: {error} {description}")));
        }

        match param("code").filter(|code| !code.is_empty()) {
            Some(code) => {
                respond(&mut stream, "200 OK", CALLBACK_OK).await?;
                Ok(Some(code))
            }
            None => {
                respond(&mut stream, "400 Bad Request", "Missing code").await?;
                Ok(None)
            }
        }
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> AppResult<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
