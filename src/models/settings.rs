use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_GAMES: usize = 100;
pub const DEFAULT_ACHIEVEMENTS_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 100;
pub const DEFAULT_RAREST_SUBSET_SIZE: usize = 50;

const ENV_CONFIG_FILE: &str = "XBOX_REVIEW_CONFIG";
const ENV_BASE_DIR: &str = "XBOX_REVIEW_BASE_DIR";
const ENV_OUTPUT_DIR: &str = "XBOX_REVIEW_OUTPUT_DIR";
const ENV_CLIENT_ID: &str = "XBOX_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "XBOX_CLIENT_SECRET";

/// Base URLs of every remote service the tool talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiEndpoints {
    pub profile: String,
    pub titlehub: String,
    pub userstats: String,
    pub achievements: String,
    pub user_auth: String,
    pub xsts_auth: String,
    pub oauth_authorize: String,
    pub oauth_token: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            profile: "https://profile.xboxlive.com".to_string(),
            titlehub: "https://titlehub.xboxlive.com".to_string(),
            userstats: "https://userstats.xboxlive.com".to_string(),
            achievements: "https://achievements.xboxlive.com".to_string(),
            user_auth: "https://user.auth.xboxlive.com/user/authenticate".to_string(),
            xsts_auth: "https://xsts.auth.xboxlive.com/xsts/authorize".to_string(),
            oauth_authorize: "https://login.live.com/oauth20_authorize.srf".to_string(),
            oauth_token: "https://login.live.com/oauth20_token.srf".to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Points every service at a single base URL. Used against mock servers.
    pub fn single_host(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            profile: base.to_string(),
            titlehub: base.to_string(),
            userstats: base.to_string(),
            achievements: base.to_string(),
            user_auth: format!("{base}/user/authenticate"),
            xsts_auth: format!("{base}/xsts/authorize"),
            oauth_authorize: format!("{base}/oauth20_authorize.srf"),
            oauth_token: format!("{base}/oauth20_token.srf"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OAuthSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: String,
    pub callback_timeout_secs: u64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: "http://localhost:8080/auth/callback".to_string(),
            scopes: "Xboxlive.signin Xboxlive.offline_access".to_string(),
            callback_timeout_secs: 300,
        }
    }
}

/// Process-wide settings, resolved once by the binary and handed to services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub base_dir: PathBuf,
    pub tokens_file: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub endpoints: ApiEndpoints,
    pub oauth: OAuthSettings,
    pub http_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub batch_size: usize,
    pub batch_concurrency: usize,
    pub max_games: usize,
    pub achievements_page_size: u32,
    pub request_interval_ms: u64,
    pub rarest_subset_size: usize,
    pub accept_language: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let base_dir = default_base_dir();
        Self::with_base_dir(base_dir)
    }
}

impl AppConfig {
    /// Defaults rooted at `base_dir` (`tokens/`, `output/`, `logs/` beneath it).
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            tokens_file: base_dir.join("tokens").join("tokens.json"),
            output_dir: base_dir.join("output"),
            log_dir: base_dir.join("logs"),
            base_dir,
            endpoints: ApiEndpoints::default(),
            oauth: OAuthSettings::default(),
            http_timeout_secs: DEFAULT_TIMEOUT_SECS,
            image_timeout_secs: 10,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            max_games: DEFAULT_MAX_GAMES,
            achievements_page_size: DEFAULT_ACHIEVEMENTS_PAGE_SIZE,
            request_interval_ms: DEFAULT_REQUEST_INTERVAL_MS,
            rarest_subset_size: DEFAULT_RAREST_SUBSET_SIZE,
            accept_language: "pt-BR".to_string(),
        }
    }

    /// Defaults, then the YAML file (explicit path or `XBOX_REVIEW_CONFIG`), then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let env_path = std::env::var(ENV_CONFIG_FILE).ok().map(PathBuf::from);
        let file = path.map(Path::to_path_buf).or(env_path);

        let mut config = match file {
            Some(file) => Self::from_yaml_file(&file)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::config(format!("cannot read config file {}: {err}", path.display()))
        })?;
        let config = Self::from_yaml_str(&raw)?;
        debug!(target: "app::config", path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Parses YAML. Path fields left out of the file follow `base_dir`.
    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(raw)?;
        let base_dir = value
            .get("base_dir")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(default_base_dir);

        let mut defaults = serde_yaml::to_value(Self::with_base_dir(base_dir))?;
        merge_yaml(&mut defaults, value);
        Ok(serde_yaml::from_value(defaults)?)
    }

    /// Applies environment overrides through `lookup` so tests need not touch the
    /// real process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(ENV_BASE_DIR).filter(|v| !v.trim().is_empty()) {
            let rebased = Self::with_base_dir(base.trim());
            self.tokens_file = rebased.tokens_file;
            self.output_dir = rebased.output_dir;
            self.log_dir = rebased.log_dir;
            self.base_dir = rebased.base_dir;
        }
        if let Some(output) = lookup(ENV_OUTPUT_DIR).filter(|v| !v.trim().is_empty()) {
            self.output_dir = PathBuf::from(output.trim());
        }
        if let Some(id) = lookup(ENV_CLIENT_ID).filter(|v| !v.trim().is_empty()) {
            self.oauth.client_id = Some(id.trim().to_string());
        }
        if let Some(secret) = lookup(ENV_CLIENT_SECRET).filter(|v| !v.trim().is_empty()) {
            self.oauth.client_secret = Some(secret.trim().to_string());
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.batch_size == 0 {
            return Err(AppError::config("batch_size must be greater than zero"));
        }
        if self.batch_concurrency == 0 {
            return Err(AppError::config("batch_concurrency must be greater than zero"));
        }
        if self.http_timeout_secs == 0 {
            return Err(AppError::config("http_timeout_secs must be greater than zero"));
        }
        if self.rarest_subset_size == 0 {
            return Err(AppError::config("rarest_subset_size must be greater than zero"));
        }
        Ok(())
    }

    pub fn ensure_dirs(&self) -> AppResult<()> {
        if let Some(parent) = self.tokens_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }
}

fn default_base_dir() -> PathBuf {
    let container = Path::new("/app");
    if container.exists() {
        container.to_path_buf()
    } else {
        PathBuf::from(".")
    }
}

fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
