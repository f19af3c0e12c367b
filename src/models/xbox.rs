use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};

/// Unlock time the platform reports for achievements that were never earned.
pub const NEVER_UNLOCKED: &str = "0001-01-01T00:00:00Z";

/// The token triple every data API call is authorised with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XboxCredentials {
    pub user_hash: String,
    pub xsts_token: String,
    pub xuid: String,
}

impl XboxCredentials {
    pub fn new(
        user_hash: impl Into<String>,
        xsts_token: impl Into<String>,
        xuid: impl Into<String>,
    ) -> Self {
        Self {
            user_hash: user_hash.into(),
            xsts_token: xsts_token.into(),
            xuid: xuid.into(),
        }
    }

    /// Reads the triple out of a token document. Any missing or empty field is a
    /// configuration error.
    pub fn from_tokens(tokens: &JsonValue) -> AppResult<Self> {
        let field = |name: &str| -> AppResult<String> {
            tokens
                .get(name)
                .and_then(|value| match value {
                    JsonValue::String(s) => Some(s.trim().to_string()),
                    JsonValue::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|value| !value.is_empty())
                .ok_or_else(|| AppError::config(format!("tokens file is missing field `{name}`")))
        };

        Ok(Self {
            user_hash: field("user_hash")?,
            xsts_token: field("xsts_token")?,
            xuid: field("xuid")?,
        })
    }

    pub fn load(path: &std::path::Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::config(format!(
                "tokens not found at {}; run `lifetime-review authenticate` first",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path)?;
        let tokens: JsonValue = serde_json::from_str(&raw)
            .map_err(|err| AppError::config(format!("tokens file is not valid JSON: {err}")))?;
        Self::from_tokens(&tokens)
    }

    pub fn auth_header(&self) -> String {
        format!("XBL3.0 x={};{}", self.user_hash, self.xsts_token)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Everything the handshake persists to the tokens file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredTokens {
    pub oauth: OAuthTokens,
    pub user_token: String,
    pub xsts_token: String,
    pub user_hash: String,
    pub xuid: String,
    pub gamertag: String,
}

impl StoredTokens {
    pub fn credentials(&self) -> XboxCredentials {
        XboxCredentials::new(&self.user_hash, &self.xsts_token, &self.xuid)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Profile {
    pub xuid: String,
    pub gamertag: String,
    /// Kept as the platform's string so snapshots round-trip unchanged.
    pub gamerscore: String,
    pub avatar_url: String,
}

impl Profile {
    pub fn is_empty(&self) -> bool {
        self.xuid.is_empty() && self.gamertag.is_empty()
    }

    pub fn gamerscore_value(&self) -> i64 {
        self.gamerscore.trim().parse().unwrap_or(0)
    }

    pub fn display_name(&self) -> &str {
        if self.gamertag.is_empty() {
            "Unknown"
        } else {
            &self.gamertag
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Game {
    pub id: String,
    pub name: String,
    pub last_played: Option<String>,
    pub current_gamerscore: i64,
    pub max_gamerscore: i64,
    pub achievements_unlocked: i64,
    pub progress_percent: f64,
    pub image: String,
    pub hours_played: f64,
}

impl Game {
    pub fn is_completed(&self) -> bool {
        self.progress_percent >= 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub gamerscore: i64,
    pub time_unlocked: Option<String>,
    pub rarity_percent: f64,
    pub rarity_category: String,
    pub title_id: String,
    pub icon: String,
    pub game_name: String,
    pub game_image: String,
}

impl Default for Achievement {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: String::new(),
            gamerscore: 0,
            time_unlocked: None,
            rarity_percent: 100.0,
            rarity_category: "Common".to_string(),
            title_id: String::new(),
            icon: String::new(),
            game_name: String::new(),
            game_image: String::new(),
        }
    }
}

impl Achievement {
    pub fn is_unlocked(&self) -> bool {
        is_unlock_time(self.time_unlocked.as_deref())
    }
}

/// True when `value` is a real unlock time: present, non-empty and not the
/// platform's never-unlocked sentinel.
pub fn is_unlock_time(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        Some(time) => !time.is_empty() && time != NEVER_UNLOCKED,
        None => false,
    }
}
