use std::collections::HashMap;
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::settings::{ApiEndpoints, AppConfig};
use crate::models::xbox::{is_unlock_time, Achievement, Game, Profile, XboxCredentials};
use crate::utils::format::round_one_decimal;

const PROFILE_SETTINGS: &str = "GameDisplayPicRaw,Gamerscore,Gamertag,AccountTier";
const STAT_MINUTES_PLAYED: &str = "MinutesPlayed";

/// Read-side contract the snapshot pipeline is written against. Every method is
/// total: remote failures come back as empty or default values.
#[async_trait]
pub trait XboxDataSource: Send + Sync {
    /// Profile of `xuid`, or of the credential owner when `None`.
    async fn get_profile(&self, xuid: Option<&str>) -> Profile;

    /// XUID behind a gamertag. A missing player and an unreachable profile
    /// service are reported apart.
    async fn resolve_xuid(&self, gamertag: &str) -> XuidLookup;

    /// Every title of type `Game` in the player's history.
    async fn get_games(&self, xuid: &str) -> Vec<Game>;

    /// Hours played per title id. Titles whose batch failed are absent.
    async fn get_playtime(&self, xuid: &str, title_ids: &[String]) -> HashMap<String, f64>;

    /// Unlocked achievements of one title.
    async fn get_achievements(&self, xuid: &str, title_id: &str) -> Vec<Achievement>;
}

/// Outcome of a gamertag lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XuidLookup {
    Found(String),
    NotFound,
    Unavailable,
}

/// Raw result of one call before it is reduced to data or no data.
enum Fetched {
    Body(JsonValue),
    Status(StatusCode),
    Failed,
}

/// The four remote services, each negotiating its own contract version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceGroup {
    Profile,
    TitleHub,
    UserStats,
    Achievements,
}

impl ResourceGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceGroup::Profile => "profile",
            ResourceGroup::TitleHub => "titlehub",
            ResourceGroup::UserStats => "userstats",
            ResourceGroup::Achievements => "achievements",
        }
    }

    pub fn contract_version(self) -> &'static str {
        match self {
            ResourceGroup::Profile => "2",
            ResourceGroup::TitleHub => "2",
            ResourceGroup::UserStats => "2",
            ResourceGroup::Achievements => "4",
        }
    }
}

/// reqwest-backed Xbox Live client.
#[derive(Clone)]
pub struct XboxApiClient {
    client: reqwest::Client,
    credentials: XboxCredentials,
    auth_header: String,
    endpoints: ApiEndpoints,
    accept_language: String,
    batch_size: usize,
    batch_concurrency: usize,
    achievements_page_size: u32,
}

impl XboxApiClient {
    pub fn new(config: &AppConfig, credentials: XboxCredentials) -> AppResult<Self> {
        let auth_header = credentials.auth_header();
        if reqwest::header::HeaderValue::from_str(&auth_header).is_err() {
            return Err(AppError::config(
                "credentials contain characters that cannot be sent in a header",
            ));
        }
        if config.batch_size == 0 {
            return Err(AppError::config("batch_size must be greater than zero"));
        }

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(config.http_timeout().min(StdDuration::from_secs(15)))
            .user_agent(concat!("xbox-lifetime-review/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|err| AppError::other(format!("cannot build Xbox HTTP client: {err}")))?;

        Ok(Self {
            client,
            credentials,
            auth_header,
            endpoints: config.endpoints.clone(),
            accept_language: config.accept_language.clone(),
            batch_size: config.batch_size,
            batch_concurrency: config.batch_concurrency.max(1),
            achievements_page_size: config.achievements_page_size,
        })
    }

    pub fn credentials(&self) -> &XboxCredentials {
        &self.credentials
    }

    fn request(&self, method: Method, group: ResourceGroup, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTHORIZATION, &self.auth_header)
            .header("x-xbl-contract-version", group.contract_version())
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, &self.accept_language)
    }

    /// Sends `request` and decodes a 200 body. Anything else is logged and
    /// reported as `None`.
    async fn execute(&self, group: ResourceGroup, request: RequestBuilder) -> Option<JsonValue> {
        match self.send(group, request).await {
            Fetched::Body(body) => Some(body),
            Fetched::Status(_) | Fetched::Failed => None,
        }
    }

    async fn send(&self, group: ResourceGroup, request: RequestBuilder) -> Fetched {
        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    target: "app::xbox",
                    group = group.as_str(),
                    timeout = err.is_timeout(),
                    error = %err,
                    "request failed, treating as no data"
                );
                return Fetched::Failed;
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!(
                target: "app::xbox",
                group = group.as_str(),
                status = status.as_u16(),
                "non-success status, treating as no data"
            );
            return Fetched::Status(status);
        }

        match response.json::<JsonValue>().await {
            Ok(body) => {
                debug!(
                    target: "app::xbox",
                    group = group.as_str(),
                    latency_ms = started.elapsed().as_millis() as u64,
                    "response received"
                );
                Fetched::Body(body)
            }
            Err(err) => {
                warn!(
                    target: "app::xbox",
                    group = group.as_str(),
                    error = %err,
                    "undecodable response body"
                );
                Fetched::Failed
            }
        }
    }

    async fn get_json(&self, group: ResourceGroup, url: &str) -> Option<JsonValue> {
        self.execute(group, self.request(Method::GET, group, url))
            .await
    }

    async fn fetch_playtime_chunk(
        &self,
        xuid: &str,
        index: usize,
        chunk: &[String],
    ) -> Option<HashMap<String, f64>> {
        let payload = BatchStatsRequest::minutes_played(xuid, chunk);
        let url = format!("{}/batch", self.endpoints.userstats);
        let request = self
            .request(Method::POST, ResourceGroup::UserStats, &url)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload);

        match self.execute(ResourceGroup::UserStats, request).await {
            Some(body) => Some(parse_playtime(&body)),
            None => {
                warn!(
                    target: "app::xbox",
                    batch = index,
                    titles = chunk.len(),
                    "playtime batch skipped"
                );
                None
            }
        }
    }
}

#[async_trait]
impl XboxDataSource for XboxApiClient {
    async fn get_profile(&self, xuid: Option<&str>) -> Profile {
        let xuid = xuid.unwrap_or(&self.credentials.xuid);
        let url = format!(
            "{}/users/xuid({})/profile/settings?settings={}",
            self.endpoints.profile, xuid, PROFILE_SETTINGS
        );

        match self.get_json(ResourceGroup::Profile, &url).await {
            Some(body) => parse_profile(&body, xuid),
            None => Profile::default(),
        }
    }

    async fn resolve_xuid(&self, gamertag: &str) -> XuidLookup {
        let url = format!(
            "{}/users/gt({})/profile/settings",
            self.endpoints.profile,
            urlencoding::encode(gamertag)
        );
        let request = self.request(Method::GET, ResourceGroup::Profile, &url);

        match self.send(ResourceGroup::Profile, request).await {
            Fetched::Body(body) => parse_xuid_lookup(&body),
            Fetched::Status(status) if status == StatusCode::NOT_FOUND => XuidLookup::NotFound,
            Fetched::Status(_) | Fetched::Failed => XuidLookup::Unavailable,
        }
    }

    async fn get_games(&self, xuid: &str) -> Vec<Game> {
        let url = format!(
            "{}/users/xuid({})/titles/titlehistory/decoration/achievement,image,scid",
            self.endpoints.titlehub, xuid
        );

        match self.get_json(ResourceGroup::TitleHub, &url).await {
            Some(body) => parse_games(&body),
            None => Vec::new(),
        }
    }

    async fn get_playtime(&self, xuid: &str, title_ids: &[String]) -> HashMap<String, f64> {
        if title_ids.is_empty() {
            return HashMap::new();
        }

        let chunks: Vec<Vec<String>> = title_ids
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        let total_batches = chunks.len();

        // `buffered` yields in submission order, so the merge is deterministic.
        let results: Vec<Option<HashMap<String, f64>>> = stream::iter(chunks.into_iter().enumerate())
            .map(|(index, chunk)| async move {
                self.fetch_playtime_chunk(xuid, index, &chunk).await
            })
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let mut playtime = HashMap::new();
        let mut failed = 0usize;
        for result in results {
            match result {
                Some(partial) => playtime.extend(partial),
                None => failed += 1,
            }
        }

        debug!(
            target: "app::xbox",
            titles = title_ids.len(),
            batches = total_batches,
            failed_batches = failed,
            resolved = playtime.len(),
            "playtime lookup finished"
        );
        playtime
    }

    async fn get_achievements(&self, xuid: &str, title_id: &str) -> Vec<Achievement> {
        let url = format!(
            "{}/users/xuid({})/achievements?titleId={}&maxItems={}",
            self.endpoints.achievements, xuid, title_id, self.achievements_page_size
        );

        match self.get_json(ResourceGroup::Achievements, &url).await {
            Some(body) => parse_achievements(&body, title_id),
            None => Vec::new(),
        }
    }
}

// --- Request bodies ---

#[derive(Debug, Serialize)]
struct BatchStatsRequest<'a> {
    arrangebyfield: &'static str,
    stats: Vec<StatRequest<'a>>,
    xuids: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct StatRequest<'a> {
    name: &'static str,
    titleid: &'a str,
}

impl<'a> BatchStatsRequest<'a> {
    fn minutes_played(xuid: &'a str, title_ids: &'a [String]) -> Self {
        Self {
            arrangebyfield: "xuid",
            stats: title_ids
                .iter()
                .map(|id| StatRequest {
                    name: STAT_MINUTES_PLAYED,
                    titleid: id.as_str(),
                })
                .collect(),
            xuids: vec![xuid],
        }
    }
}

// --- Response shapes ---

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProfileResponse {
    profile_users: Vec<ProfileUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileUser {
    id: Option<JsonValue>,
    settings: Vec<ProfileSetting>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileSetting {
    id: String,
    value: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TitleHistoryResponse {
    titles: Vec<TitleEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TitleEntry {
    title_id: Option<JsonValue>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    achievement: Option<TitleAchievement>,
    title_history: Option<TitleHistory>,
    display_image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TitleAchievement {
    current_achievements: Option<i64>,
    current_gamerscore: Option<i64>,
    total_gamerscore: Option<i64>,
    progress_percentage: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TitleHistory {
    last_time_played: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatsResponse {
    statlistscollection: Vec<StatList>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatList {
    stats: Vec<StatEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatEntry {
    name: Option<String>,
    titleid: Option<JsonValue>,
    value: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AchievementsResponse {
    achievements: Vec<AchievementEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AchievementEntry {
    id: Option<JsonValue>,
    name: Option<String>,
    description: Option<String>,
    progression: Option<Progression>,
    rarity: Option<Rarity>,
    rewards: Option<Vec<Reward>>,
    media_assets: Option<Vec<MediaAsset>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Progression {
    time_unlocked: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Rarity {
    current_percentage: Option<f64>,
    current_category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Reward {
    value: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaAsset {
    url: Option<String>,
}

// --- Normalisation ---

fn json_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_to_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_profile(body: &JsonValue, xuid: &str) -> Profile {
    let Ok(response) = serde_json::from_value::<ProfileResponse>(body.clone()) else {
        warn!(target: "app::xbox", "unexpected profile payload");
        return Profile::default();
    };
    let Some(user) = response.profile_users.into_iter().next() else {
        return Profile::default();
    };

    let settings: HashMap<String, String> = user
        .settings
        .into_iter()
        .filter_map(|setting| {
            let value = setting.value.as_ref().and_then(json_to_string)?;
            Some((setting.id, value))
        })
        .collect();
    let setting = |key: &str, default: &str| {
        settings
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    };

    Profile {
        xuid: xuid.to_string(),
        gamertag: setting("Gamertag", ""),
        gamerscore: setting("Gamerscore", "0"),
        avatar_url: setting("GameDisplayPicRaw", ""),
    }
}

/// A well-formed answer without a usable id means the gamertag is unknown.
fn parse_xuid_lookup(body: &JsonValue) -> XuidLookup {
    let Ok(response) = serde_json::from_value::<ProfileResponse>(body.clone()) else {
        warn!(target: "app::xbox", "unexpected gamertag lookup payload");
        return XuidLookup::Unavailable;
    };
    response
        .profile_users
        .into_iter()
        .next()
        .and_then(|user| user.id)
        .and_then(|id| json_to_string(&id))
        .filter(|id| !id.is_empty())
        .map_or(XuidLookup::NotFound, XuidLookup::Found)
}

fn parse_games(body: &JsonValue) -> Vec<Game> {
    let Ok(response) = serde_json::from_value::<TitleHistoryResponse>(body.clone()) else {
        warn!(target: "app::xbox", "unexpected title history payload");
        return Vec::new();
    };

    response
        .titles
        .into_iter()
        .filter(|title| title.kind.as_deref() == Some("Game"))
        .map(|title| {
            let achievement = title.achievement.unwrap_or_default();
            Game {
                id: title
                    .title_id
                    .as_ref()
                    .and_then(json_to_string)
                    .unwrap_or_default(),
                name: title.name.unwrap_or_else(|| "Unknown".to_string()),
                last_played: title.title_history.and_then(|history| history.last_time_played),
                current_gamerscore: achievement.current_gamerscore.unwrap_or(0),
                max_gamerscore: achievement.total_gamerscore.unwrap_or(0),
                achievements_unlocked: achievement.current_achievements.unwrap_or(0),
                progress_percent: achievement.progress_percentage.unwrap_or(0.0),
                image: title.display_image.unwrap_or_default(),
                hours_played: 0.0,
            }
        })
        .collect()
}

fn parse_playtime(body: &JsonValue) -> HashMap<String, f64> {
    let Ok(response) = serde_json::from_value::<StatsResponse>(body.clone()) else {
        warn!(target: "app::xbox", "unexpected stats payload");
        return HashMap::new();
    };

    response
        .statlistscollection
        .into_iter()
        .flat_map(|list| list.stats)
        .filter(|stat| stat.name.as_deref() == Some(STAT_MINUTES_PLAYED))
        .filter_map(|stat| {
            let title_id = stat.titleid.as_ref().and_then(json_to_string)?;
            if title_id.is_empty() {
                return None;
            }
            let minutes = stat.value.as_ref().and_then(json_to_f64).unwrap_or(0.0);
            Some((title_id, round_one_decimal(minutes.trunc() / 60.0)))
        })
        .collect()
}

/// Normalises an achievements listing, keeping only achievements with a real
/// unlock time. This is the single place locked achievements are dropped.
fn parse_achievements(body: &JsonValue, title_id: &str) -> Vec<Achievement> {
    let Ok(response) = serde_json::from_value::<AchievementsResponse>(body.clone()) else {
        warn!(target: "app::xbox", title_id, "unexpected achievements payload");
        return Vec::new();
    };

    response
        .achievements
        .into_iter()
        .filter_map(|entry| {
            let unlocked = entry.progression.and_then(|p| p.time_unlocked);
            if !is_unlock_time(unlocked.as_deref()) {
                return None;
            }
            let rarity = entry.rarity.unwrap_or_default();
            let gamerscore = entry
                .rewards
                .as_ref()
                .and_then(|rewards| rewards.first())
                .and_then(|reward| reward.value.as_ref())
                .and_then(json_to_f64)
                .map(|value| value as i64)
                .unwrap_or(0);
            let icon = entry
                .media_assets
                .and_then(|assets| assets.into_iter().next())
                .and_then(|asset| asset.url)
                .unwrap_or_default();

            Some(Achievement {
                id: entry.id.as_ref().and_then(json_to_string).unwrap_or_default(),
                name: entry.name.unwrap_or_default(),
                description: entry.description.unwrap_or_default(),
                gamerscore,
                time_unlocked: unlocked,
                rarity_percent: rarity.current_percentage.unwrap_or(100.0),
                rarity_category: rarity
                    .current_category
                    .unwrap_or_else(|| "Common".to_string()),
                title_id: title_id.to_string(),
                icon,
                game_name: String::new(),
                game_image: String::new(),
            })
        })
        .collect()
}
