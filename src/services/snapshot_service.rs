use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::settings::{AppConfig, DEFAULT_RAREST_SUBSET_SIZE};
use crate::models::snapshot::{Snapshot, SnapshotOutcome, Statistics, TargetUser, YearRollup};
use crate::models::xbox::{Achievement, Game, Profile, XboxCredentials};
use crate::services::snapshot_store::SnapshotStore;
use crate::services::xbox_api::{XboxApiClient, XboxDataSource, XuidLookup};
use crate::utils::dates::{month_key, year_from_date};
use crate::utils::format::round_one_decimal;
use crate::utils::pacing::RequestPacer;

/// Single-use accumulator for one snapshot run. Steps must be called in order:
/// profile, games, achievements, then `build`.
pub struct SnapshotBuilder<'a> {
    source: &'a dyn XboxDataSource,
    xuid: String,
    pacer: RequestPacer,
    rarest_subset_size: usize,
    profile: Profile,
    games: Vec<Game>,
    achievements: Vec<Achievement>,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(source: &'a dyn XboxDataSource, xuid: impl Into<String>, pacer: RequestPacer) -> Self {
        Self {
            source,
            xuid: xuid.into(),
            pacer,
            rarest_subset_size: DEFAULT_RAREST_SUBSET_SIZE,
            profile: Profile::default(),
            games: Vec::new(),
            achievements: Vec::new(),
        }
    }

    pub fn with_rarest_subset_size(mut self, size: usize) -> Self {
        self.rarest_subset_size = size;
        self
    }

    pub fn xuid(&self) -> &str {
        &self.xuid
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn achievements(&self) -> &[Achievement] {
        &self.achievements
    }

    /// Informational only; an empty profile does not stop the run.
    pub async fn fetch_profile(&mut self) -> &Profile {
        self.profile = self.source.get_profile(Some(self.xuid.as_str())).await;
        if self.profile.is_empty() {
            warn!(target: "app::snapshot", xuid = %self.xuid, "profile unavailable, continuing");
        } else {
            info!(
                target: "app::snapshot",
                gamertag = %self.profile.gamertag,
                gamerscore = %self.profile.gamerscore,
                "profile loaded"
            );
        }
        &self.profile
    }

    /// Library plus playtime, ordered by hours played (most first).
    pub async fn fetch_games(&mut self) -> &[Game] {
        let mut games = self.source.get_games(&self.xuid).await;
        info!(target: "app::snapshot", count = games.len(), "library loaded");

        let title_ids: Vec<String> = games.iter().map(|game| game.id.clone()).collect();
        let playtime = self.source.get_playtime(&self.xuid, &title_ids).await;
        for game in &mut games {
            game.hours_played = playtime.get(&game.id).copied().unwrap_or(0.0);
        }
        sort_by_hours_desc(&mut games);

        self.games = games;
        &self.games
    }

    /// Unlocked achievements of the first `max_games` games. Games without any
    /// unlocked achievement are never queried.
    pub async fn fetch_achievements(&mut self, max_games: usize) -> &[Achievement] {
        let total = self.games.len().min(max_games);
        let mut collected = Vec::new();

        for (index, game) in self.games.iter().take(max_games).enumerate() {
            if game.achievements_unlocked <= 0 {
                debug!(target: "app::snapshot", game = %game.name, "no unlocked achievements, skipping");
                continue;
            }

            self.pacer.ready().await;
            info!(
                target: "app::snapshot",
                current = index + 1,
                total,
                game = %game.name,
                "fetching achievements"
            );

            let mut fetched = self.source.get_achievements(&self.xuid, &game.id).await;
            for achievement in &mut fetched {
                achievement.game_name = game.name.clone();
                achievement.game_image = game.image.clone();
            }
            collected.extend(fetched);
        }

        sort_by_rarity(&mut collected);
        info!(target: "app::snapshot", count = collected.len(), "achievements collected");
        self.achievements = collected;
        &self.achievements
    }

    pub fn build(self, created_at: NaiveDateTime) -> Snapshot {
        let statistics = compute_statistics(&self.games);
        let by_year = compute_by_year(&self.games);
        let achievements_by_month = compute_by_month(&self.achievements);
        let rarest_achievements = self
            .achievements
            .iter()
            .take(self.rarest_subset_size)
            .cloned()
            .collect();

        Snapshot {
            snapshot_date: created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            profile: self.profile,
            statistics,
            by_year,
            achievements_by_month,
            games: self.games,
            achievements_detailed: self.achievements,
            rarest_achievements,
        }
    }
}

pub fn sort_by_hours_desc(games: &mut [Game]) {
    games.sort_by(|a, b| b.hours_played.total_cmp(&a.hours_played));
}

/// Rarest first; equal rarities keep their collection order.
pub fn sort_by_rarity(achievements: &mut [Achievement]) {
    achievements.sort_by(|a, b| a.rarity_percent.total_cmp(&b.rarity_percent));
}

pub fn compute_statistics(games: &[Game]) -> Statistics {
    Statistics {
        total_games: games.len() as i64,
        total_hours: round_one_decimal(games.iter().map(|game| game.hours_played).sum()),
        total_achievements: games.iter().map(|game| game.achievements_unlocked).sum(),
        total_gamerscore_earned: games.iter().map(|game| game.current_gamerscore).sum(),
        completed_games: games.iter().filter(|game| game.is_completed()).count() as i64,
    }
}

/// Rollup keyed by the year a game was last played. Games never played have no
/// bucket.
pub fn compute_by_year(games: &[Game]) -> BTreeMap<String, YearRollup> {
    let mut by_year: BTreeMap<String, YearRollup> = BTreeMap::new();
    for game in games {
        let Some(year) = game.last_played.as_deref().and_then(year_from_date) else {
            continue;
        };
        let rollup = by_year.entry(year).or_default();
        rollup.games += 1;
        rollup.hours += game.hours_played;
        rollup.achievements += game.achievements_unlocked;
        rollup.gamerscore += game.current_gamerscore;
        if game.is_completed() {
            rollup.completed += 1;
        }
    }
    for rollup in by_year.values_mut() {
        rollup.hours = round_one_decimal(rollup.hours);
    }
    by_year
}

pub fn compute_by_month(achievements: &[Achievement]) -> BTreeMap<String, i64> {
    let mut by_month = BTreeMap::new();
    for key in achievements
        .iter()
        .filter_map(|achievement| achievement.time_unlocked.as_deref().and_then(month_key))
    {
        *by_month.entry(key).or_insert(0) += 1;
    }
    by_month
}

/// Explicit XUID, then gamertag lookup, then the credential owner.
pub async fn resolve_target(
    source: &dyn XboxDataSource,
    credentials: &XboxCredentials,
    target: &TargetUser,
) -> XuidLookup {
    match target {
        TargetUser::Own => XuidLookup::Found(credentials.xuid.clone()),
        TargetUser::Xuid(xuid) => XuidLookup::Found(xuid.clone()),
        TargetUser::Gamertag(gamertag) => {
            info!(target: "app::snapshot", %gamertag, "resolving gamertag");
            source.resolve_xuid(gamertag).await
        }
    }
}

/// Runs the full pipeline and persists the result.
pub struct SnapshotService {
    source: Arc<dyn XboxDataSource>,
    credentials: XboxCredentials,
    store: SnapshotStore,
    request_interval: Duration,
    rarest_subset_size: usize,
}

impl SnapshotService {
    pub fn new(
        source: Arc<dyn XboxDataSource>,
        credentials: XboxCredentials,
        config: &AppConfig,
    ) -> Self {
        Self {
            source,
            credentials,
            store: SnapshotStore::new(&config.output_dir),
            request_interval: config.request_interval(),
            rarest_subset_size: config.rarest_subset_size,
        }
    }

    /// Loads the stored credentials and wires up the HTTP client.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let credentials = XboxCredentials::load(&config.tokens_file)?;
        let client = XboxApiClient::new(config, credentials.clone())?;
        Ok(Self::new(Arc::new(client), credentials, config))
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn target_label(&self, target: &TargetUser) -> String {
        match target {
            TargetUser::Gamertag(gamertag) => gamertag.clone(),
            TargetUser::Xuid(xuid) => xuid.clone(),
            TargetUser::Own => self.credentials.xuid.clone(),
        }
    }

    pub async fn create_snapshot(
        &self,
        target: &TargetUser,
        max_games: usize,
    ) -> AppResult<SnapshotOutcome> {
        let xuid = match resolve_target(self.source.as_ref(), &self.credentials, target).await {
            XuidLookup::Found(xuid) => xuid,
            XuidLookup::NotFound => {
                let gamertag = self.target_label(target);
                warn!(target: "app::snapshot", %gamertag, "gamertag not found");
                return Ok(SnapshotOutcome::UserNotFound { gamertag });
            }
            XuidLookup::Unavailable => {
                let gamertag = self.target_label(target);
                warn!(target: "app::snapshot", %gamertag, "gamertag lookup unavailable");
                return Ok(SnapshotOutcome::LookupUnavailable { gamertag });
            }
        };

        info!(target: "app::snapshot", %xuid, max_games, "creating snapshot");
        let mut builder = SnapshotBuilder::new(
            self.source.as_ref(),
            xuid,
            RequestPacer::new(self.request_interval),
        )
        .with_rarest_subset_size(self.rarest_subset_size);

        builder.fetch_profile().await;
        builder.fetch_games().await;
        builder.fetch_achievements(max_games).await;

        let taken_at = Local::now().naive_local();
        let snapshot = builder.build(taken_at);
        let files = self.store.save(&snapshot, snapshot.gamertag(), taken_at)?;

        info!(
            target: "app::snapshot",
            gamertag = snapshot.gamertag(),
            games = snapshot.statistics.total_games,
            hours = snapshot.statistics.total_hours,
            achievements = snapshot.achievements_detailed.len(),
            "snapshot created"
        );
        Ok(SnapshotOutcome::Created {
            snapshot: Box::new(snapshot),
            files,
        })
    }
}
