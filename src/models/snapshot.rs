use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::xbox::{Achievement, Game, Profile};

/// Who a snapshot is taken for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetUser {
    /// The owner of the stored credentials.
    #[default]
    Own,
    Xuid(String),
    Gamertag(String),
}

impl TargetUser {
    /// An all-digit argument is a XUID, anything else a gamertag.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim).filter(|value| !value.is_empty()) {
            None => TargetUser::Own,
            Some(value) if value.chars().all(|c| c.is_ascii_digit()) => {
                TargetUser::Xuid(value.to_string())
            }
            Some(value) => TargetUser::Gamertag(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Statistics {
    pub total_games: i64,
    pub total_hours: f64,
    pub total_achievements: i64,
    pub total_gamerscore_earned: i64,
    pub completed_games: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct YearRollup {
    pub games: i64,
    pub hours: f64,
    pub achievements: i64,
    pub gamerscore: i64,
    pub completed: i64,
}

/// Point-in-time aggregate of one player's library. Built once, then only read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Snapshot {
    pub snapshot_date: String,
    pub profile: Profile,
    pub statistics: Statistics,
    pub by_year: BTreeMap<String, YearRollup>,
    pub achievements_by_month: BTreeMap<String, i64>,
    pub games: Vec<Game>,
    pub achievements_detailed: Vec<Achievement>,
    pub rarest_achievements: Vec<Achievement>,
}

impl Snapshot {
    pub fn gamertag(&self) -> &str {
        self.profile.display_name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFiles {
    pub timestamped: PathBuf,
    pub latest: PathBuf,
}

/// Result of a snapshot run. A gamertag that does not resolve is a normal
/// outcome, not an error.
#[derive(Debug)]
pub enum SnapshotOutcome {
    Created {
        snapshot: Box<Snapshot>,
        files: SnapshotFiles,
    },
    UserNotFound {
        gamertag: String,
    },
    /// The profile service could not answer the gamertag lookup.
    LookupUnavailable {
        gamertag: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_user_parse() {
        assert_eq!(TargetUser::parse(None), TargetUser::Own);
        assert_eq!(TargetUser::parse(Some("  ")), TargetUser::Own);
        assert_eq!(
            TargetUser::parse(Some("2533274800000000")),
            TargetUser::Xuid("2533274800000000".into())
        );
        assert_eq!(
            TargetUser::parse(Some("Major Nelson")),
            TargetUser::Gamertag("Major Nelson".into())
        );
        assert_eq!(
            TargetUser::parse(Some("Player1")),
            TargetUser::Gamertag("Player1".into())
        );
    }

    #[test]
    fn snapshot_serializes_every_section() {
        let snapshot = Snapshot {
            snapshot_date: "2024-07-01T12:00:00".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        for key in [
            "snapshot_date",
            "profile",
            "statistics",
            "by_year",
            "achievements_by_month",
            "games",
            "achievements_detailed",
            "rarest_achievements",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn snapshot_tolerates_missing_sections() {
        let snapshot: Snapshot =
            serde_json::from_value(json!({"profile": {"gamertag": "Solo"}})).unwrap();
        assert_eq!(snapshot.gamertag(), "Solo");
        assert!(snapshot.games.is_empty());
        assert_eq!(snapshot.statistics.total_games, 0);
    }
}
