use httpmock::prelude::*;
use lifetime_review::models::settings::{ApiEndpoints, AppConfig};
use lifetime_review::models::snapshot::{Snapshot, SnapshotOutcome, TargetUser};
use lifetime_review::models::xbox::StoredTokens;
use lifetime_review::services::snapshot_service::SnapshotService;
use serde_json::{json, Value as JsonValue};
use tempfile::TempDir;

const OWN_XUID: &str = "2533274800000001";

struct Harness {
    _dir: TempDir,
    config: AppConfig,
}

impl Harness {
    fn new(server: &MockServer) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::with_base_dir(dir.path());
        config.endpoints = ApiEndpoints::single_host(&server.base_url());
        config.request_interval_ms = 0;
        config.ensure_dirs().unwrap();

        let tokens = StoredTokens {
            user_hash: "hash".into(),
            xsts_token: "xsts".into(),
            xuid: OWN_XUID.into(),
            gamertag: "MockPlayer".into(),
            ..Default::default()
        };
        std::fs::write(&config.tokens_file, serde_json::to_vec(&tokens).unwrap()).unwrap();

        Self { _dir: dir, config }
    }

    fn output_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.config.output_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn title(id: &str, name: &str, unlocked: i64, progress: i64, last_played: &str) -> JsonValue {
    json!({
        "titleId": id,
        "name": name,
        "type": "Game",
        "displayImage": format!("http://img/{id}"),
        "titleHistory": {"lastTimePlayed": last_played},
        "achievement": {
            "currentAchievements": unlocked,
            "currentGamerscore": unlocked * 10,
            "totalGamerscore": 1000,
            "progressPercentage": progress
        }
    })
}

fn unlocked(id: &str, rarity: f64, at: &str) -> JsonValue {
    json!({
        "id": id,
        "name": format!("Achievement {id}"),
        "description": "",
        "progression": {"timeUnlocked": at},
        "rarity": {"currentPercentage": rarity, "currentCategory": "Rare"},
        "rewards": [{"value": "10"}]
    })
}

async fn mount_library(server: &MockServer, xuid: &str) {
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/users/xuid({xuid})/profile/settings"));
            then.status(200).json_body(json!({
                "profileUsers": [{
                    "id": xuid,
                    "settings": [
                        {"id": "Gamertag", "value": "MockPlayer"},
                        {"id": "Gamerscore", "value": "150"}
                    ]
                }]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!(
                "/users/xuid({xuid})/titles/titlehistory/decoration/achievement,image,scid"
            ));
            then.status(200).json_body(json!({
                "titles": [
                    title("1", "Game1", 5, 50, "2023-05-01T10:00:00Z"),
                    title("2", "Game2", 0, 0, "2023-06-01T10:00:00Z"),
                    title("3", "Game3", 10, 100, "2024-01-02T10:00:00Z"),
                    {"titleId": "4", "name": "Media App", "type": "App"}
                ]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/batch");
            then.status(200).json_body(json!({
                "statlistscollection": [{
                    "stats": [
                        {"name": "MinutesPlayed", "titleid": "1", "value": "630"},
                        {"name": "MinutesPlayed", "titleid": "2", "value": "0"},
                        {"name": "MinutesPlayed", "titleid": "3", "value": "1500"}
                    ]
                }]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/users/xuid({xuid})/achievements"))
                .query_param("titleId", "1");
            then.status(200).json_body(json!({
                "achievements": [
                    unlocked("1a", 12.0, "2023-05-01T10:00:00Z"),
                    {"id": "1z", "name": "Locked", "progression": {"timeUnlocked": "0001-01-01T00:00:00Z"}}
                ]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/users/xuid({xuid})/achievements"))
                .query_param("titleId", "3");
            then.status(200).json_body(json!({
                "achievements": [
                    unlocked("3a", 1.5, "2024-01-02T10:00:00Z"),
                    unlocked("3b", 40.0, "2024-01-03T10:00:00Z")
                ]
            }));
        })
        .await;
}

#[tokio::test]
async fn own_snapshot_end_to_end() {
    let server = MockServer::start_async().await;
    mount_library(&server, OWN_XUID).await;
    let skipped = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/users/xuid({OWN_XUID})/achievements"))
                .query_param("titleId", "2");
            then.status(200).json_body(json!({"achievements": []}));
        })
        .await;

    let harness = Harness::new(&server);
    let service = SnapshotService::from_config(&harness.config).unwrap();
    let outcome = service.create_snapshot(&TargetUser::Own, 100).await.unwrap();

    let SnapshotOutcome::Created { snapshot, files } = outcome else {
        panic!("expected a created snapshot");
    };
    skipped.assert_hits_async(0).await;

    let order: Vec<&str> = snapshot.games.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(order, vec!["3", "1", "2"]);
    assert_eq!(snapshot.games[0].hours_played, 25.0);
    assert_eq!(snapshot.games[1].hours_played, 10.5);

    let stats = &snapshot.statistics;
    assert_eq!(stats.total_games, 3);
    assert_eq!(stats.total_hours, 35.5);
    assert_eq!(stats.total_achievements, 15);
    assert_eq!(stats.total_gamerscore_earned, 150);
    assert_eq!(stats.completed_games, 1);

    let rarities: Vec<f64> = snapshot
        .achievements_detailed
        .iter()
        .map(|a| a.rarity_percent)
        .collect();
    assert_eq!(rarities, vec![1.5, 12.0, 40.0]);
    assert_eq!(snapshot.achievements_detailed[0].game_name, "Game3");
    assert!(snapshot.achievements_detailed.iter().all(|a| a.id != "1z"));

    assert_eq!(snapshot.by_year["2023"].games, 2);
    assert_eq!(snapshot.by_year["2024"].completed, 1);
    assert_eq!(snapshot.achievements_by_month["2024-01"], 2);
    assert_eq!(snapshot.achievements_by_month["2023-05"], 1);
    assert!(!snapshot.achievements_by_month.contains_key("0001-01"));

    let latest: Snapshot =
        serde_json::from_str(&std::fs::read_to_string(&files.latest).unwrap()).unwrap();
    assert_eq!(latest, *snapshot);
    assert_eq!(
        std::fs::read(&files.latest).unwrap(),
        std::fs::read(&files.timestamped).unwrap()
    );
    assert_eq!(harness.output_files().len(), 2);
}

#[tokio::test]
async fn max_games_caps_achievement_requests() {
    let server = MockServer::start_async().await;
    mount_library(&server, OWN_XUID).await;

    let harness = Harness::new(&server);
    let service = SnapshotService::from_config(&harness.config).unwrap();
    let outcome = service.create_snapshot(&TargetUser::Own, 1).await.unwrap();

    let SnapshotOutcome::Created { snapshot, .. } = outcome else {
        panic!("expected a created snapshot");
    };
    assert_eq!(snapshot.achievements_detailed.len(), 2);
    assert!(snapshot.statistics.total_achievements > snapshot.achievements_detailed.len() as i64);
}

#[tokio::test]
async fn gamertag_target_is_resolved_first() {
    let server = MockServer::start_async().await;
    let friend = "2533274800000777";
    let lookup = server
        .mock_async(|when, then| {
            when.method(GET).path("/users/gt(FriendlyGamer)/profile/settings");
            then.status(200)
                .json_body(json!({"profileUsers": [{"id": friend, "settings": []}]}));
        })
        .await;
    mount_library(&server, friend).await;

    let harness = Harness::new(&server);
    let service = SnapshotService::from_config(&harness.config).unwrap();
    let outcome = service
        .create_snapshot(&TargetUser::Gamertag("FriendlyGamer".into()), 100)
        .await
        .unwrap();

    lookup.assert_async().await;
    assert!(matches!(outcome, SnapshotOutcome::Created { .. }));
}

#[tokio::test]
async fn unknown_gamertag_writes_no_files() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/users/gt(NobodyHere)/profile/settings");
            then.status(404);
        })
        .await;
    let library = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/titles/titlehistory");
            then.status(200).json_body(json!({"titles": []}));
        })
        .await;

    let harness = Harness::new(&server);
    let service = SnapshotService::from_config(&harness.config).unwrap();
    let outcome = service
        .create_snapshot(&TargetUser::Gamertag("NobodyHere".into()), 100)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        SnapshotOutcome::UserNotFound { ref gamertag } if gamertag == "NobodyHere"
    ));
    library.assert_hits_async(0).await;
    assert!(harness.output_files().is_empty());
}

#[tokio::test]
async fn gamertag_lookup_outage_writes_no_files() {
    let server = MockServer::start_async().await;
    let lookup = server
        .mock_async(|when, then| {
            when.method(GET).path("/users/gt(RealPlayer)/profile/settings");
            then.status(503);
        })
        .await;
    let library = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/titles/titlehistory");
            then.status(200).json_body(json!({"titles": []}));
        })
        .await;

    let harness = Harness::new(&server);
    let service = SnapshotService::from_config(&harness.config).unwrap();
    let outcome = service
        .create_snapshot(&TargetUser::Gamertag("RealPlayer".into()), 100)
        .await
        .unwrap();

    lookup.assert_async().await;
    assert!(matches!(
        outcome,
        SnapshotOutcome::LookupUnavailable { ref gamertag } if gamertag == "RealPlayer"
    ));
    library.assert_hits_async(0).await;
    assert!(harness.output_files().is_empty());
}

#[tokio::test]
async fn unreachable_api_still_produces_a_zeroed_snapshot() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path_contains("/");
            then.status(503);
        })
        .await;

    let harness = Harness::new(&server);
    let service = SnapshotService::from_config(&harness.config).unwrap();
    let outcome = service.create_snapshot(&TargetUser::Own, 100).await.unwrap();

    let SnapshotOutcome::Created { snapshot, files } = outcome else {
        panic!("expected a created snapshot");
    };
    assert_eq!(snapshot.statistics.total_games, 0);
    assert!(snapshot.games.is_empty());
    assert!(files.latest.ends_with("achievements_snapshot_Unknown_latest.json"));
}

#[test]
fn missing_tokens_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::with_base_dir(dir.path());
    let err = SnapshotService::from_config(&config).err().unwrap();
    assert!(err.is_config());
}
