use chrono::NaiveDate;
use httpmock::prelude::*;
use lifetime_review::error::AppError;
use lifetime_review::models::settings::AppConfig;
use lifetime_review::models::snapshot::{Snapshot, Statistics};
use lifetime_review::models::xbox::{Achievement, Game, Profile};
use lifetime_review::services::report_service::ReportService;
use lifetime_review::services::snapshot_store::SnapshotStore;
use lifetime_review::services::svg_report::fetch_image_data_uri;

fn snapshot_with_images(base_url: &str) -> Snapshot {
    Snapshot {
        snapshot_date: "2024-07-01T12:00:00".into(),
        profile: Profile {
            xuid: "1".into(),
            gamertag: "MockPlayer".into(),
            gamerscore: "1500".into(),
            avatar_url: format!("{base_url}/avatar.png"),
        },
        statistics: Statistics {
            total_games: 2,
            total_hours: 35.5,
            total_achievements: 15,
            total_gamerscore_earned: 150,
            completed_games: 1,
        },
        games: vec![
            Game {
                id: "3".into(),
                name: "Game3".into(),
                hours_played: 25.0,
                progress_percent: 100.0,
                achievements_unlocked: 10,
                image: format!("{base_url}/missing.png"),
                last_played: Some("2024-01-02T10:00:00Z".into()),
                ..Default::default()
            },
            Game {
                id: "1".into(),
                name: "Game1".into(),
                hours_played: 10.5,
                progress_percent: 50.0,
                achievements_unlocked: 5,
                ..Default::default()
            },
        ],
        achievements_detailed: vec![Achievement {
            id: "3a".into(),
            name: "Legend".into(),
            time_unlocked: Some("2024-01-02T10:00:00Z".into()),
            rarity_percent: 1.5,
            game_name: "Game3".into(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[tokio::test]
async fn report_writes_html_and_svg_with_embedded_images() {
    let server = MockServer::start_async().await;
    let avatar = server
        .mock_async(|when, then| {
            when.method(GET).path("/avatar.png");
            then.status(200)
                .header("content-type", "image/png")
                .body(vec![0x89u8, b'P', b'N', b'G']);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing.png");
            then.status(404);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::with_base_dir(dir.path());
    let store = SnapshotStore::new(&config.output_dir);
    let taken_at = NaiveDate::from_ymd_opt(2024, 7, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    store
        .save(&snapshot_with_images(&server.base_url()), "MockPlayer", taken_at)
        .unwrap();

    let service = ReportService::new(&config).unwrap();
    let files = service
        .generate("achievements_snapshot_MockPlayer_latest")
        .await
        .unwrap();

    avatar.assert_async().await;
    assert!(files.html.ends_with("lifetime_review_MockPlayer.html"));
    assert!(files.svg.ends_with("share_MockPlayer.svg"));

    let html = std::fs::read_to_string(&files.html).unwrap();
    assert!(html.contains("35,5h"));
    assert!(html.contains("1.500G"));
    assert!(html.contains("Legend"));
    assert!(html.contains("share_MockPlayer.svg"));

    let svg = std::fs::read_to_string(&files.svg).unwrap();
    assert!(svg.contains("MOCKPLAYER"));
    assert!(svg.contains("data:image/png;base64,iVBORw=="));
    assert!(!svg.contains("missing.png"));
}

#[tokio::test]
async fn report_tolerates_a_partial_document() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::with_base_dir(dir.path());
    std::fs::create_dir_all(&config.output_dir).unwrap();
    std::fs::write(
        config.output_dir.join("partial.json"),
        r#"{"profile": {"gamertag": "Solo"}, "games": [{"name": "Only Game"}]}"#,
    )
    .unwrap();

    let service = ReportService::new(&config).unwrap();
    let files = service.generate("partial").await.unwrap();

    let html = std::fs::read_to_string(&files.html).unwrap();
    assert!(html.contains("Only Game"));
    assert!(html.contains("0,0h"));
    assert!(files.svg.exists());
}

#[tokio::test]
async fn report_for_unknown_snapshot_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::with_base_dir(dir.path());
    let service = ReportService::new(&config).unwrap();

    let err = service.generate("does-not-exist").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn image_data_uri_defaults_to_jpeg() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/plain");
            then.status(200).body("abc");
        })
        .await;

    let client = reqwest::Client::new();
    let uri = fetch_image_data_uri(&client, &server.url("/plain"))
        .await
        .unwrap();
    assert_eq!(uri, "data:image/jpeg;base64,YWJj");
}
