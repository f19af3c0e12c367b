use std::fs;
use std::path::PathBuf;

use chrono::Local;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::settings::AppConfig;
use crate::models::snapshot::Snapshot;
use crate::services::html_report::HtmlReport;
use crate::services::snapshot_store::{sanitize_gamertag, SnapshotStore};
use crate::services::svg_report::{fetch_share_images, SvgReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    pub html: PathBuf,
    pub svg: PathBuf,
}

/// Turns a stored snapshot into the HTML page and the SVG share card.
pub struct ReportService {
    store: SnapshotStore,
    image_client: reqwest::Client,
}

impl ReportService {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let image_client = reqwest::Client::builder()
            .timeout(config.image_timeout())
            .user_agent(concat!("xbox-lifetime-review/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AppError::other(format!("cannot build image HTTP client: {err}")))?;

        Ok(Self {
            store: SnapshotStore::new(&config.output_dir),
            image_client,
        })
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn generate(&self, snapshot_name: &str) -> AppResult<ReportFiles> {
        let path = self.store.resolve(snapshot_name)?;
        let snapshot = self.store.load(&path)?;
        info!(target: "app::report", path = %path.display(), gamertag = snapshot.gamertag(), "rendering report");
        self.render(&snapshot).await
    }

    pub async fn render(&self, snapshot: &Snapshot) -> AppResult<ReportFiles> {
        fs::create_dir_all(self.store.output_dir())?;
        let gamertag = sanitize_gamertag(snapshot.gamertag());

        let html = HtmlReport::new(snapshot, Local::now().date_naive()).render();
        let html_path = self
            .store
            .output_dir()
            .join(format!("lifetime_review_{gamertag}.html"));
        fs::write(&html_path, html)?;

        let images = fetch_share_images(&self.image_client, snapshot).await;
        let svg = SvgReport::new(snapshot, &images).render();
        let svg_path = self.store.output_dir().join(format!("share_{gamertag}.svg"));
        fs::write(&svg_path, svg)?;

        info!(
            target: "app::report",
            html = %html_path.display(),
            svg = %svg_path.display(),
            images = images.len(),
            "report written"
        );
        Ok(ReportFiles {
            html: html_path,
            svg: svg_path,
        })
    }
}
