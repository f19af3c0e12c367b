use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::snapshot::{Snapshot, SnapshotFiles};

const FILE_PREFIX: &str = "achievements_snapshot_";

/// Reads and writes snapshot documents in the output directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    output_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn latest_path(&self, gamertag: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{FILE_PREFIX}{}_latest.json",
            sanitize_gamertag(gamertag)
        ))
    }

    pub fn timestamped_path(&self, gamertag: &str, taken_at: NaiveDateTime) -> PathBuf {
        self.output_dir.join(format!(
            "{FILE_PREFIX}{}_{}.json",
            sanitize_gamertag(gamertag),
            taken_at.format("%Y%m%d_%H%M%S")
        ))
    }

    /// Writes the historical copy and overwrites the `latest` copy. Both files
    /// hold the same bytes.
    pub fn save(
        &self,
        snapshot: &Snapshot,
        gamertag: &str,
        taken_at: NaiveDateTime,
    ) -> AppResult<SnapshotFiles> {
        fs::create_dir_all(&self.output_dir)?;
        let payload = serde_json::to_vec_pretty(snapshot)?;

        let files = SnapshotFiles {
            timestamped: self.timestamped_path(gamertag, taken_at),
            latest: self.latest_path(gamertag),
        };
        write_atomically(&files.timestamped, &payload)?;
        write_atomically(&files.latest, &payload)?;

        info!(
            target: "app::store",
            timestamped = %files.timestamped.display(),
            latest = %files.latest.display(),
            bytes = payload.len(),
            "snapshot saved"
        );
        Ok(files)
    }

    pub fn load(&self, path: &Path) -> AppResult<Snapshot> {
        if !path.is_file() {
            return Err(AppError::not_found(path));
        }
        let raw = fs::read_to_string(path)?;
        let snapshot = serde_json::from_str(&raw)?;
        debug!(target: "app::store", path = %path.display(), "snapshot loaded");
        Ok(snapshot)
    }

    /// An existing path wins; otherwise `name` and then `name.json` inside the
    /// output directory.
    pub fn resolve(&self, name: &str) -> AppResult<PathBuf> {
        let direct = PathBuf::from(name);
        if direct.is_file() {
            return Ok(direct);
        }

        let in_output = self.output_dir.join(name);
        if in_output.is_file() {
            return Ok(in_output);
        }

        let with_extension = self.output_dir.join(format!("{name}.json"));
        if with_extension.is_file() {
            return Ok(with_extension);
        }

        Err(AppError::not_found(in_output))
    }
}

/// Gamertag as it appears in file names: path separators and control characters
/// become `_`.
pub fn sanitize_gamertag(gamertag: &str) -> String {
    let cleaned: String = gamertag
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|ch| ch == '.') {
        "Unknown".to_string()
    } else {
        cleaned
    }
}

fn write_atomically(path: &Path, payload: &[u8]) -> AppResult<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, payload)?;
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    Ok(())
}
