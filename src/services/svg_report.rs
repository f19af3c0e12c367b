use std::collections::HashMap;
use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::models::snapshot::Snapshot;
use crate::models::xbox::Game;
use crate::utils::format::{escape_html, format_hours, format_number, truncate_chars};

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 600;
const GAME_NAME_CHARS: usize = 20;
const CARD_WIDTH: u32 = 155;
const CARD_GAP: u32 = 15;
const CARDS_X: u32 = 40;
const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";
const PANEL_FILL: &str = "rgba(45,60,45,0.65)";

/// Pre-fetched images for the share card, keyed by source URL.
#[derive(Debug, Clone, Default)]
pub struct ShareImages {
    data_uris: HashMap<String, String>,
}

impl ShareImages {
    pub fn insert(&mut self, url: impl Into<String>, data_uri: impl Into<String>) {
        self.data_uris.insert(url.into(), data_uri.into());
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        if url.is_empty() {
            return None;
        }
        self.data_uris.get(url).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data_uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_uris.is_empty()
    }
}

/// Downloads `url` and returns it as a `data:` URI. Failures yield `None`.
pub async fn fetch_image_data_uri(client: &reqwest::Client, url: &str) -> Option<String> {
    if url.trim().is_empty() {
        return None;
    }

    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(target: "app::report", %url, error = %err, "image download failed");
            return None;
        }
    };
    if !response.status().is_success() {
        warn!(target: "app::report", %url, status = response.status().as_u16(), "image download rejected");
        return None;
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_IMAGE_TYPE.to_string());

    match response.bytes().await {
        Ok(bytes) => Some(format!("data:{content_type};base64,{}", BASE64.encode(&bytes))),
        Err(err) => {
            warn!(target: "app::report", %url, error = %err, "image body unreadable");
            None
        }
    }
}

/// Fetches the background, avatar and top-3 game images concurrently.
pub async fn fetch_share_images(client: &reqwest::Client, snapshot: &Snapshot) -> ShareImages {
    let mut urls: Vec<&str> = Vec::new();
    if let Some(top) = snapshot.games.first() {
        urls.push(&top.image);
    }
    urls.push(&snapshot.profile.avatar_url);
    urls.extend(top_three(snapshot).into_iter().map(|game| game.image.as_str()));
    urls.retain(|url| !url.is_empty());
    urls.sort_unstable();
    urls.dedup();

    let fetched = join_all(
        urls.iter()
            .map(|url| async move { (*url, fetch_image_data_uri(client, url).await) }),
    )
    .await;

    let mut images = ShareImages::default();
    for (url, data_uri) in fetched {
        if let Some(data_uri) = data_uri {
            images.insert(url, data_uri);
        }
    }
    debug!(target: "app::report", requested = urls.len(), embedded = images.len(), "share images fetched");
    images
}

fn top_three(snapshot: &Snapshot) -> Vec<&Game> {
    let mut games: Vec<&Game> = snapshot.games.iter().collect();
    games.sort_by(|a, b| b.hours_played.total_cmp(&a.hours_played));
    games.truncate(3);
    games
}

/// 1200x600 social share card.
pub struct SvgReport<'a> {
    snapshot: &'a Snapshot,
    images: &'a ShareImages,
}

impl<'a> SvgReport<'a> {
    pub fn new(snapshot: &'a Snapshot, images: &'a ShareImages) -> Self {
        Self { snapshot, images }
    }

    pub fn top_games(&self) -> Vec<&'a Game> {
        top_three(self.snapshot)
    }

    pub fn render(&self) -> String {
        let snapshot = self.snapshot;
        let stats = &snapshot.statistics;
        let background = snapshot
            .games
            .first()
            .and_then(|game| self.images.get(&game.image));
        let avatar = self.images.get(&snapshot.profile.avatar_url);

        let mut svg = String::with_capacity(16 * 1024);
        let _ = writeln!(
            svg,
            "<svg width=\"{WIDTH}\" height=\"{HEIGHT}\" viewBox=\"0 0 {WIDTH} {HEIGHT}\" xmlns=\"http://www.w3.org/2000/svg\">"
        );
        svg.push_str(DEFS);
        let _ = writeln!(svg, "  <rect width=\"{WIDTH}\" height=\"{HEIGHT}\" fill=\"#050508\"/>");
        if let Some(uri) = background {
            let _ = writeln!(
                svg,
                "  <image x=\"-100\" y=\"-100\" width=\"1400\" height=\"800\" href=\"{}\" preserveAspectRatio=\"xMidYMid slice\" filter=\"url(#blur)\"/>",
                escape_html(uri)
            );
        }
        let _ = writeln!(svg, "  <rect width=\"{WIDTH}\" height=\"{HEIGHT}\" fill=\"url(#overlay)\"/>");

        svg.push_str("  <g transform=\"translate(40, 40)\">\n    <circle cx=\"35\" cy=\"35\" r=\"35\" fill=\"#107C10\"/>\n");
        if let Some(uri) = avatar {
            let _ = writeln!(
                svg,
                "    <image x=\"0\" y=\"0\" width=\"70\" height=\"70\" href=\"{}\" clip-path=\"url(#avatarClip)\"/>",
                escape_html(uri)
            );
        }
        let _ = writeln!(
            svg,
            "    <text x=\"90\" y=\"45\" fill=\"#fff\" font-size=\"28\" font-weight=\"700\" font-family=\"'Bebas Neue', sans-serif\" letter-spacing=\"3\">{}</text>\n  </g>",
            escape_html(&snapshot.gamertag().to_uppercase())
        );

        svg.push_str(TITLE);

        let cards = [
            ("⏱️", format!("{}h", format_hours(stats.total_hours)), "TOTAL DE HORAS"),
            ("🎮", stats.total_games.to_string(), "JOGOS JOGADOS"),
            (
                "🏆",
                format!("{}G", format_number(snapshot.profile.gamerscore_value())),
                "GAMERSCORE",
            ),
            ("🏅", format_number(stats.total_achievements), "CONQUISTAS"),
        ];
        svg.push_str("  <g>\n");
        for (index, (icon, value, label)) in cards.iter().enumerate() {
            write_stat_card(&mut svg, index as u32, icon, value, label);
        }
        svg.push_str("  </g>\n");

        self.write_top_games(&mut svg);
        svg.push_str("</svg>\n");
        svg
    }

    fn write_top_games(&self, svg: &mut String) {
        svg.push_str("  <text x=\"850\" y=\"170\" fill=\"#2ECC40\" font-size=\"22\" font-weight=\"700\" font-family=\"'Bebas Neue', sans-serif\" letter-spacing=\"2\">TOP 3 JOGOS</text>\n");
        for (index, game) in self.top_games().into_iter().enumerate() {
            let y = 200 + index as u32 * 85;
            let _ = writeln!(
                svg,
                "  <rect x=\"850\" y=\"{y}\" width=\"310\" height=\"70\" rx=\"12\" fill=\"{PANEL_FILL}\" stroke=\"rgba(255,255,255,0.1)\" stroke-width=\"1\"/>"
            );
            if let Some(uri) = self.images.get(&game.image) {
                let _ = writeln!(
                    svg,
                    "  <image x=\"862\" y=\"{}\" width=\"50\" height=\"50\" href=\"{}\"/>",
                    y + 10,
                    escape_html(uri)
                );
            }
            let _ = writeln!(
                svg,
                "  <text x=\"922\" y=\"{}\" fill=\"#fff\" font-size=\"14\" font-weight=\"600\" font-family=\"'Space Grotesk', sans-serif\">{}</text>",
                y + 32,
                escape_html(truncate_chars(&game.name, GAME_NAME_CHARS))
            );
            let _ = writeln!(
                svg,
                "  <text x=\"922\" y=\"{}\" fill=\"#2ECC40\" font-size=\"14\" font-weight=\"700\" font-family=\"'Space Grotesk', sans-serif\">{}h</text>",
                y + 52,
                format_hours(game.hours_played)
            );
        }
    }
}

fn write_stat_card(svg: &mut String, slot: u32, icon: &str, value: &str, label: &str) {
    let x = CARDS_X + slot * (CARD_WIDTH + CARD_GAP);
    let center = x + CARD_WIDTH / 2;
    let _ = writeln!(
        svg,
        "    <rect x=\"{x}\" y=\"380\" width=\"{CARD_WIDTH}\" height=\"130\" rx=\"16\" fill=\"{PANEL_FILL}\" stroke=\"rgba(255,255,255,0.1)\" stroke-width=\"1\"/>"
    );
    let _ = writeln!(
        svg,
        "    <text x=\"{center}\" y=\"420\" fill=\"#fff\" font-size=\"20\" text-anchor=\"middle\">{icon}</text>"
    );
    let _ = writeln!(
        svg,
        "    <text x=\"{center}\" y=\"460\" fill=\"#2ECC40\" font-size=\"32\" font-weight=\"700\" text-anchor=\"middle\">{}</text>",
        escape_html(value)
    );
    let _ = writeln!(
        svg,
        "    <text x=\"{center}\" y=\"490\" fill=\"#8a8a9a\" font-size=\"11\" text-anchor=\"middle\">{label}</text>"
    );
}

const DEFS: &str = r#"  <defs>
    <filter id="blur" x="-50%" y="-50%" width="200%" height="200%">
      <feGaussianBlur in="SourceGraphic" stdDeviation="30"/>
    </filter>
    <linearGradient id="overlay" x1="0%" y1="0%" x2="100%" y2="100%">
      <stop offset="0%" style="stop-color:rgba(16,124,16,0.25)"/>
      <stop offset="100%" style="stop-color:rgba(5,5,8,0.8)"/>
    </linearGradient>
    <linearGradient id="titleGrad" x1="0%" y1="0%" x2="0%" y2="100%">
      <stop offset="0%" style="stop-color:#ffffff"/>
      <stop offset="100%" style="stop-color:#888888"/>
    </linearGradient>
    <clipPath id="avatarClip">
      <circle cx="35" cy="35" r="35"/>
    </clipPath>
    <style>
      @import url('https://fonts.googleapis.com/css2?family=Bebas+Neue&amp;family=Space+Grotesk:wght@400;600;700&amp;display=swap');
    </style>
  </defs>
"#;

const TITLE: &str = r#"  <text x="40" y="200" fill="url(#titleGrad)" font-size="80" font-weight="700" font-family="'Bebas Neue', sans-serif">LIFETIME</text>
  <text x="40" y="280" fill="url(#titleGrad)" font-size="80" font-weight="700" font-family="'Bebas Neue', sans-serif">REVIEW</text>
"#;
