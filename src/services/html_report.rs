//! Single-page lifetime review (pt-BR). Rendering is a pure function of the
//! snapshot and the render date.

use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::models::snapshot::Snapshot;
use crate::models::xbox::{Achievement, Game};
use crate::services::snapshot_store::sanitize_gamertag;
use crate::utils::dates::{is_month_key, parse_iso_date};
use crate::utils::format::{escape_html, format_hours, format_number, truncate_chars};

const TOP_GAMES: usize = 10;
const TOP_RARE_ACHIEVEMENTS: usize = 10;
const MAX_COMPLETED_GAMES: usize = 20;
const DESCRIPTION_CHARS: usize = 60;
const MIN_RARITY: f64 = 0.01;
const MAX_RARITY: f64 = 50.0;

pub struct HtmlReport<'a> {
    snapshot: &'a Snapshot,
    rendered_on: NaiveDate,
}

impl<'a> HtmlReport<'a> {
    pub fn new(snapshot: &'a Snapshot, rendered_on: NaiveDate) -> Self {
        Self {
            snapshot,
            rendered_on,
        }
    }

    pub fn gamertag(&self) -> &str {
        self.snapshot.gamertag()
    }

    /// First game in library order, i.e. the most played one.
    pub fn top_game(&self) -> Option<&'a Game> {
        self.snapshot.games.first()
    }

    pub fn top_games(&self) -> Vec<&'a Game> {
        let mut games: Vec<&Game> = self.snapshot.games.iter().collect();
        games.sort_by(|a, b| b.hours_played.total_cmp(&a.hours_played));
        games.truncate(TOP_GAMES);
        games
    }

    /// Unlocked achievements with `0.01 <= rarity < 50`, rarest first.
    pub fn rarest_achievements(&self) -> Vec<&'a Achievement> {
        let mut rare: Vec<&Achievement> = self
            .snapshot
            .achievements_detailed
            .iter()
            .filter(|a| a.is_unlocked())
            .filter(|a| (MIN_RARITY..MAX_RARITY).contains(&a.rarity_percent))
            .collect();
        rare.sort_by(|a, b| a.rarity_percent.total_cmp(&b.rarity_percent));
        rare.truncate(TOP_RARE_ACHIEVEMENTS);
        rare
    }

    /// 100% games, most recently played first.
    pub fn completed_games(&self) -> Vec<&'a Game> {
        let mut done: Vec<&Game> = self
            .snapshot
            .games
            .iter()
            .filter(|g| g.is_completed())
            .collect();
        done.sort_by(|a, b| {
            let a = a.last_played.as_deref().unwrap_or("");
            let b = b.last_played.as_deref().unwrap_or("");
            b.cmp(a)
        });
        done.truncate(MAX_COMPLETED_GAMES);
        done
    }

    /// Month labels (`Jan/24`) and counts, oldest first.
    pub fn chart_data(&self) -> (Vec<String>, Vec<i64>) {
        self.snapshot
            .achievements_by_month
            .iter()
            .filter(|(key, _)| is_month_key(key))
            .map(|(key, count)| (month_label(key), *count))
            .unzip()
    }

    fn summary(&self) -> String {
        let stats = &self.snapshot.statistics;
        format!(
            "{} - {}h jogadas, {} jogos, {} conquistas",
            self.gamertag(),
            format_hours(stats.total_hours),
            stats.total_games,
            format_number(stats.total_achievements)
        )
    }

    pub fn render(&self) -> String {
        let gamertag = escape_html(self.gamertag());
        let summary = escape_html(&self.summary());
        let svg_url = escape_html(&format!("share_{}.svg", sanitize_gamertag(self.gamertag())));
        let title = format!("Xbox Lifetime Review - {gamertag}");
        let hero_image = self
            .top_game()
            .map(|game| escape_html(&game.image))
            .unwrap_or_default();

        let mut html = String::with_capacity(32 * 1024);
        html.push_str("<!DOCTYPE html>\n<html lang=\"pt-BR\">\n<head>\n");
        html.push_str("<meta charset=\"UTF-8\">\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\n");
        let _ = writeln!(html, "<title>{title}</title>");
        let _ = writeln!(html, "<meta name=\"description\" content=\"{summary}\">");
        html.push_str("<meta property=\"og:type\" content=\"website\">\n");
        let _ = writeln!(html, "<meta property=\"og:title\" content=\"{title}\">");
        let _ = writeln!(html, "<meta property=\"og:description\" content=\"{summary}\">");
        let _ = writeln!(html, "<meta property=\"og:image\" content=\"{svg_url}\">");
        html.push_str("<meta name=\"twitter:card\" content=\"summary_large_image\">\n");
        let _ = writeln!(html, "<meta name=\"twitter:title\" content=\"{title}\">");
        let _ = writeln!(html, "<meta name=\"twitter:description\" content=\"{summary}\">");
        let _ = writeln!(html, "<meta name=\"twitter:image\" content=\"{svg_url}\">");
        html.push_str(FONTS_AND_CHARTS);
        html.push_str("<style>\n");
        html.push_str(STYLE);
        let _ = writeln!(
            html,
            ".hero-bg{{position:absolute;inset:0;background:url('{hero_image}') center/cover;filter:blur(15px) brightness(.5);transform:scale(1.15);z-index:1}}"
        );
        html.push_str("</style>\n</head>\n<body>\n");
        html.push_str(SHARE_BUTTON);

        self.write_hero(&mut html);
        self.write_top_games(&mut html);
        self.write_rare_achievements(&mut html);
        self.write_chart_section(&mut html);
        self.write_completed(&mut html);

        let _ = writeln!(
            html,
            "<footer class=\"footer\">{} - {gamertag}</footer>",
            self.rendered_on.format("%d/%m/%Y")
        );
        self.write_scripts(&mut html);
        html.push_str("</body>\n</html>\n");
        html
    }

    fn write_hero(&self, html: &mut String) {
        let profile = &self.snapshot.profile;
        let stats = &self.snapshot.statistics;

        html.push_str("<section class=\"hero\">\n<div class=\"hero-bg\"></div><div class=\"hero-ov\"></div>\n<div class=\"hero-c\">\n");
        let _ = writeln!(
            html,
            "<div class=\"profile\"><img src=\"{}\" class=\"avatar\" onerror=\"this.style.display='none'\"><h1 class=\"gt\">{}</h1></div>",
            escape_html(&profile.avatar_url),
            escape_html(self.gamertag())
        );
        html.push_str("<h2 class=\"title\">LIFETIME<br>REVIEW</h2>\n<div class=\"stats\">\n");
        write_stat(html, "⏱️", &format!("{}h", format_hours(stats.total_hours)), "Horas");
        write_stat(html, "🎮", &stats.total_games.to_string(), "Jogos");
        write_stat(
            html,
            "🏆",
            &format!("{}G", format_number(profile.gamerscore_value())),
            "Gamerscore",
        );
        write_stat(html, "🏅", &format_number(stats.total_achievements), "Conquistas");
        html.push_str("</div>\n");

        let (image, name, hours) = match self.top_game() {
            Some(game) => (
                escape_html(&game.image),
                escape_html(&game.name),
                format_hours(game.hours_played),
            ),
            None => (String::new(), "N/A".to_string(), format_hours(0.0)),
        };
        let _ = writeln!(
            html,
            "<div class=\"top-badge\"><img src=\"{image}\" onerror=\"this.style.display='none'\"><div><div style=\"font-size:.75rem;opacity:.8\">Mais jogado</div><div style=\"font-weight:700\">{name} - {hours}h</div></div></div>"
        );
        html.push_str("</div>\n</section>\n");
    }

    fn write_top_games(&self, html: &mut String) {
        html.push_str("<section class=\"section\"><h2 class=\"sec-title\">TOP 10 JOGOS</h2><div class=\"grid\">\n");
        for (index, game) in self.top_games().into_iter().enumerate() {
            let rank = index + 1;
            let class = match rank {
                1 => "gold",
                2 => "silver",
                3 => "bronze",
                _ => "",
            };
            let _ = writeln!(
                html,
                "<div class=\"game-card {class}\"><div class=\"rank\">{rank}</div>\
                 <img src=\"{}\" class=\"thumb\" onerror=\"this.style.display='none'\">\
                 <div class=\"info\"><div class=\"name\">{}</div>\
                 <div class=\"meta\"><span class=\"hours\">{}h</span><span class=\"tag\">{} ach</span></div>\
                 <div class=\"bar\"><div class=\"fill\" style=\"width:{}%\"></div></div></div></div>",
                escape_html(&game.image),
                escape_html(&game.name),
                format_hours(game.hours_played),
                game.achievements_unlocked,
                game.progress_percent.clamp(0.0, 100.0)
            );
        }
        html.push_str("</div></section>\n");
    }

    fn write_rare_achievements(&self, html: &mut String) {
        html.push_str("<section class=\"section\"><h2 class=\"sec-title\">TOP 10 CONQUISTAS RARAS</h2><div class=\"grid\">\n");
        for (index, achievement) in self.rarest_achievements().into_iter().enumerate() {
            let date = achievement
                .time_unlocked
                .as_deref()
                .and_then(parse_iso_date)
                .map(|dt| format!("<div class=\"date\">{}</div>", dt.format("%d/%m/%Y")))
                .unwrap_or_default();
            let _ = writeln!(
                html,
                "<div class=\"ach-card {}\"><div class=\"rank\">{}</div>\
                 <img src=\"{}\" class=\"icon\" onerror=\"this.style.display='none'\">\
                 <div class=\"info\"><div class=\"name\">{}</div><div class=\"game\">{}</div>\
                 <div class=\"desc\">{}</div>{date}</div>\
                 <div class=\"rarity\"><div class=\"pct\">{:.1}%</div><div class=\"gs\">{}G</div></div></div>",
                rarity_class(achievement.rarity_percent),
                index + 1,
                escape_html(&achievement.icon),
                escape_html(&achievement.name),
                escape_html(&achievement.game_name),
                escape_html(truncate_chars(&achievement.description, DESCRIPTION_CHARS)),
                achievement.rarity_percent,
                achievement.gamerscore
            );
        }
        html.push_str("</div></section>\n");
    }

    fn write_chart_section(&self, html: &mut String) {
        html.push_str(
            "<div class=\"chart-sec\"><h2 class=\"sec-title\" style=\"margin-bottom:30px\">CONQUISTAS POR MES</h2>\
             <div class=\"chart-box\"><canvas id=\"chart\"></canvas></div></div>\n",
        );
    }

    fn write_completed(&self, html: &mut String) {
        let _ = writeln!(
            html,
            "<section class=\"section\"><h2 class=\"sec-title\">JOGOS 100% ({})</h2><div class=\"done-grid\">",
            self.snapshot.statistics.completed_games
        );
        for game in self.completed_games() {
            let _ = writeln!(
                html,
                "<div class=\"done\"><img src=\"{}\" onerror=\"this.style.display='none'\">\
                 <div class=\"info\"><div class=\"name\">{}</div><div class=\"meta\">{}G - {}h</div></div>\
                 <div class=\"badge\">100%</div></div>",
                escape_html(&game.image),
                escape_html(&game.name),
                game.current_gamerscore,
                format_hours(game.hours_played)
            );
        }
        html.push_str("</div></section>\n");
    }

    fn write_scripts(&self, html: &mut String) {
        let (labels, values) = self.chart_data();
        let stats = &self.snapshot.statistics;
        let share_text = format!(
            "Xbox Lifetime Review - {}\n{}h jogadas, {} jogos, {} conquistas",
            self.gamertag(),
            format_hours(stats.total_hours),
            stats.total_games,
            format_number(stats.total_achievements)
        );

        html.push_str("<script>\n");
        let _ = writeln!(html, "const chartLabels={};", script_json(&labels));
        let _ = writeln!(html, "const chartValues={};", script_json(&values));
        let _ = writeln!(html, "const shareText={};", script_json(&share_text));
        html.push_str(SCRIPT);
        html.push_str("</script>\n");
    }
}

fn write_stat(html: &mut String, icon: &str, value: &str, label: &str) {
    let _ = writeln!(
        html,
        "<div class=\"stat\"><div class=\"stat-i\">{icon}</div><div class=\"stat-v\">{}</div><div class=\"stat-l\">{label}</div></div>",
        escape_html(value)
    );
}

pub fn rarity_class(rarity_percent: f64) -> &'static str {
    if rarity_percent < 5.0 {
        "legendary"
    } else if rarity_percent < 15.0 {
        "epic"
    } else if rarity_percent < 30.0 {
        "rare"
    } else {
        ""
    }
}

fn month_label(key: &str) -> String {
    NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d")
        .map(|date| date.format("%b/%y").to_string())
        .unwrap_or_else(|_| key.to_string())
}

/// JSON literal safe to inline inside a `<script>` element.
fn script_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
}

const FONTS_AND_CHARTS: &str = r#"<link href="https://fonts.googleapis.com/css2?family=Bebas+Neue&family=Space+Grotesk:wght@400;600;700&display=swap" rel="stylesheet">
<script src="https://cdn.jsdelivr.net/npm/chart.js"></script>
"#;

const SHARE_BUTTON: &str = r#"<button class="share-btn" onclick="shareReview()">
<svg viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2"><path d="M4 12v8a2 2 0 002 2h12a2 2 0 002-2v-8M16 6l-4-4-4 4M12 2v13"/></svg>
Compartilhar
</button>
"#;

const STYLE: &str = r#"*{margin:0;padding:0;box-sizing:border-box}
:root{--g:#107C10;--gl:#2ECC40;--gold:#FFD700;--silver:#C0C0C0;--bronze:#CD7F32;--leg:#ff8000;--epic:#a335ee;--rare:#0070dd;--bg:#0a0a0f;--card:#141420;--t1:#fff;--t2:#8a8a9a}
body{font-family:'Space Grotesk',sans-serif;background:var(--bg);color:var(--t1)}
.share-btn{position:fixed;top:20px;right:20px;z-index:1000;background:linear-gradient(135deg,var(--g),var(--gl));color:#fff;border:none;padding:12px 20px;border-radius:50px;font-family:'Space Grotesk',sans-serif;font-size:.9rem;font-weight:600;cursor:pointer;box-shadow:0 5px 20px rgba(16,124,16,.4);display:flex;align-items:center;gap:8px;transition:transform .2s,box-shadow .2s}
.share-btn:hover{transform:translateY(-2px);box-shadow:0 8px 30px rgba(16,124,16,.5)}
.share-btn svg{width:18px;height:18px}
.hero{position:relative;min-height:100vh;display:flex;align-items:center;justify-content:center;overflow:hidden}
.hero-ov{position:absolute;inset:0;background:linear-gradient(180deg,rgba(16,124,16,.25),rgba(10,30,15,.6) 40%,rgba(10,10,15,1));z-index:2}
.hero-c{position:relative;z-index:10;text-align:center;padding:40px;max-width:1000px}
.profile{display:flex;align-items:center;justify-content:center;gap:20px;margin-bottom:30px}
.avatar{width:100px;height:100px;border-radius:50%;border:3px solid var(--g);box-shadow:0 0 30px rgba(16,124,16,.5)}
.gt{font-family:'Bebas Neue',sans-serif;font-size:3rem;letter-spacing:2px}
.title{font-family:'Bebas Neue',sans-serif;font-size:7rem;line-height:.9;background:linear-gradient(180deg,#fff,#888);-webkit-background-clip:text;-webkit-text-fill-color:transparent;margin-bottom:50px}
.stats{display:grid;grid-template-columns:repeat(4,1fr);gap:20px;margin-bottom:50px}
.stat{background:rgba(255,255,255,.05);border:1px solid rgba(255,255,255,.1);border-radius:16px;padding:25px}
.stat-i{font-size:2rem;margin-bottom:10px}.stat-v{font-size:2.5rem;font-weight:700;color:var(--gl)}.stat-l{font-size:.85rem;color:var(--t2);text-transform:uppercase}
.top-badge{display:inline-flex;align-items:center;gap:15px;background:linear-gradient(135deg,var(--g),var(--gl));padding:15px 30px;border-radius:50px}
.top-badge img{width:50px;height:50px;border-radius:8px}
.section{padding:80px 40px;max-width:1200px;margin:0 auto}
.sec-title{font-family:'Bebas Neue',sans-serif;font-size:3rem;text-align:center;margin-bottom:50px;background:linear-gradient(90deg,var(--gl),var(--g));-webkit-background-clip:text;-webkit-text-fill-color:transparent}
.grid{display:flex;flex-direction:column;gap:15px}
.game-card,.ach-card{display:flex;align-items:center;gap:20px;background:var(--card);border-radius:12px;padding:15px 20px;border:1px solid rgba(255,255,255,.05);transition:transform .3s}
.game-card:hover,.ach-card:hover{transform:translateX(10px)}
.game-card.gold{border-left:4px solid var(--gold)}.game-card.silver{border-left:4px solid var(--silver)}.game-card.bronze{border-left:4px solid var(--bronze)}
.rank{font-family:'Bebas Neue',sans-serif;font-size:2.5rem;width:50px;text-align:center;color:var(--t2)}
.game-card.gold .rank{color:var(--gold)}.game-card.silver .rank{color:var(--silver)}.game-card.bronze .rank{color:var(--bronze)}
.thumb{width:80px;height:80px;object-fit:cover;border-radius:8px}
.info{flex:1}.name{font-size:1.2rem;font-weight:600;margin-bottom:5px}
.hours{font-size:1.5rem;font-weight:700;color:var(--gl)}
.meta{display:flex;align-items:center;gap:15px;margin-bottom:10px}
.tag{background:rgba(16,124,16,.3);color:var(--gl);padding:4px 10px;border-radius:20px;font-size:.85rem}
.bar{height:8px;background:rgba(255,255,255,.1);border-radius:4px;overflow:hidden}
.fill{height:100%;background:linear-gradient(90deg,var(--g),var(--gl));border-radius:4px}
.ach-card.legendary{border-left:4px solid var(--leg)}.ach-card.epic{border-left:4px solid var(--epic)}.ach-card.rare{border-left:4px solid var(--rare)}
.ach-card.legendary .rank,.ach-card.legendary .pct{color:var(--leg)}
.ach-card.epic .rank,.ach-card.epic .pct{color:var(--epic)}
.ach-card.rare .rank,.ach-card.rare .pct{color:var(--rare)}
.icon{width:60px;height:60px;border-radius:8px;object-fit:cover}
.game{font-size:.85rem;color:var(--gl)}.desc{font-size:.8rem;color:var(--t2)}.date{font-size:.75rem;color:var(--gl);margin-top:5px}
.rarity{text-align:right;min-width:80px}.pct{font-size:1.5rem;font-weight:700}.gs{font-size:.9rem;color:var(--gold);margin-top:5px}
.chart-sec{background:var(--card);border-radius:20px;padding:40px;margin:80px auto;max-width:1100px}
.chart-box{position:relative;height:350px}
.done-grid{display:grid;grid-template-columns:repeat(auto-fill,minmax(300px,1fr));gap:15px}
.done{display:flex;align-items:center;gap:12px;background:var(--card);border-radius:10px;padding:12px;border:1px solid var(--g)}
.done img{width:50px;height:50px;border-radius:6px;object-fit:cover}
.done .info{flex:1}.done .name{font-size:.95rem;font-weight:600}.done .meta{font-size:.8rem;color:var(--t2)}
.badge{font-weight:700;color:var(--gl);background:rgba(16,124,16,.2);padding:5px 10px;border-radius:6px}
.footer{text-align:center;padding:40px;color:var(--t2);font-size:.85rem}
@media(max-width:768px){.title{font-size:4rem}.stats{grid-template-columns:repeat(2,1fr)}.section{padding:60px 20px}.share-btn{bottom:20px;right:20px;padding:12px 20px}}
"#;

const SCRIPT: &str = r#"const ctx=document.getElementById('chart').getContext('2d');
const grd=ctx.createLinearGradient(0,0,0,350);grd.addColorStop(0,'rgba(46,204,64,.5)');grd.addColorStop(1,'rgba(46,204,64,0)');
new Chart(ctx,{type:'line',data:{labels:chartLabels,datasets:[{data:chartValues,borderColor:'#2ECC40',backgroundColor:grd,fill:true,tension:.4,pointRadius:4}]},options:{responsive:true,maintainAspectRatio:false,plugins:{legend:{display:false}},scales:{x:{grid:{color:'rgba(255,255,255,.05)'},ticks:{color:'#8a8a9a'}},y:{beginAtZero:true,grid:{color:'rgba(255,255,255,.05)'},ticks:{color:'#8a8a9a'}}}}});
function shareReview(){
  const url=window.location.href;
  if(navigator.share){
    navigator.share({title:'Xbox Lifetime Review',text:shareText,url:url}).catch(()=>{});
  }else{
    window.open('https://twitter.com/intent/tweet?text='+encodeURIComponent(shareText)+'&hashtags=Xbox,LifetimeReview','_blank');
  }
}
"#;
