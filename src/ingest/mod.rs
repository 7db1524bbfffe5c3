// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::article::Article;
use crate::ingest::types::SourceProvider;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;

/// Markers for photo-only items. Such items carry no story to judge.
const PHOTO_MARKERS: [&str; 3] = ["포토", "[photo]", "[사진]"];

const BODY_CAP_CHARS: usize = 1500;

/// Normalize feed text: entity decode, tag strip, quote folding, whitespace collapse.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > BODY_CAP_CHARS {
        out = out.chars().take(BODY_CAP_CHARS).collect();
    }

    out
}

/// Photo-gallery items: a photo marker in the title, or no body at all.
pub fn is_photo_only(article: &Article) -> bool {
    let title = article.title.to_lowercase();
    PHOTO_MARKERS.iter().any(|m| title.contains(m)) || article.body.trim().is_empty()
}

/// Drop stale and photo-only items; newest first.
/// Returns (kept, filtered_count).
pub fn filter_articles(
    now: DateTime<Utc>,
    raw: Vec<Article>,
    max_age: chrono::Duration,
) -> (Vec<Article>, usize) {
    let mut filtered_out = 0usize;
    let mut kept = Vec::with_capacity(raw.len());
    for a in raw {
        let age = now.signed_duration_since(a.published_at);
        if age > max_age || is_photo_only(&a) {
            filtered_out += 1;
            continue;
        }
        kept.push(a);
    }
    kept.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    (kept, filtered_out)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    #[serde(skip)]
    pub kept: Vec<Article>,
    pub parsed: usize,
    pub filtered: usize,
    pub provider_errors: usize,
}

/// Run ingest once over the given providers. A failing provider is logged and
/// counted; the others still contribute.
pub async fn run_once(
    providers: &[Box<dyn SourceProvider>],
    max_age: chrono::Duration,
) -> IngestReport {
    crate::metrics::ensure_described();

    let mut raw = Vec::new();
    let mut provider_errors = 0usize;
    for p in providers {
        match p.fetch_latest().await {
            Ok(mut v) => raw.append(&mut v),
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, provider = p.name(), "provider error");
                counter!("ingest_provider_errors_total").increment(1);
                provider_errors += 1;
            }
        }
    }

    let now = Utc::now();
    let parsed = raw.len();
    let (kept, filtered) = filter_articles(now, raw, max_age);

    // Telemetry
    counter!("ingest_kept_total").increment(kept.len() as u64);
    counter!("ingest_filtered_total").increment(filtered as u64);
    gauge!("curator_last_run_ts").set(now.timestamp() as f64);

    tracing::info!(
        target: "ingest",
        providers = providers.len(),
        parsed,
        kept = kept.len(),
        filtered,
        provider_errors,
        "ingest pass finished"
    );

    IngestReport {
        kept,
        parsed,
        filtered,
        provider_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_collapses_ws() {
        let s = "  <p>Rate&nbsp;cut&nbsp;&nbsp; <b>expected</b></p>  ";
        assert_eq!(normalize_text(s), "Rate cut expected");
        assert_eq!(normalize_text("“quoted”"), "\"quoted\"");
    }

    #[test]
    fn photo_items_are_detected() {
        let now = Utc::now();
        assert!(is_photo_only(&Article::new("[포토] 시장 풍경", "본문", "f", now)));
        assert!(is_photo_only(&Article::new("Market view", "   ", "f", now)));
        assert!(!is_photo_only(&Article::new("금리 인하 전망", "본문", "f", now)));
    }

    #[test]
    fn filter_drops_stale_and_sorts_newest_first() {
        let now = Utc::now();
        let raw = vec![
            Article::new("old", "b", "f", now - chrono::Duration::hours(30)),
            Article::new("mid", "b", "f", now - chrono::Duration::hours(5)),
            Article::new("new", "b", "f", now - chrono::Duration::hours(1)),
        ];
        let (kept, filtered) = filter_articles(now, raw, chrono::Duration::hours(24));
        assert_eq!(filtered, 1);
        let titles: Vec<&str> = kept.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid"]);
    }
}
