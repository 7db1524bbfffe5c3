// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::FeedSpec;

const ENV_PATH: &str = "CURATOR_FEEDS_PATH";

/// Load feeds from an explicit path. Supports TOML (`[[feeds]]`) or a JSON array.
pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feeds from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feeds(&content, ext.as_str())
}

/// Load feeds using env var + fallbacks:
/// 1) $CURATOR_FEEDS_PATH
/// 2) config/feeds.toml
/// 3) config/feeds.json
pub fn load_feeds_default() -> Result<Vec<FeedSpec>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_feeds_from(&pb);
        } else {
            return Err(anyhow!("CURATOR_FEEDS_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/feeds.toml");
    if toml_p.exists() {
        return load_feeds_from(&toml_p);
    }
    let json_p = PathBuf::from("config/feeds.json");
    if json_p.exists() {
        return load_feeds_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_feeds(s: &str, hint_ext: &str) -> Result<Vec<FeedSpec>> {
    let try_toml = hint_ext == "toml" || s.contains("[[feeds]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported feeds format"))
}

fn parse_toml(s: &str) -> Result<Vec<FeedSpec>> {
    #[derive(Deserialize)]
    struct TomlFeeds {
        #[serde(default)]
        feeds: Vec<FeedSpec>,
    }
    let v: TomlFeeds = toml::from_str(s)?;
    Ok(clean_feeds(v.feeds))
}

fn parse_json(s: &str) -> Result<Vec<FeedSpec>> {
    let v: Vec<FeedSpec> = serde_json::from_str(s)?;
    Ok(clean_feeds(v))
}

/// Trim fields, drop disabled or url-less entries, dedup by id (last wins).
fn clean_feeds(items: Vec<FeedSpec>) -> Vec<FeedSpec> {
    let mut by_id = BTreeMap::new();
    for mut f in items {
        f.id = f.id.trim().to_string();
        f.url = f.url.trim().to_string();
        f.category = f.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        f.company = f.company.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        if !f.enabled || f.url.is_empty() {
            continue;
        }
        if f.id.is_empty() {
            f.id = f.url.clone();
        }
        by_id.insert(f.id.clone(), f);
    }
    by_id.into_values().collect()
}

// ------------------------------------------------------------
// Remote feed directory: GET {base}/news/rss
// ------------------------------------------------------------

#[derive(Deserialize)]
struct RemoteFeed {
    #[serde(default)]
    mq_seq: Option<serde_json::Value>,
    mq_rss: String,
    #[serde(default)]
    mq_company: Option<String>,
    #[serde(default)]
    mq_category: Option<String>,
}

#[derive(Deserialize)]
struct RemoteFeedList {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<RemoteFeed>,
}

/// Fetch the active feed list from the news backend. The backend only
/// returns active feeds, so every entry is enabled.
pub async fn fetch_remote_feeds(client: &reqwest::Client, base_url: &str) -> Result<Vec<FeedSpec>> {
    let url = format!("{}/news/rss", base_url.trim_end_matches('/'));
    let body: RemoteFeedList = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("GET {url}"))?
        .json()
        .await
        .context("decoding feed list")?;
    if !body.success {
        return Err(anyhow!("feed list request returned success=false"));
    }
    let feeds = body
        .data
        .into_iter()
        .map(|r| {
            let id = match &r.mq_seq {
                Some(serde_json::Value::String(s)) => format!("feed-{s}"),
                Some(serde_json::Value::Number(n)) => format!("feed-{n}"),
                _ => r.mq_rss.clone(),
            };
            FeedSpec {
                id,
                url: r.mq_rss,
                category: r.mq_category,
                company: r.mq_company,
                enabled: true,
            }
        })
        .collect();
    Ok(clean_feeds(feeds))
}
