use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::article::Article;
use crate::ingest::types::{FeedSpec, SourceProvider};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// RFC 2822 is what RSS 2.0 mandates; some Korean feeds emit RFC 3339 instead.
pub(crate) fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822) {
        return DateTime::from_timestamp(dt.unix_timestamp(), 0);
    }
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Generic RSS 2.0 provider for one configured feed.
pub struct RssProvider {
    feed: FeedSpec,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl RssProvider {
    /// Parse a fixed document instead of fetching `feed.url`.
    pub fn from_fixture(feed: FeedSpec, xml: &str) -> Self {
        Self {
            feed,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_feed(feed: FeedSpec, client: reqwest::Client) -> Self {
        Self {
            feed,
            mode: Mode::Http { client },
        }
    }

    pub fn feed(&self) -> &FeedSpec {
        &self.feed
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<Article>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)
            .with_context(|| format!("parsing rss xml for feed {}", self.feed.id))?;

        let fetched_at = Utc::now();
        let mut undated = 0u64;
        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = crate::ingest::normalize_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let Some(published_at) = it.pub_date.as_deref().and_then(parse_pub_date) else {
                undated += 1;
                continue;
            };
            let body = crate::ingest::normalize_text(it.description.as_deref().unwrap_or_default());

            let mut article = Article::new(title, body, self.feed.id.clone(), published_at)
                .with_fetched_at(fetched_at);
            if let Some(link) = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) {
                article = article.with_url(link);
            }
            if let Some(c) = &self.feed.category {
                article = article.with_category(c.clone());
            }
            if let Some(c) = &self.feed.company {
                article = article.with_company(c.clone());
            }
            out.push(article);
        }

        if undated > 0 {
            tracing::debug!(target: "ingest", feed = %self.feed.id, undated, "items without pubDate skipped");
            counter!("ingest_filtered_total").increment(undated);
        }
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_events_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for RssProvider {
    async fn fetch_latest(&self) -> Result<Vec<Article>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { client } => {
                let body = client
                    .get(&self.feed.url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .with_context(|| format!("rss http get {}", self.feed.url))?
                    .text()
                    .await
                    .context("rss http .text()")?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.feed.id
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&middot;", "·")
        .replace("&hellip;", "...")
}
