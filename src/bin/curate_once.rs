//! One-shot curation pass: ingest every configured feed, run the pipeline,
//! print the cycle report as JSON.
//!
//! Usage:
//!   curate_once                 # feeds from config/feeds.toml (or remote list)
//!   curate_once <rss-file>      # a local RSS document instead of the feeds

use anyhow::Context;

use news_curator::config::{AiConfig, CuratorConfig};
use news_curator::ingest::config::load_feeds_default;
use news_curator::ingest::providers::RssProvider;
use news_curator::ingest::types::{FeedSpec, SourceProvider};
use news_curator::runtime::CuratorRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    news_curator::init_tracing();

    let cfg = CuratorConfig::load_default().context("loading curator config")?;
    let ai = AiConfig::load_default().context("loading ai config")?;

    let fixture = std::env::args().nth(1);
    let feeds = if fixture.is_some() {
        Vec::new()
    } else {
        load_feeds_default().context("loading feeds")?
    };

    let mut runtime = CuratorRuntime::build(cfg, &ai, feeds).await?;
    if let Some(path) = fixture {
        let xml = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
        let feed = FeedSpec {
            id: "local".into(),
            url: path.clone(),
            category: None,
            company: None,
            enabled: true,
        };
        let providers: Vec<Box<dyn SourceProvider>> =
            vec![Box::new(RssProvider::from_fixture(feed, &xml))];
        runtime = runtime.with_providers(providers);
    }

    let report = runtime.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.batch.failed > 0 {
        std::process::exit(2);
    }
    Ok(())
}
