// tests/curate_cycle.rs
//
// Full cycle through the runtime: fixture feed → mock judgment → file stores.
// Serial: selects the mock backend through AI_TEST_MODE.

use std::env;

use serial_test::serial;

use news_curator::config::ai::ENV_AI_TEST_MODE;
use news_curator::config::{AiConfig, CuratorConfig};
use news_curator::history::RunHistory;
use news_curator::ingest::providers::RssProvider;
use news_curator::ingest::types::{FeedSpec, SourceProvider};
use news_curator::runtime::CuratorRuntime;

const NEWS_XML: &str = include_str!("fixtures/news_rss.xml");

fn providers() -> Vec<Box<dyn SourceProvider>> {
    let feed = FeedSpec {
        id: "fixture".into(),
        url: "file://fixture".into(),
        category: Some("economy".into()),
        company: None,
        enabled: true,
    };
    vec![Box::new(RssProvider::from_fixture(feed, NEWS_XML))]
}

#[tokio::test]
#[serial]
async fn cycle_stores_then_dedups_on_second_pass() {
    env::set_var(ENV_AI_TEST_MODE, "mock");
    let tmp = tempfile::tempdir().unwrap();

    let mut cfg = CuratorConfig::default();
    cfg.storage.data_dir = tmp.path().join("data");
    cfg.pipeline.max_age_hours = 876_000; // fixture dates are fixed
    cfg.pipeline.journal_path = Some(tmp.path().join("runs.jsonl"));
    let cfg = cfg.sanitized();

    let runtime = CuratorRuntime::build(cfg, &AiConfig::default(), Vec::new())
        .await
        .unwrap()
        .with_providers(providers());

    let first = runtime.run_cycle().await;
    assert_eq!(first.ingest.parsed, 4);
    assert_eq!(first.ingest.filtered, 1);
    assert_eq!(first.batch.stored, 3);
    assert_eq!(first.batch.failed, 0);

    let stored_files = std::fs::read_dir(tmp.path().join("data").join("articles"))
        .unwrap()
        .count();
    assert_eq!(stored_files, 3);

    let second = runtime.run_cycle().await;
    assert_eq!(second.batch.stored, 0);
    assert_eq!(second.batch.duplicates, 3);

    // Per stored article: the mark, three checkpoints and the archived record.
    // Duplicates are not journaled.
    let journal_path = tmp.path().join("runs.jsonl");
    let journal = std::fs::read_to_string(&journal_path).unwrap();
    assert_eq!(journal.lines().count(), 15);

    let reopened = RunHistory::with_journal(500, &journal_path).unwrap();
    assert!(reopened.resumable().is_empty());
    assert_eq!(reopened.len(), 3);
    let journal = std::fs::read_to_string(&journal_path).unwrap();
    assert_eq!(journal.lines().count(), 3, "reopen compacts to the archive");

    env::remove_var(ENV_AI_TEST_MODE);
}

#[tokio::test]
#[serial]
async fn disabled_ai_reports_failures_not_discards() {
    env::remove_var(ENV_AI_TEST_MODE);
    let tmp = tempfile::tempdir().unwrap();

    let mut cfg = CuratorConfig::default();
    cfg.storage.data_dir = tmp.path().join("data");
    cfg.pipeline.max_age_hours = 876_000;
    cfg.pipeline.run_attempts = 1;

    let runtime = CuratorRuntime::build(cfg, &AiConfig::default(), Vec::new())
        .await
        .unwrap()
        .with_providers(providers());

    let report = runtime.run_cycle().await;
    assert_eq!(report.batch.failed, 3);
    assert_eq!(report.batch.discarded, 0);
    assert_eq!(runtime.history().failed().len(), 3);
}
