// tests/dedup_store.rs
//
// Dedup store contract: idempotent mark, durability across reopen, and a
// single winner for concurrent check-and-mark on the same fingerprint.

use std::sync::Arc;

use news_curator::article::Fingerprint;
use news_curator::dedup::{DedupStore, FileDedupStore, MemoryDedupStore};

#[tokio::test]
async fn file_store_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let fp = Fingerprint::derive("Rate cut expected", "https://news.example.com/1");

    {
        let store = FileDedupStore::open(tmp.path()).unwrap();
        assert!(!store.seen(&fp).await.unwrap());
        store.mark(&fp).await.unwrap();
        store.mark(&fp).await.unwrap();
        assert!(store.seen(&fp).await.unwrap());
    }

    let reopened = FileDedupStore::open(tmp.path()).unwrap();
    assert!(reopened.seen(&fp).await.unwrap());
    assert!(!reopened.check_and_mark(&fp).await.unwrap());
}

#[tokio::test]
async fn equivalent_titles_share_a_marker() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileDedupStore::open(tmp.path()).unwrap();
    let a = Fingerprint::derive("Rate  Cut Expected", "https://news.example.com/1/");
    let b = Fingerprint::derive("rate cut expected ", "https://news.example.com/1");
    assert!(store.check_and_mark(&a).await.unwrap());
    assert!(!store.check_and_mark(&b).await.unwrap());
}

async fn single_winner(store: Arc<dyn DedupStore>) {
    let fp = Fingerprint::derive("Concurrent", "https://news.example.com/c");
    let mut handles = Vec::new();
    for _ in 0..16 {
        let s = store.clone();
        let fp = fp.clone();
        handles.push(tokio::spawn(async move { s.check_and_mark(&fp).await.unwrap() }));
    }
    let mut winners = 0;
    for h in handles {
        if h.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one run may pass dedup");
    assert!(store.seen(&fp).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_check_and_mark_memory() {
    single_winner(Arc::new(MemoryDedupStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_check_and_mark_file() {
    let tmp = tempfile::tempdir().unwrap();
    single_winner(Arc::new(FileDedupStore::open(tmp.path()).unwrap())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_handles_on_one_directory_agree() {
    // Stands in for two processes sharing the data dir.
    let tmp = tempfile::tempdir().unwrap();
    let a = FileDedupStore::open(tmp.path()).unwrap();
    let b = FileDedupStore::open(tmp.path()).unwrap();
    let fp = Fingerprint::derive("Shared", "https://news.example.com/s");

    let (ra, rb) = tokio::join!(a.check_and_mark(&fp), b.check_and_mark(&fp));
    assert!(ra.unwrap() ^ rb.unwrap());
}
