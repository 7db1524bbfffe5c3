//! Run history: a bounded ring of archived records plus the set of records
//! that are still open (in flight or failed), optionally mirrored to a
//! JSON-lines journal so both survive restarts.
//!
//! A record is archived once it is stored, discarded or failed with its retry
//! budget spent. Open records live outside the ring, so eviction never drops
//! an article whose dedup mark is set but whose run has not resolved.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::article::Fingerprint;
use crate::pipeline::{ProcessingRecord, ProcessingState};

const MAX_CAP: usize = 10_000;

#[derive(Debug, Default)]
struct Inner {
    archive: VecDeque<ProcessingRecord>,
    open: HashMap<Fingerprint, ProcessingRecord>,
}

impl Inner {
    fn apply(&mut self, record: ProcessingRecord, cap: usize) {
        match record.state {
            ProcessingState::Stored | ProcessingState::Discarded => {
                self.open.remove(&record.fingerprint);
            }
            _ => {
                self.open.insert(record.fingerprint.clone(), record.clone());
            }
        }
        if is_archived(&record) {
            self.archive.push_back(record);
            while self.archive.len() > cap {
                self.archive.pop_front();
            }
        }
    }
}

fn is_archived(r: &ProcessingRecord) -> bool {
    match r.state {
        ProcessingState::Stored | ProcessingState::Discarded => true,
        ProcessingState::Failed => r.exhausted,
        _ => false,
    }
}

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<Inner>,
    cap: usize,
    journal: Option<PathBuf>,
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, MAX_CAP);
        Self {
            inner: Mutex::new(Inner::default()),
            cap,
            journal: None,
        }
    }

    /// Attach a journal file. Existing lines are replayed into memory and the
    /// file is rewritten with only what is still retained.
    pub fn with_journal(cap: usize, path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut h = Self::with_capacity(cap);
        if path.exists() {
            let replayed = read_journal(&path)?;
            let before = replayed.len();
            let g = h.inner.get_mut().map_err(|_| anyhow::anyhow!("history mutex poisoned"))?;
            for r in replayed {
                g.apply(r, h.cap);
            }
            let kept = compact(&path, g)?;
            info!(
                target: "history",
                path = %path.display(),
                before,
                kept,
                open = g.open.len(),
                "journal compacted"
            );
        } else if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating journal dir {}", dir.display()))?;
        }
        h.journal = Some(path);
        Ok(h)
    }

    /// Record the current state of a run. Stored and discarded records close
    /// the article; anything else keeps it open for a later resume.
    pub fn push(&self, record: &ProcessingRecord) {
        let Ok(mut g) = self.inner.lock() else {
            return;
        };
        // Journal lines are appended under the same lock to keep them whole.
        if let Some(path) = &self.journal {
            if let Err(e) = append_line(path, record) {
                warn!(target: "history", error = ?e, path = %path.display(), "journal append failed");
            }
        }
        g.apply(record.clone(), self.cap);
    }

    /// Archived records in the ring.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.archive.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<ProcessingRecord> {
        let Ok(g) = self.inner.lock() else {
            return Vec::new();
        };
        let start = g.archive.len().saturating_sub(n);
        g.archive.iter().skip(start).cloned().collect()
    }

    /// Open records whose latest state is failed, oldest first.
    pub fn failed(&self) -> Vec<ProcessingRecord> {
        let mut out = self.open_where(|r| r.state == ProcessingState::Failed);
        out.sort_by_key(|r| r.updated_at);
        out
    }

    /// Every open record: failed ones plus runs that never reached a
    /// terminal state (e.g. the process stopped mid-judgment).
    pub fn resumable(&self) -> Vec<ProcessingRecord> {
        let mut out = self.open_where(|_| true);
        out.sort_by_key(|r| r.updated_at);
        out
    }

    fn open_where(&self, keep: impl Fn(&ProcessingRecord) -> bool) -> Vec<ProcessingRecord> {
        let Ok(g) = self.inner.lock() else {
            return Vec::new();
        };
        g.open.values().filter(|r| keep(r)).cloned().collect()
    }
}

fn append_line(path: &Path, record: &ProcessingRecord) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(line.as_bytes())?;
    Ok(())
}

/// Rewrite the journal so replaying it rebuilds the same state: open records
/// already evicted from the ring first, then the ring, then in-flight records.
/// Returns the number of lines written.
fn compact(path: &Path, g: &Inner) -> anyhow::Result<usize> {
    let archived: HashSet<(&Fingerprint, DateTime<Utc>)> = g
        .archive
        .iter()
        .map(|r| (&r.fingerprint, r.updated_at))
        .collect();
    let (mut evicted, mut in_flight): (Vec<&ProcessingRecord>, Vec<&ProcessingRecord>) = g
        .open
        .values()
        .filter(|r| !archived.contains(&(&r.fingerprint, r.updated_at)))
        .partition(|r| is_archived(r));
    evicted.sort_by_key(|r| r.updated_at);
    in_flight.sort_by_key(|r| r.updated_at);

    let tmp = path.with_extension("jsonl.tmp");
    let mut written = 0usize;
    {
        let f = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        let mut w = BufWriter::new(f);
        for r in evicted.into_iter().chain(g.archive.iter()).chain(in_flight) {
            serde_json::to_writer(&mut w, r)?;
            w.write_all(b"\n")?;
            written += 1;
        }
        w.flush()?;
        w.get_ref().sync_data()?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("replacing journal {}", path.display()))?;
    Ok(written)
}

/// Read every well-formed record from a journal. Torn or foreign lines are skipped.
pub fn read_journal(path: &Path) -> anyhow::Result<Vec<ProcessingRecord>> {
    let f = File::open(path).with_context(|| format!("opening journal {}", path.display()))?;
    let mut out = Vec::new();
    for (i, line) in BufReader::new(f).lines().enumerate() {
        let line = line.with_context(|| format!("reading journal {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ProcessingRecord>(&line) {
            Ok(r) => out.push(r),
            Err(e) => warn!(target: "history", line = i + 1, error = %e, "skipping journal line"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Article;

    fn record(title: &str, state: ProcessingState) -> ProcessingRecord {
        let mut r = ProcessingRecord::new(&Article::new(title, "b", "feed", Utc::now()));
        r.state = state;
        r.dedup_marked = true;
        r
    }

    fn exhausted(title: &str) -> ProcessingRecord {
        let mut r = record(title, ProcessingState::Failed);
        r.exhausted = true;
        r
    }

    #[test]
    fn ring_drops_oldest() {
        let h = RunHistory::with_capacity(2);
        h.push(&record("a", ProcessingState::Stored));
        h.push(&record("b", ProcessingState::Stored));
        h.push(&record("c", ProcessingState::Discarded));
        let last = h.snapshot_last_n(10);
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].title, "b");
        assert_eq!(h.snapshot_last_n(1)[0].title, "c");
    }

    #[test]
    fn later_success_clears_failed() {
        let h = RunHistory::with_capacity(10);
        h.push(&exhausted("a"));
        h.push(&exhausted("b"));
        h.push(&record("a", ProcessingState::Stored));
        let failed = h.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].title, "b");
    }

    #[test]
    fn failed_record_outlives_ring_eviction() {
        let h = RunHistory::with_capacity(2);
        h.push(&exhausted("stuck"));
        for i in 0..5 {
            h.push(&record(&format!("other {i}"), ProcessingState::Discarded));
        }
        assert!(h.snapshot_last_n(10).iter().all(|r| r.title != "stuck"));
        let failed = h.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].title, "stuck");
    }

    #[test]
    fn checkpoints_are_resumable_but_not_archived() {
        let h = RunHistory::with_capacity(10);
        h.push(&record("mid-flight", ProcessingState::Stage1Done));
        assert!(h.is_empty());
        assert!(h.failed().is_empty());
        assert_eq!(h.resumable()[0].state, ProcessingState::Stage1Done);

        h.push(&record("mid-flight", ProcessingState::Stored));
        assert!(h.resumable().is_empty());
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn journal_replays_on_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("runs").join("journal.jsonl");
        {
            let h = RunHistory::with_journal(10, &path).unwrap();
            h.push(&exhausted("a"));
            h.push(&record("b", ProcessingState::Stored));
            h.push(&record("c", ProcessingState::Pending));
        }
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{not json\n")
            .unwrap();

        let h = RunHistory::with_journal(10, &path).unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h.failed()[0].title, "a");
        assert_eq!(h.resumable().len(), 2);
    }

    #[test]
    fn reopen_compacts_the_journal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("journal.jsonl");
        {
            let h = RunHistory::with_journal(2, &path).unwrap();
            h.push(&exhausted("stuck"));
            let mut r = record("done", ProcessingState::Pending);
            for state in [
                ProcessingState::Stage1Done,
                ProcessingState::Stage2Done,
                ProcessingState::Decided,
                ProcessingState::Stored,
            ] {
                r.state = state;
                h.push(&r);
            }
            for i in 0..4 {
                h.push(&record(&format!("old {i}"), ProcessingState::Discarded));
            }
        }
        assert_eq!(read_journal(&path).unwrap().len(), 9);

        let h = RunHistory::with_journal(2, &path).unwrap();
        // Two archived records plus the open failure.
        assert_eq!(read_journal(&path).unwrap().len(), 3);
        assert_eq!(h.failed()[0].title, "stuck");
        assert_eq!(h.len(), 2);

        let again = RunHistory::with_journal(2, &path).unwrap();
        assert_eq!(again.failed().len(), 1);
        assert_eq!(read_journal(&path).unwrap().len(), 3);
    }
}
