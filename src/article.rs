//! Article model and its canonical fingerprint.
//!
//! The fingerprint is the identity used both by the dedup store and as the
//! storage upsert key, so the two can never disagree about "same article".

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex digest (32 chars) of the normalized title + source locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a fingerprint: {0:?}")]
pub struct InvalidFingerprint(pub String);

impl Fingerprint {
    /// Derive from a title and a source locator (the article link, or the feed id
    /// when the item carries no link). Stable under casing and whitespace variance.
    pub fn derive(title: &str, source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_key(title).as_bytes());
        hasher.update([0x1f]);
        hasher.update(normalize_source(source).as_bytes());
        let digest = hasher.finalize();

        let mut out = String::with_capacity(32);
        for b in digest.iter().take(16) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        Self(out)
    }

    /// Accepts a previously rendered fingerprint (32 lowercase hex chars).
    pub fn parse(s: &str) -> Option<Self> {
        let ok = s.len() == 32 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        ok.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = InvalidFingerprint;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or(InvalidFingerprint(s))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_key(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_source(s: &str) -> String {
    normalize_key(s).trim_end_matches('/').to_string()
}

/// A fetched news item. Never mutated after the feed layer builds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub body: String,
    /// Feed identifier, e.g. "yonhap-economy".
    pub source_id: String,
    pub url: Option<String>,
    pub category: Option<String>,
    pub company: Option<String>,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        source_id: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            source_id: source_id.into(),
            url: None,
            category: None,
            company: None,
            published_at,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_fetched_at(mut self, ts: DateTime<Utc>) -> Self {
        self.fetched_at = ts;
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let source = self.url.as_deref().unwrap_or(&self.source_id);
        Fingerprint::derive(&self.title, source)
    }

    /// Title cut for log lines; article text itself is never logged.
    pub fn short_title(&self) -> String {
        let mut out: String = self.title.chars().take(30).collect();
        if self.title.chars().count() > 30 {
            out.push_str("...");
        }
        out
    }

    /// Text handed to the judgment model: `key: value` lines.
    pub fn judgment_text(&self) -> String {
        let mut lines = Vec::with_capacity(4);
        if let Some(c) = &self.category {
            lines.push(format!("category: {c}"));
        }
        lines.push(format!("title: {}", self.title));
        lines.push(format!("summary: {}", self.body));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_case_and_whitespace() {
        let a = Fingerprint::derive("  Rate  Cut   Expected ", "https://news.example/a/");
        let b = Fingerprint::derive("rate cut expected", "HTTPS://NEWS.EXAMPLE/A");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn fingerprint_differs_by_source() {
        let a = Fingerprint::derive("Same title", "https://a.example/1");
        let b = Fingerprint::derive("Same title", "https://b.example/1");
        assert_ne!(a, b);
    }

    #[test]
    fn parse_accepts_only_rendered_digests() {
        let fp = Fingerprint::derive("t", "s");
        assert_eq!(Fingerprint::parse(fp.as_str()), Some(fp));
        assert!(Fingerprint::parse("../../etc/passwd").is_none());
        assert!(Fingerprint::parse("ABCDEF").is_none());
    }

    #[test]
    fn deserialize_goes_through_parse() {
        let fp = Fingerprint::derive("t", "s");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{fp}\""));
        assert_eq!(serde_json::from_str::<Fingerprint>(&json).unwrap(), fp);
        assert!(serde_json::from_str::<Fingerprint>(r#""a""#).is_err());
        assert!(serde_json::from_str::<Fingerprint>(r#""../../../etc/passwd""#).is_err());
    }

    #[test]
    fn article_fingerprint_falls_back_to_source_id() {
        let now = Utc::now();
        let with_link = Article::new("T", "B", "feed-1", now).with_url("https://x.example/1");
        let without = Article::new("T", "B", "feed-1", now);
        assert_eq!(without.fingerprint(), Fingerprint::derive("T", "feed-1"));
        assert_ne!(with_link.fingerprint(), without.fingerprint());
    }

    #[test]
    fn judgment_text_has_key_value_lines() {
        let a = Article::new("Title", "Body", "f", Utc::now()).with_category("economy");
        assert_eq!(a.judgment_text(), "category: economy\ntitle: Title\nsummary: Body");
    }
}
