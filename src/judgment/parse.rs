//! Response parsing: raw model text → `Judgment`.
//!
//! Accepted shapes: a bare `{...}` object, or the first ``` fenced block
//! (optionally labelled `json`). Scores may sit at top level or under
//! `"scores"`. Anything else is a malformed response.

use serde_json::{Map, Value};

use crate::decision::Recommendation;
use crate::score::JudgmentScore;

use super::Judgment;

const UNIQUENESS_KEYS: &[&str] = &["uniqueness", "unique", "unique_score", "uniqueness_score"];
const IMPACT_KEYS: &[&str] = &["impact", "impact_score"];
const URGENCY_KEYS: &[&str] = &["urgency", "urgency_score"];
const CREDIBILITY_KEYS: &[&str] = &["credibility", "credibility_score", "reliability"];

pub fn parse_judgment(raw: &str) -> Result<Judgment, String> {
    let body = extract_json_block(raw).ok_or_else(|| "no JSON object in response".to_string())?;
    let value: Value = serde_json::from_str(body).map_err(|e| format!("JSON parse failed: {e}"))?;
    let root = value
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;

    let scores = match root.get("scores").and_then(Value::as_object) {
        Some(inner) => inner,
        None => root,
    };

    let score = JudgmentScore::new(
        field(scores, UNIQUENESS_KEYS)?,
        field(scores, IMPACT_KEYS)?,
        field(scores, URGENCY_KEYS)?,
        field(scores, CREDIBILITY_KEYS)?,
    )
    .map_err(|e| e.to_string())?;

    let recommendation = root
        .get("recommendation")
        .and_then(Value::as_str)
        .and_then(Recommendation::parse_label);

    let reason = ["reason", "short_reason", "rationale"]
        .iter()
        .find_map(|k| root.get(*k).and_then(Value::as_str))
        .map(clean_reason)
        .filter(|s| !s.is_empty());

    Ok(Judgment {
        score,
        recommendation,
        reason,
    })
}

/// Locate the JSON payload inside the raw text.
pub fn extract_json_block(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```") {
        let rest = &raw[start + 3..];
        let end = rest.find("```")?;
        let block = rest[..end].trim();
        let block = block.strip_prefix("json").unwrap_or(block).trim();
        return Some(block);
    }
    let trimmed = raw.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}')).then_some(trimmed)
}

fn field(obj: &Map<String, Value>, keys: &[&str]) -> Result<i64, String> {
    let (key, v) = keys
        .iter()
        .find_map(|k| obj.get(*k).map(|v| (*k, v)))
        .ok_or_else(|| format!("missing field `{}`", keys[0]))?;
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| format!("`{key}` is not an integer: {n}")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("`{key}` is not numeric: {s:?}")),
        other => Err(format!("`{key}` has unexpected type: {other}")),
    }
}

/// Single line, collapsed whitespace, at most 160 chars.
fn clean_reason(s: &str) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(160).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object() {
        let j = parse_judgment(r#" {"uniqueness":6,"impact":7,"urgency":7,"credibility":2} "#)
            .unwrap();
        assert_eq!(j.score.total(), 20);
        assert!(j.recommendation.is_none());
    }

    #[test]
    fn fenced_block_with_label() {
        let raw = "Here you go:\n```json\n{\"unique\": \"8\", \"impact\": 8, \"urgency\": 9, \"credibility\": 3, \"recommendation\": \"HIGH\", \"reason\": \"new\\n data\"}\n```\nthanks";
        let j = parse_judgment(raw).unwrap();
        assert_eq!(j.score.total(), 25);
        assert_eq!(j.recommendation, Some(Recommendation::High));
        assert_eq!(j.reason.as_deref(), Some("new data"));
    }

    #[test]
    fn nested_scores_object() {
        let raw = r#"{"scores":{"uniqueness":1,"impact":1,"urgency":1,"credibility":0},"recommendation":"low"}"#;
        let j = parse_judgment(raw).unwrap();
        assert_eq!(j.score.total(), 3);
        assert_eq!(j.recommendation, Some(Recommendation::Low));
    }

    #[test]
    fn rejects_prose_and_bad_fields() {
        assert!(parse_judgment("I think this article is important.").is_err());
        assert!(parse_judgment(r#"{"uniqueness":6,"impact":7,"urgency":7}"#).is_err());
        assert!(
            parse_judgment(r#"{"uniqueness":"six","impact":7,"urgency":7,"credibility":1}"#)
                .is_err()
        );
        assert!(
            parse_judgment(r#"{"uniqueness":12,"impact":7,"urgency":7,"credibility":1}"#)
                .is_err()
        );
        assert!(parse_judgment("```json\n{\"uniqueness\": 1").is_err());
    }
}
