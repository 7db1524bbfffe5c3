//! Recommendation label and the threshold policy.
//!
//! `decide` is a pure function of the latest score: no I/O, no model output
//! involved, so the threshold policy can change without touching prompts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::score::{JudgmentScore, Stage, DIMENSION_MAX};

const TOTAL_MAX: u8 = DIMENSION_MAX * 3;

/// Output label of the decision step. Only `High` is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    High,
    Mid,
    Low,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::High => "high",
            Recommendation::Mid => "mid",
            Recommendation::Low => "low",
        }
    }

    /// Lenient parse of a model-provided label ("HIGH", "medium", ...).
    pub fn parse_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Recommendation::High),
            "mid" | "medium" => Some(Recommendation::Mid),
            "low" => Some(Recommendation::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configurable thresholds. Defaults: discard floor 10, mid 15, high 25.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
    /// Stage-1 totals below this are discarded before Stage-2.
    pub discard_floor: u8,
    pub mid_threshold: u8,
    pub high_threshold: u8,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            discard_floor: 10,
            mid_threshold: 15,
            high_threshold: 25,
        }
    }
}

impl DecisionPolicy {
    /// Clamp into 0..=30 and keep `mid <= high`.
    pub fn sanitized(mut self) -> Self {
        self.discard_floor = self.discard_floor.min(TOTAL_MAX);
        self.high_threshold = self.high_threshold.min(TOTAL_MAX);
        self.mid_threshold = self.mid_threshold.min(TOTAL_MAX);
        if self.mid_threshold > self.high_threshold {
            std::mem::swap(&mut self.mid_threshold, &mut self.high_threshold);
        }
        self
    }

    pub fn label_for(&self, total: u8) -> Recommendation {
        if total >= self.high_threshold {
            Recommendation::High
        } else if total >= self.mid_threshold {
            Recommendation::Mid
        } else {
            Recommendation::Low
        }
    }

    pub fn is_below_floor(&self, score: &JudgmentScore) -> bool {
        score.total() < self.discard_floor
    }

    /// Decision for a single score.
    pub fn decide(&self, score: &JudgmentScore) -> Decision {
        self.decide_from(score, Stage::Stage1)
    }

    /// Stage-2 supersedes Stage-1 when present.
    pub fn aggregate(&self, stage1: &JudgmentScore, stage2: Option<&JudgmentScore>) -> Decision {
        match stage2 {
            Some(s2) => self.decide_from(s2, Stage::Stage2),
            None => self.decide_from(stage1, Stage::Stage1),
        }
    }

    fn decide_from(&self, score: &JudgmentScore, basis: Stage) -> Decision {
        let total = score.total();
        Decision {
            total,
            credibility: score.credibility(),
            recommendation: self.label_for(total),
            basis,
            score: *score,
        }
    }
}

/// `decide` under the default policy.
pub fn decide(score: &JudgmentScore) -> Decision {
    DecisionPolicy::default().decide(score)
}

/// Derived record; never stored on its own, only alongside an accepted article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// uniqueness + impact + urgency, 0..=30.
    pub total: u8,
    /// Carried through for display; does not move the label.
    pub credibility: u8,
    pub recommendation: Recommendation,
    /// Stage whose score the decision was computed from.
    pub basis: Stage,
    pub score: JudgmentScore,
}

impl Decision {
    pub fn is_high(&self) -> bool {
        self.recommendation == Recommendation::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn s(u: i64, i: i64, r: i64, c: i64) -> JudgmentScore {
        JudgmentScore::new(u, i, r, c).unwrap()
    }

    #[test]
    fn serialize_decision_shape() {
        let d = decide(&s(8, 8, 9, 3));
        let v = serde_json::to_value(d).unwrap();
        assert_eq!(v["total"], json!(25));
        assert_eq!(v["credibility"], json!(3));
        assert_eq!(v["recommendation"], json!("high"));
        assert_eq!(v["basis"], json!("stage1"));
        assert_eq!(v["score"]["urgency"], json!(9));
    }

    #[test]
    fn aggregate_prefers_stage2() {
        let p = DecisionPolicy::default();
        let d = p.aggregate(&s(2, 2, 2, 0), Some(&s(9, 9, 9, 5)));
        assert_eq!(d.basis, Stage::Stage2);
        assert!(d.is_high());
        let d1 = p.aggregate(&s(9, 9, 9, 5), None);
        assert_eq!(d1.basis, Stage::Stage1);
    }

    #[test]
    fn sanitize_swaps_inverted_thresholds() {
        let p = DecisionPolicy {
            discard_floor: 99,
            mid_threshold: 28,
            high_threshold: 20,
        }
        .sanitized();
        assert_eq!(p.discard_floor, 30);
        assert_eq!(p.mid_threshold, 20);
        assert_eq!(p.high_threshold, 28);
    }

    #[test]
    fn model_labels_parse_leniently() {
        assert_eq!(Recommendation::parse_label(" HIGH "), Some(Recommendation::High));
        assert_eq!(Recommendation::parse_label("medium"), Some(Recommendation::Mid));
        assert_eq!(Recommendation::parse_label("maybe"), None);
    }
}
