//! Judgment scores produced by the evaluators.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DIMENSION_MAX: u8 = 10;
pub const CREDIBILITY_MAX: u8 = 5;

/// Which judgment pass produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Stage1,
    Stage2,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Stage1 => "stage1",
            Stage::Stage2 => "stage2",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four editorial dimensions. uniqueness/impact/urgency are in [0,10],
/// credibility in [0,5]; the constructor is the only way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawScore")]
pub struct JudgmentScore {
    uniqueness: u8,
    impact: u8,
    urgency: u8,
    credibility: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}={value} out of range 0..={max}")]
pub struct ScoreRangeError {
    pub field: &'static str,
    pub value: i64,
    pub max: u8,
}

impl JudgmentScore {
    pub fn new(
        uniqueness: i64,
        impact: i64,
        urgency: i64,
        credibility: i64,
    ) -> Result<Self, ScoreRangeError> {
        Ok(Self {
            uniqueness: check("uniqueness", uniqueness, DIMENSION_MAX)?,
            impact: check("impact", impact, DIMENSION_MAX)?,
            urgency: check("urgency", urgency, DIMENSION_MAX)?,
            credibility: check("credibility", credibility, CREDIBILITY_MAX)?,
        })
    }

    pub fn uniqueness(&self) -> u8 {
        self.uniqueness
    }

    pub fn impact(&self) -> u8 {
        self.impact
    }

    pub fn urgency(&self) -> u8 {
        self.urgency
    }

    pub fn credibility(&self) -> u8 {
        self.credibility
    }

    /// uniqueness + impact + urgency (0..=30). Credibility is not part of it.
    pub fn total(&self) -> u8 {
        self.uniqueness + self.impact + self.urgency
    }
}

fn check(field: &'static str, value: i64, max: u8) -> Result<u8, ScoreRangeError> {
    if (0..=i64::from(max)).contains(&value) {
        Ok(value as u8)
    } else {
        Err(ScoreRangeError { field, value, max })
    }
}

#[derive(Deserialize)]
struct RawScore {
    uniqueness: i64,
    impact: i64,
    urgency: i64,
    credibility: i64,
}

impl TryFrom<RawScore> for JudgmentScore {
    type Error = ScoreRangeError;

    fn try_from(r: RawScore) -> Result<Self, Self::Error> {
        JudgmentScore::new(r.uniqueness, r.impact, r.urgency, r.credibility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_excludes_credibility() {
        let s = JudgmentScore::new(8, 8, 9, 3).unwrap();
        assert_eq!(s.total(), 25);
        assert_eq!(s.credibility(), 3);
    }

    #[test]
    fn rejects_out_of_range() {
        let err = JudgmentScore::new(11, 0, 0, 0).unwrap_err();
        assert_eq!(err.field, "uniqueness");
        assert!(JudgmentScore::new(0, 0, 0, 6).is_err());
        assert!(JudgmentScore::new(0, -1, 0, 0).is_err());
    }

    #[test]
    fn deserialize_validates_range() {
        let ok: JudgmentScore =
            serde_json::from_str(r#"{"uniqueness":1,"impact":2,"urgency":3,"credibility":4}"#)
                .unwrap();
        assert_eq!(ok.total(), 6);
        let bad = serde_json::from_str::<JudgmentScore>(
            r#"{"uniqueness":1,"impact":2,"urgency":30,"credibility":4}"#,
        );
        assert!(bad.is_err());
    }
}
