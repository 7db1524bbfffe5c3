//! Scoring criteria per stage. The prompt text is configuration: built-in
//! defaults, optionally replaced by `stage1.md` / `stage2.md` from a prompt dir.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::score::Stage;

pub const SYSTEM_PROMPT: &str = "You are an editorial analyst that scores news articles and returns structured JSON responses only.";

pub const DEFAULT_STAGE1_PROMPT: &str = r#"Score the news article below on a coarse first pass.

Criteria:
- uniqueness (0-10): does it carry core signal keywords shared with currently trending topics, and is the angle not a rehash?
- impact (0-10): are named institutions, companies or public bodies involved?
- urgency (0-10): is there time-window language (today, this week, deadline, effective from)?
- credibility (0-5): are sources or data cited at all?

Return only a JSON object:
{"uniqueness": <int>, "impact": <int>, "urgency": <int>, "credibility": <int>, "reason": "<one short sentence>"}"#;

pub const DEFAULT_STAGE2_PROMPT: &str = r#"Re-score the news article below with deeper criteria. The first-pass scores are included for reference; do not copy them.

Criteria:
- uniqueness (0-10): new factual content beyond the first pass (explicit statistics, named experts).
- impact (0-10): number of institutional or policy references.
- urgency (0-10): explicit date or condition clauses ("from July 1", "if rates rise").
- credibility (0-5): number of cited sources or data attributions.
- recommendation: "high", "mid" or "low".

Return only a JSON object:
{"uniqueness": <int>, "impact": <int>, "urgency": <int>, "credibility": <int>, "recommendation": "<high|mid|low>", "reason": "<one short sentence>"}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    pub stage: Stage,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub system: String,
    pub stage1: String,
    pub stage2: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            stage1: DEFAULT_STAGE1_PROMPT.to_string(),
            stage2: DEFAULT_STAGE2_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    /// Load overrides from `dir`; a missing or empty file keeps the default.
    pub fn load(dir: Option<&Path>) -> Self {
        let mut set = Self::default();
        let Some(dir) = dir else {
            return set;
        };
        if let Some(p) = read_prompt(&dir.join("system.md")) {
            set.system = p;
        }
        if let Some(p) = read_prompt(&dir.join("stage1.md")) {
            set.stage1 = p;
        }
        if let Some(p) = read_prompt(&dir.join("stage2.md")) {
            set.stage2 = p;
        }
        set
    }

    pub fn criteria(&self, stage: Stage) -> Criteria {
        let prompt = match stage {
            Stage::Stage1 => self.stage1.clone(),
            Stage::Stage2 => self.stage2.clone(),
        };
        Criteria { stage, prompt }
    }
}

fn read_prompt(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) if !s.trim().is_empty() => {
            info!(target: "judgment", path = %path.display(), "prompt override loaded");
            Some(s.trim().to_string())
        }
        Ok(_) => None,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(target: "judgment", path = %path.display(), error = %e, "prompt read failed; using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_only_present_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("stage2.md"), "  custom stage two  \n").unwrap();
        fs::write(tmp.path().join("stage1.md"), "   ").unwrap();
        let set = PromptSet::load(Some(tmp.path()));
        assert_eq!(set.stage1, DEFAULT_STAGE1_PROMPT);
        assert_eq!(set.stage2, "custom stage two");
        assert_eq!(set.criteria(Stage::Stage2).stage, Stage::Stage2);
    }
}
