//! Stage-1 (coarse) and Stage-2 (refined) evaluators on top of the judgment client.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::article::Article;
use crate::decision::{DecisionPolicy, Recommendation};
use crate::error::EvaluationFailure;
use crate::judgment::{Criteria, JudgmentClient, PromptSet};
use crate::score::{JudgmentScore, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Continue,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage1Assessment {
    pub score: JudgmentScore,
    pub verdict: Verdict,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage2Assessment {
    pub score: JudgmentScore,
    /// The model's own label; audit only, the decision ignores it.
    pub model_label: Option<Recommendation>,
    pub reason: Option<String>,
}

pub struct Stage1Evaluator {
    client: Arc<JudgmentClient>,
    criteria: Criteria,
    policy: DecisionPolicy,
}

impl Stage1Evaluator {
    pub fn new(client: Arc<JudgmentClient>, prompts: &PromptSet, policy: DecisionPolicy) -> Self {
        Self {
            client,
            criteria: prompts.criteria(Stage::Stage1),
            policy,
        }
    }

    pub async fn assess(&self, article: &Article) -> Result<Stage1Assessment, EvaluationFailure> {
        let judgment = self
            .client
            .evaluate(&article.judgment_text(), &self.criteria)
            .await?;
        let verdict = if self.policy.is_below_floor(&judgment.score) {
            Verdict::Discard
        } else {
            Verdict::Continue
        };
        debug!(
            target: "pipeline",
            title = %article.short_title(),
            total = judgment.score.total(),
            floor = self.policy.discard_floor,
            ?verdict,
            "stage1 assessed"
        );
        Ok(Stage1Assessment {
            score: judgment.score,
            verdict,
            reason: judgment.reason,
        })
    }
}

pub struct Stage2Evaluator {
    client: Arc<JudgmentClient>,
    criteria: Criteria,
}

impl Stage2Evaluator {
    pub fn new(client: Arc<JudgmentClient>, prompts: &PromptSet) -> Self {
        Self {
            client,
            criteria: prompts.criteria(Stage::Stage2),
        }
    }

    pub async fn assess(
        &self,
        article: &Article,
        stage1: &JudgmentScore,
    ) -> Result<Stage2Assessment, EvaluationFailure> {
        let text = format!(
            "{}\nstage1_uniqueness: {}\nstage1_impact: {}\nstage1_urgency: {}\nstage1_credibility: {}",
            article.judgment_text(),
            stage1.uniqueness(),
            stage1.impact(),
            stage1.urgency(),
            stage1.credibility()
        );
        let judgment = self.client.evaluate(&text, &self.criteria).await?;
        debug!(
            target: "pipeline",
            title = %article.short_title(),
            total = judgment.score.total(),
            model_label = ?judgment.recommendation,
            "stage2 assessed"
        );
        Ok(Stage2Assessment {
            score: judgment.score,
            model_label: judgment.recommendation,
            reason: judgment.reason,
        })
    }
}
