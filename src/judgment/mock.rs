//! Deterministic backends for local runs (`AI_TEST_MODE=mock`) and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::score::Stage;

use super::backend::{BackendError, JudgmentBackend, JudgmentRequest};

/// Fixed reply per stage. Defaults pass Stage-1 (20) and reach high in Stage-2 (25).
#[derive(Debug, Clone)]
pub struct MockBackend {
    pub stage1: String,
    pub stage2: String,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            stage1: r#"{"uniqueness":6,"impact":7,"urgency":7,"credibility":2,"reason":"mock stage1"}"#
                .to_string(),
            stage2: r#"{"uniqueness":8,"impact":8,"urgency":9,"credibility":3,"recommendation":"high","reason":"mock stage2"}"#
                .to_string(),
        }
    }
}

#[async_trait]
impl JudgmentBackend for MockBackend {
    async fn call(&self, request: &JudgmentRequest) -> Result<String, BackendError> {
        Ok(match request.stage {
            Stage::Stage1 => self.stage1.clone(),
            Stage::Stage2 => self.stage2.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// One scripted step of a `ScriptedBackend`.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail(BackendError),
    /// Sleep, then reply; lets tests exercise the client-side timeout.
    Stall(Duration, String),
}

/// Replays a per-stage script and counts calls. When a stage's script runs
/// out, the last step is repeated.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<Stage, VecDeque<Scripted>>>,
    last: Mutex<HashMap<Stage, Scripted>>,
    calls: Mutex<HashMap<Stage, u32>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, stage: Stage, step: Scripted) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(stage)
            .or_default()
            .push_back(step);
        self
    }

    pub fn reply(self, stage: Stage, body: impl Into<String>) -> Self {
        self.then(stage, Scripted::Reply(body.into()))
    }

    pub fn fail(self, stage: Stage, err: BackendError) -> Self {
        self.then(stage, Scripted::Fail(err))
    }

    /// Convenience: reply with the four score fields.
    pub fn scores(self, stage: Stage, u: u8, i: u8, r: u8, c: u8) -> Self {
        self.reply(
            stage,
            format!(r#"{{"uniqueness":{u},"impact":{i},"urgency":{r},"credibility":{c}}}"#),
        )
    }

    pub fn calls(&self, stage: Stage) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&stage)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls(Stage::Stage1) + self.calls(Stage::Stage2)
    }

    fn next_step(&self, stage: Stage) -> Option<Scripted> {
        let popped = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&stage)
            .and_then(VecDeque::pop_front);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match popped {
            Some(step) => {
                last.insert(stage, step.clone());
                Some(step)
            }
            None => last.get(&stage).cloned(),
        }
    }
}

#[async_trait]
impl JudgmentBackend for ScriptedBackend {
    async fn call(&self, request: &JudgmentRequest) -> Result<String, BackendError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(request.stage)
            .or_default() += 1;

        match self.next_step(request.stage) {
            Some(Scripted::Reply(body)) => Ok(body),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Stall(wait, body)) => {
                tokio::time::sleep(wait).await;
                Ok(body)
            }
            None => Err(BackendError::Rejected(format!(
                "no script for {}",
                request.stage
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
