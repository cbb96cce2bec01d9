//! Reconciliation log: the ordered diagnostic record of a run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Runner states and escalation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Init,
    PatternAcquire,
    RegexSplit,
    Evaluate,
    AutoRepair,
    GapRefine,
    DirectSearch,
    Advanced,
    Done,
    Fail,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::PatternAcquire => "pattern-acquire",
            Stage::RegexSplit => "regex-split",
            Stage::Evaluate => "evaluate",
            Stage::AutoRepair => "auto-repair",
            Stage::GapRefine => "gap-refine",
            Stage::DirectSearch => "direct-search",
            Stage::Advanced => "advanced",
            Stage::Done => "done",
            Stage::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// One decision or transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileEvent {
    pub stage: Stage,
    pub action: String,
    pub before_count: usize,
    pub after_count: usize,
    pub reason: String,
}

/// Append-only event list whose order matches the runner's transitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationLog {
    pub events: Vec<ReconcileEvent>,
}

impl ReconciliationLog {
    pub fn record(
        &mut self,
        stage: Stage,
        action: impl Into<String>,
        before_count: usize,
        after_count: usize,
        reason: impl Into<String>,
    ) {
        self.events.push(ReconcileEvent {
            stage,
            action: action.into(),
            before_count,
            after_count,
            reason: reason.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events recorded for a given stage, in append order.
    pub fn stage_events(&self, stage: Stage) -> impl Iterator<Item = &ReconcileEvent> {
        self.events.iter().filter(move |e| e.stage == stage)
    }
}
