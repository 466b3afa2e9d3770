//! Continue/stop decisions between improvement rounds.
//!
//! The engine only sees [`IterationJudge`]; production wiring uses
//! [`LlmJudge`], tests substitute deterministic judges.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::content::QualityRating;
use crate::retry::RetryPolicy;
use crate::services::{CompletionService, complete_with_retry, parse_json};

/// Everything a judge may look at.
#[derive(Debug, Clone, Copy)]
pub struct JudgeInput<'a> {
    pub current: &'a QualityRating,
    pub previous: &'a QualityRating,
    /// 1-based index of the iteration just rated.
    pub iteration: u32,
    /// Maximum iterations for this run.
    pub budget: u32,
    pub target: f32,
}

impl JudgeInput<'_> {
    pub fn remaining(&self) -> u32 {
        self.budget.saturating_sub(self.iteration)
    }

    pub fn delta(&self) -> f32 {
        self.current.score - self.previous.score
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub should_continue: bool,
    pub reason: String,
}

impl Verdict {
    pub fn proceed(reason: impl Into<String>) -> Self {
        Self {
            should_continue: true,
            reason: reason.into(),
        }
    }

    pub fn stop(reason: impl Into<String>) -> Self {
        Self {
            should_continue: false,
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait IterationJudge: Send + Sync {
    async fn judge(&self, input: JudgeInput<'_>) -> Verdict;
}

/// Rule-based judge; also the fallback for [`LlmJudge`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicJudge;

/// Distance to target under which residual issues are worth another round.
const NEAR_TARGET: f32 = 1.0;
/// A drop larger than this is treated as a regression.
const REGRESSION: f32 = 0.5;

impl HeuristicJudge {
    pub fn decide(input: &JudgeInput<'_>) -> Verdict {
        let remaining = input.remaining();
        let delta = input.delta();

        if remaining == 0 {
            return Verdict::stop("iteration budget exhausted");
        }
        if input.target - input.current.score <= NEAR_TARGET && !input.current.improvements.is_empty() {
            return Verdict::proceed(format!(
                "score {:.1} is within reach of {:.1} with {} fixable issues",
                input.current.score,
                input.target,
                input.current.improvements.len()
            ));
        }
        if delta <= 0.0 && remaining <= 1 {
            return Verdict::stop(format!(
                "no improvement ({delta:+.1}) and only {remaining} round left"
            ));
        }
        if delta < -REGRESSION {
            return Verdict::stop(format!("quality regressed by {:.1}", -delta));
        }
        Verdict::proceed(format!("{remaining} rounds left, last change {delta:+.1}"))
    }
}

#[async_trait]
impl IterationJudge for HeuristicJudge {
    async fn judge(&self, input: JudgeInput<'_>) -> Verdict {
        Self::decide(&input)
    }
}

#[derive(Debug, Deserialize)]
struct LlmVerdict {
    #[serde(rename = "continue")]
    should_continue: bool,
    #[serde(default)]
    reason: String,
}

/// Delegates the decision to the model, falling back to [`HeuristicJudge`].
pub struct LlmJudge {
    llm: Arc<dyn CompletionService>,
    retry: RetryPolicy,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn CompletionService>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }
}

#[async_trait]
impl IterationJudge for LlmJudge {
    async fn judge(&self, input: JudgeInput<'_>) -> Verdict {
        let issues = input
            .current
            .improvements
            .iter()
            .map(|i| format!("- [{}] {}", i.location, i.issue))
            .collect::<Vec<_>>()
            .join("\n");
        let system = "You decide whether another revision round of an article is worth its cost. \
                      Respond with ONLY valid JSON.";
        let user = format!(
            "Target score: {:.1}\n\
             Previous score: {:.1}\n\
             Current score: {:.1}\n\
             Round {} of {} ({} left)\n\
             Editor summary: {}\n\
             Open issues:\n{}\n\
             \n\
             Continue when the remaining issues are concrete and fixable, when the score is close \
             to target, or when the last round still improved things. Stop when improvement is flat \
             or negative and the budget is nearly spent.\n\
             Format: {{\"continue\": true|false, \"reason\": \"<one sentence>\"}}",
            input.target,
            input.previous.score,
            input.current.score,
            input.iteration,
            input.budget,
            input.remaining(),
            input.current.summary,
            if issues.is_empty() { "(none)".to_string() } else { issues },
        );

        match complete_with_retry(&self.llm, &self.retry, "judge iteration", system, &user, 0.0, 200)
            .await
            .and_then(|text| parse_json::<LlmVerdict>(&text))
        {
            Ok(verdict) => Verdict {
                should_continue: verdict.should_continue,
                reason: verdict.reason,
            },
            Err(err) => {
                warn!(error = %err, "judge reply unusable, using heuristic");
                HeuristicJudge::decide(&input)
            }
        }
    }
}
