//! Iterative draft → rate → improve loop.
//!
//! The loop stops as soon as a draft reaches the target score, when the
//! [`IterationJudge`] decides another round is not worth it, or when the
//! iteration limit (`min(max_iterations, safety_cap)`) is reached. The result
//! is always the last recorded draft, whether or not it met the target.

mod judge;
pub mod prompts;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::QualitySettings;
use crate::content::{
    Content, Improvement, IterationRecord, Metadata, QualityRating, StyleConfig, clamp_score,
};
use crate::error::{PressError, Result};
use crate::research::ResearchResult;
use crate::retry::RetryPolicy;
use crate::services::{CompletionService, complete_with_retry, parse_json};

pub use judge::{HeuristicJudge, IterationJudge, JudgeInput, LlmJudge, Verdict};

/// Everything needed to write one article.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub title: String,
    pub niche: String,
    pub keywords: Vec<String>,
    /// Grounding material.
    pub research: ResearchResult,
    pub style: StyleConfig,
    pub angle: Option<String>,
}

/// Why the loop ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum StopReason {
    TargetReached,
    JudgeStopped(String),
    BudgetExhausted,
}

#[derive(Debug, Clone)]
pub struct Refinement {
    /// Content of the last recorded iteration.
    pub content: Content,
    pub iterations: Vec<IterationRecord>,
    pub stop_reason: StopReason,
}

impl Refinement {
    pub fn final_score(&self) -> f32 {
        self.iterations
            .last()
            .map(|record| record.rating.score)
            .unwrap_or_default()
    }

    pub fn accepted(&self) -> bool {
        self.stop_reason == StopReason::TargetReached
    }
}

#[derive(Debug, Deserialize)]
struct DraftReply {
    title: String,
    body: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RatingReply {
    score: f32,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    improvements: Vec<Improvement>,
    #[serde(default)]
    structure: Option<f32>,
    #[serde(default)]
    depth: Option<f32>,
    #[serde(default)]
    engagement: Option<f32>,
}

pub struct RefinementEngine {
    llm: Arc<dyn CompletionService>,
    judge: Arc<dyn IterationJudge>,
    retry: RetryPolicy,
}

impl RefinementEngine {
    pub fn new(
        llm: Arc<dyn CompletionService>,
        judge: Arc<dyn IterationJudge>,
        retry: RetryPolicy,
    ) -> Self {
        Self { llm, judge, retry }
    }

    pub async fn refine(
        &self,
        request: &GenerationRequest,
        quality: &QualitySettings,
    ) -> Result<Refinement> {
        let limit = quality.iteration_limit();
        let target = quality.target_score;

        let draft = self.generate(request).await?;
        let rating = self.rate(request, &draft, None).await?;
        info!(title = %request.title, iteration = 1, score = rating.score, "draft rated");

        let mut iterations = vec![IterationRecord {
            sequence: 1,
            content: draft,
            rating,
        }];

        let stop_reason = 'rounds: {
            if iterations[0].rating.score >= target {
                break 'rounds StopReason::TargetReached;
            }

            for sequence in 2..=limit {
                if request.research.is_empty() {
                    return Err(PressError::NoGrounding(request.title.clone()));
                }

                let previous = iterations.last().cloned().ok_or_else(|| {
                    PressError::MalformedResponse("refinement history is empty".into())
                })?;
                let improved = self.improve(request, &previous, &iterations).await?;
                let rating = self
                    .rate(request, &improved, Some(previous.rating.score))
                    .await?;
                info!(
                    title = %request.title,
                    iteration = sequence,
                    score = rating.score,
                    previous = previous.rating.score,
                    "revision rated"
                );

                iterations.push(IterationRecord {
                    sequence,
                    content: improved,
                    rating,
                });
                let current = &iterations[iterations.len() - 1].rating;

                if current.score >= target {
                    break 'rounds StopReason::TargetReached;
                }
                if sequence == limit {
                    break;
                }

                let verdict = self
                    .judge
                    .judge(JudgeInput {
                        current,
                        previous: &previous.rating,
                        iteration: sequence,
                        budget: limit,
                        target,
                    })
                    .await;
                debug!(iteration = sequence, verdict = ?verdict, "judge verdict");
                if !verdict.should_continue {
                    break 'rounds StopReason::JudgeStopped(verdict.reason);
                }
            }

            StopReason::BudgetExhausted
        };

        let content = iterations
            .last()
            .map(|record| record.content.clone())
            .unwrap_or_default();
        info!(
            title = %request.title,
            iterations = iterations.len(),
            stop = ?stop_reason,
            "refinement finished"
        );
        Ok(Refinement {
            content,
            iterations,
            stop_reason,
        })
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Content> {
        let text = complete_with_retry(
            &self.llm,
            &self.retry,
            "generate draft",
            prompts::DRAFT_SYSTEM,
            &prompts::draft_prompt(request),
            0.7,
            prompts::draft_max_tokens(request),
        )
        .await?;
        draft_to_content(&text)
    }

    async fn improve(
        &self,
        request: &GenerationRequest,
        previous: &IterationRecord,
        history: &[IterationRecord],
    ) -> Result<Content> {
        let text = complete_with_retry(
            &self.llm,
            &self.retry,
            "improve draft",
            prompts::DRAFT_SYSTEM,
            &prompts::improvement_prompt(request, previous, history),
            0.6,
            prompts::draft_max_tokens(request),
        )
        .await?;
        draft_to_content(&text)
    }

    async fn rate(
        &self,
        request: &GenerationRequest,
        content: &Content,
        previous_score: Option<f32>,
    ) -> Result<QualityRating> {
        let text = complete_with_retry(
            &self.llm,
            &self.retry,
            "rate draft",
            prompts::RATING_SYSTEM,
            &prompts::rating_prompt(request, content, previous_score),
            0.0,
            2000,
        )
        .await?;
        let reply: RatingReply = parse_json(&text)?;
        let score = clamp_score(reply.score);
        Ok(QualityRating {
            score,
            summary: reply.summary,
            improvements: reply.improvements,
            structure: clamp_score(reply.structure.unwrap_or(score)),
            depth: clamp_score(reply.depth.unwrap_or(score)),
            engagement: clamp_score(reply.engagement.unwrap_or(score)),
            length: content.word_count(),
        })
    }
}

fn draft_to_content(text: &str) -> Result<Content> {
    let reply: DraftReply = parse_json(text)?;
    Ok(Content {
        title: reply.title.trim().to_string(),
        body: reply.body,
        media: Vec::new(),
        metadata: Metadata {
            tags: reply.tags,
            categories: reply.categories,
            ..Metadata::default()
        },
    })
}
