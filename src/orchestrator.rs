//! Publishing orchestrator: the top-level driver.
//!
//! For every active project and every due work item, strictly one after the
//! other, runs research → refinement → validation → media → persistence →
//! publish, then applies the item's state transition and persists it. This
//! is the only place that changes work item status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationToken;
use crate::config::{ProjectConfig, QualitySettings};
use crate::content::{Content, WorkItem};
use crate::error::{ErrorKind, PressError, Result};
use crate::media::MediaEnricher;
use crate::refine::{GenerationRequest, RefinementEngine};
use crate::registry::AdapterRegistry;
use crate::research::ResearchOrchestrator;
use crate::services::{LogLevel, Persistence};
use crate::state_machine::{Event, StateMachine, Transition};
use crate::validation::ValidationRules;

/// Run-wide knobs; per-project quality settings override `quality`.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    /// Produce and store content without publishing it.
    pub generate_only: bool,
    pub quality: QualitySettings,
    pub validation: ValidationRules,
}

/// What happened to one item during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Published {
        url: Option<String>,
    },
    /// Content stored, nothing published; the item stays pending.
    Generated,
    Rescheduled {
        retry_count: u32,
        scheduled_for: DateTime<Utc>,
        error: String,
    },
    Failed {
        kind: ErrorKind,
        error: String,
    },
    /// Released untouched (cancellation or not pending).
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    pub item_id: String,
    pub project_id: String,
    pub title: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
    pub iterations: usize,
    pub final_score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub items: Vec<ItemReport>,
}

impl RunReport {
    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn published(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Published { .. }))
    }

    pub fn generated(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Generated))
    }

    pub fn rescheduled(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Rescheduled { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped { .. }))
    }
}

/// Result of one successful pass through the pipeline.
enum Produced {
    Published { url: Option<String>, content: Content },
    Generated,
}

#[derive(Default)]
struct AttemptStats {
    iterations: usize,
    final_score: Option<f32>,
}

pub struct PublishingOrchestrator {
    store: Arc<dyn Persistence>,
    research: ResearchOrchestrator,
    refiner: RefinementEngine,
    media: Option<MediaEnricher>,
    registry: Arc<AdapterRegistry>,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
}

impl PublishingOrchestrator {
    pub fn new(
        store: Arc<dyn Persistence>,
        research: ResearchOrchestrator,
        refiner: RefinementEngine,
        registry: Arc<AdapterRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            research,
            refiner,
            media: None,
            registry,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_media(mut self, media: MediaEnricher) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle for requesting cancellation from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Processes every due item of every active project (or only of
    /// `project_filter`), sequentially.
    ///
    /// Item failures are recorded in the report; only persistence failures
    /// abort the run.
    pub async fn run(&self, project_filter: Option<&str>) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut items = Vec::new();

        let projects: Vec<ProjectConfig> = self
            .store
            .list_active_projects()
            .await?
            .into_iter()
            .filter(|p| project_filter.is_none_or(|id| p.id == id))
            .collect();
        info!(
            projects = projects.len(),
            generate_only = self.settings.generate_only,
            "run started"
        );

        'projects: for project in &projects {
            let due = self.store.list_due_items(Some(&project.id), Utc::now()).await?;
            debug!(project_id = %project.id, due = due.len(), "due items listed");

            for item in due {
                if self.cancel.is_cancelled() {
                    break 'projects;
                }
                items.push(self.process_item(project, item).await?);
            }
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            cancelled: self.cancel.is_cancelled(),
            items,
        };
        info!(
            published = report.published(),
            generated = report.generated(),
            rescheduled = report.rescheduled(),
            failed = report.failed(),
            skipped = report.skipped(),
            cancelled = report.cancelled,
            "run finished"
        );
        Ok(report)
    }

    async fn process_item(&self, project: &ProjectConfig, mut item: WorkItem) -> Result<ItemReport> {
        let mut report = ItemReport {
            item_id: item.id.clone(),
            project_id: project.id.clone(),
            title: item.title.clone(),
            outcome: ItemOutcome::Skipped {
                reason: String::new(),
            },
            iterations: 0,
            final_score: None,
        };

        let update = match StateMachine::next(&mut item, Event::PickedUp) {
            Ok((_, update)) => update,
            Err(err) => {
                warn!(item_id = %item.id, error = %err, "item is not pending, skipping");
                report.outcome = ItemOutcome::Skipped {
                    reason: err.to_string(),
                };
                return Ok(report);
            }
        };
        self.store.update_item(&item.id, &update).await?;
        info!(item_id = %item.id, project_id = %project.id, title = %item.title, "processing item");
        self.log(LogLevel::Info, "processing started", &item, json!({})).await?;

        let mut stats = AttemptStats::default();
        let attempt = self.attempt(project, &item, &mut stats).await;
        report.iterations = stats.iterations;
        report.final_score = stats.final_score;

        let (outcome, transition, update) = match &attempt {
            Ok(Produced::Published { url, content }) => {
                let (transition, update) = StateMachine::next(
                    &mut item,
                    Event::Published {
                        url: url.clone(),
                        content,
                    },
                )?;
                let outcome = ItemOutcome::Published { url: url.clone() };
                (outcome, transition, update)
            }
            Ok(Produced::Generated) => {
                let (transition, update) = StateMachine::next(&mut item, Event::Released)?;
                (ItemOutcome::Generated, transition, update)
            }
            Err(PressError::Cancelled) => {
                let (transition, update) = StateMachine::next(&mut item, Event::Released)?;
                let outcome = ItemOutcome::Skipped {
                    reason: "cancelled".to_string(),
                };
                (outcome, transition, update)
            }
            Err(err) => {
                let (transition, update) = StateMachine::next(&mut item, Event::Failed(err))?;
                let outcome = match &transition {
                    Transition::Rescheduled {
                        retry_count,
                        scheduled_for,
                        ..
                    } => ItemOutcome::Rescheduled {
                        retry_count: *retry_count,
                        scheduled_for: *scheduled_for,
                        error: err.to_string(),
                    },
                    _ => ItemOutcome::Failed {
                        kind: err.kind(),
                        error: err.to_string(),
                    },
                };
                (outcome, transition, update)
            }
        };

        self.store.update_item(&item.id, &update).await?;
        self.record(&item, &transition, &outcome).await?;
        report.outcome = outcome;
        Ok(report)
    }

    /// One pass through the pipeline. Cancellation is checked between stages.
    async fn attempt(
        &self,
        project: &ProjectConfig,
        item: &WorkItem,
        stats: &mut AttemptStats,
    ) -> Result<Produced> {
        project.validate()?;

        self.cancel.check()?;
        let mut research = self
            .research
            .research(&item.title, &item.niche, &item.keywords)
            .await?;

        self.cancel.check()?;
        let settings = *self.research.settings();
        let assessment = self.research.assess_quality(&item.title, &research).await;
        debug!(
            item_id = %item.id,
            confidence = assessment.confidence,
            sufficient = assessment.sufficient,
            reason = %assessment.reason,
            "research assessed"
        );
        if assessment.confidence < settings.confidence_threshold
            && !research.is_empty()
            && self.research.can_enrich()
        {
            self.cancel.check()?;
            research = self
                .research
                .enrich(&research, settings.enrich_count, settings.token_budget)
                .await?;
        }

        self.cancel.check()?;
        let quality = project.quality.unwrap_or(self.settings.quality);
        let request = GenerationRequest {
            title: item.title.clone(),
            niche: item.niche.clone(),
            keywords: item.keywords.clone(),
            research,
            style: project.style.clone(),
            angle: None,
        };
        let refinement = self.refiner.refine(&request, &quality).await?;
        stats.iterations = refinement.iterations.len();
        stats.final_score = Some(refinement.final_score());
        if !refinement.accepted() {
            warn!(
                item_id = %item.id,
                score = refinement.final_score(),
                target = quality.target_score,
                stop = ?refinement.stop_reason,
                "content below target score"
            );
        }

        let mut content = refinement.content.clone();
        self.settings.validation.check(&content)?;

        if let Some(media) = self.media.as_ref().filter(|_| project.media_enabled) {
            self.cancel.check()?;
            let added = media.enrich(&mut content, &item.title).await;
            debug!(item_id = %item.id, added, "media attached");
        }

        self.store.save_content(&item.id, &content).await?;
        self.store
            .replace_iterations(&item.id, &refinement.iterations)
            .await?;

        if self.settings.generate_only {
            info!(item_id = %item.id, "generate-only: content stored, not publishing");
            return Ok(Produced::Generated);
        }

        self.cancel.check()?;
        let plugin = self.registry.get_adapter(project).await?;
        let outcome = plugin.publish(&content, project).await?;
        if !outcome.success {
            return Err(PressError::PublishRejected {
                platform: plugin.platform().to_string(),
                message: outcome
                    .error
                    .or(outcome.message)
                    .unwrap_or_else(|| "no reason given".to_string()),
            });
        }
        Ok(Produced::Published {
            url: outcome.url,
            content,
        })
    }

    async fn record(
        &self,
        item: &WorkItem,
        transition: &Transition,
        outcome: &ItemOutcome,
    ) -> Result<()> {
        let context = serde_json::to_value(outcome)?;
        match transition {
            Transition::Published { url } => {
                info!(item_id = %item.id, url = ?url, "item published");
                self.log(LogLevel::Info, "published", item, context).await
            }
            Transition::Released => {
                info!(item_id = %item.id, "item released to pending");
                self.log(LogLevel::Info, "released", item, context).await
            }
            Transition::Rescheduled {
                retry_count,
                scheduled_for,
                kind,
            } => {
                warn!(
                    item_id = %item.id,
                    retry_count,
                    scheduled_for = %scheduled_for,
                    kind = %kind,
                    error = item.last_error.as_deref().unwrap_or_default(),
                    "item rescheduled"
                );
                self.log(LogLevel::Warn, "rescheduled", item, context).await
            }
            Transition::Failed { kind } => {
                error!(
                    item_id = %item.id,
                    kind = %kind,
                    error = item.last_error.as_deref().unwrap_or_default(),
                    "item failed"
                );
                self.log(LogLevel::Error, "failed", item, context).await
            }
            Transition::Started => Ok(()),
        }
    }

    async fn log(
        &self,
        level: LogLevel,
        message: &str,
        item: &WorkItem,
        extra: serde_json::Value,
    ) -> Result<()> {
        let context = json!({
            "item_id": item.id,
            "project_id": item.project_id,
            "retry_count": item.retry_count,
            "detail": extra,
        });
        self.store.append_log(level, message, context).await
    }
}
