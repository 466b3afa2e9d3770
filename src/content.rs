//! Domain records shared by research, refinement and publishing.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a [`WorkItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Processing,
    Published,
    Failed,
}

impl WorkStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkStatus::Published | WorkStatus::Failed)
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkStatus::Pending => write!(f, "pending"),
            WorkStatus::Processing => write!(f, "processing"),
            WorkStatus::Published => write!(f, "published"),
            WorkStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One schedulable unit of content to produce and publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub niche: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub status: WorkStatus,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub final_content: Option<Content>,
    #[serde(default)]
    pub published_url: Option<String>,
}

fn default_retry_ceiling() -> u32 {
    3
}

impl WorkItem {
    pub fn new(
        project_id: impl Into<String>,
        title: impl Into<String>,
        niche: impl Into<String>,
        keywords: Vec<String>,
        scheduled_for: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            title: title.into(),
            niche: niche.into(),
            keywords,
            status: WorkStatus::Pending,
            scheduled_for,
            retry_count: 0,
            retry_ceiling: default_retry_ceiling(),
            last_error: None,
            final_content: None,
            published_url: None,
        }
    }

    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling;
        self
    }

    /// Pending and scheduled no later than `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == WorkStatus::Pending && self.scheduled_for <= now
    }
}

/// Tone, length and language guidance for generated drafts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub tone: String,
    /// Approximate target length in words.
    pub target_words: u32,
    pub language: String,
    pub custom_instructions: Option<String>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            tone: "informative".to_string(),
            target_words: 1200,
            language: "en".to_string(),
            custom_instructions: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub alt: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub custom: BTreeMap<String, serde_json::Value>,
}

/// Platform-agnostic article handed to a publisher plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub title: String,
    /// Markdown body.
    pub body: String,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Content {
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }

    /// Markdown headings (`#` through `######`) found in the body.
    pub fn headings(&self) -> Vec<&str> {
        self.body
            .lines()
            .map(str::trim_start)
            .filter(|line| {
                let hashes = line.chars().take_while(|c| *c == '#').count();
                (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
            })
            .collect()
    }
}

/// One location-scoped, actionable fix proposed by the rater.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub location: String,
    pub issue: String,
    pub action: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Scored critique of one draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRating {
    /// Overall score in `1.0..=10.0`.
    pub score: f32,
    pub summary: String,
    #[serde(default)]
    pub improvements: Vec<Improvement>,
    #[serde(default)]
    pub structure: f32,
    #[serde(default)]
    pub depth: f32,
    #[serde(default)]
    pub engagement: f32,
    /// Word count of the rated draft.
    #[serde(default)]
    pub length: usize,
}

pub const MIN_SCORE: f32 = 1.0;
pub const MAX_SCORE: f32 = 10.0;

pub fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        MIN_SCORE
    } else {
        score.clamp(MIN_SCORE, MAX_SCORE)
    }
}

/// A draft together with its rating; `sequence` starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub sequence: u32,
    pub content: Content,
    pub rating: QualityRating,
}

/// What a plugin reports back for one publish attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub success: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PublishOutcome {
    pub fn published(url: impl Into<String>) -> Self {
        Self {
            success: true,
            url: Some(url.into()),
            message: None,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            url: None,
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
