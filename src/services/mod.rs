//! Contracts for the external collaborators the core drives.
//!
//! Every trait is object safe (via `async_trait`) so the orchestrator can hold
//! `Arc<dyn ...>` handles and tests can substitute scripted doubles.

mod html;
mod json;
mod searx;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProjectConfig;
use crate::content::{Content, IterationRecord, WorkItem};
use crate::error::Result;
use crate::retry::{self, RetryPolicy};
use crate::state_machine::ItemUpdate;

pub use html::{HttpPageFetcher, html_to_text};
pub use json::{extract_json, parse_json};
pub use searx::SearxClient;

/// Text completion backed by a language model.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// How long a single request may take before the backend itself gives up.
    /// Retried completions never get a shorter attempt budget than this.
    fn request_timeout(&self) -> Option<Duration> {
        None
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub source: String,
    /// Snippet was replaced by a summary of the fetched page.
    #[serde(default)]
    pub enriched: bool,
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>>;
}

/// Fetches a page as raw HTML or text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageHit {
    pub url: String,
    pub alt: String,
    #[serde(default)]
    pub caption: Option<String>,
    /// The URL is stable and may be embedded as-is.
    #[serde(default)]
    pub permanent: bool,
}

/// Image search. An empty result is not an error.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<ImageHit>>;

    /// Raw bytes and content type, for re-hosting images that are not permanent.
    async fn download(&self, image: &ImageHit) -> Result<(Vec<u8>, String)>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the buffer and returns a permanent URL.
    async fn upload(&self, buffer: Vec<u8>, filename: &str, content_type: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Storage for projects, work items, produced content and run logs.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn list_active_projects(&self) -> Result<Vec<ProjectConfig>>;

    /// Pending items scheduled at or before `now`, optionally for one project.
    async fn list_due_items(
        &self,
        project_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>>;

    async fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<()>;

    async fn save_content(&self, item_id: &str, content: &Content) -> Result<()>;

    /// Replaces any previously stored history for the item.
    async fn replace_iterations(&self, item_id: &str, records: &[IterationRecord]) -> Result<()>;

    async fn append_log(&self, level: LogLevel, message: &str, context: serde_json::Value)
    -> Result<()>;
}

/// Runs one completion under the retry policy, with the attempt timeout
/// widened to the service's own request timeout.
pub async fn complete_with_retry(
    llm: &Arc<dyn CompletionService>,
    policy: &RetryPolicy,
    context: &str,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String> {
    let policy = match llm.request_timeout() {
        Some(request_timeout) => policy.clone().covering(request_timeout),
        None => policy.clone(),
    };
    retry::execute(
        || {
            let llm = Arc::clone(llm);
            let system = system.to_string();
            let user = user.to_string();
            async move { llm.complete(&system, &user, temperature, max_tokens).await }
        },
        &policy,
        context,
    )
    .await
}
