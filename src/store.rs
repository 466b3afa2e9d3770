//! Persistence implementations.
//!
//! [`MemoryStore`] keeps everything in process; [`JsonFileStore`] keeps the
//! same state in one JSON document that is rewritten after every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProjectConfig;
use crate::content::{Content, IterationRecord, WorkItem, WorkStatus};
use crate::error::{PressError, Result};
use crate::services::{LogLevel, Persistence};
use crate::state_machine::ItemUpdate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// Everything a store holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    pub projects: Vec<ProjectConfig>,
    pub items: Vec<WorkItem>,
    /// Latest saved content per work item id.
    pub contents: BTreeMap<String, Content>,
    pub iterations: BTreeMap<String, Vec<IterationRecord>>,
    pub logs: Vec<LogEntry>,
}

impl StoreState {
    pub fn item(&self, id: &str) -> Option<&WorkItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Item counts per status.
    pub fn status_counts(&self) -> BTreeMap<WorkStatus, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.status).or_insert(0) += 1;
        }
        counts
    }

    fn active_projects(&self) -> Vec<ProjectConfig> {
        self.projects.iter().filter(|p| p.active).cloned().collect()
    }

    fn due_items(&self, project_id: Option<&str>, now: DateTime<Utc>) -> Vec<WorkItem> {
        let mut due: Vec<WorkItem> = self
            .items
            .iter()
            .filter(|item| item.is_due(now))
            .filter(|item| project_id.is_none_or(|id| item.project_id == id))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for).then(a.id.cmp(&b.id)));
        due
    }

    fn apply(&mut self, id: &str, update: &ItemUpdate) -> Result<()> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| PressError::Config(format!("unknown work item '{id}'")))?;
        update.apply_to(item);
        Ok(())
    }

    fn log(&mut self, level: LogLevel, message: &str, context: serde_json::Value) {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            context,
        });
    }
}

/// In-process store, used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: StoreState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_project(self, project: ProjectConfig) -> Self {
        self.lock().projects.push(project);
        self
    }

    pub fn with_item(self, item: WorkItem) -> Self {
        self.lock().items.push(item);
        self
    }

    pub fn snapshot(&self) -> StoreState {
        self.lock().clone()
    }

    pub fn item(&self, id: &str) -> Option<WorkItem> {
        self.lock().item(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        // A poisoned lock only means a panic elsewhere; the data is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn list_active_projects(&self) -> Result<Vec<ProjectConfig>> {
        Ok(self.lock().active_projects())
    }

    async fn list_due_items(
        &self,
        project_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>> {
        Ok(self.lock().due_items(project_id, now))
    }

    async fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<()> {
        self.lock().apply(id, update)
    }

    async fn save_content(&self, item_id: &str, content: &Content) -> Result<()> {
        self.lock()
            .contents
            .insert(item_id.to_string(), content.clone());
        Ok(())
    }

    async fn replace_iterations(&self, item_id: &str, records: &[IterationRecord]) -> Result<()> {
        self.lock()
            .iterations
            .insert(item_id.to_string(), records.to_vec());
        Ok(())
    }

    async fn append_log(
        &self,
        level: LogLevel,
        message: &str,
        context: serde_json::Value,
    ) -> Result<()> {
        self.lock().log(level, message, context);
        Ok(())
    }
}

/// Store backed by a single JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    state: tokio::sync::Mutex<StoreState>,
}

impl JsonFileStore {
    /// Loads the document at `path`; a missing file starts an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "store file not found, starting empty");
                StoreState::default()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            state: tokio::sync::Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> StoreState {
        self.state.lock().await.clone()
    }

    /// Writes to a sibling temp file, then renames over the original.
    async fn persist(&self, state: &StoreState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut StoreState) -> Result<()> + Send,
    {
        let mut state = self.state.lock().await;
        change(&mut state)?;
        self.persist(&state).await
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn list_active_projects(&self) -> Result<Vec<ProjectConfig>> {
        Ok(self.state.lock().await.active_projects())
    }

    async fn list_due_items(
        &self,
        project_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>> {
        Ok(self.state.lock().await.due_items(project_id, now))
    }

    async fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<()> {
        self.mutate(|state| state.apply(id, update)).await
    }

    async fn save_content(&self, item_id: &str, content: &Content) -> Result<()> {
        self.mutate(|state| {
            state.contents.insert(item_id.to_string(), content.clone());
            Ok(())
        })
        .await
    }

    async fn replace_iterations(&self, item_id: &str, records: &[IterationRecord]) -> Result<()> {
        self.mutate(|state| {
            state.iterations.insert(item_id.to_string(), records.to_vec());
            Ok(())
        })
        .await
    }

    async fn append_log(
        &self,
        level: LogLevel,
        message: &str,
        context: serde_json::Value,
    ) -> Result<()> {
        self.mutate(|state| {
            state.log(level, message, context);
            Ok(())
        })
        .await
    }
}
