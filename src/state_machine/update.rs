use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{Content, WorkItem, WorkStatus};

/// Partial set of fields to persist for a work item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    /// `Some(None)` clears the stored error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_url: Option<String>,
}

impl ItemUpdate {
    pub fn status(status: WorkStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, item: &mut WorkItem) {
        if let Some(status) = self.status {
            item.status = status;
        }
        if let Some(retry_count) = self.retry_count {
            item.retry_count = retry_count;
        }
        if let Some(scheduled_for) = self.scheduled_for {
            item.scheduled_for = scheduled_for;
        }
        if let Some(last_error) = &self.last_error {
            item.last_error = last_error.clone();
        }
        if let Some(content) = &self.final_content {
            item.final_content = Some(content.clone());
        }
        if let Some(url) = &self.published_url {
            item.published_url = Some(url.clone());
        }
    }
}
