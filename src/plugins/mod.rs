//! Built-in publisher plugins.

mod filesystem;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{FILESYSTEM_PLATFORM, PlatformConfig, ProjectConfig, WEBHOOK_PLATFORM};
use crate::error::{PressError, Result};
use crate::registry::{AdapterRegistry, PublisherPlugin};

pub use filesystem::{FilesystemPlugin, render_markdown, slugify};
pub use webhook::WebhookPlugin;

fn mismatch(project: &ProjectConfig, expected: &str) -> PressError {
    PressError::Config(format!(
        "project '{}' is configured for '{}', not '{expected}'",
        project.id,
        project.platform_id()
    ))
}

/// Adds the `webhook` and `filesystem` plugins to the registration table.
pub fn register_builtin(registry: &mut AdapterRegistry, timeout: Duration) {
    registry.register(WEBHOOK_PLATFORM, move |project: &ProjectConfig| {
        let PlatformConfig::Webhook(config) = &project.platform else {
            return Err(mismatch(project, WEBHOOK_PLATFORM));
        };
        let plugin: Arc<dyn PublisherPlugin> = Arc::new(WebhookPlugin::new(config.clone(), timeout)?);
        Ok(plugin)
    });

    registry.register(FILESYSTEM_PLATFORM, |project: &ProjectConfig| -> Result<Arc<dyn PublisherPlugin>> {
        let PlatformConfig::Filesystem(config) = &project.platform else {
            return Err(mismatch(project, FILESYSTEM_PLATFORM));
        };
        Ok(Arc::new(FilesystemPlugin::new(config.clone())))
    });
}
