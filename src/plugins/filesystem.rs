use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::{FILESYSTEM_PLATFORM, FilesystemConfig, ProjectConfig};
use crate::content::{Content, PublishOutcome};
use crate::error::{PressError, Result};
use crate::registry::PublisherPlugin;

const MEDIA_DIR: &str = "media";

/// Writes each article as `<slug>.md` with a front-matter header. A slug that
/// is already taken gets a `-2`, `-3`, ... suffix; existing files are never
/// overwritten.
pub struct FilesystemPlugin {
    directory: PathBuf,
}

impl FilesystemPlugin {
    pub fn new(config: FilesystemConfig) -> Self {
        Self {
            directory: config.directory,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Lowercase slug of the title's letters and digits, in any script; runs of
/// other characters collapse into one `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}

fn quoted(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn quoted_list(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| quoted(v)).collect();
    format!("[{}]", items.join(", "))
}

/// Front matter followed by the body and any media as markdown images.
pub fn render_markdown(content: &Content, project: &ProjectConfig) -> String {
    let mut out = String::from("---\n");
    out.push_str(&format!("title: {}\n", quoted(&content.title)));
    out.push_str(&format!("project: {}\n", quoted(&project.id)));
    if let Some(date) = content.metadata.publish_date {
        out.push_str(&format!("date: {}\n", date.to_rfc3339()));
    }
    out.push_str(&format!("tags: {}\n", quoted_list(&content.metadata.tags)));
    out.push_str(&format!(
        "categories: {}\n",
        quoted_list(&content.metadata.categories)
    ));
    for (key, value) in &content.metadata.custom {
        out.push_str(&format!("{key}: {value}\n"));
    }
    out.push_str("---\n\n");
    out.push_str(content.body.trim_end());
    out.push('\n');

    for media in &content.media {
        out.push_str(&format!("\n![{}]({})\n", media.alt, media.url));
        if let Some(caption) = &media.caption {
            out.push_str(&format!("*{caption}*\n"));
        }
    }
    out
}

/// Creates `<slug>.md`, or the first free `<slug>-N.md`.
async fn create_unique(directory: &Path, slug: &str) -> Result<(PathBuf, tokio::fs::File)> {
    let mut n = 1u32;
    loop {
        let name = if n == 1 {
            format!("{slug}.md")
        } else {
            format!("{slug}-{n}.md")
        };
        let path = directory.join(name);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "slug taken, trying next suffix");
                n += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[async_trait]
impl PublisherPlugin for FilesystemPlugin {
    fn platform(&self) -> &str {
        FILESYSTEM_PLATFORM
    }

    async fn authenticate(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|err| PressError::Authentication {
                platform: FILESYSTEM_PLATFORM.to_string(),
                message: format!("{} is not writable: {err}", self.directory.display()),
            })
    }

    async fn publish(&self, content: &Content, project: &ProjectConfig) -> Result<PublishOutcome> {
        let (path, mut file) = create_unique(&self.directory, &slugify(&content.title)).await?;
        file.write_all(render_markdown(content, project).as_bytes()).await?;
        file.flush().await?;
        info!(path = %path.display(), "article written");
        Ok(PublishOutcome::published(path.display().to_string()))
    }

    async fn upload_media(
        &self,
        buffer: Vec<u8>,
        filename: &str,
        _content_type: &str,
    ) -> Result<Option<String>> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| PressError::Config(format!("invalid media filename '{filename}'")))?;
        let dir = self.directory.join(MEDIA_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(name), buffer).await?;
        Ok(Some(format!("{MEDIA_DIR}/{}", name.to_string_lossy())))
    }
}
