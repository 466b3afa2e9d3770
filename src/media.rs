//! Media enrichment: attach images to produced content.
//!
//! Every failure in here is tolerated. The worst case is an article without
//! images.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::MediaSettings;
use crate::content::{Content, MediaItem};
use crate::error::Result;
use crate::services::{BlobStore, ImageHit, ImageSource};

pub struct MediaEnricher {
    images: Arc<dyn ImageSource>,
    blobs: Option<Arc<dyn BlobStore>>,
    settings: MediaSettings,
}

impl MediaEnricher {
    pub fn new(images: Arc<dyn ImageSource>, settings: MediaSettings) -> Self {
        Self {
            images,
            blobs: None,
            settings,
        }
    }

    /// Re-hosts images whose source URL is not permanent.
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled && self.settings.images_per_item > 0
    }

    /// Appends up to `images_per_item` images to `content` and returns how
    /// many were added.
    pub async fn enrich(&self, content: &mut Content, query: &str) -> usize {
        if !self.enabled() {
            return 0;
        }

        let hits = match self.images.search(query, self.settings.images_per_item).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(query, error = %err, "image search failed, continuing without media");
                return 0;
            }
        };
        if hits.is_empty() {
            debug!(query, "no images found");
        }

        let mut added = 0;
        for (index, hit) in hits
            .into_iter()
            .take(self.settings.images_per_item)
            .enumerate()
        {
            match self.resolve(&hit, query, index).await {
                Ok(Some(url)) => {
                    content.media.push(MediaItem {
                        url,
                        alt: hit.alt,
                        caption: hit.caption,
                    });
                    added += 1;
                }
                Ok(None) => {
                    debug!(url = %hit.url, "image is not permanent and no blob store is configured");
                }
                Err(err) => warn!(url = %hit.url, error = %err, "image skipped"),
            }
        }
        added
    }

    async fn resolve(&self, hit: &ImageHit, query: &str, index: usize) -> Result<Option<String>> {
        if hit.permanent {
            return Ok(Some(hit.url.clone()));
        }
        let Some(blobs) = &self.blobs else {
            return Ok(None);
        };
        let (buffer, content_type) = self.images.download(hit).await?;
        let filename = format!(
            "{}-{}.{}",
            crate::plugins::slugify(query),
            index + 1,
            extension_for(&content_type)
        );
        blobs.upload(buffer, &filename, &content_type).await.map(Some)
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type.split(';').next().unwrap_or_default().trim() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PressError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticImages {
        hits: Vec<ImageHit>,
        fail_search: bool,
    }

    #[async_trait]
    impl ImageSource for StaticImages {
        async fn search(&self, _query: &str, count: usize) -> Result<Vec<ImageHit>> {
            if self.fail_search {
                return Err(PressError::Status {
                    service: "images".into(),
                    status: 500,
                    message: "down".into(),
                });
            }
            Ok(self.hits.iter().take(count).cloned().collect())
        }

        async fn download(&self, image: &ImageHit) -> Result<(Vec<u8>, String)> {
            if image.url.contains("broken") {
                return Err(PressError::Status {
                    service: "images".into(),
                    status: 404,
                    message: "gone".into(),
                });
            }
            Ok((vec![0xFF, 0xD8], "image/png".into()))
        }
    }

    #[derive(Default)]
    struct RecordingBlobs(Mutex<Vec<String>>);

    #[async_trait]
    impl BlobStore for RecordingBlobs {
        async fn upload(&self, _buffer: Vec<u8>, filename: &str, _ct: &str) -> Result<String> {
            self.0.lock().unwrap().push(filename.to_string());
            Ok(format!("https://cdn.example/{filename}"))
        }
    }

    fn hit(url: &str, permanent: bool) -> ImageHit {
        ImageHit {
            url: url.into(),
            alt: format!("alt for {url}"),
            caption: None,
            permanent,
        }
    }

    fn settings(images_per_item: usize) -> MediaSettings {
        MediaSettings {
            enabled: true,
            images_per_item,
        }
    }

    #[tokio::test]
    async fn permanent_images_are_embedded_directly() {
        let images = Arc::new(StaticImages {
            hits: vec![hit("https://img.example/a.jpg", true)],
            fail_search: false,
        });
        let mut content = Content::default();
        let added = MediaEnricher::new(images, settings(1))
            .enrich(&mut content, "compost")
            .await;
        assert_eq!(added, 1);
        assert_eq!(content.media[0].url, "https://img.example/a.jpg");
    }

    #[tokio::test]
    async fn temporary_images_are_rehosted() {
        let images = Arc::new(StaticImages {
            hits: vec![
                hit("https://tmp.example/a", false),
                hit("https://tmp.example/broken", false),
                hit("https://tmp.example/c", false),
            ],
            fail_search: false,
        });
        let blobs = Arc::new(RecordingBlobs::default());
        let mut content = Content::default();
        let added = MediaEnricher::new(images, settings(3))
            .with_blob_store(blobs.clone())
            .enrich(&mut content, "Compost Bins")
            .await;

        assert_eq!(added, 2);
        assert_eq!(
            *blobs.0.lock().unwrap(),
            vec!["compost-bins-1.png".to_string(), "compost-bins-3.png".to_string()]
        );
        assert_eq!(content.media[1].url, "https://cdn.example/compost-bins-3.png");
    }

    #[tokio::test]
    async fn temporary_images_without_blob_store_are_skipped() {
        let images = Arc::new(StaticImages {
            hits: vec![hit("https://tmp.example/a", false)],
            fail_search: false,
        });
        let mut content = Content::default();
        let added = MediaEnricher::new(images, settings(1))
            .enrich(&mut content, "compost")
            .await;
        assert_eq!(added, 0);
        assert!(content.media.is_empty());
    }

    #[tokio::test]
    async fn search_failure_is_tolerated() {
        let images = Arc::new(StaticImages {
            hits: vec![],
            fail_search: true,
        });
        let mut content = Content::default();
        let enricher = MediaEnricher::new(images, settings(2));
        assert_eq!(enricher.enrich(&mut content, "compost").await, 0);
    }

    #[tokio::test]
    async fn disabled_enricher_does_nothing() {
        let images = Arc::new(StaticImages {
            hits: vec![hit("https://img.example/a.jpg", true)],
            fail_search: false,
        });
        let mut content = Content::default();
        let enricher = MediaEnricher::new(
            images,
            MediaSettings {
                enabled: false,
                images_per_item: 3,
            },
        );
        assert_eq!(enricher.enrich(&mut content, "compost").await, 0);
        assert!(content.media.is_empty());
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(extension_for("image/png; charset=binary"), "png");
        assert_eq!(extension_for("application/octet-stream"), "jpg");
    }
}
