//! Adapter registry: resolves a project's platform to a live, authenticated
//! [`PublisherPlugin`] and caches it per `(platform, project)`.
//!
//! Plugins are made available through an explicit registration table filled
//! at startup. An unknown platform is always an error; there is no default
//! plugin.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ProjectConfig;
use crate::content::{Content, PublishOutcome};
use crate::error::{ErrorKind, PressError, Result};

/// Contract every publishing backend implements.
#[async_trait]
pub trait PublisherPlugin: Send + Sync {
    /// Identifier this plugin is registered under.
    fn platform(&self) -> &str;

    /// Verifies credentials. Called once before the instance is cached.
    async fn authenticate(&self) -> Result<()>;

    async fn publish(&self, content: &Content, project: &ProjectConfig) -> Result<PublishOutcome>;

    /// Stores a media file on the platform and returns its URL.
    ///
    /// `Ok(None)` means the platform does not host media.
    async fn upload_media(
        &self,
        _buffer: Vec<u8>,
        _filename: &str,
        _content_type: &str,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Builds an unauthenticated plugin instance for one project.
pub type PluginFactory =
    Arc<dyn Fn(&ProjectConfig) -> Result<Arc<dyn PublisherPlugin>> + Send + Sync>;

type CacheKey = (String, String);

#[derive(Default)]
pub struct AdapterRegistry {
    factories: HashMap<String, PluginFactory>,
    cache: RwLock<HashMap<CacheKey, Arc<dyn PublisherPlugin>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the factory for `platform`.
    pub fn register<F>(&mut self, platform: impl Into<String>, factory: F)
    where
        F: Fn(&ProjectConfig) -> Result<Arc<dyn PublisherPlugin>> + Send + Sync + 'static,
    {
        let platform = platform.into();
        debug!(platform = %platform, "registering publisher plugin");
        self.factories.insert(platform, Arc::new(factory));
    }

    pub fn exists(&self, platform: &str) -> bool {
        self.factories.contains_key(platform)
    }

    pub fn platforms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the cached plugin for the project, constructing and
    /// authenticating one on first use.
    pub async fn get_adapter(&self, project: &ProjectConfig) -> Result<Arc<dyn PublisherPlugin>> {
        let platform = project.platform_id();
        let key = (platform.to_string(), project.id.clone());

        {
            let cache = self.cache.read().await;
            if let Some(plugin) = cache.get(&key) {
                debug!(platform, project_id = %project.id, "using cached adapter");
                return Ok(Arc::clone(plugin));
            }
        }

        let factory = self
            .factories
            .get(platform)
            .ok_or_else(|| PressError::AdapterNotFound(platform.to_string()))?;
        let plugin = factory(project)?;

        plugin.authenticate().await.map_err(|err| match err {
            PressError::Authentication { .. } => err,
            other if other.kind() == ErrorKind::Transient => other,
            other => PressError::Authentication {
                platform: platform.to_string(),
                message: other.to_string(),
            },
        })?;

        let mut cache = self.cache.write().await;
        let plugin = Arc::clone(cache.entry(key).or_insert(plugin));
        info!(platform, project_id = %project.id, "adapter authenticated and cached");
        Ok(plugin)
    }

    /// Drops every cached instance; the next lookup re-authenticates.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let dropped = cache.len();
        cache.clear();
        info!(dropped, "adapter cache cleared");
    }

    /// Drops the cached instance for one project, if any.
    pub async fn evict(&self, platform: &str, project_id: &str) -> bool {
        let removed = self
            .cache
            .write()
            .await
            .remove(&(platform.to_string(), project_id.to_string()))
            .is_some();
        if removed {
            debug!(platform, project_id, "adapter evicted");
        }
        removed
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomPlatformConfig, PlatformConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Auth {
        Accept,
        Reject,
        TimeOut,
    }

    struct CountingPlugin {
        auths: Arc<AtomicUsize>,
        mode: Auth,
    }

    #[async_trait]
    impl PublisherPlugin for CountingPlugin {
        fn platform(&self) -> &str {
            "counting"
        }

        async fn authenticate(&self) -> Result<()> {
            self.auths.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Auth::Accept => Ok(()),
                Auth::Reject => Err(PressError::Status {
                    service: "counting".into(),
                    status: 401,
                    message: "bad token".into(),
                }),
                Auth::TimeOut => Err(PressError::Timeout {
                    operation: "auth".into(),
                    after: std::time::Duration::from_secs(1),
                }),
            }
        }

        async fn publish(&self, _c: &Content, _p: &ProjectConfig) -> Result<PublishOutcome> {
            Ok(PublishOutcome::published("https://example.test/post"))
        }
    }

    fn project(id: &str, platform: &str) -> ProjectConfig {
        ProjectConfig::new(
            id,
            PlatformConfig::Custom(CustomPlatformConfig {
                platform: platform.into(),
                endpoints: Default::default(),
                auth: Default::default(),
                params: Default::default(),
            }),
        )
    }

    fn registry_with(auths: Arc<AtomicUsize>, mode: Auth) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register("counting", move |_project: &ProjectConfig| {
            Ok(Arc::new(CountingPlugin {
                auths: Arc::clone(&auths),
                mode,
            }) as Arc<dyn PublisherPlugin>)
        });
        registry
    }

    #[tokio::test]
    async fn same_key_returns_identical_instance() {
        let auths = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(Arc::clone(&auths), Auth::Accept);
        let a = registry.get_adapter(&project("blog", "counting")).await.unwrap();
        let b = registry.get_adapter(&project("blog", "counting")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(auths.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn projects_get_separate_instances() {
        let auths = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(Arc::clone(&auths), Auth::Accept);
        let a = registry.get_adapter(&project("blog", "counting")).await.unwrap();
        let b = registry.get_adapter(&project("shop", "counting")).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.cached_len().await, 2);
    }

    #[tokio::test]
    async fn clear_forces_new_authenticated_instance() {
        let auths = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(Arc::clone(&auths), Auth::Accept);
        let a = registry.get_adapter(&project("blog", "counting")).await.unwrap();
        registry.clear().await;
        let b = registry.get_adapter(&project("blog", "counting")).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(auths.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn evict_only_drops_one_key() {
        let auths = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(Arc::clone(&auths), Auth::Accept);
        registry.get_adapter(&project("blog", "counting")).await.unwrap();
        let shop = registry.get_adapter(&project("shop", "counting")).await.unwrap();

        assert!(registry.evict("counting", "blog").await);
        assert!(!registry.evict("counting", "blog").await);
        let again = registry.get_adapter(&project("shop", "counting")).await.unwrap();
        assert!(Arc::ptr_eq(&shop, &again));
        assert_eq!(registry.cached_len().await, 1);
    }

    #[tokio::test]
    async fn unknown_platform_is_adapter_not_found() {
        let registry = registry_with(Arc::new(AtomicUsize::new(0)), Auth::Accept);
        assert!(!registry.exists("unknown-platform"));
        let err = match registry.get_adapter(&project("blog", "unknown-platform")).await {
            Err(err) => err,
            Ok(_) => panic!("expected adapter lookup to fail"),
        };
        assert!(matches!(err, PressError::AdapterNotFound(ref p) if p == "unknown-platform"));
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn rejected_credentials_become_fatal_and_are_not_cached() {
        let auths = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(Arc::clone(&auths), Auth::Reject);
        let err = match registry.get_adapter(&project("blog", "counting")).await {
            Err(err) => err,
            Ok(_) => panic!("expected authentication to fail"),
        };
        assert!(matches!(err, PressError::Authentication { .. }));
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(registry.cached_len().await, 0);
    }

    #[tokio::test]
    async fn transient_auth_failure_keeps_its_kind() {
        let registry = registry_with(Arc::new(AtomicUsize::new(0)), Auth::TimeOut);
        let err = match registry.get_adapter(&project("blog", "counting")).await {
            Err(err) => err,
            Ok(_) => panic!("expected authentication to fail"),
        };
        assert!(matches!(err, PressError::Timeout { .. }));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn platforms_are_listed_sorted() {
        let mut registry = AdapterRegistry::new();
        registry.register("zeta", |_p: &ProjectConfig| Err(PressError::Cancelled));
        registry.register("alpha", |_p: &ProjectConfig| Err(PressError::Cancelled));
        assert_eq!(registry.platforms(), vec!["alpha", "zeta"]);
        assert!(registry.exists("zeta"));
    }
}
