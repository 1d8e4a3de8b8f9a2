use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::PreviewResult;
use crate::html::{mjml_to_html, RenderOutput};

/// Distinct sources held before the render cache is cleared.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Turns compiled MJML into HTML. Implemented locally by [`LocalRenderer`];
/// a remote rendering endpoint plugs in behind the same trait.
#[async_trait]
pub trait RenderService: Send + Sync {
    async fn render(&self, mjml: &str) -> PreviewResult<Arc<RenderOutput>>;
}

#[async_trait]
impl<T: RenderService + ?Sized> RenderService for Arc<T> {
    async fn render(&self, mjml: &str) -> PreviewResult<Arc<RenderOutput>> {
        (**self).render(mjml).await
    }
}

/// In-process renderer. Compile output is byte-stable, so the MJML source
/// itself is the cache key.
pub struct LocalRenderer {
    cache: DashMap<String, Arc<RenderOutput>>,
    capacity: usize,
}

impl LocalRenderer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl Default for LocalRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderService for LocalRenderer {
    async fn render(&self, mjml: &str) -> PreviewResult<Arc<RenderOutput>> {
        if let Some(hit) = self.cache.get(mjml) {
            debug!(bytes = mjml.len(), "render cache hit");
            return Ok(Arc::clone(hit.value()));
        }
        let output = Arc::new(mjml_to_html(mjml)?);
        if self.cache.len() >= self.capacity {
            self.cache.clear();
        }
        self.cache.insert(mjml.to_string(), Arc::clone(&output));
        Ok(output)
    }
}
