//! Debounced live preview.
//!
//! Every edit or sample-data change calls [`PreviewSession::request`] with an
//! immutable tree snapshot. A request that is superseded while it waits out
//! the debounce window is dropped without compiling. In-flight renders are
//! never aborted; a response is published only when nothing newer has been
//! published already, so the last request wins.

use mailcraft_blocks::BlockTree;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{PreviewError, PreviewResult};
use crate::pipeline::{CompileResponse, PreviewPipeline, SampleData};
use crate::service::RenderService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub debounce_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { debounce_ms: 400 }
    }
}

impl PreviewConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// A published preview and the request it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub seq: u64,
    pub response: CompileResponse,
}

/// What became of a preview request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Published,
    /// A newer request arrived during the debounce window.
    Superseded,
    /// Rendered, but a newer response was already showing.
    Stale,
}

pub struct PreviewTicket {
    pub seq: u64,
    handle: JoinHandle<Outcome>,
}

impl PreviewTicket {
    pub async fn wait(self) -> PreviewResult<Outcome> {
        self.handle
            .await
            .map_err(|e| PreviewError::Service(format!("preview task failed: {e}")))
    }
}

pub struct PreviewSession<R> {
    pipeline: Arc<PreviewPipeline<R>>,
    debounce: Duration,
    latest_request: Arc<AtomicU64>,
    published: Arc<watch::Sender<Option<Arc<Preview>>>>,
}

impl<R: RenderService + 'static> PreviewSession<R> {
    pub fn new(pipeline: PreviewPipeline<R>, config: &PreviewConfig) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            pipeline: Arc::new(pipeline),
            debounce: config.debounce(),
            latest_request: Arc::new(AtomicU64::new(0)),
            published: Arc::new(published),
        }
    }

    pub fn pipeline(&self) -> &Arc<PreviewPipeline<R>> {
        &self.pipeline
    }

    /// Queue a preview of `tree` with the editor's raw sample-data text.
    /// Must be called within a Tokio runtime.
    pub fn request(&self, tree: Arc<BlockTree>, sample_text: &str) -> PreviewTicket {
        let seq = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
        let sample = SampleData::from_text(sample_text);
        let pipeline = Arc::clone(&self.pipeline);
        let latest_request = Arc::clone(&self.latest_request);
        let published = Arc::clone(&self.published);
        let debounce = self.debounce;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if latest_request.load(Ordering::SeqCst) != seq {
                debug!(seq, "preview request superseded");
                return Outcome::Superseded;
            }

            let response = pipeline.compile(&tree, &sample).await;
            let fresh = published.send_if_modified(|current| {
                if current.as_ref().is_some_and(|p| p.seq > seq) {
                    return false;
                }
                *current = Some(Arc::new(Preview { seq, response }));
                true
            });
            if fresh {
                debug!(seq, "preview published");
                Outcome::Published
            } else {
                debug!(seq, "discarding stale preview response");
                Outcome::Stale
            }
        });

        PreviewTicket { seq, handle }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Preview>>> {
        self.published.subscribe()
    }

    pub fn latest(&self) -> Option<Arc<Preview>> {
        self.published.borrow().clone()
    }

    /// Sequence number of the most recent request.
    pub fn latest_request(&self) -> u64 {
        self.latest_request.load(Ordering::SeqCst)
    }
}
