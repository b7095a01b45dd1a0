//! Resolution orchestrator.
//!
//! ```text
//! Idle → Fetching → ExtractingMetadata → Done(metadata)
//!          ↘                 ↘
//!           RenderingFallback → Done(snapshot) | Done(nothing)
//! ```
//!
//! One request produces exactly one [`Completion`]. Requests are independent:
//! dispatching a new one never cancels an in-flight one.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::config::ResolverConfig;
use crate::fetch::{FetchRequest, Fetcher};
use crate::opengraph::{self, Extraction};
use crate::renderer::{FallbackRenderer, Renderer};
use crate::types::{
    Completion, FailureKind, PreviewError, PreviewRequest, PreviewResult, RenderedSnapshot,
    Resolution,
};

/// Pipeline state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Idle,
    Fetching,
    ExtractingMetadata,
    RenderingFallback,
    Done,
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionState::Idle => "idle",
            ResolutionState::Fetching => "fetching",
            ResolutionState::ExtractingMetadata => "extracting_metadata",
            ResolutionState::RenderingFallback => "rendering_fallback",
            ResolutionState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Drives fetch → extract → fallback render for one URL at a time.
///
/// Holds no per-request state, so one `Resolver` (usually behind an `Arc`)
/// serves any number of concurrent requests.
pub struct Resolver {
    fetcher: Fetcher,
    fallback: FallbackRenderer,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(fetcher: Fetcher, renderer: Arc<dyn Renderer>, config: ResolverConfig) -> Self {
        let fallback = FallbackRenderer::new(renderer, &config);
        Self {
            fetcher,
            fallback,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        self.fallback.renderer()
    }

    /// Start resolving the request's link on the Tokio runtime.
    ///
    /// Returns `None` and starts nothing when there is no link or metadata is
    /// disabled. Otherwise the completion is sent on `reply` exactly once,
    /// unless the returned handle is cancelled first, in which case `reply`
    /// is dropped unsent.
    pub fn dispatch(
        self: &Arc<Self>,
        request: PreviewRequest,
        reply: oneshot::Sender<Completion>,
    ) -> Option<ResolutionHandle> {
        let Some(url) = request.target().cloned() else {
            tracing::debug!(
                has_link = request.link.is_some(),
                metadata_enabled = request.metadata_enabled,
                "no link found or metadata disabled"
            );
            return None;
        };

        let id = Uuid::new_v4();
        let resolver = Arc::clone(self);
        let task = tokio::spawn(async move {
            let completion = resolver.resolve_with_id(id, &url).await;
            if reply.send(completion).is_err() {
                tracing::debug!(request_id = %id, "completion receiver dropped");
            }
        });

        Some(ResolutionHandle { id, task })
    }

    /// Run the whole pipeline for `url` and return its completion.
    pub async fn resolve(&self, url: &Url) -> Completion {
        self.resolve_with_id(Uuid::new_v4(), url).await
    }

    async fn resolve_with_id(&self, request_id: Uuid, url: &Url) -> Completion {
        let span = tracing::info_span!("resolve", %request_id, url = %url);
        self.run(request_id, url).instrument(span).await
    }

    async fn run(&self, request_id: Uuid, url: &Url) -> Completion {
        let started = Instant::now();
        enter(ResolutionState::Idle);

        let (resolution, fallback_cause, render_failure) = match self.metadata(url).await {
            Ok(Extraction { metadata, .. })
                if metadata.has_image() || !self.config.render_on_missing_image =>
            {
                (Resolution::Metadata(metadata), None, None)
            }
            Ok(Extraction {
                metadata,
                image_error,
            }) => {
                // A present but unusable og:image is reported as such.
                let cause = image_error.map_or(FailureKind::MissingImage, |e| e.kind());
                enter(ResolutionState::RenderingFallback);
                match self.render(url).await {
                    Ok(snapshot) => (
                        Resolution::MetadataWithSnapshot { metadata, snapshot },
                        Some(cause),
                        None,
                    ),
                    Err(kind) => (Resolution::Metadata(metadata), Some(cause), Some(kind)),
                }
            }
            Err(e) => {
                let cause = e.kind();
                tracing::warn!(url = %url, cause = %cause, "metadata unavailable: {e}");
                enter(ResolutionState::RenderingFallback);
                match self.render(url).await {
                    Ok(snapshot) => (Resolution::Snapshot(snapshot), Some(cause), None),
                    Err(kind) => (Resolution::Nothing, Some(cause), Some(kind)),
                }
            }
        };

        enter(ResolutionState::Done);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            url = %url,
            elapsed_ms,
            fallback_cause = ?fallback_cause,
            render_failure = ?render_failure,
            "resolution.complete"
        );

        Completion {
            request_id,
            url: url.clone(),
            resolution,
            fallback_cause,
            render_failure,
            elapsed_ms,
        }
    }

    async fn metadata(&self, url: &Url) -> PreviewResult<Extraction> {
        enter(ResolutionState::Fetching);
        let request = FetchRequest::from_config(url.clone(), &self.config);
        let body = self.fetcher.try_fetch(&request).await?;

        enter(ResolutionState::ExtractingMetadata);
        opengraph::extract_detailed(&body, self.config.decoding).ok_or(PreviewError::Parse)
    }

    async fn render(&self, url: &Url) -> Result<RenderedSnapshot, FailureKind> {
        self.fallback.render_and_capture(url).await.map_err(|e| {
            tracing::warn!(url = %url, "fallback render failed: {e}");
            e.kind()
        })
    }
}

fn enter(state: ResolutionState) {
    tracing::debug!(state = %state, "resolution.state");
}

/// Handle to a dispatched resolution.
#[derive(Debug)]
pub struct ResolutionHandle {
    id: Uuid,
    task: JoinHandle<()>,
}

impl ResolutionHandle {
    /// The `request_id` the eventual [`Completion`] will carry.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Abort the resolution. No completion is delivered afterwards.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end. Errs if it was cancelled.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}
