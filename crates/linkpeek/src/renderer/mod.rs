//! Off-screen page rendering for the snapshot fallback.
//!
//! `Renderer` and `RenderSurface` abstract over the browser engine
//! (currently Chromium via chromiumoxide). `FallbackRenderer` drives one
//! load → settle → capture attempt on top of them.

pub mod chromium;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use crate::config::{ResolverConfig, Viewport};
use crate::types::{PreviewError, PreviewResult, RenderedSnapshot};

/// Result of a successful page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can open rendering surfaces.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a new off-screen surface (tab) of the given size.
    async fn new_surface(&self, viewport: Viewport) -> Result<Box<dyn RenderSurface>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open surfaces.
    fn active_surfaces(&self) -> usize;
}

/// A single off-screen surface.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Load `url`, resolving once the page signals load completion.
    /// An error is the load-failure signal.
    async fn load(&mut self, url: &Url) -> Result<LoadOutcome>;
    /// Capture the surface's current pixels as PNG.
    async fn capture_png(&self) -> Result<Vec<u8>>;
    /// Close this surface.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A renderer used when no browser is available. Every surface request
/// fails, so the fallback path resolves to nothing.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_surface(&self, _viewport: Viewport) -> Result<Box<dyn RenderSurface>> {
        Err(anyhow::anyhow!("browser not available, snapshot fallback disabled"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_surfaces(&self) -> usize {
        0
    }
}

/// Loads a page off-screen, waits for it to settle, captures it once.
#[derive(Clone)]
pub struct FallbackRenderer {
    renderer: Arc<dyn Renderer>,
    viewport: Viewport,
    settle_delay: Duration,
    deadline: Option<Duration>,
}

impl FallbackRenderer {
    pub fn new(renderer: Arc<dyn Renderer>, config: &ResolverConfig) -> Self {
        Self {
            renderer,
            viewport: config.viewport,
            settle_delay: config.settle_delay,
            deadline: config.render_deadline,
        }
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// Render `url` and capture a snapshot.
    ///
    /// No retry on load failure. The settle delay is a heuristic: pages still
    /// animating after it are captured mid-state. When a deadline is set, the
    /// whole attempt (surface creation included) must finish within it.
    pub async fn render_and_capture(&self, url: &Url) -> PreviewResult<RenderedSnapshot> {
        let deadline = self.deadline.map(|d| Instant::now() + d);

        let surface = self
            .within(deadline, async {
                self.renderer
                    .new_surface(self.viewport)
                    .await
                    .map_err(|e| PreviewError::Renderer(format!("{e:#}")))
            })
            .await?;
        let mut guard = SurfaceGuard(Some(surface));

        let result = match guard.0.as_deref_mut() {
            Some(surface) => {
                self.within(deadline, self.load_settle_capture(surface, url))
                    .await
            }
            None => Err(PreviewError::Renderer("render surface already closed".into())),
        };

        guard.close(url).await;
        result
    }

    async fn load_settle_capture(
        &self,
        surface: &mut dyn RenderSurface,
        url: &Url,
    ) -> PreviewResult<RenderedSnapshot> {
        let outcome = surface
            .load(url)
            .await
            .map_err(|e| PreviewError::RenderLoad(format!("{e:#}")))?;
        tracing::debug!(
            url = %url,
            final_url = %outcome.final_url,
            load_time_ms = outcome.load_time_ms,
            settle_ms = self.settle_delay.as_millis() as u64,
            "render.loaded"
        );

        tokio::time::sleep(self.settle_delay).await;

        let png = surface
            .capture_png()
            .await
            .map_err(|e| PreviewError::Capture(format!("{e:#}")))?;
        RenderedSnapshot::from_png(url.clone(), png)
    }

    async fn within<T>(
        &self,
        deadline: Option<Instant>,
        fut: impl std::future::Future<Output = PreviewResult<T>>,
    ) -> PreviewResult<T> {
        match (deadline, self.deadline) {
            (Some(at), Some(limit)) => tokio::time::timeout_at(at, fut)
                .await
                .unwrap_or_else(|_| Err(PreviewError::RenderTimeout(limit))),
            _ => fut.await,
        }
    }
}

/// Owns a surface for one attempt. Closes it on drop when the attempt is
/// abandoned before reaching [`SurfaceGuard::close`] (task abort).
struct SurfaceGuard(Option<Box<dyn RenderSurface>>);

impl SurfaceGuard {
    async fn close(mut self, url: &Url) {
        if let Some(surface) = self.0.take() {
            if let Err(e) = surface.close().await {
                tracing::debug!(url = %url, "closing render surface failed: {e:#}");
            }
        }
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        let Some(surface) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = surface.close().await {
                        tracing::debug!("closing abandoned render surface failed: {e:#}");
                    }
                });
            }
            Err(_) => tracing::debug!("no runtime to close abandoned render surface"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png() -> Vec<u8> {
        crate::snapshot::encode_png(&image::DynamicImage::new_rgb8(8, 8)).unwrap()
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ok,
        FailLoad,
        Hang,
    }

    struct FakeRenderer {
        behaviour: Behaviour,
        captures: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    struct FakeSurface {
        behaviour: Behaviour,
        captures: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn new_surface(&self, _viewport: Viewport) -> Result<Box<dyn RenderSurface>> {
            Ok(Box::new(FakeSurface {
                behaviour: self.behaviour,
                captures: Arc::clone(&self.captures),
                closed: Arc::clone(&self.closed),
            }))
        }
        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
        fn active_surfaces(&self) -> usize {
            0
        }
    }

    #[async_trait]
    impl RenderSurface for FakeSurface {
        async fn load(&mut self, url: &Url) -> Result<LoadOutcome> {
            match self.behaviour {
                Behaviour::Ok => Ok(LoadOutcome {
                    final_url: url.to_string(),
                    load_time_ms: 1,
                }),
                Behaviour::FailLoad => Err(anyhow::anyhow!("net::ERR_NAME_NOT_RESOLVED")),
                Behaviour::Hang => futures::future::pending().await,
            }
        }
        async fn capture_png(&self) -> Result<Vec<u8>> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            Ok(png())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fallback(
        behaviour: Behaviour,
        deadline: Option<Duration>,
    ) -> (FallbackRenderer, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let captures = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let renderer = Arc::new(FakeRenderer {
            behaviour,
            captures: Arc::clone(&captures),
            closed: Arc::clone(&closed),
        });
        let config = ResolverConfig {
            settle_delay: Duration::from_millis(10),
            render_deadline: deadline,
            ..Default::default()
        };
        (FallbackRenderer::new(renderer, &config), captures, closed)
    }

    fn url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[tokio::test]
    async fn test_captures_exactly_once() {
        let (fb, captures, closed) = fallback(Behaviour::Ok, None);
        let snap = fb.render_and_capture(&url()).await.unwrap();
        assert_eq!((snap.width, snap.height), (8, 8));
        assert_eq!(snap.source_url, url());
        assert_eq!(captures.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_failure_produces_no_capture() {
        let (fb, captures, closed) = fallback(Behaviour::FailLoad, None);
        let err = fb.render_and_capture(&url()).await.unwrap_err();
        assert!(matches!(err, PreviewError::RenderLoad(_)));
        assert_eq!(captures.load(Ordering::SeqCst), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_bounds_hanging_load() {
        let (fb, captures, closed) =
            fallback(Behaviour::Hang, Some(Duration::from_millis(50)));
        let err = fb.render_and_capture(&url()).await.unwrap_err();
        assert!(matches!(err, PreviewError::RenderTimeout(_)));
        assert_eq!(captures.load(Ordering::SeqCst), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_attempt_still_closes_surface() {
        let (fb, captures, closed) = fallback(Behaviour::Hang, None);
        let target = url();
        let attempt = tokio::time::timeout(
            Duration::from_millis(50),
            fb.render_and_capture(&target),
        );
        assert!(attempt.await.is_err());

        for _ in 0..100 {
            if closed.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(captures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_noop_renderer_fails_fast() {
        let config = ResolverConfig::default();
        let fb = FallbackRenderer::new(Arc::new(NoopRenderer), &config);
        let err = fb.render_and_capture(&url()).await.unwrap_err();
        assert!(matches!(err, PreviewError::Renderer(_)));
    }
}
