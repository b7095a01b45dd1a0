//! Chromium-based renderer using chromiumoxide.

use super::{LoadOutcome, RenderSurface, Renderer};
use crate::config::Viewport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

/// Headless Chromium renderer. One browser process, one tab per surface.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium from `executable`.
    ///
    /// `window` sizes the browser window; each surface additionally sets its
    /// own device metrics from the viewport it is opened with.
    pub async fn launch(executable: PathBuf, window: Viewport) -> Result<Self> {
        let config = BrowserConfig::builder()
            .chrome_executable(executable)
            .window_size(window.width, window.height)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("chromium handler event error: {e}");
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_surface(&self, viewport: Viewport) -> Result<Box<dyn RenderSurface>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        // Counted and owned from here on, so an error or an abandoned call
        // below still closes the tab on drop.
        self.active_count.fetch_add(1, Ordering::Relaxed);
        let surface = ChromiumSurface {
            page: Some(page),
            active_count: Arc::clone(&self.active_count),
        };

        surface
            .page()?
            .execute(SetDeviceMetricsOverrideParams::new(
                viewport.width as i64,
                viewport.height as i64,
                1.0,
                false,
            ))
            .await
            .context("failed to size render surface")?;

        Ok(Box::new(surface))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close Chromium")?;
        if let Err(e) = browser.wait().await {
            tracing::debug!("waiting for Chromium to exit failed: {e}");
        }
        self.handler.abort();
        Ok(())
    }

    fn active_surfaces(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium tab used as an off-screen surface.
///
/// Closing is idempotent: whichever of [`RenderSurface::close`] or `Drop`
/// runs first closes the tab and releases the count.
pub struct ChromiumSurface {
    page: Option<Page>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumSurface {
    fn page(&self) -> Result<&Page> {
        self.page.as_ref().context("render surface already closed")
    }

    fn release(&mut self) -> Option<Page> {
        let page = self.page.take()?;
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        Some(page)
    }
}

#[async_trait]
impl RenderSurface for ChromiumSurface {
    async fn load(&mut self, url: &Url) -> Result<LoadOutcome> {
        let start = Instant::now();
        let page = self.page()?;

        // goto resolves once the navigation has committed and loaded; a
        // network or navigation error is the load-failure signal.
        page.goto(url.as_str())
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        if let Err(e) = page.wait_for_navigation().await {
            tracing::debug!(url = %url, "waiting for navigation failed: {e}");
        }

        let final_url = page
            .url()
            .await
            .unwrap_or_default()
            .unwrap_or_else(|| url.to_string());

        Ok(LoadOutcome {
            final_url,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn capture_png(&self) -> Result<Vec<u8>> {
        self.page()?
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .context("screenshot failed")
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        if let Some(page) = self.release() {
            page.close().await.context("failed to close tab")?;
        }
        Ok(())
    }
}

impl Drop for ChromiumSurface {
    fn drop(&mut self) {
        let Some(page) = self.release() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::debug!("closing dropped tab failed: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chromium_from_env() -> Option<PathBuf> {
        std::env::var("LINKPEEK_CHROMIUM_PATH").ok().map(PathBuf::from)
    }

    #[tokio::test]
    #[ignore] // Requires Chromium (LINKPEEK_CHROMIUM_PATH)
    async fn test_chromium_load_and_capture() {
        let path = chromium_from_env().expect("LINKPEEK_CHROMIUM_PATH not set");
        let viewport = Viewport {
            width: 320,
            height: 240,
        };
        let renderer = ChromiumRenderer::launch(path, viewport)
            .await
            .expect("failed to launch renderer");
        let mut surface = renderer
            .new_surface(viewport)
            .await
            .expect("failed to create surface");
        assert_eq!(renderer.active_surfaces(), 1);

        let url = Url::parse("data:text/html,<h1 style='color:red'>Hello</h1>").unwrap();
        let outcome = surface.load(&url).await.expect("load failed");
        assert!(outcome.load_time_ms < 10_000);

        let png = surface.capture_png().await.expect("capture failed");
        let snap = crate::types::RenderedSnapshot::from_png(url, png).unwrap();
        assert_eq!((snap.width, snap.height), (320, 240));

        surface.close().await.expect("close failed");
        assert_eq!(renderer.active_surfaces(), 0);
        renderer.shutdown().await.expect("shutdown failed");
    }
}
