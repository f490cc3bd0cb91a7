//! Chromium renderer backend via chromiumoxide.
//!
//! Launched headless with a tall window so the first scroll cycles of a
//! harvest already have a screenful of feed in range before any lazy loading
//! fires. One `ChromiumContext` wraps one tab; the orchestrator opens one per
//! render attempt and closes it on every exit path.

use super::{NavigationResult, RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Viewport for harvesting runs. Height is deliberately oversized relative to
/// a desktop screen: more of the feed is in range per scroll step.
const WINDOW_SIZE: &str = "--window-size=1440,2400";

/// Locate a Chromium binary: the `FORAGER_CHROMIUM_PATH` override first, then
/// `PATH`, then the `~/.forager/chromium` managed install, then the default
/// macOS application bundle.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("FORAGER_CHROMIUM_PATH") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in [
        "chromium",
        "chromium-browser",
        "google-chrome",
        "google-chrome-stable",
        "chrome",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let managed = home.join(".forager").join("chromium");
        for rel in [
            "chrome-linux64/chrome",
            "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
            "chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
            "chrome",
        ] {
            let candidate = managed.join(rel);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    if cfg!(target_os = "macos") {
        let app = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if app.exists() {
            return Some(app);
        }
    }

    None
}

/// Headless Chromium behind the [`Renderer`] trait.
pub struct ChromiumRenderer {
    browser: Browser,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless instance configured for harvesting: no audio, no
    /// scrollbars polluting measured heights, no background chatter.
    pub async fn new() -> Result<Self> {
        let chrome_path = find_chromium()
            .context("no Chromium binary found; set FORAGER_CHROMIUM_PATH or install Chrome")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            .arg("--disable-background-networking")
            .arg(WINDOW_SIZE)
            .build()
            .map_err(|e| anyhow::anyhow!("browser config rejected: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launching headless Chromium")?;

        // The CDP event loop has to be pumped for the browser to make any
        // progress at all.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("opening a new tab")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        // The browser process is torn down when the renderer drops.
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// One tab of the launched browser.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        let budget = Duration::from_millis(timeout_ms);

        match tokio::time::timeout(budget, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!("navigation to {url} timed out after {timeout_ms}ms"),
        }

        // Let the load event settle, but only within whatever budget the
        // goto left over; a page that never fires it still renders.
        let leftover = budget.saturating_sub(start.elapsed());
        let _ = tokio::time::timeout(leftover, self.page.wait_for_navigation()).await;

        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());

        Ok(NavigationResult {
            final_url,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("script evaluation failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("script result not convertible: {e:?}"))
    }

    async fn get_html(&self) -> Result<String> {
        self.page.content().await.context("reading rendered DOM")
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("reading tab URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_wins_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("chrome-binary");
        std::fs::write(&fake, b"").unwrap();
        std::env::set_var("FORAGER_CHROMIUM_PATH", &fake);
        assert_eq!(find_chromium(), Some(fake));
        std::env::remove_var("FORAGER_CHROMIUM_PATH");
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_navigate_scroll_and_measure() {
        let renderer = ChromiumRenderer::new()
            .await
            .expect("failed to create renderer");
        let mut ctx = renderer
            .new_context()
            .await
            .expect("failed to create context");

        let nav = ctx
            .navigate(
                "data:text/html,<h1>Front page</h1><a href='/story/1'>A headline long enough</a>",
                10000,
            )
            .await
            .expect("navigation failed");
        assert!(nav.load_time_ms < 10000);

        ctx.scroll_to(400).await.expect("scroll failed");
        let height = ctx.page_height().await.expect("height failed");
        assert!(height > 0);

        let html = ctx.get_html().await.expect("get_html failed");
        assert!(html.contains("Front page"));

        // No load-more control on this page
        let clicked = ctx
            .click_first("button.load-more")
            .await
            .expect("click failed");
        assert!(!clicked);

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);

        renderer.shutdown().await.expect("shutdown failed");
    }
}
