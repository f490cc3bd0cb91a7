//! Renderer abstraction for browser-based page retrieval.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over the
//! browser engine (currently Chromium via chromiumoxide). A context is a
//! stateful, single-navigation resource: one harvest owns one context, drives
//! it sequentially, and closes it on every exit path. The navigation
//! controller's scroll/click/measure needs are met by default methods built
//! on `execute_js`, so test doubles only have to script the JS surface.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;

    /// Scroll the viewport to a vertical offset in pixels.
    async fn scroll_to(&self, y: u64) -> Result<()> {
        self.execute_js(&format!("window.scrollTo(0, {y})")).await?;
        Ok(())
    }

    /// Measured scrollable height of the page in pixels.
    async fn page_height(&self) -> Result<u64> {
        let value = self
            .execute_js("document.body ? document.body.scrollHeight : 0")
            .await?;
        Ok(value.as_u64().unwrap_or(0))
    }

    /// Click the first element matching `selector` if present and visible.
    /// Returns whether anything was clicked.
    async fn click_first(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ \
               const el = document.querySelector({sel:?}); \
               if (!el || el.disabled) return false; \
               el.click(); \
               return true; \
             }})()",
            sel = selector
        );
        let value = self.execute_js(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

/// A no-op renderer used when Chromium is unavailable.
///
/// The static strategy works without a browser. This stub makes render
/// attempts fail cleanly, which the orchestrator treats as a recoverable
/// strategy failure rather than a fatal error.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available — static-only mode"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
