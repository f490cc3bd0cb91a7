//! Scroll-driven incremental content loading for the render strategy.
//!
//! A small state machine: `Scrolling` until the page stops producing new
//! candidate signatures and stops growing (`Converged`), or until the cycle
//! ceiling is hit (`Aborted`). Aborted is a successful completion with
//! partial results, not an error — the caller extracts whatever the page
//! surfaced. The fast and thorough variants are one controller parameterized
//! by a [`ScrollProfile`], not separate routines.

use crate::extract::{self, HarvestKind, RuleSet};
use crate::progress::{self, HarvestEventKind, ProgressSender};
use crate::renderer::RenderContext;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Consecutive no-new-items/no-growth cycles required before convergence.
/// Debounces transient loading delays.
const STALL_CYCLES: u32 = 3;

/// Selector for "load more"-style pagination controls.
const LOAD_MORE_SELECTOR: &str =
    "button.load-more, a.load-more, [class*='load-more'], [class*='loadmore'], [class*='show-more']";

/// Terminal state of a scroll run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollState {
    Scrolling,
    Converged,
    Aborted,
}

/// Caller-selected latency/thoroughness trade-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollProfile {
    /// Viewport advance per cycle, pixels.
    pub step_px: u64,
    /// Pause after each advance so asynchronous content can settle.
    pub settle_ms: u64,
    /// Hard iteration ceiling.
    pub max_cycles: u32,
}

impl ScrollProfile {
    /// Small steps, long settles, high ceiling.
    pub fn thorough() -> Self {
        Self {
            step_px: 600,
            settle_ms: 1_200,
            max_cycles: 20,
        }
    }

    /// Two large jumps, short pauses, low ceiling.
    pub fn fast() -> Self {
        Self {
            step_px: 2_400,
            settle_ms: 300,
            max_cycles: 4,
        }
    }
}

/// What a scroll run observed.
#[derive(Debug, Clone)]
pub struct ScrollReport {
    pub state: ScrollState,
    pub cycles: u32,
    /// Distinct candidate signatures seen across the whole run.
    pub items_seen: usize,
}

/// Drives scroll/interaction cycles against one render context until the
/// page converges or the ceiling is reached.
pub struct NavigationController {
    rules: Arc<RuleSet>,
    kind: HarvestKind,
    profile: ScrollProfile,
}

impl NavigationController {
    pub fn new(rules: Arc<RuleSet>, kind: HarvestKind, profile: ScrollProfile) -> Self {
        Self {
            rules,
            kind,
            profile,
        }
    }

    /// Run the scroll loop. The context must already be navigated to the
    /// page. On exit the viewport is reset to the top so extraction sees a
    /// consistent snapshot regardless of where scrolling stopped.
    pub async fn drive(
        &self,
        ctx: &dyn RenderContext,
        page_url: &str,
        progress: &Option<ProgressSender>,
        request_id: &str,
        seq: &mut u64,
    ) -> Result<ScrollReport> {
        let mut seen = self.signatures(ctx, page_url).await?;
        let mut last_height = ctx.page_height().await?;
        let mut position: u64 = 0;
        let mut stalls: u32 = 0;
        let mut cycles: u32 = 0;

        let state = loop {
            if cycles >= self.profile.max_cycles {
                break ScrollState::Aborted;
            }
            cycles += 1;

            position += self.profile.step_px;
            ctx.scroll_to(position).await?;
            tokio::time::sleep(Duration::from_millis(self.profile.settle_ms)).await;

            let height = ctx.page_height().await?;
            let sigs = self.signatures(ctx, page_url).await?;
            let new_items = sigs.iter().filter(|s| !seen.contains(*s)).count();
            for s in sigs {
                seen.insert(s);
            }

            debug!(cycle = cycles, new_items, height, "scroll cycle");
            progress::emit(
                progress,
                request_id,
                seq,
                HarvestEventKind::ScrollCycle {
                    cycle: cycles,
                    new_items,
                    page_height: height,
                },
            );

            if new_items == 0 && height == last_height {
                // A still-clickable load-more control extends the run rather
                // than counting as a stall cycle.
                if ctx.click_first(LOAD_MORE_SELECTOR).await.unwrap_or(false) {
                    tokio::time::sleep(Duration::from_millis(self.profile.settle_ms)).await;
                    let grown = ctx.page_height().await?;
                    if grown > height {
                        last_height = grown;
                        stalls = 0;
                        continue;
                    }
                    // Clicked but the page did not grow: nothing left to load.
                    break ScrollState::Converged;
                }
                stalls += 1;
                if stalls >= STALL_CYCLES {
                    break ScrollState::Converged;
                }
            } else {
                stalls = 0;
                last_height = height;
            }
        };

        // Hand back a viewport-independent DOM snapshot.
        ctx.scroll_to(0).await?;

        Ok(ScrollReport {
            state,
            cycles,
            items_seen: seen.len(),
        })
    }

    /// Re-query the DOM for the same candidate-detection signatures the
    /// extractor uses. `scraper` types are `!Send`, so the parse runs on the
    /// blocking pool.
    async fn signatures(&self, ctx: &dyn RenderContext, page_url: &str) -> Result<HashSet<String>> {
        let html = ctx.get_html().await?;
        let rules = Arc::clone(&self.rules);
        let url = page_url.to_string();
        let kind = self.kind;
        let sigs = tokio::task::spawn_blocking(move || {
            extract::signature_set(&html, &url, &rules, kind)
        })
        .await?;
        Ok(sigs)
    }
}
