// Copyright 2026 Forager Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvest orchestrator: strategy selection → extraction → fallback.
//!
//! One harvest call fetches the page statically, classifies it, runs the
//! recommended retrieval path, and falls back to the alternate path when the
//! primary errors or comes back empty. Strategy attempts run sequentially —
//! the render backend is a stateful single-navigation resource — and each
//! render attempt owns its context, acquired scoped and closed on every exit
//! path. The orchestrator favors returning something over failing: only when
//! every attempt fails outright does the caller see an error.

use crate::classify::{self, Recommendation, Strategy};
use crate::config::HarvestConfig;
use crate::download::{DownloadOutcome, ParallelDownloader};
use crate::error::HarvestError;
use crate::extract::{self, Candidate, HarvestKind, RuleSet};
use crate::fetch::{FetchedPage, StaticFetcher};
use crate::navigate::{NavigationController, ScrollProfile};
use crate::progress::{self, HarvestEventKind, ProgressSender};
use crate::renderer::Renderer;
use crate::score::{self, ScoredCandidate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Caller-selected latency budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Thorough,
    Fast,
}

impl Profile {
    fn scroll_profile(&self) -> ScrollProfile {
        match self {
            Profile::Thorough => ScrollProfile::thorough(),
            Profile::Fast => ScrollProfile::fast(),
        }
    }
}

/// Request to harvest a single page.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    pub url: String,
    pub kind: HarvestKind,
    pub max_results: usize,
    pub profile: Profile,
    /// Overall deadline override; defaults to the configured `overall_ms`.
    pub deadline_ms: Option<u64>,
}

/// The ordered, deduplicated outcome of one harvest call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestResult {
    pub items: Vec<ScoredCandidate>,
    /// Strategy the classifier recommended (after any conservative downgrade).
    pub strategy: Strategy,
    pub confidence: u32,
    /// Retrieval paths actually executed, in order ("static", "render").
    pub executed: Vec<String>,
    pub attempts: u32,
    pub fallbacks: u32,
    pub elapsed_ms: u64,
}

/// The two concrete retrieval paths a strategy maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetrievalPath {
    Static,
    Render,
}

impl RetrievalPath {
    fn name(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Render => "render",
        }
    }

    fn other(&self) -> Self {
        match self {
            Self::Static => Self::Render,
            Self::Render => Self::Static,
        }
    }
}

/// Composes classifier, fetcher, renderer, navigation, extraction and
/// scoring into the harvest pipeline.
pub struct Harvester {
    config: HarvestConfig,
    rules: Arc<RuleSet>,
    fetcher: StaticFetcher,
    renderer: Arc<dyn Renderer>,
    progress: Option<ProgressSender>,
}

impl Harvester {
    pub fn new(config: HarvestConfig, rules: RuleSet, renderer: Arc<dyn Renderer>) -> Self {
        let fetcher = StaticFetcher::new(config.timeouts.fetch_ms);
        Self {
            config,
            rules: Arc::new(rules),
            fetcher,
            renderer,
            progress: None,
        }
    }

    /// Attach an advisory progress channel. Events are dropped when nobody
    /// listens.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Run one harvest: classify, extract under the recommended strategy,
    /// fall back as needed, then score/dedupe/rank and truncate.
    ///
    /// Errors only with [`HarvestError::ExhaustedFallbacks`]; a strategy that
    /// runs but finds nothing produces an empty, valid result.
    pub async fn harvest(&self, req: HarvestRequest) -> Result<HarvestResult, HarvestError> {
        let start = Instant::now();
        let overall = Duration::from_millis(
            req.deadline_ms.unwrap_or(self.config.timeouts.overall_ms),
        );
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut seq = 0u64;

        info!(url = %req.url, kind = %req.kind, "harvest started");

        // Stage 1: static fetch, reused for classification and the static path.
        let static_page = self.initial_fetch(&req, start, overall, &request_id, &mut seq).await;

        let recommendation = match &static_page {
            Some(page) => {
                let page = page.clone();
                let policy = self.config.classifier.clone();
                let rules = Arc::clone(&self.rules);
                tokio::task::spawn_blocking(move || classify::classify(&page, &policy, &rules))
                    .await
                    .unwrap_or_else(|_| {
                        classify::fetch_failure_recommendation("classifier task panicked")
                    })
            }
            None => classify::fetch_failure_recommendation("initial fetch failed"),
        };

        progress::emit(
            &self.progress,
            &request_id,
            &mut seq,
            HarvestEventKind::StrategyChosen {
                strategy: recommendation.strategy.to_string(),
                confidence: recommendation.confidence,
                reasons: recommendation.reasons.clone(),
            },
        );
        info!(
            strategy = %recommendation.strategy,
            confidence = recommendation.confidence,
            "strategy chosen"
        );

        // Stage 2: primary attempt, fallback, then one opportunistic re-run.
        let primary = if recommendation.strategy.is_render_heavy() {
            RetrievalPath::Render
        } else {
            RetrievalPath::Static
        };

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut executed: Vec<String> = Vec::new();
        let mut attempts: u32 = 0;
        let mut fallbacks: u32 = 0;
        let mut any_success = false;
        let mut last_err: Option<String> = None;

        for (i, path) in [primary, primary.other()].into_iter().enumerate() {
            if start.elapsed() >= overall {
                warn!("overall deadline reached before {} attempt", path.name());
                break;
            }
            attempts += 1;
            executed.push(path.name().to_string());

            match self
                .attempt(path, &req, static_page.as_ref(), start, overall, &request_id, &mut seq)
                .await
            {
                Ok(found) => {
                    any_success = true;
                    progress::emit(
                        &self.progress,
                        &request_id,
                        &mut seq,
                        HarvestEventKind::StageCandidates {
                            stage: format!("{}-extract", path.name()),
                            count: found.len(),
                        },
                    );
                    if !found.is_empty() {
                        candidates = found;
                        break;
                    }
                    if i == 0 {
                        fallbacks += 1;
                        self.emit_fallback(path, "zero candidates", &request_id, &mut seq);
                    }
                }
                Err(e) => {
                    warn!("{} attempt failed: {e}", path.name());
                    last_err = Some(e.to_string());
                    if i == 0 {
                        fallbacks += 1;
                        self.emit_fallback(path, &e.to_string(), &request_id, &mut seq);
                    }
                }
            }
        }

        // Both paths failed or came back empty with at least one hard error:
        // run both once more opportunistically and merge whatever partials
        // exist before giving up.
        if candidates.is_empty() && last_err.is_some() && start.elapsed() < overall {
            for path in [primary, primary.other()] {
                if start.elapsed() >= overall {
                    break;
                }
                attempts += 1;
                executed.push(path.name().to_string());
                match self
                    .attempt(path, &req, None, start, overall, &request_id, &mut seq)
                    .await
                {
                    Ok(found) => {
                        any_success = true;
                        candidates.extend(found);
                    }
                    Err(e) => last_err = Some(e.to_string()),
                }
            }
        }

        if !any_success && candidates.is_empty() {
            return Err(HarvestError::ExhaustedFallbacks {
                attempts,
                last: last_err.unwrap_or_else(|| "no strategy attempt could run".to_string()),
            });
        }

        // Stage 3: score, dedupe, rank, truncate.
        let kind = req.kind;
        let keywords = self.config.keywords.clone();
        let weights = self.config.weights.clone();
        let mut items = tokio::task::spawn_blocking(move || {
            score::rank(candidates, kind, &keywords, &weights)
        })
        .await
        .unwrap_or_default();
        items.truncate(req.max_results);

        let elapsed_ms = start.elapsed().as_millis() as u64;
        progress::emit(
            &self.progress,
            &request_id,
            &mut seq,
            HarvestEventKind::HarvestComplete {
                total: items.len(),
                strategy_used: recommendation.strategy.to_string(),
                elapsed_ms,
            },
        );
        info!(total = items.len(), elapsed_ms, "harvest complete");

        Ok(HarvestResult {
            items,
            strategy: recommendation.strategy,
            confidence: recommendation.confidence,
            executed,
            attempts,
            fallbacks,
            elapsed_ms,
        })
    }

    /// Classify without harvesting — exposed for the CLI and for callers
    /// that want the recommendation alone.
    pub async fn classify_only(&self, url: &str) -> Recommendation {
        match self.fetcher.get(url, self.config.timeouts.fetch_ms).await {
            Ok(page) if page.is_success() => {
                let policy = self.config.classifier.clone();
                let rules = Arc::clone(&self.rules);
                tokio::task::spawn_blocking(move || classify::classify(&page, &policy, &rules))
                    .await
                    .unwrap_or_else(|_| {
                        classify::fetch_failure_recommendation("classifier task panicked")
                    })
            }
            Ok(page) => {
                classify::fetch_failure_recommendation(&format!("status {}", page.status))
            }
            Err(e) => classify::fetch_failure_recommendation(&format!("{e:#}")),
        }
    }

    /// Download the images in a harvest result with the bounded worker pool.
    pub async fn download(
        &self,
        result: &HarvestResult,
        destination: &Path,
    ) -> Vec<DownloadOutcome> {
        let downloader =
            ParallelDownloader::new(self.fetcher.clone(), self.config.timeouts.download_ms);
        let candidates: Vec<Candidate> =
            result.items.iter().map(|s| s.candidate.clone()).collect();
        downloader
            .download_all(
                &candidates,
                destination,
                self.config.download_concurrency(),
            )
            .await
    }

    async fn initial_fetch(
        &self,
        req: &HarvestRequest,
        start: Instant,
        overall: Duration,
        request_id: &str,
        seq: &mut u64,
    ) -> Option<FetchedPage> {
        let budget = remaining(start, overall).min(Duration::from_millis(
            self.config.timeouts.fetch_ms,
        ));
        match tokio::time::timeout(budget, self.fetcher.get(&req.url, self.config.timeouts.fetch_ms))
            .await
        {
            Ok(Ok(page)) if page.is_success() => {
                progress::emit(
                    &self.progress,
                    request_id,
                    seq,
                    HarvestEventKind::FetchCompleted {
                        status: page.status,
                        byte_size: page.byte_size,
                        elapsed_ms: page.elapsed_ms,
                    },
                );
                Some(page)
            }
            Ok(Ok(page)) => {
                warn!(status = page.status, "initial fetch returned non-2xx");
                None
            }
            Ok(Err(e)) => {
                warn!("initial fetch failed: {e}");
                None
            }
            Err(_) => {
                warn!("initial fetch timed out");
                None
            }
        }
    }

    /// Run one retrieval path to completion, returning unranked candidates.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        path: RetrievalPath,
        req: &HarvestRequest,
        cached: Option<&FetchedPage>,
        start: Instant,
        overall: Duration,
        request_id: &str,
        seq: &mut u64,
    ) -> Result<Vec<Candidate>, HarvestError> {
        match path {
            RetrievalPath::Static => self.attempt_static(req, cached, start, overall).await,
            RetrievalPath::Render => {
                self.attempt_render(req, start, overall, request_id, seq).await
            }
        }
    }

    async fn attempt_static(
        &self,
        req: &HarvestRequest,
        cached: Option<&FetchedPage>,
        start: Instant,
        overall: Duration,
    ) -> Result<Vec<Candidate>, HarvestError> {
        let page = match cached {
            Some(page) => page.clone(),
            None => {
                let budget = remaining(start, overall)
                    .min(Duration::from_millis(self.config.timeouts.fetch_ms));
                let fetched = tokio::time::timeout(
                    budget,
                    self.fetcher.get(&req.url, self.config.timeouts.fetch_ms),
                )
                .await
                .map_err(|_| HarvestError::Timeout { stage: "fetch" })?
                .map_err(|e| HarvestError::FetchFailure(format!("{e:#}")))?;
                if !fetched.is_success() {
                    return Err(HarvestError::FetchFailure(format!(
                        "status {}",
                        fetched.status
                    )));
                }
                fetched
            }
        };

        self.extract_candidates(page.body, page.final_url, req).await
    }

    async fn attempt_render(
        &self,
        req: &HarvestRequest,
        start: Instant,
        overall: Duration,
        request_id: &str,
        seq: &mut u64,
    ) -> Result<Vec<Candidate>, HarvestError> {
        let mut ctx = self
            .renderer
            .new_context()
            .await
            .map_err(|e| HarvestError::RenderFailure(format!("{e:#}")))?;

        // Everything after acquisition runs inside a block so the context is
        // closed on every exit path, including navigation errors and the
        // overall deadline.
        let result = async {
            let nav_budget = remaining(start, overall)
                .min(Duration::from_millis(self.config.timeouts.navigate_ms));
            tokio::time::timeout(
                nav_budget,
                ctx.navigate(&req.url, self.config.timeouts.navigate_ms),
            )
            .await
            .map_err(|_| HarvestError::Timeout { stage: "navigate" })?
            .map_err(|e| HarvestError::RenderFailure(format!("{e:#}")))?;

            let controller = NavigationController::new(
                Arc::clone(&self.rules),
                req.kind,
                req.profile.scroll_profile(),
            );
            let scroll_budget = remaining(start, overall);
            let report = tokio::time::timeout(
                scroll_budget,
                controller.drive(ctx.as_ref(), &req.url, &self.progress, request_id, seq),
            )
            .await
            // Deadline mid-scroll: keep whatever the page has surfaced.
            .unwrap_or_else(|_| {
                Ok(crate::navigate::ScrollReport {
                    state: crate::navigate::ScrollState::Aborted,
                    cycles: 0,
                    items_seen: 0,
                })
            })
            .map_err(|e| HarvestError::RenderFailure(format!("{e:#}")))?;

            info!(
                state = ?report.state,
                cycles = report.cycles,
                items = report.items_seen,
                "scroll run finished"
            );

            let html = ctx
                .get_html()
                .await
                .map_err(|e| HarvestError::RenderFailure(format!("{e:#}")))?;
            let base_url = ctx.get_url().await.unwrap_or_else(|_| req.url.clone());
            let base_url = if base_url.is_empty() {
                req.url.clone()
            } else {
                base_url
            };

            self.extract_candidates(html, base_url, req).await
        }
        .await;

        if let Err(e) = ctx.close().await {
            warn!("render context close failed: {e}");
        }

        result
    }

    /// Extraction on the blocking pool (`scraper` types are `!Send`).
    async fn extract_candidates(
        &self,
        html: String,
        base_url: String,
        req: &HarvestRequest,
    ) -> Result<Vec<Candidate>, HarvestError> {
        let rules = Arc::clone(&self.rules);
        let kind = req.kind;
        // Extract generously; dedup and ranking trim to the ceiling later.
        let cap = req.max_results.saturating_mul(4).max(50);
        tokio::task::spawn_blocking(move || match kind {
            HarvestKind::Articles => extract::extract_articles(&html, &base_url, &rules, cap),
            HarvestKind::Images => extract::extract_images(&html, &base_url, &rules, cap),
        })
        .await
        .map_err(|e| HarvestError::RenderFailure(format!("extraction task failed: {e}")))
    }

    fn emit_fallback(&self, from: RetrievalPath, reason: &str, request_id: &str, seq: &mut u64) {
        progress::emit(
            &self.progress,
            request_id,
            seq,
            HarvestEventKind::FallbackTriggered {
                from: from.name().to_string(),
                to: from.other().name().to_string(),
                reason: reason.to_string(),
            },
        );
    }
}

fn remaining(start: Instant, overall: Duration) -> Duration {
    overall.saturating_sub(start.elapsed())
}
