//! Page classification: score retrieval strategies from static markup.
//!
//! Evaluates a fixed battery of structural signals against the raw page and
//! accumulates weights onto the five candidate strategies. The battery is
//! deliberately dumb — boolean/numeric checks, no learning — because its job
//! is only to pick which retrieval machinery to spin up, and a wrong guess
//! costs one fallback, not a wrong answer.
//!
//! Synchronous (`scraper` is `!Send`); async callers use `spawn_blocking`.

use crate::config::ClassifierPolicy;
use crate::extract::{self, RuleSet};
use crate::fetch::FetchedPage;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// A retrieval strategy the classifier can recommend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    LightweightStatic,
    InteractiveRender,
    CachedParallel,
    RenderThenStaticFallback,
    StaticThenRenderFallback,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::LightweightStatic,
        Strategy::InteractiveRender,
        Strategy::CachedParallel,
        Strategy::RenderThenStaticFallback,
        Strategy::StaticThenRenderFallback,
    ];

    /// Render-heavy strategies navigate a browser first.
    pub fn is_render_heavy(&self) -> bool {
        matches!(
            self,
            Strategy::InteractiveRender | Strategy::RenderThenStaticFallback
        )
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LightweightStatic => write!(f, "lightweight-static"),
            Self::InteractiveRender => write!(f, "interactive-render"),
            Self::CachedParallel => write!(f, "cached-parallel"),
            Self::RenderThenStaticFallback => write!(f, "render-then-static-fallback"),
            Self::StaticThenRenderFallback => write!(f, "static-then-render-fallback"),
        }
    }
}

/// Derived facts about a fetched page. Immutable snapshot, computed once per
/// classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSignals {
    pub script_count: usize,
    pub has_framework_fingerprint: bool,
    pub has_lazy_load: bool,
    pub has_infinite_scroll: bool,
    pub has_pagination: bool,
    pub has_async_indicators: bool,
    pub newsy_host: bool,
    pub article_link_count: usize,
    pub image_count: usize,
    pub byte_size: usize,
    pub node_count: usize,
    pub stylesheet_count: usize,
}

impl PageSignals {
    /// Structural complexity flag: large payload, deep DOM, or script-heavy.
    pub fn is_heavy(&self) -> bool {
        self.byte_size > 500_000 || self.node_count > 3_000 || self.script_count > 30
    }

    /// Nothing on the page hints at client-side content assembly.
    pub fn is_plain(&self) -> bool {
        self.script_count == 0
            && !self.has_lazy_load
            && !self.has_infinite_scroll
            && !self.has_pagination
            && !self.has_framework_fingerprint
    }
}

/// Accumulated per-strategy scores with human-readable reasons. Transient:
/// used to pick the winner and ordered alternates, then carried on the
/// recommendation for diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyScores {
    entries: Vec<(Strategy, u32, Vec<String>)>,
}

impl StrategyScores {
    pub fn new() -> Self {
        Self {
            entries: Strategy::ALL
                .iter()
                .map(|s| (*s, 0, Vec::new()))
                .collect(),
        }
    }

    pub fn add(&mut self, strategy: Strategy, weight: u32, reason: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(s, _, _)| *s == strategy) {
            entry.1 += weight;
            entry.2.push(reason.to_string());
        }
    }

    pub fn score(&self, strategy: Strategy) -> u32 {
        self.entries
            .iter()
            .find(|(s, _, _)| *s == strategy)
            .map(|(_, w, _)| *w)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.entries.iter().map(|(_, w, _)| *w).sum()
    }

    /// Highest-scoring strategy. Ties resolve to the earlier entry in
    /// [`Strategy::ALL`] order, which is deterministic.
    pub fn winner(&self) -> (Strategy, u32) {
        let mut best: Option<(Strategy, u32)> = None;
        for (s, w, _) in &self.entries {
            if best.map_or(true, |(_, bw)| *w > bw) {
                best = Some((*s, *w));
            }
        }
        best.unwrap_or((Strategy::LightweightStatic, 0))
    }

    pub fn reasons(&self, strategy: Strategy) -> Vec<String> {
        self.entries
            .iter()
            .find(|(s, _, _)| *s == strategy)
            .map(|(_, _, r)| r.clone())
            .unwrap_or_default()
    }
}

/// The classifier's output: one recommended strategy with confidence 0–100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub strategy: Strategy,
    pub confidence: u32,
    pub reasons: Vec<String>,
    pub scores: StrategyScores,
    pub signals: Option<PageSignals>,
}

const FRAMEWORK_FINGERPRINTS: &[&str] = &[
    "__NEXT_DATA__",
    "data-reactroot",
    "ng-version",
    "ng-app",
    "__nuxt",
    "data-v-app",
    "sveltekit",
];

const LAZY_LOAD_MARKERS: &[&str] = &["loading=\"lazy\"", "data-src=", "data-lazy", "lazyload"];

const INFINITE_SCROLL_MARKERS: &[&str] =
    &["infinite-scroll", "infinite_scroll", "infinitescroll", "data-infinite", "endless-feed"];

const NEWSY_HOST_TOKENS: &[&str] = &[
    "news", "times", "post", "daily", "herald", "tribune", "gazette", "journal",
    "chronicle", "press",
];

/// Compute the signal snapshot for a fetched page.
pub fn compute_signals(html: &str, url: &str, rules: &RuleSet) -> PageSignals {
    let document = Html::parse_document(html);

    let count = |sel: &str| -> usize {
        Selector::parse(sel)
            .map(|s| document.select(&s).count())
            .unwrap_or(0)
    };

    let script_count = count("script");
    let stylesheet_count = count("link[rel=stylesheet]");
    let image_count = count("img");
    let node_count = count("*");

    let has_pagination = count("a[rel=next]") > 0
        || count("[class*=pagination]") > 0
        || count("[class*=pager]") > 0
        || count("[class*='load-more']") > 0
        || count("[class*='show-more']") > 0;

    let has_framework_fingerprint = FRAMEWORK_FINGERPRINTS.iter().any(|f| html.contains(f));
    let has_lazy_load = LAZY_LOAD_MARKERS.iter().any(|m| html.contains(m));
    let has_infinite_scroll = INFINITE_SCROLL_MARKERS.iter().any(|m| html.contains(m));

    // Async-request indicators only count inside inline script bodies; the
    // words appear in article prose often enough to matter.
    let async_re = regex::Regex::new(r"fetch\s*\(|XMLHttpRequest|axios\.|\.ajax\s*\(")
        .expect("async-indicator regex is valid");
    let has_async_indicators = Selector::parse("script")
        .map(|s| {
            document.select(&s).any(|el| {
                let body: String = el.text().collect();
                async_re.is_match(&body)
            })
        })
        .unwrap_or(false);

    let newsy_host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .map(|host| NEWSY_HOST_TOKENS.iter().any(|t| host.contains(t)))
        .unwrap_or(false);

    let article_link_count = extract::extract_articles(html, url, rules, 50).len();

    PageSignals {
        script_count,
        has_framework_fingerprint,
        has_lazy_load,
        has_infinite_scroll,
        has_pagination,
        has_async_indicators,
        newsy_host,
        article_link_count,
        image_count,
        byte_size: html.len(),
        node_count,
        stylesheet_count,
    }
}

/// Classify a successfully fetched page.
pub fn classify(page: &FetchedPage, policy: &ClassifierPolicy, rules: &RuleSet) -> Recommendation {
    let signals = compute_signals(&page.body, &page.final_url, rules);
    classify_signals(signals, policy)
}

/// Score strategies from a precomputed signal snapshot.
pub fn classify_signals(signals: PageSignals, policy: &ClassifierPolicy) -> Recommendation {
    let mut scores = StrategyScores::new();

    if signals.script_count > 0 {
        scores.add(
            Strategy::InteractiveRender,
            policy.w_script_presence,
            "page carries script tags",
        );
        scores.add(
            Strategy::RenderThenStaticFallback,
            policy.w_script_presence,
            "page carries script tags",
        );
    }
    if signals.has_framework_fingerprint {
        scores.add(
            Strategy::InteractiveRender,
            policy.w_framework_fingerprint,
            "client-side framework fingerprint",
        );
        scores.add(
            Strategy::RenderThenStaticFallback,
            policy.w_framework_fingerprint / 2,
            "client-side framework fingerprint",
        );
    }
    if signals.has_lazy_load {
        scores.add(
            Strategy::InteractiveRender,
            policy.w_lazy_load,
            "lazy-load attributes present",
        );
    }
    if signals.has_infinite_scroll {
        scores.add(
            Strategy::InteractiveRender,
            policy.w_infinite_scroll,
            "infinite-scroll markers present",
        );
    }
    if signals.has_pagination {
        scores.add(
            Strategy::RenderThenStaticFallback,
            policy.w_pagination,
            "pagination controls present",
        );
    }
    if signals.has_async_indicators {
        scores.add(
            Strategy::InteractiveRender,
            policy.w_async_requests,
            "inline scripts issue asynchronous requests",
        );
        scores.add(
            Strategy::StaticThenRenderFallback,
            policy.w_async_requests / 2,
            "inline scripts issue asynchronous requests",
        );
    }
    if signals.newsy_host {
        scores.add(
            Strategy::CachedParallel,
            policy.w_newsy_host,
            "host name suggests a news outlet",
        );
        scores.add(
            Strategy::LightweightStatic,
            policy.w_newsy_host / 2,
            "host name suggests a news outlet",
        );
    }
    if signals.article_link_count >= 5 {
        scores.add(
            Strategy::LightweightStatic,
            policy.w_article_links,
            "article links already present in static markup",
        );
        scores.add(
            Strategy::CachedParallel,
            policy.w_article_links / 2,
            "article links already present in static markup",
        );
    }
    if signals.is_heavy() {
        scores.add(
            Strategy::StaticThenRenderFallback,
            policy.w_heavy_page,
            "structurally complex page",
        );
        scores.add(
            Strategy::RenderThenStaticFallback,
            policy.w_heavy_page,
            "structurally complex page",
        );
    }
    if signals.is_plain() {
        scores.add(
            Strategy::LightweightStatic,
            policy.w_plain_page,
            "no dynamic-content markers",
        );
    }

    let (winner, winning) = scores.winner();
    let total = scores.total();
    let confidence = if total == 0 {
        0
    } else {
        100 * winning / total
    };
    let mut reasons = scores.reasons(winner);

    // Conservative downgrade: a low-confidence render-heavy pick is not
    // worth a browser session.
    let (strategy, confidence) =
        if confidence < policy.downgrade_threshold && winner.is_render_heavy() {
            reasons.push("confidence too low, defaulting to conservative strategy".to_string());
            (Strategy::LightweightStatic, confidence)
        } else {
            (winner, confidence)
        };

    Recommendation {
        strategy,
        confidence,
        reasons,
        scores,
        signals: Some(signals),
    }
}

/// Default recommendation when the initial fetch itself fails. Rendering
/// backends manage their own navigation and tolerate transient fetch issues,
/// so the render strategy gets the benefit of the doubt.
pub fn fetch_failure_recommendation(error: &str) -> Recommendation {
    Recommendation {
        strategy: Strategy::InteractiveRender,
        confidence: 50,
        reasons: vec![format!("initial fetch failed ({error}), deferring to renderer")],
        scores: StrategyScores::new(),
        signals: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str, url: &str) -> FetchedPage {
        FetchedPage {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            byte_size: body.len(),
            body: body.to_string(),
            elapsed_ms: 10,
        }
    }

    fn policy() -> ClassifierPolicy {
        ClassifierPolicy::default()
    }

    #[test]
    fn test_plain_page_recommends_lightweight_static() {
        let html = r#"
          <html><body>
            <h1><a href="/story/one-long-headline">A perfectly static headline</a></h1>
            <p>Plain server-rendered content.</p>
          </body></html>
        "#;
        let rec = classify(
            &page(html, "https://example.com/"),
            &policy(),
            &RuleSet::default(),
        );
        assert_eq!(rec.strategy, Strategy::LightweightStatic);
        assert!(rec.confidence >= 60, "confidence was {}", rec.confidence);
    }

    #[test]
    fn test_dynamic_page_recommends_render() {
        let html = r#"
          <html><body>
            <div id="app" data-reactroot></div>
            <div class="feed infinite-scroll" data-infinite="true"></div>
            <img data-src="/lazy.jpg" loading="lazy">
            <script>fetch('/api/feed').then(r => r.json());</script>
          </body></html>
        "#;
        let rec = classify(
            &page(html, "https://example.com/feed"),
            &policy(),
            &RuleSet::default(),
        );
        assert_eq!(rec.strategy, Strategy::InteractiveRender);
        assert!(rec.confidence >= 60);
        assert!(!rec.reasons.is_empty());
    }

    #[test]
    fn test_low_confidence_render_pick_downgrades() {
        // Script presence alone nudges the render strategies, but everything
        // else is static-looking: the render pick must not survive at low
        // confidence.
        let html = r#"
          <html><body>
            <script src="/analytics.js"></script>
            <h2><a href="/story/a-sufficiently-long-title">A sufficiently long title</a></h2>
          </body></html>
        "#;
        let rec = classify(
            &page(html, "https://example.com/"),
            &policy(),
            &RuleSet::default(),
        );
        if rec.confidence < 60 {
            assert_eq!(rec.strategy, Strategy::LightweightStatic);
            assert!(rec
                .reasons
                .iter()
                .any(|r| r.contains("defaulting to conservative strategy")));
        }
    }

    #[test]
    fn test_newsy_static_front_page_prefers_static_family() {
        let mut body = String::from("<html><body><article>");
        for i in 0..8 {
            body.push_str(&format!(
                "<h2><a href=\"/story/item-{i}\">Front page story number {i}</a></h2>"
            ));
        }
        body.push_str("</article></body></html>");
        let rec = classify(
            &page(&body, "https://daily-example.com/"),
            &policy(),
            &RuleSet::default(),
        );
        assert!(matches!(
            rec.strategy,
            Strategy::LightweightStatic | Strategy::CachedParallel
        ));
    }

    #[test]
    fn test_confidence_formula_and_zero_total() {
        let mut scores = StrategyScores::new();
        scores.add(Strategy::LightweightStatic, 30, "static markup");
        scores.add(Strategy::InteractiveRender, 10, "script tags");
        let (winner, winning) = scores.winner();
        assert_eq!(winner, Strategy::LightweightStatic);
        assert_eq!(100 * winning / scores.total(), 75);

        // Zero total scores: winner defaults deterministically, confidence 0.
        let empty = StrategyScores::new();
        assert_eq!(empty.total(), 0);
        assert_eq!(empty.winner(), (Strategy::LightweightStatic, 0));
    }

    #[test]
    fn test_fetch_failure_default() {
        let rec = fetch_failure_recommendation("connection refused");
        assert_eq!(rec.strategy, Strategy::InteractiveRender);
        assert_eq!(rec.confidence, 50);
        assert!(rec.reasons[0].contains("connection refused"));
        assert!(rec.signals.is_none());
    }

    #[test]
    fn test_signals_snapshot() {
        let html = r#"
          <html><head><link rel="stylesheet" href="/a.css"></head>
          <body><script></script><script></script><img src="/x.jpg"></body></html>
        "#;
        let s = compute_signals(html, "https://example.com/", &RuleSet::default());
        assert_eq!(s.script_count, 2);
        assert_eq!(s.stylesheet_count, 1);
        assert_eq!(s.image_count, 1);
        assert!(s.node_count >= 6);
        assert!(!s.newsy_host);
        assert!(!s.is_heavy());
    }
}
