//! Injectable harvesting policy.
//!
//! Everything here ships with compiled-in defaults so a caller only needs a
//! URL, a kind, a ceiling and a profile. The weights and keyword lists were
//! tuned empirically against a handful of news and gallery sites — they are
//! policy, not algorithmic truth, and callers are expected to recalibrate
//! them for their own corpus rather than trust them blindly.

use serde::{Deserialize, Serialize};

/// Per-stage timeouts in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTimeouts {
    /// Static GET of the page under harvest.
    pub fetch_ms: u64,
    /// Browser navigation to the page under harvest.
    pub navigate_ms: u64,
    /// One image download, end to end.
    pub download_ms: u64,
    /// Whole-harvest deadline. Work in flight when it elapses is abandoned;
    /// candidates already accumulated are still scored and returned.
    pub overall_ms: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            fetch_ms: 15_000,
            navigate_ms: 30_000,
            download_ms: 30_000,
            overall_ms: 120_000,
        }
    }
}

/// Keyword lists consulted by the scorer. Matching is case-insensitive
/// substring matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordLists {
    /// Topical/urgency words that lift an article title.
    pub topical: Vec<String>,
    /// Content-relevance words that lift image alt text.
    pub image_relevance: Vec<String>,
    /// Class/id tokens indicating a featured or hero placement.
    pub hero_tokens: Vec<String>,
    /// URL path tokens indicating a news/article section.
    pub news_path_tokens: Vec<String>,
    /// URL path tokens indicating a media/photo section.
    pub media_path_tokens: Vec<String>,
}

impl Default for KeywordLists {
    fn default() -> Self {
        Self {
            topical: [
                "breaking", "exclusive", "urgent", "live", "update", "report",
                "analysis", "investigation", "revealed", "crisis",
            ]
            .map(String::from)
            .to_vec(),
            image_relevance: [
                "photo", "picture", "scene", "view", "portrait", "aerial",
                "gallery", "shot",
            ]
            .map(String::from)
            .to_vec(),
            hero_tokens: ["hero", "featured", "lead", "main", "top-story", "headline"]
                .map(String::from)
                .to_vec(),
            news_path_tokens: ["news", "article", "story", "politics", "world", "business"]
                .map(String::from)
                .to_vec(),
            media_path_tokens: ["media", "photo", "image", "gallery", "picture"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Numeric scoring weights (see the scorer for where each applies).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub title_keyword: u32,
    pub hero_placement: u32,
    pub news_path: u32,
    pub image_dims_large: u32,
    pub image_dims_medium: u32,
    pub image_alt_keyword: u32,
    pub image_hero_placement: u32,
    pub image_media_path: u32,
    /// Declared pixel area at or above which an image earns the large bonus.
    pub large_area_px: u32,
    /// Declared pixel area at or above which an image earns the medium bonus.
    pub medium_area_px: u32,
    /// Declared pixel area below which an image is treated as a tracking
    /// pixel or icon and filtered before scoring.
    pub implausible_area_px: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            title_keyword: 20,
            hero_placement: 25,
            news_path: 10,
            image_dims_large: 10,
            image_dims_medium: 5,
            image_alt_keyword: 15,
            image_hero_placement: 20,
            image_media_path: 5,
            large_area_px: 640 * 480,
            medium_area_px: 320 * 240,
            implausible_area_px: 64 * 64,
        }
    }
}

/// Classifier signal weights and the conservatism threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierPolicy {
    /// Below this confidence a render-heavy winner is downgraded to the
    /// lightweight static strategy.
    pub downgrade_threshold: u32,
    pub w_script_presence: u32,
    pub w_framework_fingerprint: u32,
    pub w_lazy_load: u32,
    pub w_infinite_scroll: u32,
    pub w_pagination: u32,
    pub w_async_requests: u32,
    pub w_newsy_host: u32,
    pub w_article_links: u32,
    pub w_heavy_page: u32,
    pub w_plain_page: u32,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            downgrade_threshold: 60,
            w_script_presence: 10,
            w_framework_fingerprint: 25,
            w_lazy_load: 20,
            w_infinite_scroll: 25,
            w_pagination: 15,
            w_async_requests: 15,
            w_newsy_host: 10,
            w_article_links: 20,
            w_heavy_page: 10,
            w_plain_page: 25,
        }
    }
}

/// The full injectable policy bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestConfig {
    pub timeouts: StageTimeouts,
    pub keywords: KeywordLists,
    pub weights: ScoringWeights,
    pub classifier: ClassifierPolicy,
    /// Bounded worker count for the parallel downloader.
    pub download_concurrency: Option<usize>,
}

impl HarvestConfig {
    pub fn download_concurrency(&self) -> usize {
        self.download_concurrency.unwrap_or(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = HarvestConfig::default();
        assert_eq!(cfg.download_concurrency(), 5);
        assert_eq!(cfg.classifier.downgrade_threshold, 60);
        assert!(cfg.weights.large_area_px > cfg.weights.medium_area_px);
        assert!(cfg.weights.medium_area_px > cfg.weights.implausible_area_px);
        assert!(!cfg.keywords.topical.is_empty());
    }

    #[test]
    fn test_config_roundtrip() {
        let cfg = HarvestConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: HarvestConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.weights.title_keyword, cfg.weights.title_keyword);
    }
}
