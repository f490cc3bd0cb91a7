//! Relevance scoring and normalized-URL deduplication.
//!
//! A pure function of its input: ranking the same candidate list twice yields
//! the same ordered result. Scores are heuristic ranks, not probabilities.

use crate::config::{KeywordLists, ScoringWeights};
use crate::extract::{Candidate, HarvestKind};
use serde::{Deserialize, Serialize};
use url::Url;

/// A candidate with its relevance score and final rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: u32,
    /// Position in the ranked result, starting at 0.
    pub rank: usize,
}

/// Deduplication key: scheme and host lowercased, fragment removed, trailing
/// slash stripped. Unparseable URLs fall back to the raw string so they still
/// deduplicate against exact copies of themselves.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_fragment(None);
            let s = url.to_string();
            s.strip_suffix('/').unwrap_or(&s).to_string()
        }
        Err(_) => raw.trim_end_matches('/').to_string(),
    }
}

/// Score, deduplicate and rank candidates.
///
/// Candidates with empty or non-absolute URLs are dropped here as a final
/// guard — the extractor should never produce them, but the invariant that
/// no such candidate reaches a `ScoredCandidate` is enforced at this boundary
/// too. Duplicates by normalized URL are dropped silently, first occurrence
/// wins. The sort is stable: ties keep first-seen order.
pub fn rank(
    candidates: Vec<Candidate>,
    kind: HarvestKind,
    keywords: &KeywordLists,
    weights: &ScoringWeights,
) -> Vec<ScoredCandidate> {
    let mut seen = std::collections::HashSet::new();
    let mut scored: Vec<ScoredCandidate> = Vec::new();

    for candidate in candidates {
        let Ok(url) = Url::parse(&candidate.url) else {
            continue;
        };
        if url.host_str().is_none() {
            continue;
        }
        if !seen.insert(normalize_url(&candidate.url)) {
            continue;
        }

        let score = match kind {
            HarvestKind::Articles => score_article(&candidate, &url, keywords, weights),
            HarvestKind::Images => match score_image(&candidate, &url, keywords, weights) {
                Some(s) => s,
                // Implausibly small — filtered before scoring, not after.
                None => continue,
            },
        };

        scored.push(ScoredCandidate {
            candidate,
            score,
            rank: 0,
        });
    }

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    for (i, sc) in scored.iter_mut().enumerate() {
        sc.rank = i;
    }
    scored
}

fn score_article(
    candidate: &Candidate,
    url: &Url,
    keywords: &KeywordLists,
    weights: &ScoringWeights,
) -> u32 {
    let mut score = 0;

    let title = candidate.text.to_lowercase();
    if keywords.topical.iter().any(|k| title.contains(k.as_str())) {
        score += weights.title_keyword;
    }

    // Structural provenance: which rule matched is itself a relevance signal.
    score += candidate.rule_weight;

    if has_hero_token(candidate, keywords) {
        score += weights.hero_placement;
    }

    let path = url.path().to_lowercase();
    if keywords
        .news_path_tokens
        .iter()
        .any(|t| path_contains_token(&path, t))
    {
        score += weights.news_path;
    }

    score
}

/// Returns `None` when the image fails the byte-plausibility filter: declared
/// dimensions below the icon threshold, or a filename that marks it as a
/// tracking pixel or sprite.
fn score_image(
    candidate: &Candidate,
    url: &Url,
    keywords: &KeywordLists,
    weights: &ScoringWeights,
) -> Option<u32> {
    let path = url.path().to_lowercase();

    if let (Some(w), Some(h)) = (candidate.width, candidate.height) {
        if w.saturating_mul(h) < weights.implausible_area_px {
            return None;
        }
    }
    let file = path.rsplit('/').next().unwrap_or("");
    if file.ends_with(".ico")
        || file.ends_with(".cur")
        || ["pixel", "spacer", "blank", "tracker", "1x1"]
            .iter()
            .any(|m| file.contains(m))
    {
        return None;
    }

    let mut score = 0;

    if let (Some(w), Some(h)) = (candidate.width, candidate.height) {
        let area = w.saturating_mul(h);
        if area >= weights.large_area_px {
            score += weights.image_dims_large;
        } else if area >= weights.medium_area_px {
            score += weights.image_dims_medium;
        }
    }

    let alt = candidate.text.to_lowercase();
    if keywords
        .image_relevance
        .iter()
        .any(|k| alt.contains(k.as_str()))
    {
        score += weights.image_alt_keyword;
    }

    if has_hero_token(candidate, keywords) {
        score += weights.image_hero_placement;
    }

    if keywords
        .media_path_tokens
        .iter()
        .any(|t| path_contains_token(&path, t))
    {
        score += weights.image_media_path;
    }

    Some(score)
}

fn has_hero_token(candidate: &Candidate, keywords: &KeywordLists) -> bool {
    let class = candidate.class_attr.to_lowercase();
    let id = candidate.id_attr.to_lowercase();
    keywords
        .hero_tokens
        .iter()
        .any(|t| class.contains(t.as_str()) || id.contains(t.as_str()))
}

fn path_contains_token(path: &str, token: &str) -> bool {
    path.split(|c| c == '/' || c == '-' || c == '_' || c == '.')
        .any(|seg| seg == token)
}
