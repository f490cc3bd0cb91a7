//! CSS-selector cascade that turns raw HTML into harvest candidates.
//!
//! Rules live in an ordered list, each a structural pattern plus an optional
//! exclusion token and a provenance weight. Rule order encodes precedence and
//! must be preserved exactly: for articles the cascade stops at the first rule
//! that produces at least one candidate, so a high-precision match is never
//! diluted by the noisy generic rules further down. Image extraction applies
//! every rule and relies on the deduplicator afterwards, because image
//! relevance is harder to front-load into rule order.
//!
//! The default rules are embedded at compile time from `selector_rules.json`
//! via `include_str!`, so there is no runtime file I/O; callers can inject a
//! replacement [`RuleSet`] through the config.
//!
//! All entry points are **synchronous** because the `scraper` crate's types
//! are `!Send` — async callers wrap these in `tokio::task::spawn_blocking`.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Raw JSON content of the default rule configuration, embedded at compile
/// time.
const RULES_JSON: &str = include_str!("selector_rules.json");

/// Titles shorter than this are treated as navigation chrome, not content.
pub const MIN_TITLE_LEN: usize = 10;

/// What a harvest call is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestKind {
    Articles,
    Images,
}

impl std::fmt::Display for HarvestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Articles => write!(f, "articles"),
            Self::Images => write!(f, "images"),
        }
    }
}

/// One structural extraction rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorRule {
    /// Human-readable rule name, carried onto candidates as provenance.
    pub name: String,
    /// CSS selector matched against the document.
    pub selector: String,
    /// Optional token: elements whose class/id contains it are skipped.
    #[serde(default)]
    pub exclude: Option<String>,
    /// Provenance weight — the scorer treats which rule matched as a
    /// relevance signal in its own right.
    pub weight: u32,
}

/// The ordered rule lists for both candidate kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub articles: Vec<SelectorRule>,
    pub images: Vec<SelectorRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        serde_json::from_str(RULES_JSON).expect("embedded selector_rules.json is valid")
    }
}

/// An unscored, unfiltered extraction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Absolute URL. Never empty — relative hrefs that fail to resolve
    /// against the page URL are dropped during extraction.
    pub url: String,
    /// Display text for articles, alt text for images.
    pub text: String,
    /// Name of the rule that matched.
    pub rule: String,
    /// Provenance weight of that rule.
    pub rule_weight: u32,
    /// Raw class attribute of the matched element.
    pub class_attr: String,
    /// Raw id attribute of the matched element.
    pub id_attr: String,
    /// Declared pixel width, images only.
    pub width: Option<u32>,
    /// Declared pixel height, images only.
    pub height: Option<u32>,
}

/// Extract candidate articles from raw HTML.
///
/// Applies the article rules in priority order and stops after the first
/// rule that yields at least one candidate. Returns at most `max` candidates.
pub fn extract_articles(html: &str, base_url: &str, rules: &RuleSet, max: usize) -> Vec<Candidate> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut out: Vec<Candidate> = Vec::new();

    for rule in &rules.articles {
        let Ok(sel) = Selector::parse(&rule.selector) else {
            continue;
        };
        for el in document.select(&sel) {
            if element_excluded(&el, rule.exclude.as_deref()) {
                continue;
            }
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let Some(url) = absolutize(&base, href) else {
                continue;
            };
            if is_excluded_article_url(&url) {
                continue;
            }
            let title = candidate_text(&el);
            if title.chars().count() < MIN_TITLE_LEN {
                continue;
            }
            out.push(Candidate {
                url: url.to_string(),
                text: title,
                rule: rule.name.clone(),
                rule_weight: rule.weight,
                class_attr: el.value().attr("class").unwrap_or("").to_string(),
                id_attr: el.value().attr("id").unwrap_or("").to_string(),
                width: None,
                height: None,
            });
            if out.len() >= max {
                return out;
            }
        }
        // First-match-wins breadth: a rule that produced anything ends the cascade.
        if !out.is_empty() {
            break;
        }
    }

    out
}

/// Extract candidate images from raw HTML.
///
/// Unlike articles, every rule is applied and the union deduplicated by URL
/// here (the scorer deduplicates again on normalized URLs).
pub fn extract_images(html: &str, base_url: &str, rules: &RuleSet, max: usize) -> Vec<Candidate> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<Candidate> = Vec::new();

    for rule in &rules.images {
        let Ok(sel) = Selector::parse(&rule.selector) else {
            continue;
        };
        for el in document.select(&sel) {
            if element_excluded(&el, rule.exclude.as_deref()) {
                continue;
            }
            let Some(src) = image_source(&el) else {
                continue;
            };
            let Some(url) = absolutize(&base, &src) else {
                continue;
            };
            if url.scheme() != "http" && url.scheme() != "https" {
                continue;
            }
            let url_str = url.to_string();
            if !seen.insert(url_str.clone()) {
                continue;
            }
            out.push(Candidate {
                url: url_str,
                text: el.value().attr("alt").unwrap_or("").trim().to_string(),
                rule: rule.name.clone(),
                rule_weight: rule.weight,
                class_attr: el.value().attr("class").unwrap_or("").to_string(),
                id_attr: el.value().attr("id").unwrap_or("").to_string(),
                width: parse_dimension(el.value().attr("width")),
                height: parse_dimension(el.value().attr("height")),
            });
            if out.len() >= max {
                return out;
            }
        }
    }

    out
}

/// The candidate-detection signatures the navigation controller re-queries
/// between scroll cycles: the union of every rule's matches, as URLs.
///
/// Deliberately broader than `extract_articles` (no first-match cutoff) so
/// convergence detection sees items a lower-priority rule would surface.
pub fn signature_set(html: &str, base_url: &str, rules: &RuleSet, kind: HarvestKind) -> HashSet<String> {
    let Ok(base) = Url::parse(base_url) else {
        return HashSet::new();
    };
    let document = Html::parse_document(html);
    let mut sigs = HashSet::new();

    let rule_list = match kind {
        HarvestKind::Articles => &rules.articles,
        HarvestKind::Images => &rules.images,
    };

    for rule in rule_list {
        let Ok(sel) = Selector::parse(&rule.selector) else {
            continue;
        };
        for el in document.select(&sel) {
            let raw = match kind {
                HarvestKind::Articles => el.value().attr("href").map(str::to_string),
                HarvestKind::Images => image_source(&el),
            };
            if let Some(raw) = raw {
                if let Some(url) = absolutize(&base, &raw) {
                    sigs.insert(url.to_string());
                }
            }
        }
    }

    sigs
}

// ── Exclusion policy ─────────────────────────────────────────────────────────

/// Navigation/utility path segments that never lead to articles.
const EXCLUDED_SEGMENTS: &[&str] = &[
    "tag", "tags", "category", "categories", "search", "login", "signin",
    "register", "sitemap", "contact", "privacy", "terms", "page", "author",
    "subscribe", "account",
];

/// Social-network hosts, matched by suffix.
const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com", "twitter.com", "x.com", "instagram.com", "linkedin.com",
    "pinterest.com", "youtube.com", "tiktok.com", "reddit.com", "t.me",
    "whatsapp.com",
];

/// File extensions that are not articles: documents, archives, stylesheets,
/// scripts, and raw media.
const EXCLUDED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "rar", "gz",
    "tar", "7z", "css", "js", "json", "xml", "rss", "jpg", "jpeg", "png",
    "gif", "webp", "svg", "ico", "mp4", "mp3", "avi", "mov", "webm",
];

/// Whether an href should be dropped before it ever becomes a candidate.
/// Scheme-less pseudo-links are rejected before URL resolution.
pub fn is_excluded_href(href: &str) -> bool {
    let trimmed = href.trim();
    trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("javascript:")
        || trimmed.starts_with("mailto:")
        || trimmed.starts_with("tel:")
        || trimmed.starts_with("data:")
}

/// Exclusion policy for a resolved article URL.
pub fn is_excluded_article_url(url: &Url) -> bool {
    if url.scheme() != "http" && url.scheme() != "https" {
        return true;
    }

    if let Some(host) = url.host_str() {
        let host = host.to_lowercase();
        if SOCIAL_DOMAINS
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
        {
            return true;
        }
    }

    let path = url.path().to_lowercase();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if EXCLUDED_SEGMENTS.contains(&segment) {
            return true;
        }
    }

    if let Some(ext) = path.rsplit('/').next().and_then(|f| f.rsplit_once('.')) {
        if EXCLUDED_EXTENSIONS.contains(&ext.1) {
            return true;
        }
    }

    false
}

// ── Element helpers ──────────────────────────────────────────────────────────

fn element_excluded(el: &ElementRef<'_>, exclude: Option<&str>) -> bool {
    let Some(token) = exclude else {
        return false;
    };
    let class = el.value().attr("class").unwrap_or("");
    let id = el.value().attr("id").unwrap_or("");
    class.contains(token) || id.contains(token)
}

/// Resolve an href/src against the page URL. Pseudo-links and unresolvable
/// relative paths yield `None`.
fn absolutize(base: &Url, raw: &str) -> Option<Url> {
    if is_excluded_href(raw) {
        return None;
    }
    base.join(raw.trim()).ok()
}

/// Visible text of an element with whitespace collapsed, falling back to the
/// title attribute when the anchor wraps only an image.
fn candidate_text(el: &ElementRef<'_>) -> String {
    let text: String = el.text().collect::<Vec<_>>().join(" ");
    let collapsed = collapse_whitespace(&text);
    if !collapsed.is_empty() {
        return collapsed;
    }
    collapse_whitespace(el.value().attr("title").unwrap_or(""))
}

/// Pick the usable source of an `img`/`source` element, preferring the lazy
/// attributes a scroller populates later over a placeholder `src`.
fn image_source(el: &ElementRef<'_>) -> Option<String> {
    for attr in ["data-src", "data-lazy-src", "data-original"] {
        if let Some(v) = el.value().attr(attr) {
            if !is_excluded_href(v) {
                return Some(v.to_string());
            }
        }
    }
    if let Some(srcset) = el.value().attr("srcset") {
        // First entry of the srcset: "url 1x, url2 2x"
        let first = srcset.split(',').next()?.trim();
        let url = first.split_whitespace().next()?;
        if !is_excluded_href(url) {
            return Some(url.to_string());
        }
    }
    let src = el.value().attr("src")?;
    if is_excluded_href(src) {
        return None;
    }
    Some(src.to_string())
}

fn parse_dimension(attr: Option<&str>) -> Option<u32> {
    attr.and_then(|v| v.trim().trim_end_matches("px").parse::<u32>().ok())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
