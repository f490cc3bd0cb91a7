//! `forager harvest` — run one harvest and print the ranked results.

use super::{KindArg, ProfileArg};
use crate::config::HarvestConfig;
use crate::extract::{HarvestKind, RuleSet};
use crate::harvest::{Harvester, HarvestRequest};
use crate::renderer::{chromium::ChromiumRenderer, NoopRenderer, Renderer};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    url: &str,
    kind: KindArg,
    max: usize,
    profile: ProfileArg,
    download_to: Option<&Path>,
    concurrency: Option<usize>,
    timeout: Option<u64>,
    no_browser: bool,
    json: bool,
) -> Result<()> {
    let mut config = HarvestConfig::default();
    config.download_concurrency = concurrency;

    let renderer = make_renderer(no_browser).await;
    let harvester = Harvester::new(config, RuleSet::default(), renderer);

    let kind: HarvestKind = kind.into();
    let result = harvester
        .harvest(HarvestRequest {
            url: url.to_string(),
            kind,
            max_results: max,
            profile: profile.into(),
            deadline_ms: timeout,
        })
        .await
        .context("harvest failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "strategy {} (confidence {}%), {} attempt(s), {} fallback(s), {} result(s) in {}ms",
            result.strategy,
            result.confidence,
            result.attempts,
            result.fallbacks,
            result.items.len(),
            result.elapsed_ms
        );
        for item in &result.items {
            println!(
                "  [{:>3}] {}  {}",
                item.score,
                item.candidate.url,
                truncate(&item.candidate.text, 70)
            );
        }
    }

    if let Some(dest) = download_to {
        if kind == HarvestKind::Images {
            let outcomes = harvester.download(&result, dest).await;
            let ok = outcomes.iter().filter(|o| o.success).count();
            if json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                println!("downloaded {ok}/{} images to {}", outcomes.len(), dest.display());
                for o in outcomes.iter().filter(|o| !o.success) {
                    println!("  failed: {}  {}", o.url, o.error.as_deref().unwrap_or(""));
                }
            }
        } else {
            warn!("--download-to only applies to --kind images, ignoring");
        }
    }

    Ok(())
}

async fn make_renderer(no_browser: bool) -> Arc<dyn Renderer> {
    if no_browser {
        return Arc::new(NoopRenderer);
    }
    match ChromiumRenderer::new().await {
        Ok(renderer) => Arc::new(renderer),
        Err(e) => {
            warn!("browser unavailable ({e:#}); continuing static-only");
            Arc::new(NoopRenderer)
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}
