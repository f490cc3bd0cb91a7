//! `forager classify` — print the classifier's recommendation for a page.

use crate::config::HarvestConfig;
use crate::extract::RuleSet;
use crate::harvest::Harvester;
use crate::renderer::NoopRenderer;
use anyhow::Result;
use std::sync::Arc;

pub async fn run(url: &str, json: bool) -> Result<()> {
    // Classification never needs a browser.
    let harvester = Harvester::new(
        HarvestConfig::default(),
        RuleSet::default(),
        Arc::new(NoopRenderer),
    );
    let rec = harvester.classify_only(url).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&rec)?);
    } else {
        println!("{} (confidence {}%)", rec.strategy, rec.confidence);
        for reason in &rec.reasons {
            println!("  - {reason}");
        }
        if let Some(signals) = &rec.signals {
            println!(
                "  signals: {} scripts, {} article links, {} images, {} nodes, {} bytes",
                signals.script_count,
                signals.article_link_count,
                signals.image_count,
                signals.node_count,
                signals.byte_size
            );
        }
    }

    Ok(())
}
