// Copyright 2026 Forager Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use forager::cli::{self, KindArg, ProfileArg};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "forager",
    about = "Forager — adaptive article and image harvester",
    version,
    after_help = "Run 'forager <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest ranked articles or images from a page
    Harvest {
        /// Page URL to harvest
        url: String,
        /// What to harvest
        #[arg(long, value_enum, default_value = "articles")]
        kind: KindArg,
        /// Maximum number of results
        #[arg(long, default_value = "50")]
        max: usize,
        /// Latency budget profile
        #[arg(long, value_enum, default_value = "thorough")]
        profile: ProfileArg,
        /// Download harvested images into this directory
        #[arg(long)]
        download_to: Option<PathBuf>,
        /// Parallel download workers
        #[arg(long)]
        concurrency: Option<usize>,
        /// Overall time budget in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Skip the browser entirely (static strategy only)
        #[arg(long)]
        no_browser: bool,
    },
    /// Classify a page and print the recommended retrieval strategy
    Classify {
        /// Page URL to classify
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Harvest {
            url,
            kind,
            max,
            profile,
            download_to,
            concurrency,
            timeout,
            no_browser,
        } => {
            cli::harvest_cmd::run(
                &url,
                kind,
                max,
                profile,
                download_to.as_deref(),
                concurrency,
                timeout,
                no_browser,
                cli.json,
            )
            .await
        }
        Commands::Classify { url } => cli::classify_cmd::run(&url, cli.json).await,
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli.json {
            println!(
                "{}",
                serde_json::json!({ "error": true, "message": format!("{e:#}") })
            );
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
