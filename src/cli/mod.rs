//! CLI command implementations — a thin front over the library.

pub mod classify_cmd;
pub mod harvest_cmd;

use crate::extract::HarvestKind;
use crate::harvest::Profile;
use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// CLI-facing harvest kind.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Articles,
    Images,
}

impl From<KindArg> for HarvestKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Articles => HarvestKind::Articles,
            KindArg::Images => HarvestKind::Images,
        }
    }
}

/// CLI-facing latency profile.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProfileArg {
    Thorough,
    Fast,
}

impl From<ProfileArg> for Profile {
    fn from(value: ProfileArg) -> Self {
        match value {
            ProfileArg::Thorough => Profile::Thorough,
            ProfileArg::Fast => Profile::Fast,
        }
    }
}

/// Install the global tracing subscriber. RUST_LOG wins when set.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "forager=debug" } else { "forager=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
