//! Error taxonomy for the harvesting engine.
//!
//! Only `ExhaustedFallbacks` ever reaches a caller of
//! [`crate::harvest::Harvester::harvest`]: fetch, render and timeout failures
//! are recoverable at the strategy level and trigger fallback instead of
//! propagating. Zero extracted candidates is not an error at all — it is an
//! empty, valid result. Per-item download failures are data, carried in
//! [`crate::download::DownloadOutcome`].

use thiserror::Error;

/// A failure somewhere in the harvest pipeline.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Network/transport failure on the static fetch path.
    #[error("static fetch failed: {0}")]
    FetchFailure(String),

    /// Rendering backend unavailable or navigation error.
    #[error("render failed: {0}")]
    RenderFailure(String),

    /// A per-stage timeout elapsed.
    #[error("stage timed out: {stage}")]
    Timeout { stage: &'static str },

    /// Every strategy path failed outright. The only fatal variant.
    #[error("all {attempts} strategy attempts failed, last error: {last}")]
    ExhaustedFallbacks { attempts: u32, last: String },
}

impl HarvestError {
    /// Whether the orchestrator may recover from this failure by falling
    /// back to the alternate strategy.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ExhaustedFallbacks { .. })
    }
}
