// Copyright 2026 Forager Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for harvest telemetry.
//!
//! The orchestrator emits `HarvestEvent`s during a harvest, which flow
//! through a `tokio::sync::broadcast` channel to all subscribers. Purely
//! advisory: when no subscriber exists, events are silently dropped.

use serde::{Deserialize, Serialize};

/// A progress event emitted during a harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestEvent {
    /// The harvest request ID this event belongs to.
    pub request_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: HarvestEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEventKind {
    /// The classifier picked a strategy.
    StrategyChosen {
        strategy: String,
        confidence: u32,
        reasons: Vec<String>,
    },
    /// The static fetch completed.
    FetchCompleted {
        status: u16,
        byte_size: usize,
        elapsed_ms: u64,
    },
    /// A pipeline stage produced candidates.
    StageCandidates { stage: String, count: usize },
    /// One scroll/settle cycle of the navigation controller.
    ScrollCycle {
        cycle: u32,
        new_items: usize,
        page_height: u64,
    },
    /// A strategy failed or came back empty and the alternate is being tried.
    FallbackTriggered {
        from: String,
        to: String,
        reason: String,
    },
    /// Harvest completed.
    HarvestComplete {
        total: usize,
        strategy_used: String,
        elapsed_ms: u64,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Sender handle for emitting progress events.
///
/// Backed by a `tokio::sync::broadcast` channel so multiple listeners can
/// subscribe independently. When no listeners exist, `send()` returns an
/// error which we silently ignore (zero cost when nobody's watching).
pub type ProgressSender = tokio::sync::broadcast::Sender<HarvestEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<HarvestEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
///
/// 256 events covers a typical harvest: a handful of stage events plus one
/// event per scroll cycle.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Convenience helper: emit a progress event, silently ignoring send errors
/// (which occur when no receivers are listening).
pub fn emit(
    tx: &Option<ProgressSender>,
    request_id: &str,
    seq: &mut u64,
    event: HarvestEventKind,
) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(HarvestEvent {
            request_id: request_id.to_string(),
            seq: *seq,
            event,
        });
    }
}
