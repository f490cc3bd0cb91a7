// Copyright 2026 Forager Contributors
// SPDX-License-Identifier: Apache-2.0

//! Forager library — adaptive web harvesting engine.
//!
//! Classifies a page to pick a retrieval strategy, extracts candidate
//! articles/images through ordered selector cascades, drives incremental
//! content loading to convergence, then scores, deduplicates and ranks the
//! results. This library crate exposes the core modules for integration
//! testing.

#![allow(clippy::new_without_default)]

pub mod classify;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod harvest;
pub mod navigate;
pub mod progress;
pub mod renderer;
pub mod score;
