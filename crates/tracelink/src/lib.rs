//! Tracelink - requirement traceability and change impact analysis.
//!
//! Given requirements extracted from documents, tracelink discovers typed
//! relationships between them (through a pluggable semantic classifier with
//! a deterministic heuristic fallback), measures traceability coverage, and
//! estimates the impact of changing a requirement by walking the relationship
//! graph.
//!
//! The [`engine::TraceEngine`] exposes the public operations; the `tracelink`
//! binary wraps it in a CLI over a `.tracelink/` workspace.

#![forbid(unsafe_code)]

// Core analysis
pub mod cancel;
pub mod classifier;
pub mod config;
pub mod coverage;
pub mod domain;
pub mod engine;
pub mod error;
pub mod graph;
pub mod id_generation;
pub mod impact;
pub mod loader;
pub mod matrix;
pub mod report;
pub mod storage;

// CLI support
pub mod app;
pub mod cli;
pub mod commands;
pub mod output;

pub use engine::{ImpactRun, MatrixRun, TraceEngine};
pub use error::{Error, Result, RunError};
