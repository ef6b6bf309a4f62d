//! Budget-aware chunking of diffs and free text
//!
//! Splits payloads into pieces that fit a downstream per-call cost budget,
//! with overlap between neighbouring chunks for context continuity.

pub mod engine;
pub mod models;
pub mod size_estimator;

pub use engine::ChunkingEngine;
pub use models::{Chunk, ChunkingConfig};
pub use size_estimator::{HeuristicEstimator, SizeEstimator};
