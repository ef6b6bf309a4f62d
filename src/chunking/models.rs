//! Data models for chunking

use crate::error::{PagerError, Result};
use serde::{Deserialize, Serialize};

/// A bounded slice of a larger payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Lines of this chunk joined with `\n`
    pub content: String,
    /// First source line covered, 0-based, overlap included
    pub start_line: usize,
    /// Last source line covered, inclusive
    pub end_line: usize,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub estimated_cost: usize,
}

impl Chunk {
    /// Number of source lines in this chunk
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// Whether another chunk follows this one
    pub fn has_next(&self) -> bool {
        self.chunk_index + 1 < self.total_chunks
    }
}

/// Chunking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Cost budget per chunk
    #[serde(default = "default_max_cost")]
    pub max_cost: usize,

    /// Lines repeated at the start of the next chunk
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,

    /// Overlap is disabled when false
    #[serde(default = "default_preserve_context")]
    pub preserve_context: bool,
}

fn default_max_cost() -> usize {
    4000
}

fn default_overlap_lines() -> usize {
    3
}

fn default_preserve_context() -> bool {
    true
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_cost: default_max_cost(),
            overlap_lines: default_overlap_lines(),
            preserve_context: default_preserve_context(),
        }
    }
}

impl ChunkingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_cost == 0 {
            return Err(PagerError::Configuration(
                "chunking.max_cost must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlap actually applied between chunks
    pub fn effective_overlap(&self) -> usize {
        if self.preserve_context {
            self.overlap_lines
        } else {
            0
        }
    }
}
