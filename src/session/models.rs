//! Data models for pagination sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a caller is within a multi-file result set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub file_index: usize,
    pub chunk_index: usize,
}

impl Position {
    pub fn new(file_index: usize, chunk_index: usize) -> Self {
        Self {
            file_index,
            chunk_index,
        }
    }
}

/// Size of the result set as of the last call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub total_files: usize,
    /// Chunks in the file at the current position
    pub total_chunks: usize,
}

impl Totals {
    pub fn new(total_files: usize, total_chunks: usize) -> Self {
        Self {
            total_files,
            total_chunks,
        }
    }
}

/// Pagination state stored behind a continuation token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationRecord {
    pub session_id: Uuid,
    pub position: Position,
    pub totals: Totals,
    /// Caller-supplied payload carried through unchanged
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PaginationRecord {
    /// Check whether the record is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Partial changes merged into an existing record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub position: Option<Position>,
    pub totals: Option<Totals>,
    pub context: Option<serde_json::Value>,
}

impl SessionUpdate {
    /// Update that only moves the position
    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    /// Merge into a record. Expiry is left untouched.
    pub fn apply(self, record: &mut PaginationRecord) {
        if let Some(position) = self.position {
            record.position = position;
        }
        if let Some(totals) = self.totals {
            record.totals = totals;
        }
        if let Some(context) = self.context {
            record.context = context;
        }
    }
}
