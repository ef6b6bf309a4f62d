//! Expiring in-memory store for pagination sessions
//!
//! Records are keyed by session id in a sharded map, so operations on
//! different tokens proceed independently while conflicting operations on the
//! same token are serialized by the shard lock. Expired entries are swept
//! opportunistically from `create` and `decode`; there is no background task.

use super::models::{PaginationRecord, Position, SessionUpdate, Totals};
use super::token::TokenCodec;
use crate::error::{PagerError, Result};
use crate::metrics::METRICS;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Token lifetime in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Minimum time between opportunistic sweeps in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Hard cap on live sessions; the oldest is evicted past this
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

/// Longest accepted token lifetime (one week)
pub const MAX_TTL_SECS: u64 = 7 * 24 * 60 * 60;

fn default_ttl_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_sessions() -> usize {
    10_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl SessionConfig {
    /// Get TTL as Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs == 0 || self.ttl_secs > MAX_TTL_SECS {
            return Err(PagerError::Configuration(format!(
                "session.ttl_secs must be between 1 and {}",
                MAX_TTL_SECS
            )));
        }
        Ok(())
    }
}

/// Session store
pub struct SessionStore {
    sessions: DashMap<Uuid, PaginationRecord>,
    codec: TokenCodec,
    ttl: Duration,
    sweep_interval: Duration,
    max_sessions: usize,
    last_sweep: Mutex<Instant>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionStore {
    /// Create a new store from configuration
    pub fn new(config: SessionConfig) -> Self {
        Self::with_ttl(config.ttl(), config.sweep_interval(), config.max_sessions)
    }

    /// Create a store with explicit timings
    pub fn with_ttl(ttl: Duration, sweep_interval: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            codec: TokenCodec::random(),
            ttl,
            sweep_interval,
            max_sessions: max_sessions.max(1),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Store a new pagination record and return its token
    pub fn create(
        &self,
        position: Position,
        totals: Totals,
        context: serde_json::Value,
    ) -> Result<String> {
        self.maybe_sweep();

        if self.sessions.len() >= self.max_sessions {
            self.sweep_expired();
            while self.sessions.len() >= self.max_sessions {
                if !self.evict_oldest() {
                    break;
                }
            }
        }

        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                PagerError::Internal(format!("Session TTL {:?} is out of range", self.ttl))
            })?;

        let session_id = Uuid::new_v4();
        let record = PaginationRecord {
            session_id,
            position,
            totals,
            context,
            created_at: now,
            expires_at,
        };

        let token = self.codec.encode(&session_id)?;
        self.sessions.insert(session_id, record);
        METRICS.sessions_created.inc();

        debug!(
            "Created pagination session {} at file {} chunk {}",
            short_id(&session_id),
            position.file_index,
            position.chunk_index
        );

        Ok(token)
    }

    /// Look up the record behind a token.
    ///
    /// Malformed, unknown and expired tokens all fail with `TokenInvalid`.
    pub fn decode(&self, token: &str) -> Result<PaginationRecord> {
        self.maybe_sweep();

        let session_id = self.resolve(token)?;
        let now = Utc::now();

        let record = self.sessions.get(&session_id).map(|entry| entry.clone());
        match record {
            Some(record) if !record.is_expired_at(now) => {
                METRICS.record_session_lookup(true);
                Ok(record)
            }
            Some(_) => {
                self.evict_if_expired(&session_id);
                Err(invalid())
            }
            None => Err(invalid()),
        }
    }

    /// Merge changes into a live record. Does not extend its lifetime.
    pub fn update(&self, token: &str, changes: SessionUpdate) -> Result<PaginationRecord> {
        let session_id = self.resolve(token)?;
        let now = Utc::now();

        if let Some(mut entry) = self.sessions.get_mut(&session_id) {
            if !entry.is_expired_at(now) {
                changes.apply(&mut entry);
                METRICS.record_session_lookup(true);
                return Ok(entry.clone());
            }
        }

        self.evict_if_expired(&session_id);
        Err(invalid())
    }

    /// Merge changes only if the record still sits at `expected`.
    ///
    /// The check and the merge happen under the record's shard lock. Returns
    /// `Ok(false)` when another caller moved the record first.
    pub fn update_if_at(
        &self,
        token: &str,
        expected: Position,
        changes: SessionUpdate,
    ) -> Result<bool> {
        let session_id = self.resolve(token)?;
        let now = Utc::now();

        if let Some(mut entry) = self.sessions.get_mut(&session_id) {
            if !entry.is_expired_at(now) {
                METRICS.record_session_lookup(true);
                if entry.position != expected {
                    return Ok(false);
                }
                changes.apply(&mut entry);
                return Ok(true);
            }
        }

        self.evict_if_expired(&session_id);
        Err(invalid())
    }

    /// Drop a session before it expires. Returns whether it existed.
    pub fn remove(&self, token: &str) -> bool {
        match self.codec.decode(token) {
            Some(session_id) => self.sessions.remove(&session_id).is_some(),
            None => false,
        }
    }

    /// Remove every expired record, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        self.sessions.retain(|_, record| {
            let keep = !record.is_expired_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            info!("Swept {} expired pagination sessions", removed);
            METRICS.record_evictions(removed);
        }
        removed
    }

    /// Number of stored records, expired ones included until swept
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Get store statistics
    pub fn stats(&self) -> SessionStats {
        let now = Utc::now();
        let total = self.sessions.len();
        let active = self
            .sessions
            .iter()
            .filter(|entry| !entry.is_expired_at(now))
            .count();

        SessionStats {
            total_sessions: total,
            active_sessions: active,
            expired_sessions: total.saturating_sub(active),
        }
    }

    fn resolve(&self, token: &str) -> Result<Uuid> {
        self.codec.decode(token).ok_or_else(invalid)
    }

    fn maybe_sweep(&self) {
        let due = match self.last_sweep.lock() {
            Ok(mut last) if last.elapsed() >= self.sweep_interval => {
                *last = Instant::now();
                true
            }
            _ => false,
        };

        if due {
            self.sweep_expired();
        }
    }

    fn evict_if_expired(&self, session_id: &Uuid) {
        let now = Utc::now();
        if self
            .sessions
            .remove_if(session_id, |_, record| record.is_expired_at(now))
            .is_some()
        {
            debug!("Evicted expired pagination session {}", short_id(session_id));
            METRICS.record_evictions(1);
        }
    }

    /// Evict the oldest record
    fn evict_oldest(&self) -> bool {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.created_at)
            .map(|entry| *entry.key());

        match oldest {
            Some(session_id) => {
                self.sessions.remove(&session_id);
                debug!("Evicted oldest pagination session {} at capacity", short_id(&session_id));
                METRICS.record_evictions(1);
                true
            }
            None => false,
        }
    }
}

/// Session store statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub expired_sessions: usize,
}

fn invalid() -> PagerError {
    METRICS.record_session_lookup(false);
    PagerError::TokenInvalid
}

fn short_id(session_id: &Uuid) -> String {
    session_id.simple().to_string()[..8].to_string()
}
