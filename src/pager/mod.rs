//! Stateless resume flow over multi-file diffs
//!
//! The first read serves the first chunk and mints a continuation token that
//! points at the next position. Each resume re-chunks the file at the stored
//! position, serves that chunk and advances the token. Chunking is
//! deterministic, so re-chunking a refetched payload reproduces the same
//! boundaries.

use crate::chunking::{Chunk, ChunkingConfig, ChunkingEngine};
use crate::error::{PagerError, Result};
use crate::session::{Position, SessionStore, SessionUpdate, Totals};
use crate::upstream::FileDiff;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Source of the payload behind a pagination session.
///
/// `context` is the value carried by the session, so a resume can refetch
/// the same payload without the caller resending it.
#[async_trait]
pub trait DiffSource: Send + Sync {
    async fn load(&self, context: &serde_json::Value) -> Result<Vec<FileDiff>>;
}

/// One served chunk
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub file_index: usize,
    pub filename: String,
    pub chunk: Chunk,
    /// File count and chunk count of the served file
    pub totals: Totals,
    /// Token for the next page; `None` once the result set is exhausted
    pub continuation: Option<String>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}

/// Chunked, resumable reads over a list of file diffs
pub struct ChunkPager {
    engine: ChunkingEngine,
    config: ChunkingConfig,
    store: Arc<SessionStore>,
}

impl ChunkPager {
    pub fn new(engine: ChunkingEngine, config: ChunkingConfig, store: Arc<SessionStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            config,
            store,
        })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// All chunks of one file; empty patches yield none
    pub fn chunks_for(&self, file: &FileDiff) -> Vec<Chunk> {
        self.engine.chunk_text(file.patch_text(), &self.config)
    }

    /// Random access to a single chunk
    pub fn chunk_at(&self, files: &[FileDiff], file_index: usize, chunk_index: usize) -> Result<Chunk> {
        let chunks = files
            .get(file_index)
            .map(|file| self.chunks_for(file))
            .unwrap_or_default();

        let total = chunks.len();
        chunks
            .into_iter()
            .nth(chunk_index)
            .ok_or(PagerError::ChunkIndexOutOfRange {
                requested: chunk_index,
                total,
            })
    }

    /// Serve the first chunk of the result set.
    ///
    /// Returns `None` when no file has any content.
    pub fn open(&self, files: &[FileDiff], context: serde_json::Value) -> Result<Option<Page>> {
        let Some((file_index, chunks)) = self.next_non_empty(files, 0) else {
            debug!("Nothing to page over {} files", files.len());
            return Ok(None);
        };

        let total_chunks = chunks.len();
        let continuation = match self.next_position(files, file_index, 0, total_chunks) {
            Some((position, totals)) => Some(self.store.create(position, totals, context)?),
            None => None,
        };

        Ok(Some(self.page(files, file_index, chunks, 0, continuation)))
    }

    /// Serve the chunk a token points at and advance the token.
    ///
    /// The returned page carries the same token while chunks remain. A token
    /// that has reached its last chunk keeps serving it until it expires.
    /// Concurrent resumes of one token each get a distinct chunk: the
    /// position only advances if nobody moved it since it was read.
    pub fn resume(&self, token: &str, files: &[FileDiff]) -> Result<Page> {
        loop {
            let record = self.store.decode(token)?;
            let position = record.position;

            let file = files.get(position.file_index).ok_or(PagerError::TokenInvalid)?;
            let chunks = self.chunks_for(file);
            let total_chunks = chunks.len();
            if position.chunk_index >= total_chunks {
                return Err(PagerError::ChunkIndexOutOfRange {
                    requested: position.chunk_index,
                    total: total_chunks,
                });
            }

            let next =
                self.next_position(files, position.file_index, position.chunk_index, total_chunks);
            let continuation = match next {
                Some((next_position, totals)) => {
                    let advanced = self.store.update_if_at(
                        token,
                        position,
                        SessionUpdate {
                            position: Some(next_position),
                            totals: Some(totals),
                            context: None,
                        },
                    )?;
                    if !advanced {
                        debug!("Continuation moved concurrently, re-reading position");
                        continue;
                    }
                    Some(token.to_string())
                }
                None => None,
            };

            return Ok(self.page(files, position.file_index, chunks, position.chunk_index, continuation));
        }
    }

    /// `open` over a payload fetched from `source`
    pub async fn open_from_source(
        &self,
        source: &dyn DiffSource,
        context: serde_json::Value,
    ) -> Result<Option<Page>> {
        let files = source.load(&context).await?;
        self.open(&files, context)
    }

    /// `resume` over a payload refetched with the session's context
    pub async fn resume_from_source(&self, token: &str, source: &dyn DiffSource) -> Result<Page> {
        let record = self.store.decode(token)?;
        let files = source.load(&record.context).await?;
        self.resume(token, &files)
    }

    fn page(
        &self,
        files: &[FileDiff],
        file_index: usize,
        chunks: Vec<Chunk>,
        chunk_index: usize,
        continuation: Option<String>,
    ) -> Page {
        let totals = Totals::new(files.len(), chunks.len());
        let filename = files[file_index].filename.clone();
        let chunk = chunks.into_iter().nth(chunk_index).unwrap_or_default();
        Page {
            file_index,
            filename,
            chunk,
            totals,
            continuation,
        }
    }

    /// First file at or after `from` with at least one chunk
    fn next_non_empty(&self, files: &[FileDiff], from: usize) -> Option<(usize, Vec<Chunk>)> {
        files
            .iter()
            .enumerate()
            .skip(from)
            .map(|(index, file)| (index, self.chunks_for(file)))
            .find(|(_, chunks)| !chunks.is_empty())
    }

    fn next_position(
        &self,
        files: &[FileDiff],
        file_index: usize,
        chunk_index: usize,
        total_chunks: usize,
    ) -> Option<(Position, Totals)> {
        if chunk_index + 1 < total_chunks {
            return Some((
                Position::new(file_index, chunk_index + 1),
                Totals::new(files.len(), total_chunks),
            ));
        }

        self.next_non_empty(files, file_index + 1)
            .map(|(next, chunks)| (Position::new(next, 0), Totals::new(files.len(), chunks.len())))
    }
}
