//! # Streaming Ingestion
//!
//! Appends generated chunks to the document as they arrive and decides,
//! once the stream ends, whether the generation completed or failed.
//!
//! ## Read loop
//!
//! ```text
//! chunk ──► append to document ──► append to accumulator ──► scan for sentinels
//!   ▲                                                              │
//!   └──────────────── keep draining, even after a hit ◄────────────┘
//! ```
//!
//! The caller holds the operation guard for the whole loop, so the user
//! cannot type into the region being written.

use crate::config::ComposeConfig;
use crate::editor::Editor;
use crate::error::{ComposeError, FailureReason, StreamError};
use crate::events::ComposeEvent;
use crate::generation::TextStream;
use crate::sentinel::SentinelScanner;
use crate::session::SessionStatus;
use futures::StreamExt;
use scribe_editor::{import_html, looks_like_markup, EditOrigin};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Result of draining one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionOutcome {
    /// `Complete` or `Failed`
    pub status: SessionStatus,
    /// Everything received, in arrival order
    pub text: String,
    pub chunks: usize,
    pub failure: Option<FailureReason>,
}

impl IngestionOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Complete
    }
}

pub struct StreamingIngestionController {
    editor: Arc<Editor>,
    scanner: SentinelScanner,
    render_markup: bool,
}

impl StreamingIngestionController {
    pub fn new(editor: Arc<Editor>, config: &ComposeConfig) -> Self {
        Self {
            editor,
            scanner: SentinelScanner::new(config.error_sentinels.clone(), config.scan_accumulated),
            render_markup: config.render_markup_on_complete,
        }
    }

    /// Clear the document and stream `stream` into it
    pub async fn ingest(
        &self,
        session_id: Uuid,
        mut stream: TextStream,
        cancel: &CancellationToken,
    ) -> Result<IngestionOutcome, ComposeError> {
        self.editor.write(|doc| doc.clear(EditOrigin::Programmatic))?;

        let mut accumulated = String::new();
        let mut chunks = 0;
        let mut failure: Option<FailureReason> = None;
        let mut cancelled = false;

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                item = stream.next() => item,
            };

            let Some(item) = item else { break };

            match item {
                Ok(chunk) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    chunks += 1;
                    let total_chars = self.editor.write(|doc| {
                        doc.append(&chunk, EditOrigin::Programmatic)
                            .map(|_| doc.len())
                    })?;
                    accumulated.push_str(&chunk);

                    self.editor.events().publish(ComposeEvent::ChunkApplied {
                        session_id,
                        chars: chunk.chars().count(),
                        total_chars,
                    });

                    if failure.is_none() {
                        if let Some(hit) = self.scanner.scan_chunk(&chunk, &accumulated) {
                            tracing::warn!(%session_id, sentinel = hit, "error sentinel in stream");
                            failure = Some(StreamError::Sentinel(hit.to_string()).into());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(%session_id, error = %e, "transport error while streaming");
                    if failure.is_none() {
                        failure = Some(e.into());
                    }
                }
            }
        }

        let failure = if cancelled {
            tracing::info!(%session_id, chunks, "generation cancelled");
            Some(StreamError::Cancelled.into())
        } else if failure.is_some() {
            failure
        } else if accumulated.trim().is_empty() {
            Some(StreamError::Empty.into())
        } else {
            None
        };

        let status = match failure {
            Some(_) => SessionStatus::Failed,
            None => {
                self.render_markup(session_id, &accumulated)?;
                SessionStatus::Complete
            }
        };

        tracing::debug!(%session_id, chunks, ?status, "stream drained");

        Ok(IngestionOutcome {
            status,
            text: accumulated,
            chunks,
            failure,
        })
    }

    /// Replace raw markup with its rendered form
    fn render_markup(&self, session_id: Uuid, text: &str) -> Result<(), ComposeError> {
        if !self.render_markup || !looks_like_markup(text) {
            return Ok(());
        }

        match import_html(text) {
            Ok(rendered) => {
                self.editor.write(|doc| doc.restore(rendered.snapshot()))?;
                tracing::debug!(%session_id, "rendered generated markup");
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "generated markup kept as text");
            }
        }
        Ok(())
    }
}
