//! # Selection & Rewrite Coordinator
//!
//! Tracks the user's selection, positions the rewrite affordance, and runs
//! scoped rewrites of the selected span.
//!
//! ## Phases
//!
//! ```text
//!          select (non-collapsed)           rewrite()
//!   Idle ─────────────────────────► Selected ─────────► Rewriting
//!    ▲  ◄─────────────────────────────  │                 │    │
//!    │   select (collapsed) / blur      │       non-empty │    │ empty / failed
//!    │                                  │                 ▼    ▼
//!    └──────────────────────────────────┴─────────── Applied  Rejected
//! ```
//!
//! `Applied` and `Rejected` are published and then settle straight back to
//! `Idle` with the affordance hidden, as does every other exit from
//! `rewrite()` once the operation lock was taken.
//!
//! The response is accumulated in full before anything touches the
//! document; a rejected rewrite leaves the span exactly as it was. An
//! applied rewrite can be undone once, restoring both the prior content
//! and the prior selection, as long as nothing else has changed the
//! document since.

use crate::config::ComposeConfig;
use crate::editor::{lock, Editor, OperationKind};
use crate::error::{ComposeError, FailureReason, StreamError, ValidationError};
use crate::events::{ComposeEvent, Notice, NoticeLevel};
use crate::generation::{GenerationService, RewriteCommand, RewriteRequest, TextStream};
use crate::sentinel::SentinelScanner;
use futures::StreamExt;
use scribe_editor::{EditOrigin, Selection, UndoSlot, UndoSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewritePhase {
    Idle,
    Selected,
    Rewriting,
    Applied,
    Rejected,
}

/// Screen rectangle of a caret position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Screen rectangles of both ends of a selection
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionBounds {
    pub start: Rect,
    pub end: Rect,
}

/// Where the rewrite menu is drawn
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affordance {
    pub left: f32,
    pub top: f32,
}

impl Affordance {
    /// Centred over the selection, `offset` above its first line
    pub fn above(bounds: &SelectionBounds, offset: f32) -> Self {
        Self {
            left: (bounds.start.left + bounds.end.right) / 2.0,
            top: bounds.start.top - offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    Applied {
        /// Caret placed after the inserted text
        selection: Selection,
        text: String,
    },
    Rejected {
        reason: FailureReason,
    },
}

struct CoordinatorState {
    phase: RewritePhase,
    selection: Selection,
    /// Document version the selection was taken at
    captured_version: u64,
    affordance: Option<Affordance>,
    undo: UndoSlot,
    /// Document version right after the undoable rewrite was applied
    applied_version: u64,
    /// Bumped on every focus/selection change; a pending blur only hides
    /// the affordance if the epoch it saw is still current
    blur_epoch: u64,
}

pub struct SelectionRewriteCoordinator {
    editor: Arc<Editor>,
    service: Arc<dyn GenerationService>,
    scanner: SentinelScanner,
    context_window: usize,
    affordance_offset: f32,
    blur_grace: Duration,
    state: Arc<Mutex<CoordinatorState>>,
}

impl SelectionRewriteCoordinator {
    pub fn new(
        editor: Arc<Editor>,
        service: Arc<dyn GenerationService>,
        config: &ComposeConfig,
    ) -> Self {
        let captured_version = editor.version();
        Self {
            editor,
            service,
            scanner: SentinelScanner::new(config.error_sentinels.clone(), false),
            context_window: config.context_window,
            affordance_offset: config.affordance_offset,
            blur_grace: config.blur_grace(),
            state: Arc::new(Mutex::new(CoordinatorState {
                phase: RewritePhase::Idle,
                selection: Selection::default(),
                captured_version,
                affordance: None,
                undo: UndoSlot::new(),
                applied_version: captured_version,
                blur_epoch: 0,
            })),
        }
    }

    pub fn phase(&self) -> RewritePhase {
        lock(&self.state).phase
    }

    pub fn selection(&self) -> Selection {
        lock(&self.state).selection
    }

    pub fn affordance(&self) -> Option<Affordance> {
        lock(&self.state).affordance
    }

    /// An applied rewrite is still undoable: its snapshot is held and the
    /// document has not changed since
    pub fn can_undo(&self) -> bool {
        let current = self.editor.version();
        let state = lock(&self.state);
        state.undo.can_undo() && state.applied_version == current
    }

    /// Record a selection change reported by the editing surface
    pub fn select(&self, selection: Selection, bounds: SelectionBounds) {
        let (len, version) = self.editor.read(|doc| (doc.len(), doc.version()));
        let selection = selection.clamp(len);

        let (phase, affordance) = {
            let mut state = lock(&self.state);
            state.blur_epoch += 1;
            state.selection = selection;
            state.captured_version = version;

            if state.phase != RewritePhase::Rewriting {
                if selection.is_collapsed() {
                    state.phase = RewritePhase::Idle;
                    state.affordance = None;
                } else {
                    state.phase = RewritePhase::Selected;
                    state.affordance = Some(Affordance::above(&bounds, self.affordance_offset));
                }
            }
            (state.phase, state.affordance)
        };

        self.publish(ComposeEvent::RewritePhase(phase));
        self.publish(ComposeEvent::Affordance(affordance));
    }

    /// Focus came back to the editor or the menu; cancels a pending blur
    pub fn focus(&self) {
        lock(&self.state).blur_epoch += 1;
    }

    /// Focus left; hide the affordance and fall back to `Idle` after the
    /// grace delay
    ///
    /// A rewrite in flight keeps its phase. Must be called from within a
    /// tokio runtime.
    pub fn blur(&self) -> JoinHandle<()> {
        let epoch = {
            let mut state = lock(&self.state);
            state.blur_epoch += 1;
            state.blur_epoch
        };

        let state = self.state.clone();
        let events = self.editor.events().clone();
        let grace = self.blur_grace;

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let (hidden, idled) = {
                let mut state = lock(&state);
                if state.blur_epoch != epoch {
                    return;
                }
                let hidden = state.affordance.take().is_some();
                let idled = state.phase == RewritePhase::Selected;
                if idled {
                    state.phase = RewritePhase::Idle;
                }
                (hidden, idled)
            };
            if idled {
                events.publish(ComposeEvent::RewritePhase(RewritePhase::Idle));
            }
            if hidden {
                events.publish(ComposeEvent::Affordance(None));
            }
        })
    }

    /// Rewrite the current selection
    ///
    /// Pre-flight problems are returned as `Err` with nothing changed; a
    /// rewrite that reached the service reports its result as an outcome.
    /// Once the operation lock is held, every exit settles back to `Idle`.
    pub async fn rewrite(&self, command: RewriteCommand) -> Result<RewriteOutcome, ComposeError> {
        let guard = self.editor.begin(OperationKind::Rewrite)?;
        let result = self.run_rewrite(command).await;
        self.settle();
        drop(guard);
        result
    }

    async fn run_rewrite(&self, command: RewriteCommand) -> Result<RewriteOutcome, ComposeError> {
        let (selection, captured_version) = {
            let state = lock(&self.state);
            (state.selection, state.captured_version)
        };

        let current = self.editor.version();
        if current != captured_version {
            return Err(ValidationError::StaleSelection {
                captured: captured_version,
                current,
            }
            .into());
        }
        if selection.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }

        let (request, snapshot) = self.editor.read(|doc| {
            let text = doc.text();
            let chars: Vec<char> = text.chars().collect();
            let before_start = selection.from.saturating_sub(self.context_window);
            let after_end = (selection.to + self.context_window).min(chars.len());

            let request = RewriteRequest {
                text: chars[selection.from..selection.to].iter().collect(),
                command,
                context_before: chars[before_start..selection.from].iter().collect(),
                context_after: chars[selection.to..after_end].iter().collect(),
            };
            (request, UndoSnapshot::capture(doc, selection))
        });

        self.set_phase(RewritePhase::Rewriting);
        tracing::info!(
            %command,
            from = selection.from,
            to = selection.to,
            chars = selection.len(),
            "rewrite started"
        );

        let result = match self.service.rewrite(request).await {
            Ok(stream) => self.collect(stream).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(text) => {
                self.editor.write(|doc| {
                    doc.replace(selection.from, selection.to, &text, EditOrigin::Programmatic)
                })?;
                let caret = Selection::collapsed(selection.from + text.chars().count());
                let version = self.editor.version();

                {
                    let mut state = lock(&self.state);
                    state.undo.store(snapshot);
                    state.applied_version = version;
                    state.selection = caret;
                    state.captured_version = version;
                }
                tracing::info!(%command, chars = text.chars().count(), "rewrite applied");
                self.set_phase(RewritePhase::Applied);
                self.notify(Notice::new(NoticeLevel::Success, "Rewrite applied").with_undo());

                Ok(RewriteOutcome::Applied {
                    selection: caret,
                    text,
                })
            }
            Err(reason) => {
                tracing::warn!(%command, %reason, "rewrite rejected");
                self.set_phase(RewritePhase::Rejected);
                self.notify(Notice::new(NoticeLevel::Error, "Rewrite failed"));
                Ok(RewriteOutcome::Rejected { reason })
            }
        }
    }

    /// Back to `Idle` with the affordance hidden
    fn settle(&self) {
        let hidden = {
            let mut state = lock(&self.state);
            state.phase = RewritePhase::Idle;
            state.affordance.take().is_some()
        };
        self.publish(ComposeEvent::RewritePhase(RewritePhase::Idle));
        if hidden {
            self.publish(ComposeEvent::Affordance(None));
        }
    }

    /// Undo the latest applied rewrite
    ///
    /// Returns `false` when there is nothing to undo, including when the
    /// document changed after the rewrite; that snapshot is discarded.
    /// The restored selection is reinstated with the coordinator `Idle`;
    /// the editing surface reports its bounds through [`select`](Self::select).
    pub fn undo(&self) -> Result<bool, ComposeError> {
        let _guard = self.editor.begin(OperationKind::Undo)?;
        let current = self.editor.version();

        let snapshot = {
            let mut state = lock(&self.state);
            if state.undo.can_undo() && state.applied_version != current {
                tracing::debug!(
                    applied = state.applied_version,
                    current,
                    "document changed since the rewrite, dropping undo snapshot"
                );
                state.undo.clear();
            }
            state.undo.take()
        };
        let Some(snapshot) = snapshot else {
            return Ok(false);
        };

        let selection = self.editor.write(|doc| snapshot.restore_into(doc))?;
        let version = self.editor.version();
        let hidden = {
            let mut state = lock(&self.state);
            state.selection = selection;
            state.captured_version = version;
            state.phase = RewritePhase::Idle;
            state.affordance.take().is_some()
        };

        tracing::info!(from = selection.from, to = selection.to, "rewrite undone");
        self.publish(ComposeEvent::RewritePhase(RewritePhase::Idle));
        if hidden {
            self.publish(ComposeEvent::Affordance(None));
        }
        self.notify(Notice::new(NoticeLevel::Success, "Rewrite undone"));
        Ok(true)
    }

    /// Accumulate the whole response and decide whether it is usable
    async fn collect(&self, mut stream: TextStream) -> Result<String, FailureReason> {
        let mut accumulated = String::new();
        let mut failure: Option<FailureReason> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => accumulated.push_str(&chunk),
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e.into());
                    }
                }
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }
        if let Some(hit) = self.scanner.find(&accumulated) {
            return Err(StreamError::Sentinel(hit.to_string()).into());
        }

        let trimmed = accumulated.trim();
        if trimmed.is_empty() {
            return Err(StreamError::Empty.into());
        }
        Ok(trimmed.to_string())
    }

    fn set_phase(&self, phase: RewritePhase) {
        lock(&self.state).phase = phase;
        self.publish(ComposeEvent::RewritePhase(phase));
    }

    fn notify(&self, notice: Notice) {
        self.publish(ComposeEvent::Notice(notice));
    }

    fn publish(&self, event: ComposeEvent) {
        self.editor.events().publish(event);
    }
}
