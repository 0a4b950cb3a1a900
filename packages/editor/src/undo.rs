//! # Rewrite Undo
//!
//! A rewrite is undone by restoring the whole document as it was right
//! before the replacement, together with the selection the user had.
//!
//! ## Design
//!
//! - A snapshot is captured before the replacement is applied
//! - Only the latest rewrite can be undone (one slot, not a stack)
//! - Undo consumes the snapshot; a second undo is a no-op
//! - The owner drops the snapshot with [`UndoSlot::clear`] once it no
//!   longer matches the document
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut slot = UndoSlot::new();
//! slot.store(UndoSnapshot::capture(&doc, selection));
//! doc.replace(from, to, "rewritten", EditOrigin::Programmatic)?;
//!
//! // Undo
//! if let Some(snapshot) = slot.take() {
//!     let selection = snapshot.restore_into(&mut doc)?;
//! }
//! ```

use crate::{Document, DocumentError, DocumentState, Selection};

/// Document content and selection captured before a rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoSnapshot {
    pub prior_document: DocumentState,
    pub prior_selection: Selection,
}

impl UndoSnapshot {
    pub fn capture(doc: &Document, selection: Selection) -> Self {
        Self {
            prior_document: doc.snapshot(),
            prior_selection: selection,
        }
    }

    /// Put the captured content back and return the captured selection
    pub fn restore_into(self, doc: &mut Document) -> Result<Selection, DocumentError> {
        doc.restore(self.prior_document)?;
        Ok(self.prior_selection)
    }
}

/// Holds the snapshot of the most recent rewrite
#[derive(Debug, Default)]
pub struct UndoSlot {
    snapshot: Option<UndoSnapshot>,
}

impl UndoSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `snapshot`, dropping any older one
    pub fn store(&mut self, snapshot: UndoSnapshot) {
        self.snapshot = Some(snapshot);
    }

    pub fn can_undo(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Hand out the snapshot for restoring, leaving the slot empty
    pub fn take(&mut self) -> Option<UndoSnapshot> {
        self.snapshot.take()
    }

    /// Drop the snapshot without applying it
    pub fn clear(&mut self) {
        self.snapshot = None;
    }
}
