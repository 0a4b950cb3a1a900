//! # Editing Surface
//!
//! Owns the document for one editing session and serialises its writers.
//!
//! Ingestion, rewrite-apply and undo-restore all write to the same buffer.
//! Each of them first takes the operation lock through [`Editor::begin`];
//! the returned [`OperationGuard`] keeps the document closed to user input
//! and releases everything when dropped, whatever path the operation took.

use crate::events::{ComposeEvent, EventBus};
use crate::ComposeError;
use scribe_editor::{export_word_html, BlockKind, Document, DocumentError, EditOrigin, Mark};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kind of AI operation holding the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Generation,
    Rewrite,
    Undo,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Generation => "generation",
            OperationKind::Rewrite => "rewrite",
            OperationKind::Undo => "undo",
        };
        f.write_str(name)
    }
}

/// Document plus the one-operation-at-a-time lock
pub struct Editor {
    document: Mutex<Document>,
    active: Mutex<Option<OperationKind>>,
    events: EventBus<ComposeEvent>,
}

impl Editor {
    pub fn new(document: Document, events: EventBus<ComposeEvent>) -> Arc<Self> {
        Arc::new(Self {
            document: Mutex::new(document),
            active: Mutex::new(None),
            events,
        })
    }

    pub fn events(&self) -> &EventBus<ComposeEvent> {
        &self.events
    }

    /// Read access to the document
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&lock(&self.document))
    }

    /// Write access for protocol writers (ingestion, rewrite, undo)
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut lock(&self.document))
    }

    pub fn text(&self) -> String {
        self.read(Document::text)
    }

    pub fn version(&self) -> u64 {
        self.read(Document::version)
    }

    pub fn is_editable(&self) -> bool {
        self.read(Document::is_editable)
    }

    pub fn active_operation(&self) -> Option<OperationKind> {
        *lock(&self.active)
    }

    /// Typed input from the user
    pub fn user_replace(&self, from: usize, to: usize, text: &str) -> Result<(), DocumentError> {
        self.write(|doc| doc.replace(from, to, text, EditOrigin::User))
    }

    /// Bold/italic toggle from the user
    pub fn user_format(
        &self,
        from: usize,
        to: usize,
        mark: Mark,
        on: bool,
    ) -> Result<(), DocumentError> {
        self.write(|doc| doc.format(from, to, mark, on, EditOrigin::User))
    }

    /// Heading toggle from the user
    pub fn user_set_block(&self, offset: usize, kind: BlockKind) -> Result<(), DocumentError> {
        self.write(|doc| doc.set_block(offset, kind, EditOrigin::User))
    }

    pub fn export_word_html(&self) -> String {
        self.read(export_word_html)
    }

    /// Take the operation lock, or fail if another operation holds it
    ///
    /// Attempts are rejected, never queued.
    pub fn begin(self: &Arc<Self>, kind: OperationKind) -> Result<OperationGuard, ComposeError> {
        {
            let mut active = lock(&self.active);
            if let Some(current) = *active {
                tracing::debug!(requested = %kind, active = %current, "operation rejected");
                return Err(ComposeError::Busy { active: current });
            }
            *active = Some(kind);
        }

        self.write(|doc| doc.set_editable(false));
        tracing::debug!(operation = %kind, "operation lock acquired");

        Ok(OperationGuard {
            editor: self.clone(),
            kind,
        })
    }
}

/// Held for the duration of one AI operation
pub struct OperationGuard {
    editor: Arc<Editor>,
    kind: OperationKind,
}

impl OperationGuard {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.editor.write(|doc| doc.set_editable(true));
        *lock(&self.editor.active) = None;
        tracing::debug!(operation = %self.kind, "operation lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor(text: &str) -> Arc<Editor> {
        Editor::new(Document::from_text(text), EventBus::new())
    }

    #[test]
    fn test_guard_locks_and_releases() {
        let editor = editor("abc");
        {
            let guard = editor.begin(OperationKind::Rewrite).unwrap();
            assert_eq!(guard.kind(), OperationKind::Rewrite);
            assert!(!editor.is_editable());
            assert_eq!(editor.active_operation(), Some(OperationKind::Rewrite));
            assert_eq!(
                editor.user_replace(0, 1, "x"),
                Err(DocumentError::ReadOnly)
            );
        }
        assert!(editor.is_editable());
        assert_eq!(editor.active_operation(), None);
        editor.user_replace(0, 1, "x").unwrap();
        assert_eq!(editor.text(), "xbc");
    }

    #[test]
    fn test_second_operation_is_rejected() {
        let editor = editor("abc");
        let _guard = editor.begin(OperationKind::Generation).unwrap();

        match editor.begin(OperationKind::Rewrite) {
            Err(ComposeError::Busy { active }) => assert_eq!(active, OperationKind::Generation),
            _ => panic!("expected Busy"),
        }
    }

    #[test]
    fn test_guard_released_on_panic() {
        let editor = editor("abc");
        let cloned = editor.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.begin(OperationKind::Rewrite).unwrap();
            panic!("operation blew up");
        }));

        assert!(result.is_err());
        assert!(editor.is_editable());
        assert!(editor.begin(OperationKind::Rewrite).is_ok());
    }
}
