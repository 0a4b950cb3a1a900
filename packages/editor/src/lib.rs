//! # Scribe Editor
//!
//! Rich-text document buffer for AI-assisted composition.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ generation stream / rewrite result          │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: Document buffer                     │
//! │  - Runs with inline marks (bold, italic)    │
//! │  - One block kind per paragraph             │
//! │  - replace / append / snapshot / restore    │
//! │  - User writes refused while locked         │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ export: Word-compatible HTML                │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Character offsets**: positions count Unicode scalar values
//! 2. **Versioned**: every mutation bumps the version, stale offsets are detectable
//! 3. **Marks travel with text**: replacing a span never reformats its neighbours
//! 4. **Single writer**: locking is expressed through [`EditOrigin`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scribe_editor::{Document, EditOrigin, Selection, UndoSnapshot};
//!
//! let mut doc = Document::new();
//! doc.append("<h2>标题</h2>", EditOrigin::Programmatic)?;
//!
//! let snapshot = UndoSnapshot::capture(&doc, Selection::between(0, 4));
//! doc.replace(0, 4, "新标题", EditOrigin::Programmatic)?;
//! snapshot.restore_into(&mut doc)?;
//! ```

mod document;
mod errors;
mod export;
mod selection;
mod tokenizer;
mod undo;

pub use document::{
    BlockKind, Document, DocumentState, EditOrigin, Mark, Marks, NodeId, Paragraph, Run,
};
pub use errors::DocumentError;
pub use export::{export_body, export_word_html, import_html, looks_like_markup};
pub use selection::Selection;
pub use undo::{UndoSlot, UndoSnapshot};
