//! # Selection
//!
//! A selection is a transient `[from, to)` view over a [`Document`](crate::Document).
//! It is only meaningful for the document version it was taken at.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub from: usize,
    pub to: usize,
}

impl Selection {
    /// Selection spanning two positions, in either order
    pub fn between(anchor: usize, head: usize) -> Self {
        Self {
            from: anchor.min(head),
            to: anchor.max(head),
        }
    }

    /// Caret with nothing selected
    pub fn collapsed(at: usize) -> Self {
        Self { from: at, to: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.from == self.to
    }

    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.is_collapsed()
    }

    /// Clamp both ends into a document of `len` characters
    pub fn clamp(self, len: usize) -> Self {
        Self {
            from: self.from.min(len),
            to: self.to.min(len),
        }
    }
}
