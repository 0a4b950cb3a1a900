//! # Document Buffer
//!
//! Core rich-text container for composed articles.
//!
//! A Document is an ordered arena of formatted text runs plus one block kind
//! per paragraph. Paragraphs are separated by `'\n'` in the logical character
//! sequence, so every offset handed to the buffer counts Unicode scalar values
//! across the whole document, newlines included.
//!
//! ## Lifecycle
//!
//! ```text
//! Stream → append → ... → snapshot ─┐
//!                 replace (rewrite) ←┘ restore (undo)
//! ```
//!
//! Every mutation bumps [`Document::version`]. Offsets captured at an older
//! version are no longer trustworthy and must be re-derived by the caller.

use crate::DocumentError;
use serde::{Deserialize, Serialize};

/// Identifier of a run inside the arena
pub type NodeId = u64;

/// Inline formatting carried by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Marks {
    pub bold: bool,
    pub italic: bool,
}

impl Marks {
    pub const PLAIN: Marks = Marks {
        bold: false,
        italic: false,
    };

    pub fn bold() -> Self {
        Self {
            bold: true,
            italic: false,
        }
    }

    /// Return a copy with `mark` switched on or off
    pub fn with(mut self, mark: Mark, on: bool) -> Self {
        match mark {
            Mark::Bold => self.bold = on,
            Mark::Italic => self.italic = on,
        }
        self
    }

    pub fn has(&self, mark: Mark) -> bool {
        match mark {
            Mark::Bold => self.bold,
            Mark::Italic => self.italic,
        }
    }
}

/// Single inline mark, used when toggling formatting over a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    Bold,
    Italic,
}

/// Paragraph-level formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "level", rename_all = "snake_case")]
pub enum BlockKind {
    #[default]
    Paragraph,
    Heading(u8),
}

/// Who is asking for a write
///
/// User writes are refused while the document is locked for an AI
/// operation; programmatic writes (streaming, rewrite apply, undo) are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    User,
    Programmatic,
}

/// A contiguous piece of text sharing one set of marks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: NodeId,
    pub text: String,
    pub marks: Marks,
}

impl Run {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// One paragraph, split into formatted segments (export view)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub kind: BlockKind,
    pub segments: Vec<(Marks, String)>,
}

impl Paragraph {
    pub fn text(&self) -> String {
        self.segments.iter().map(|(_, text)| text.as_str()).collect()
    }
}

/// Full, detached copy of a document's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentState {
    pub runs: Vec<Run>,
    pub blocks: Vec<BlockKind>,
    pub next_id: NodeId,
}

impl DocumentState {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    fn validate(&self) -> Result<(), DocumentError> {
        let newlines = self
            .runs
            .iter()
            .map(|r| count_newlines(&r.text))
            .sum::<usize>();
        if self.blocks.len() != newlines + 1 {
            return Err(DocumentError::CorruptState(format!(
                "{} blocks for {} paragraphs",
                self.blocks.len(),
                newlines + 1
            )));
        }
        for block in &self.blocks {
            check_block(*block)?;
        }
        Ok(())
    }
}

/// Editable rich-text document
#[derive(Debug, Clone)]
pub struct Document {
    runs: Vec<Run>,
    blocks: Vec<BlockKind>,
    next_id: NodeId,

    /// Current version number (increments on each mutation)
    version: u64,

    editable: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty, editable document
    pub fn new() -> Self {
        Self {
            runs: Vec::new(),
            blocks: vec![BlockKind::Paragraph],
            next_id: 1,
            version: 0,
            editable: true,
        }
    }

    /// Create a document holding plain text
    pub fn from_text(text: &str) -> Self {
        let mut doc = Self::new();
        if !text.is_empty() {
            let id = doc.alloc_id();
            doc.runs.push(Run {
                id,
                text: text.to_string(),
                marks: Marks::PLAIN,
            });
            doc.blocks = vec![BlockKind::Paragraph; count_newlines(text) + 1];
        }
        doc
    }

    /// Build a document from a previously captured state
    pub fn from_state(state: DocumentState) -> Result<Self, DocumentError> {
        let mut doc = Self::new();
        doc.restore(state)?;
        doc.version = 0;
        Ok(doc)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// Lock or unlock the document for user input
    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    /// Length in characters, paragraph separators included
    pub fn len(&self) -> usize {
        self.runs.iter().map(Run::char_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn blocks(&self) -> &[BlockKind] {
        &self.blocks
    }

    /// Block kind of the paragraph containing `offset`
    pub fn block_at(&self, offset: usize) -> Result<BlockKind, DocumentError> {
        self.check_offset(offset)?;
        Ok(self.blocks[self.newlines_before(offset)])
    }

    /// Marks of the character at `offset`
    pub fn marks_at(&self, offset: usize) -> Option<Marks> {
        let mut pos = 0;
        for run in &self.runs {
            let len = run.char_len();
            if offset < pos + len {
                return Some(run.marks);
            }
            pos += len;
        }
        None
    }

    /// Text in `[from, to)`
    pub fn text_between(&self, from: usize, to: usize) -> Result<String, DocumentError> {
        self.check_range(from, to)?;
        Ok(self.text().chars().skip(from).take(to - from).collect())
    }

    /// Replace `[from, to)` with `text`
    ///
    /// Inserted text inherits the marks of the character before `from`.
    /// Marks of untouched text stay attached to it.
    pub fn replace(
        &mut self,
        from: usize,
        to: usize,
        text: &str,
        origin: EditOrigin,
    ) -> Result<(), DocumentError> {
        self.check_writable(origin)?;
        self.check_range(from, to)?;

        if from == to && text.is_empty() {
            return Ok(());
        }

        let marks = self.marks_for_insert(from);
        let paragraph = self.newlines_before(from);

        let start = self.split_at(from);
        let end = self.split_at(to);
        let removed: String = self.runs.drain(start..end).map(|r| r.text).collect();

        if !text.is_empty() {
            let id = self.alloc_id();
            self.runs.insert(
                start,
                Run {
                    id,
                    text: text.to_string(),
                    marks,
                },
            );
        }

        self.reflow_blocks(paragraph, count_newlines(&removed), count_newlines(text));
        self.coalesce();
        self.version += 1;
        Ok(())
    }

    /// Append `text` at the end of the document
    pub fn append(&mut self, text: &str, origin: EditOrigin) -> Result<(), DocumentError> {
        let len = self.len();
        self.replace(len, len, text, origin)
    }

    /// Remove all content
    pub fn clear(&mut self, origin: EditOrigin) -> Result<(), DocumentError> {
        self.check_writable(origin)?;
        self.runs.clear();
        self.blocks = vec![BlockKind::Paragraph];
        self.version += 1;
        Ok(())
    }

    /// Switch an inline mark on or off over `[from, to)`
    pub fn format(
        &mut self,
        from: usize,
        to: usize,
        mark: Mark,
        on: bool,
        origin: EditOrigin,
    ) -> Result<(), DocumentError> {
        self.check_writable(origin)?;
        self.check_range(from, to)?;
        if from == to {
            return Ok(());
        }

        let start = self.split_at(from);
        let end = self.split_at(to);
        for run in &mut self.runs[start..end] {
            run.marks = run.marks.with(mark, on);
        }

        self.coalesce();
        self.version += 1;
        Ok(())
    }

    /// Set the block kind of the paragraph containing `offset`
    pub fn set_block(
        &mut self,
        offset: usize,
        kind: BlockKind,
        origin: EditOrigin,
    ) -> Result<(), DocumentError> {
        self.check_writable(origin)?;
        self.check_offset(offset)?;
        check_block(kind)?;

        let paragraph = self.newlines_before(offset);
        self.blocks[paragraph] = kind;
        self.version += 1;
        Ok(())
    }

    /// Capture the full content
    pub fn snapshot(&self) -> DocumentState {
        DocumentState {
            runs: self.runs.clone(),
            blocks: self.blocks.clone(),
            next_id: self.next_id,
        }
    }

    /// Replace the full content with a captured state
    ///
    /// Restoring is a protocol write and is allowed while locked.
    pub fn restore(&mut self, state: DocumentState) -> Result<(), DocumentError> {
        state.validate()?;
        let max_id = state.runs.iter().map(|r| r.id).max().unwrap_or(0);
        self.next_id = state.next_id.max(max_id + 1);
        self.runs = state.runs;
        self.blocks = state.blocks;
        self.coalesce();
        self.version += 1;
        Ok(())
    }

    /// Paragraph view used by exporters
    pub fn paragraphs(&self) -> Vec<Paragraph> {
        let mut paragraphs = Vec::with_capacity(self.blocks.len());
        let mut segments: Vec<(Marks, String)> = Vec::new();

        for run in &self.runs {
            let mut pieces = run.text.split('\n').peekable();
            while let Some(piece) = pieces.next() {
                if !piece.is_empty() {
                    match segments.last_mut() {
                        Some((marks, text)) if *marks == run.marks => text.push_str(piece),
                        _ => segments.push((run.marks, piece.to_string())),
                    }
                }
                if pieces.peek().is_some() {
                    let kind = self.blocks[paragraphs.len()];
                    paragraphs.push(Paragraph {
                        kind,
                        segments: std::mem::take(&mut segments),
                    });
                }
            }
        }

        let kind = self.blocks[paragraphs.len()];
        paragraphs.push(Paragraph { kind, segments });
        paragraphs
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_writable(&self, origin: EditOrigin) -> Result<(), DocumentError> {
        if origin == EditOrigin::User && !self.editable {
            return Err(DocumentError::ReadOnly);
        }
        Ok(())
    }

    fn check_offset(&self, offset: usize) -> Result<(), DocumentError> {
        let len = self.len();
        if offset > len {
            return Err(DocumentError::OutOfBounds { offset, len });
        }
        Ok(())
    }

    fn check_range(&self, from: usize, to: usize) -> Result<(), DocumentError> {
        if from > to {
            return Err(DocumentError::InvalidRange { from, to });
        }
        self.check_offset(to)
    }

    fn newlines_before(&self, offset: usize) -> usize {
        self.text().chars().take(offset).filter(|c| *c == '\n').count()
    }

    fn marks_for_insert(&self, offset: usize) -> Marks {
        let at = if offset > 0 { offset - 1 } else { offset };
        self.marks_at(at).unwrap_or_default()
    }

    /// Make sure a run boundary sits at `offset` and return the index of the
    /// run starting there (or `runs.len()` at the end).
    fn split_at(&mut self, offset: usize) -> usize {
        let mut pos = 0;
        for i in 0..self.runs.len() {
            if pos == offset {
                return i;
            }
            let len = self.runs[i].char_len();
            if offset < pos + len {
                let byte = byte_index(&self.runs[i].text, offset - pos);
                let tail = self.runs[i].text.split_off(byte);
                let marks = self.runs[i].marks;
                let id = self.alloc_id();
                self.runs.insert(
                    i + 1,
                    Run {
                        id,
                        text: tail,
                        marks,
                    },
                );
                return i + 1;
            }
            pos += len;
        }
        self.runs.len()
    }

    /// Keep one block per paragraph after `removed` newlines were replaced by
    /// `inserted` newlines inside paragraph `paragraph`.
    fn reflow_blocks(&mut self, paragraph: usize, removed: usize, inserted: usize) {
        let first = self.blocks[paragraph];
        let last = self.blocks[paragraph + removed];

        let mut replacement = vec![first];
        if inserted > 0 {
            replacement.extend(std::iter::repeat(BlockKind::Paragraph).take(inserted - 1));
            replacement.push(last);
        }
        self.blocks.splice(paragraph..=paragraph + removed, replacement);
    }

    fn coalesce(&mut self) {
        let mut merged: Vec<Run> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            if run.text.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(prev) if prev.marks == run.marks => prev.text.push_str(&run.text),
                _ => merged.push(run),
            }
        }
        self.runs = merged;
    }
}

fn check_block(kind: BlockKind) -> Result<(), DocumentError> {
    match kind {
        BlockKind::Heading(level) if !(1..=6).contains(&level) => {
            Err(DocumentError::InvalidHeading(level))
        }
        _ => Ok(()),
    }
}

fn count_newlines(text: &str) -> usize {
    text.chars().filter(|c| *c == '\n').count()
}

fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_empty_document() {
        let doc = Document::new();
        assert_eq!(doc.version(), 0);
        assert!(doc.is_empty());
        assert!(doc.is_editable());
        assert_eq!(doc.blocks(), &[BlockKind::Paragraph]);
    }

    #[test]
    fn test_append_counts_characters_not_bytes() {
        let mut doc = Document::new();
        doc.append("正文", EditOrigin::Programmatic).unwrap();
        doc.append("内容", EditOrigin::Programmatic).unwrap();

        assert_eq!(doc.len(), 4);
        assert_eq!(doc.text(), "正文内容");
        assert_eq!(doc.text_between(1, 3).unwrap(), "文内");
        assert_eq!(doc.version(), 2);
    }

    #[test]
    fn test_replace_middle_span() {
        let mut doc = Document::from_text("hello brave world");
        doc.replace(6, 11, "new", EditOrigin::User).unwrap();
        assert_eq!(doc.text(), "hello new world");
    }

    #[test]
    fn test_replace_rejects_bad_ranges() {
        let mut doc = Document::from_text("abc");
        assert_eq!(
            doc.replace(2, 1, "x", EditOrigin::User),
            Err(DocumentError::InvalidRange { from: 2, to: 1 })
        );
        assert_eq!(
            doc.replace(1, 9, "x", EditOrigin::User),
            Err(DocumentError::OutOfBounds { offset: 9, len: 3 })
        );
        assert_eq!(doc.text(), "abc");
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_read_only_rejects_user_but_not_programmatic() {
        let mut doc = Document::from_text("abc");
        doc.set_editable(false);

        assert_eq!(
            doc.append("d", EditOrigin::User),
            Err(DocumentError::ReadOnly)
        );
        assert_eq!(
            doc.replace(0, 1, "x", EditOrigin::User),
            Err(DocumentError::ReadOnly)
        );

        doc.append("d", EditOrigin::Programmatic).unwrap();
        assert_eq!(doc.text(), "abcd");
    }

    #[test]
    fn test_marks_move_with_text() {
        let mut doc = Document::from_text("plain bold tail");
        doc.format(6, 10, Mark::Bold, true, EditOrigin::User).unwrap();

        // Insert before the bold run: bold text shifts right
        doc.replace(0, 0, "very ", EditOrigin::User).unwrap();
        assert_eq!(doc.text(), "very plain bold tail");
        assert_eq!(doc.marks_at(11), Some(Marks::bold()));
        assert_eq!(doc.marks_at(10), Some(Marks::PLAIN));
        assert_eq!(doc.marks_at(15), Some(Marks::PLAIN));
    }

    #[test]
    fn test_insert_inherits_preceding_marks() {
        let mut doc = Document::from_text("ab");
        doc.format(0, 1, Mark::Bold, true, EditOrigin::User).unwrap();
        doc.replace(1, 1, "X", EditOrigin::User).unwrap();
        assert_eq!(doc.marks_at(1), Some(Marks::bold()));
        assert_eq!(doc.marks_at(2), Some(Marks::PLAIN));
    }

    #[test]
    fn test_adjacent_runs_coalesce() {
        let mut doc = Document::from_text("abcdef");
        doc.format(1, 3, Mark::Bold, true, EditOrigin::User).unwrap();
        assert_eq!(doc.runs().len(), 3);
        doc.format(1, 3, Mark::Bold, false, EditOrigin::User).unwrap();
        assert_eq!(doc.runs().len(), 1);
    }

    #[test]
    fn test_blocks_follow_paragraphs() {
        let mut doc = Document::from_text("Title\nBody");
        doc.set_block(0, BlockKind::Heading(2), EditOrigin::User).unwrap();
        assert_eq!(doc.blocks(), &[BlockKind::Heading(2), BlockKind::Paragraph]);

        // Joining the two paragraphs keeps the first block kind
        doc.replace(5, 6, " ", EditOrigin::User).unwrap();
        assert_eq!(doc.blocks(), &[BlockKind::Heading(2)]);

        // Splitting again: the tail keeps the kind of the block holding `to`
        doc.replace(5, 6, "\nmiddle\n", EditOrigin::User).unwrap();
        assert_eq!(
            doc.blocks(),
            &[
                BlockKind::Heading(2),
                BlockKind::Paragraph,
                BlockKind::Heading(2)
            ]
        );
    }

    #[test]
    fn test_invalid_heading_level() {
        let mut doc = Document::from_text("x");
        assert_eq!(
            doc.set_block(0, BlockKind::Heading(7), EditOrigin::User),
            Err(DocumentError::InvalidHeading(7))
        );
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut doc = Document::from_text("first\nsecond");
        doc.set_block(0, BlockKind::Heading(1), EditOrigin::User).unwrap();
        let state = doc.snapshot();

        doc.replace(0, 12, "gone", EditOrigin::User).unwrap();
        assert_eq!(doc.text(), "gone");

        doc.restore(state.clone()).unwrap();
        assert_eq!(doc.snapshot(), state);
        assert_eq!(doc.blocks()[0], BlockKind::Heading(1));
    }

    #[test]
    fn test_restore_rejects_inconsistent_state() {
        let mut doc = Document::new();
        let state = DocumentState {
            runs: vec![Run {
                id: 1,
                text: "a\nb".to_string(),
                marks: Marks::PLAIN,
            }],
            blocks: vec![BlockKind::Paragraph],
            next_id: 2,
        };
        assert!(matches!(
            doc.restore(state),
            Err(DocumentError::CorruptState(_))
        ));
    }

    #[test]
    fn test_paragraph_view() {
        let mut doc = Document::from_text("Head\nsome bold text");
        doc.set_block(0, BlockKind::Heading(2), EditOrigin::User).unwrap();
        doc.format(10, 14, Mark::Bold, true, EditOrigin::User).unwrap();

        let paragraphs = doc.paragraphs();
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].kind, BlockKind::Heading(2));
        assert_eq!(paragraphs[0].text(), "Head");
        assert_eq!(
            paragraphs[1].segments,
            vec![
                (Marks::PLAIN, "some ".to_string()),
                (Marks::bold(), "bold".to_string()),
                (Marks::PLAIN, " text".to_string()),
            ]
        );
    }

    #[test]
    fn test_clear_resets_blocks() {
        let mut doc = Document::from_text("a\nb\nc");
        doc.clear(EditOrigin::Programmatic).unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.blocks().len(), 1);
    }
}
