//! # Word Export / Import
//!
//! Documents leave the editor as Word-compatible HTML: a complete HTML file
//! carrying the Office namespaces, which word processors open as a regular
//! document. Headings become `<h1>`..`<h6>`, bold becomes `<strong>`,
//! italic becomes `<em>`.
//!
//! The importer reads the same subset back, and is lenient enough to read
//! the markup generators stream (`<h2>`, `<p>`, `<strong>`, `&emsp;`).

use crate::document::{BlockKind, DocumentState, Marks, Run};
use crate::tokenizer::{decode_entity, tokenize, HtmlToken};
use crate::{Document, DocumentError};
use std::fmt::Write;

const WORD_HTML_HEAD: &str = concat!(
    "<!DOCTYPE html>\n",
    "<html xmlns:o=\"urn:schemas-microsoft-com:office:office\" ",
    "xmlns:w=\"urn:schemas-microsoft-com:office:word\" ",
    "xmlns=\"http://www.w3.org/TR/REC-html40\">\n",
    "<head><meta charset=\"utf-8\"><title>Document</title></head>\n",
    "<body>\n",
);

const WORD_HTML_TAIL: &str = "</body>\n</html>\n";

/// Serialize a document to Word-compatible HTML
pub fn export_word_html(doc: &Document) -> String {
    let mut out = String::from(WORD_HTML_HEAD);
    out.push_str(&export_body(doc));
    out.push_str(WORD_HTML_TAIL);
    out
}

/// Serialize only the body content (one element per paragraph)
pub fn export_body(doc: &Document) -> String {
    let mut out = String::new();
    for paragraph in doc.paragraphs() {
        let tag = match paragraph.kind {
            BlockKind::Paragraph => "p".to_string(),
            BlockKind::Heading(level) => format!("h{}", level),
        };

        let _ = write!(out, "<{}>", tag);
        for (marks, text) in &paragraph.segments {
            if marks.bold {
                out.push_str("<strong>");
            }
            if marks.italic {
                out.push_str("<em>");
            }
            out.push_str(&escape(text));
            if marks.italic {
                out.push_str("</em>");
            }
            if marks.bold {
                out.push_str("</strong>");
            }
        }
        let _ = writeln!(out, "</{}>", tag);
    }
    out
}

/// Parse HTML into a document
pub fn import_html(source: &str) -> Result<Document, DocumentError> {
    let mut importer = Importer::default();
    for token in tokenize(source) {
        importer.feed(token);
    }
    Document::from_state(importer.finish())
}

/// Heuristic used to decide whether generated text should be rendered as markup
pub fn looks_like_markup(text: &str) -> bool {
    tokenize(text).iter().any(|token| {
        matches!(token, HtmlToken::StartTag(name) if is_block_tag(name) || is_inline_tag(name))
    })
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn is_block_tag(name: &str) -> bool {
    matches!(name, "p" | "div") || heading_level(name).is_some()
}

fn is_inline_tag(name: &str) -> bool {
    matches!(name, "strong" | "b" | "em" | "i" | "br")
}

fn is_skipped_tag(name: &str) -> bool {
    matches!(name, "head" | "style" | "script" | "title")
}

#[derive(Default)]
struct Importer {
    paragraphs: Vec<(BlockKind, Vec<(Marks, String)>)>,
    in_block: bool,
    bold: usize,
    italic: usize,
    skip: usize,
}

impl Importer {
    fn feed(&mut self, token: HtmlToken<'_>) {
        match token {
            HtmlToken::Declaration => {}
            HtmlToken::StartTag(name) => self.start_tag(&name),
            HtmlToken::EndTag(name) => self.end_tag(&name),
            HtmlToken::Entity(entity) => {
                if self.skip == 0 {
                    self.push_text(&decode_entity(entity));
                }
            }
            HtmlToken::Text(text) => {
                if self.skip == 0 {
                    self.push_collapsed(text);
                }
            }
        }
    }

    fn start_tag(&mut self, name: &str) {
        if is_skipped_tag(name) {
            self.skip += 1;
            return;
        }
        match name {
            "p" | "div" => self.begin_block(BlockKind::Paragraph),
            "strong" | "b" => self.bold += 1,
            "em" | "i" => self.italic += 1,
            "br" => {
                let kind = self.current_kind();
                self.close_block();
                self.begin_block(kind);
            }
            _ => {
                if let Some(level) = heading_level(name) {
                    self.begin_block(BlockKind::Heading(level));
                }
            }
        }
    }

    fn end_tag(&mut self, name: &str) {
        if is_skipped_tag(name) {
            self.skip = self.skip.saturating_sub(1);
            return;
        }
        match name {
            "strong" | "b" => self.bold = self.bold.saturating_sub(1),
            "em" | "i" => self.italic = self.italic.saturating_sub(1),
            _ if is_block_tag(name) => self.close_block(),
            _ => {}
        }
    }

    fn current_kind(&self) -> BlockKind {
        match self.paragraphs.last() {
            Some((kind, _)) if self.in_block => *kind,
            _ => BlockKind::Paragraph,
        }
    }

    fn begin_block(&mut self, kind: BlockKind) {
        match self.paragraphs.last_mut() {
            // Nested or repeated opening tag on an untouched block: retag it
            Some((current, segments)) if self.in_block && segments.is_empty() => *current = kind,
            _ => self.paragraphs.push((kind, Vec::new())),
        }
        self.in_block = true;
    }

    fn close_block(&mut self) {
        if let Some((_, segments)) = self.paragraphs.last_mut() {
            if let Some((_, text)) = segments.last_mut() {
                let trimmed = text.trim_end_matches(' ').len();
                text.truncate(trimmed);
            }
            segments.retain(|(_, text)| !text.is_empty());
        }
        self.in_block = false;
    }

    fn marks(&self) -> Marks {
        Marks {
            bold: self.bold > 0,
            italic: self.italic > 0,
        }
    }

    fn push_collapsed(&mut self, text: &str) {
        let mut collapsed = String::with_capacity(text.len());
        let mut last_space = false;
        for c in text.chars() {
            if c.is_ascii_whitespace() {
                if !last_space {
                    collapsed.push(' ');
                }
                last_space = true;
            } else {
                collapsed.push(c);
                last_space = false;
            }
        }

        if !self.in_block {
            if collapsed.trim().is_empty() {
                return;
            }
            self.begin_block(BlockKind::Paragraph);
        }

        let at_block_start = self
            .paragraphs
            .last()
            .map(|(_, segments)| segments.is_empty())
            .unwrap_or(true);
        let ends_with_space = self
            .paragraphs
            .last()
            .and_then(|(_, segments)| segments.last())
            .map(|(_, text)| text.ends_with(' '))
            .unwrap_or(false);

        let text = if at_block_start || ends_with_space {
            collapsed.trim_start_matches(' ')
        } else {
            collapsed.as_str()
        };
        self.push_text(text);
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.in_block {
            self.begin_block(BlockKind::Paragraph);
        }
        let marks = self.marks();
        if let Some((_, segments)) = self.paragraphs.last_mut() {
            match segments.last_mut() {
                Some((last, existing)) if *last == marks => existing.push_str(text),
                _ => segments.push((marks, text.to_string())),
            }
        }
    }

    fn finish(mut self) -> DocumentState {
        self.close_block();

        let mut runs = Vec::new();
        let mut blocks = Vec::new();
        let mut next_id = 1;

        for (index, (kind, segments)) in self.paragraphs.into_iter().enumerate() {
            if index > 0 {
                runs.push(Run {
                    id: next_id,
                    text: "\n".to_string(),
                    marks: Marks::PLAIN,
                });
                next_id += 1;
            }
            for (marks, text) in segments {
                runs.push(Run {
                    id: next_id,
                    text,
                    marks,
                });
                next_id += 1;
            }
            blocks.push(kind);
        }

        if blocks.is_empty() {
            blocks.push(BlockKind::Paragraph);
        }

        DocumentState {
            runs,
            blocks,
            next_id,
        }
    }
}
