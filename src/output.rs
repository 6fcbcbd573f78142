//! Output types: structural nodes, sections, and run results.
//!
//! Everything here is plain data. A [`ComposedDocument`] carries all the
//! per-run information the external renderer needs (title and author for
//! running headers included), so no rendering code has to reach for shared
//! state.

use crate::error::{AssetError, BookError, ErrorKind};
use crate::model::{Book, ImageRef};
use serde::{Deserialize, Serialize};

// ── Structural tree ──────────────────────────────────────────────────────

/// A block of converted fragment text.
///
/// Every string inside is already HTML-escaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StructuralNode {
    Heading { level: u8, text: String },
    Paragraph { runs: Vec<InlineRun> },
    ListItem { ordered: bool, runs: Vec<InlineRun> },
    Blockquote { children: Vec<StructuralNode> },
    CodeBlock { language: Option<String>, text: String },
    Rule,
}

/// A span of inline text inside a paragraph, list item or heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "camelCase")]
pub enum InlineRun {
    Text(String),
    Bold(String),
    Italic(String),
    InlineCode(String),
}

impl InlineRun {
    pub fn text(&self) -> &str {
        match self {
            InlineRun::Text(s) | InlineRun::Bold(s) | InlineRun::Italic(s) | InlineRun::InlineCode(s) => s,
        }
    }
}

impl StructuralNode {
    /// Concatenated escaped text of the node and its children, without
    /// structure. Used for TOC entries and assertions.
    pub fn plain_text(&self) -> String {
        match self {
            StructuralNode::Heading { text, .. } | StructuralNode::CodeBlock { text, .. } => text.clone(),
            StructuralNode::Paragraph { runs } | StructuralNode::ListItem { runs, .. } => {
                runs.iter().map(InlineRun::text).collect()
            }
            StructuralNode::Blockquote { children } => children
                .iter()
                .map(StructuralNode::plain_text)
                .collect::<Vec<_>>()
                .join("\n"),
            StructuralNode::Rule => String::new(),
        }
    }
}

// ── Sections ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionKind {
    Cover,
    TableOfContents,
    Chapter,
    Afterword,
}

/// One renderable unit of the final document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub kind: SectionKind,
    /// Escaped heading text.
    pub heading: Option<String>,
    pub body: Vec<StructuralNode>,
    /// Never `RemoteImage`.
    pub image: ImageRef,
    pub page_break_before: bool,
}

/// Per-run document metadata, handed to the renderer as plain data.
///
/// All strings are escaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub title: String,
    pub author: String,
    pub publisher: Option<String>,
    pub language: String,
    pub keywords: Vec<String>,
    pub date: String,
}

/// The composer's complete output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedDocument {
    pub meta: DocumentMeta,
    pub sections: Vec<Section>,
}

impl ComposedDocument {
    pub fn count(&self, kind: SectionKind) -> usize {
        self.sections.iter().filter(|s| s.kind == kind).count()
    }
}

// ── Run results ──────────────────────────────────────────────────────────

/// Which content source produced the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentSource {
    Generator,
    Fragments,
    /// Content handed in directly via [`crate::assemble::assemble_from`].
    Supplied,
}

/// Timing and count statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub chapter_count: usize,
    pub section_count: usize,
    pub images_requested: usize,
    pub images_resolved: usize,
    pub images_absent: usize,
    pub total_words: usize,
    pub generation_duration_ms: u64,
    pub asset_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyOutput {
    pub source: ContentSource,
    pub book: Book,
    pub document: ComposedDocument,
    pub stats: AssemblyStats,
    /// Images that resolved to `Absent`, with the reason.
    pub asset_failures: Vec<AssetError>,
}

/// Structured result for the calling boundary (HTTP handler, CLI `--summary`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblySummary {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_summary: Option<BookSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub title: String,
    pub author: String,
    pub chapter_count: usize,
    pub total_words: usize,
}

impl AssemblySummary {
    pub fn from_result(result: &Result<AssemblyOutput, BookError>) -> Self {
        match result {
            Ok(output) => Self {
                success: true,
                error: None,
                error_kind: None,
                book_summary: Some(BookSummary {
                    title: output.book.title.clone(),
                    author: output.book.author.clone(),
                    chapter_count: output.book.chapters.len(),
                    total_words: output.book.total_words(),
                }),
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
                book_summary: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_summary_has_no_book() {
        let result: Result<AssemblyOutput, BookError> = Err(BookError::input("author is required"));
        let summary = AssemblySummary::from_result(&result);
        assert!(!summary.success);
        assert_eq!(summary.error_kind, Some(ErrorKind::Input));
        assert!(summary.book_summary.is_none());

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("bookSummary").is_none());
        assert_eq!(json["errorKind"], "input");
    }

    #[test]
    fn plain_text_flattens_runs_and_quotes() {
        let node = StructuralNode::Blockquote {
            children: vec![
                StructuralNode::Paragraph {
                    runs: vec![InlineRun::Text("a ".into()), InlineRun::Bold("b".into())],
                },
                StructuralNode::Rule,
            ],
        };
        assert_eq!(node.plain_text(), "a b\n");
    }

    #[test]
    fn section_serialises_camel_case() {
        let section = Section {
            kind: SectionKind::TableOfContents,
            heading: None,
            body: vec![],
            image: ImageRef::Absent,
            page_break_before: true,
        };
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["kind"], "tableOfContents");
        assert_eq!(json["pageBreakBefore"], true);
        assert_eq!(json["image"]["type"], "absent");
    }
}
