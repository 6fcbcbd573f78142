//! Composition: [`Book`] + resolved images → ordered [`Section`]s.
//!
//! The composer decides *what* the document contains and in which order;
//! it never touches the network or the file system. Its output is the whole
//! contract with the renderer:
//!
//! ```text
//! Cover ─▶ TableOfContents ─▶ Chapter × n ─▶ [Afterword]
//! ```
//!
//! Every image in the output is either a `LocalAsset` or `Absent`. The run
//! date is captured once per [`Composer`], so composing the same book twice
//! with one composer yields identical documents.

use super::markdown::{convert, escape_html};
use crate::config::{AssemblyConfig, SectionLabels};
use crate::model::{Book, ImageRef, ImageSlot};
use crate::output::{ComposedDocument, DocumentMeta, InlineRun, Section, SectionKind, StructuralNode};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Image references after the asset resolver has run, keyed by slot.
///
/// A slot missing from the map is `Absent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImages {
    pub cover: ImageRef,
    /// 0-based chapter index → image.
    pub chapters: BTreeMap<usize, ImageRef>,
}

impl ResolvedImages {
    pub fn insert(&mut self, slot: ImageSlot, image: ImageRef) {
        match slot {
            ImageSlot::Cover => self.cover = image,
            ImageSlot::Chapter(i) => {
                self.chapters.insert(i, image);
            }
        }
    }

    pub fn get(&self, slot: ImageSlot) -> &ImageRef {
        const ABSENT: &ImageRef = &ImageRef::Absent;
        match slot {
            ImageSlot::Cover => &self.cover,
            ImageSlot::Chapter(i) => self.chapters.get(&i).unwrap_or(ABSENT),
        }
    }

    /// Number of slots holding a local file.
    pub fn local_count(&self) -> usize {
        std::iter::once(&self.cover)
            .chain(self.chapters.values())
            .filter(|img| img.local_path().is_some())
            .count()
    }
}

/// Builds a [`ComposedDocument`] from a normalised book.
#[derive(Debug, Clone)]
pub struct Composer {
    labels: Option<SectionLabels>,
    date_format: String,
    date: NaiveDate,
}

impl Composer {
    /// Capture labels, date format and today's date from `config`.
    pub fn new(config: &AssemblyConfig) -> Self {
        Self {
            labels: config.labels.clone(),
            date_format: config.date_format.clone(),
            date: Local::now().date_naive(),
        }
    }

    /// Pin the cover date.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn compose(&self, book: &Book, images: &ResolvedImages) -> ComposedDocument {
        let labels = SectionLabels::resolve(self.labels.as_ref(), &book.language);
        let date = self.format_date();

        let mut sections = Vec::with_capacity(book.chapters.len() + 3);

        // ── Cover ────────────────────────────────────────────────────────
        let mut cover_body = vec![paragraph(&format!("{} {}", labels.byline, book.author))];
        if let Some(ref publisher) = book.publisher {
            cover_body.push(paragraph(publisher));
        }
        cover_body.push(paragraph(&date));
        sections.push(Section {
            kind: SectionKind::Cover,
            heading: Some(escape_html(&book.title)),
            body: cover_body,
            image: local_only(images.get(ImageSlot::Cover)),
            page_break_before: false,
        });

        // ── Table of contents ────────────────────────────────────────────
        let toc_body = if book.table_of_contents.trim().is_empty() {
            synthesized_toc(book, &labels)
        } else {
            convert(&book.table_of_contents)
        };
        sections.push(Section {
            kind: SectionKind::TableOfContents,
            heading: Some(escape_html(&labels.table_of_contents)),
            body: toc_body,
            image: ImageRef::Absent,
            page_break_before: true,
        });

        // ── Chapters ─────────────────────────────────────────────────────
        for (i, chapter) in book.chapters.iter().enumerate() {
            let title = chapter.title.trim();
            sections.push(Section {
                kind: SectionKind::Chapter,
                heading: (!title.is_empty()).then(|| escape_html(title)),
                body: convert(&chapter.content),
                image: local_only(images.get(ImageSlot::Chapter(i))),
                page_break_before: true,
            });
        }

        // ── Afterword ────────────────────────────────────────────────────
        if let Some(afterword) = book.afterword.as_deref().filter(|a| !a.trim().is_empty()) {
            sections.push(Section {
                kind: SectionKind::Afterword,
                heading: Some(escape_html(&labels.afterword)),
                body: convert(afterword),
                image: ImageRef::Absent,
                page_break_before: true,
            });
        }

        ComposedDocument {
            meta: DocumentMeta {
                title: escape_html(&book.title),
                author: escape_html(&book.author),
                publisher: book.publisher.as_deref().map(escape_html),
                language: escape_html(&book.language),
                keywords: book.topics.iter().map(|t| escape_html(t)).collect(),
                date: escape_html(&date),
            },
            sections,
        }
    }

    fn format_date(&self) -> String {
        let mut out = String::new();
        if write!(out, "{}", self.date.format(&self.date_format)).is_err() {
            return self.date.to_string();
        }
        out
    }
}

/// Introduction, every non-empty chapter title, Conclusion.
fn synthesized_toc(book: &Book, labels: &SectionLabels) -> Vec<StructuralNode> {
    std::iter::once(labels.introduction.as_str())
        .chain(
            book.chapters
                .iter()
                .map(|c| c.title.trim())
                .filter(|t| !t.is_empty()),
        )
        .chain(std::iter::once(labels.conclusion.as_str()))
        .map(|entry| StructuralNode::ListItem {
            ordered: true,
            runs: vec![InlineRun::Text(escape_html(entry))],
        })
        .collect()
}

fn paragraph(text: &str) -> StructuralNode {
    StructuralNode::Paragraph {
        runs: vec![InlineRun::Text(escape_html(text))],
    }
}

fn local_only(image: &ImageRef) -> ImageRef {
    match image {
        ImageRef::LocalAsset { .. } => image.clone(),
        _ => ImageRef::Absent,
    }
}
