//! Normalisation: raw content + request → canonical [`Book`].
//!
//! Two very different sources feed the same model:
//!
//! ```text
//! Structured(GeneratedBook) ──┐
//!                             ├──▶ Normalizer ──▶ Book
//! Fragments(Vec<Fragment>) ───┘        ▲
//!                                      │ gaps filled from
//!                                 BookRequest
//! ```
//!
//! Structured fields always win; the request only fills blanks. The
//! normaliser is pure: no file system, no network, no clock.

use super::clean::{clean_text, clean_title};
use crate::config::{AssemblyConfig, SectionLabels};
use crate::error::BookError;
use crate::model::{
    clean_list, Book, BookRequest, Chapter, Fragment, FragmentRole, GeneratedBook, ImageRef,
    RawContent,
};
use tracing::debug;

/// File suffixes stripped from fragment names to form chapter titles.
const FRAGMENT_SUFFIXES: &[&str] = &[".markdown", ".html", ".htm", ".md", ".txt"];

/// Turns raw content into a validated [`Book`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    default_language: String,
    labels: Option<SectionLabels>,
}

impl Normalizer {
    pub fn new(config: &AssemblyConfig) -> Self {
        Self {
            default_language: config.default_language.clone(),
            labels: config.labels.clone(),
        }
    }

    /// Normalise `raw` into a book, filling gaps from `request`.
    ///
    /// # Errors
    /// * [`BookError::Generation`] for a generator error response.
    /// * [`BookError::Input`] when the author is blank, or when there are
    ///   neither topics nor chapters.
    pub fn normalize(&self, raw: RawContent, request: &BookRequest) -> Result<Book, BookError> {
        let book = match raw {
            RawContent::Failed { error } => return Err(BookError::generation(error)),
            RawContent::Structured(generated) => self.from_structured(generated, request),
            RawContent::Fragments(fragments) => self.from_fragments(fragments, request),
        };

        if book.author.is_empty() {
            return Err(BookError::input("author is required"));
        }
        if book.topics.is_empty() && book.chapters.is_empty() {
            return Err(BookError::input(
                "at least one topic or chapter is required",
            ));
        }

        debug!(
            "Normalised '{}' by {}: {} chapters, {} words",
            book.title,
            book.author,
            book.chapters.len(),
            book.total_words()
        );
        Ok(book)
    }

    fn labels(&self, language: &str) -> SectionLabels {
        SectionLabels::resolve(self.labels.as_ref(), language)
    }

    fn language(&self, preferred: Option<&str>, request: &BookRequest) -> String {
        non_blank(preferred)
            .or_else(|| non_blank(request.language.as_deref()))
            .unwrap_or_else(|| self.default_language.clone())
    }

    fn from_structured(&self, generated: GeneratedBook, request: &BookRequest) -> Book {
        let topics = match clean_list(&generated.topics) {
            t if t.is_empty() => request.clean_topics(),
            t => t,
        };
        let language = self.language(generated.language.as_deref(), request);
        let title = pick_title(
            generated.title.as_deref(),
            request,
            &topics,
            &self.labels(&language),
        );

        let chapters = generated
            .chapters
            .unwrap_or_default()
            .into_iter()
            .map(|c| Chapter {
                title: c.title.as_deref().map(clean_title).unwrap_or_default(),
                content: c.content.as_deref().map(clean_text).unwrap_or_default(),
                image: ImageRef::from_source(c.image.as_deref()),
            })
            .collect();

        Book {
            title,
            author: non_blank(generated.author.as_deref())
                .unwrap_or_else(|| request.author.trim().to_string()),
            publisher: non_blank(generated.publisher.as_deref())
                .or_else(|| non_blank(request.publisher.as_deref())),
            language,
            table_of_contents: generated
                .table_of_contents
                .as_deref()
                .map(clean_text)
                .unwrap_or_default(),
            chapters,
            afterword: generated
                .afterword
                .as_deref()
                .map(clean_text)
                .filter(|a| !a.is_empty()),
            topics,
            cover: ImageRef::from_source(generated.cover_image.as_deref()),
        }
    }

    fn from_fragments(&self, fragments: Vec<Fragment>, request: &BookRequest) -> Book {
        let topics = request.clean_topics();
        let language = self.language(None, request);
        let labels = self.labels(&language);

        let mut forewords = Vec::new();
        let mut bodies = Vec::new();
        let mut afterwords = Vec::new();

        for fragment in fragments {
            let text = clean_text(&fragment.text);
            if text.is_empty() {
                debug!("Skipping empty fragment '{}'", fragment.name);
                continue;
            }
            match fragment.role {
                FragmentRole::Foreword => forewords.push(Chapter {
                    title: labels.foreword.clone(),
                    content: text,
                    image: ImageRef::Absent,
                }),
                FragmentRole::Afterword => afterwords.push(text),
                FragmentRole::ChapterBody => bodies.push(Chapter {
                    title: fragment_title(&fragment.name),
                    content: text,
                    image: ImageRef::Absent,
                }),
            }
        }

        forewords.extend(bodies);
        let afterword = Some(afterwords.join("\n\n")).filter(|a| !a.is_empty());

        Book {
            title: pick_title(None, request, &topics, &labels),
            author: request.author.trim().to_string(),
            publisher: non_blank(request.publisher.as_deref()),
            language,
            table_of_contents: String::new(),
            chapters: forewords,
            afterword,
            topics,
            cover: ImageRef::Absent,
        }
    }
}

/// Reject a request that can never produce a book, before any content
/// source is consulted.
pub fn validate_request(request: &BookRequest) -> Result<(), BookError> {
    if request.author.trim().is_empty() {
        return Err(BookError::input("author is required"));
    }
    if request.clean_topics().is_empty() && request.fragments.is_empty() {
        return Err(BookError::input("at least one topic is required"));
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Generated title, then request title, then first topic, then the label.
fn pick_title(
    generated: Option<&str>,
    request: &BookRequest,
    topics: &[String],
    labels: &SectionLabels,
) -> String {
    [generated, request.title.as_deref()]
        .into_iter()
        .flatten()
        .map(clean_title)
        .find(|t| !t.is_empty())
        .or_else(|| topics.first().cloned())
        .unwrap_or_else(|| labels.untitled.clone())
}

/// Chapter title for a legacy fragment: its file name without directory or
/// known suffix.
fn fragment_title(name: &str) -> String {
    let file = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);
    let stem = FRAGMENT_SUFFIXES
        .iter()
        .find_map(|suffix| {
            let cut = file.len().checked_sub(suffix.len())?;
            file.get(cut..)
                .filter(|tail| tail.eq_ignore_ascii_case(suffix))
                .map(|_| &file[..cut])
        })
        .unwrap_or(file);
    stem.trim().to_string()
}
