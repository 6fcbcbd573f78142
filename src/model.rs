//! Canonical book model and the raw shapes it is normalised from.
//!
//! Three layers live here:
//!
//! * **Request**: [`BookRequest`], what the caller asked for (author,
//!   topics, language, optional fragment names).
//! * **Raw content**: [`RawContent`], whatever the content source produced:
//!   the generator's JSON ([`GeneratedBook`]), a generator error, or a set of
//!   role-tagged legacy [`Fragment`]s.
//! * **Canonical**: [`Book`], the single shape the rest of the pipeline
//!   consumes. Produced only by [`crate::pipeline::normalize`].

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

// ── Request ──────────────────────────────────────────────────────────────

/// What the caller asked for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookRequest {
    pub author: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    /// Title override; the generator's title is used when absent.
    #[serde(default)]
    pub title: Option<String>,
    /// Legacy fragment names (file names inside the fragment directory),
    /// in the order they should appear in the book.
    #[serde(default)]
    pub fragments: Vec<String>,
}

impl BookRequest {
    pub fn new(author: impl Into<String>, topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            author: author.into(),
            topics: topics.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_fragments(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fragments = names.into_iter().map(Into::into).collect();
        self
    }

    /// Topics with surrounding whitespace removed and blanks dropped.
    pub fn clean_topics(&self) -> Vec<String> {
        clean_list(&self.topics)
    }
}

// ── Raw content ──────────────────────────────────────────────────────────

/// Output of a content source, before normalisation.
#[derive(Debug, Clone)]
pub enum RawContent {
    /// Structured generator output.
    Structured(GeneratedBook),
    /// Pre-existing uploaded fragments, roles already classified.
    Fragments(Vec<Fragment>),
    /// The generator answered with `{"error": …}`.
    Failed { error: String },
}

/// Every shape the generator may print on stdout.
///
/// The root must be a JSON object. An object carrying an `error` key is a
/// [`GeneratorResponse::Failure`] whatever the value's type, even if it also
/// has book fields. Only objects without one are read as a book.
#[derive(Debug, Clone)]
pub enum GeneratorResponse {
    Failure { error: String },
    Book(Box<GeneratedBook>),
}

impl<'de> Deserialize<'de> for GeneratorResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let serde_json::Value::Object(ref fields) = value else {
            return Err(D::Error::custom(
                "generator response must be a JSON object",
            ));
        };
        if let Some(error) = fields.get("error") {
            return Ok(GeneratorResponse::Failure {
                error: error_message(error),
            });
        }
        GeneratedBook::deserialize(value)
            .map(|book| GeneratorResponse::Book(Box::new(book)))
            .map_err(D::Error::custom)
    }
}

/// `"msg"` as-is, `{"message": "msg", …}` by its message, anything else as
/// compact JSON.
fn error_message(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(fields) => match fields.get("message") {
            Some(serde_json::Value::String(message)) => message.clone(),
            _ => error.to_string(),
        },
        other => other.to_string(),
    }
}

impl From<GeneratorResponse> for RawContent {
    fn from(response: GeneratorResponse) -> Self {
        match response {
            GeneratorResponse::Failure { error } => RawContent::Failed { error },
            GeneratorResponse::Book(book) => RawContent::Structured(*book),
        }
    }
}

/// Structured book content as produced by the generator. Every field is
/// optional on the wire; defaults are applied by the normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedBook {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "topics_from_string_or_list")]
    pub topics: Vec<String>,
    #[serde(default, alias = "tableOfContents")]
    pub table_of_contents: Option<String>,
    #[serde(default)]
    pub chapters: Option<Vec<GeneratedChapter>>,
    #[serde(default)]
    pub afterword: Option<String>,
    #[serde(default, alias = "coverImage")]
    pub cover_image: Option<String>,
}

/// One chapter of generator output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedChapter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// The generator accepts topics either as `"a, b"` or `["a", "b"]` and echoes
/// them back the same way.
fn topics_from_string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TopicList {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Option::<TopicList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(TopicList::Joined(s)) => s.split(',').map(str::to_string).collect(),
        Some(TopicList::List(v)) => v,
    })
}

// ── Fragments ────────────────────────────────────────────────────────────

/// Role of a legacy fragment, decided once when the fragment is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentRole {
    Foreword,
    Afterword,
    ChapterBody,
}

const FOREWORD_MARKERS: &[&str] = &["vorwort", "foreword", "preface"];
const AFTERWORD_MARKERS: &[&str] = &["nachwort", "afterword", "epilogue"];

impl FragmentRole {
    /// Classify an uploaded file name by case-insensitive marker substring.
    pub fn classify(name: &str) -> Self {
        let lower = name.to_lowercase();
        if FOREWORD_MARKERS.iter().any(|m| lower.contains(m)) {
            FragmentRole::Foreword
        } else if AFTERWORD_MARKERS.iter().any(|m| lower.contains(m)) {
            FragmentRole::Afterword
        } else {
            FragmentRole::ChapterBody
        }
    }
}

/// A single unit of source text prior to structural conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub name: String,
    pub role: FragmentRole,
    pub text: String,
}

impl Fragment {
    pub fn new(name: impl Into<String>, role: FragmentRole, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            text: text.into(),
        }
    }

    /// Build a fragment whose role is inferred from its name.
    pub fn classified(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        let role = FragmentRole::classify(&name);
        Self::new(name, role, text)
    }
}

// ── Canonical model ──────────────────────────────────────────────────────

/// The canonical book. Chapter order is rendering order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub publisher: Option<String>,
    pub language: String,
    pub table_of_contents: String,
    pub chapters: Vec<Chapter>,
    pub afterword: Option<String>,
    pub topics: Vec<String>,
    pub cover: ImageRef,
}

impl Book {
    /// Whitespace-separated words across all chapter bodies.
    pub fn total_words(&self) -> usize {
        self.chapters
            .iter()
            .map(|c| c.content.split_whitespace().count())
            .sum()
    }

    /// Every image slot that still needs resolving, in book order.
    pub fn image_slots(&self) -> Vec<(ImageSlot, &ImageRef)> {
        let mut slots = Vec::with_capacity(self.chapters.len() + 1);
        if !self.cover.is_absent() {
            slots.push((ImageSlot::Cover, &self.cover));
        }
        for (i, chapter) in self.chapters.iter().enumerate() {
            if !chapter.image.is_absent() {
                slots.push((ImageSlot::Chapter(i), &chapter.image));
            }
        }
        slots
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub content: String,
    pub image: ImageRef,
}

/// Reference to an illustration at some stage of resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImageRef {
    RemoteImage { url: String },
    LocalAsset { path: PathBuf },
    #[default]
    Absent,
}

impl ImageRef {
    /// Interpret an optional generator image field.
    ///
    /// `http(s)://` and `data:` sources are remote; any other non-blank
    /// string is taken as a local path.
    pub fn from_source(source: Option<&str>) -> Self {
        match source.map(str::trim) {
            None | Some("") => ImageRef::Absent,
            Some(s) if is_remote(s) => ImageRef::RemoteImage { url: s.to_string() },
            Some(s) => ImageRef::LocalAsset {
                path: PathBuf::from(s),
            },
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ImageRef::Absent)
    }

    pub fn local_path(&self) -> Option<&PathBuf> {
        match self {
            ImageRef::LocalAsset { path } => Some(path),
            _ => None,
        }
    }
}

/// Check if an image source must be fetched or decoded before use.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://") || source.starts_with("data:")
}

/// Where an image belongs in the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImageSlot {
    Cover,
    /// 0-based chapter index.
    Chapter(usize),
}

impl ImageSlot {
    /// Prefix used for asset file names.
    pub fn file_prefix(&self) -> String {
        match self {
            ImageSlot::Cover => "cover".to_string(),
            ImageSlot::Chapter(i) => format!("chapter-{:02}", i + 1),
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSlot::Cover => f.write_str("cover"),
            ImageSlot::Chapter(i) => write!(f, "chapter {}", i + 1),
        }
    }
}

pub(crate) fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
