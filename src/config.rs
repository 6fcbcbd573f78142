//! Configuration types for book assembly.
//!
//! All assembly behaviour is controlled through [`AssemblyConfig`], built via
//! its [`AssemblyConfigBuilder`]. One struct holds every knob, so a config can
//! be cloned into concurrent tasks and logged as a unit.

use crate::error::BookError;
use crate::pipeline::generator::ContentGenerator;
use crate::progress::ProgressCallback;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one or many assembly runs.
///
/// Built via [`AssemblyConfig::builder()`] or using
/// [`AssemblyConfig::default()`].
///
/// # Example
/// ```rust
/// use bookgen::AssemblyConfig;
///
/// let config = AssemblyConfig::builder()
///     .asset_dir("/tmp/book-assets")
///     .image_timeout_secs(20)
///     .generator_command("python3", ["ai_generator.py"])
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AssemblyConfig {
    /// Pre-constructed content generator. Takes precedence over `generator_command`.
    pub generator: Option<Arc<dyn ContentGenerator>>,

    /// Generator executable followed by its leading arguments, e.g.
    /// `["python3", "ai_generator.py"]`. The request arguments
    /// (`book <author> <topics> <language>`) are appended per run.
    pub generator_command: Option<Vec<String>>,

    /// Budget for the whole generator call, in seconds. Default: 1200.
    ///
    /// A full book is several dozen sequential completions on the generator
    /// side, so this is deliberately generous. Exceeding it fails the run with
    /// [`BookError::GenerationTimeout`].
    pub generation_timeout_secs: u64,

    /// Budget for fetching and storing one image, in seconds. Default: 60.
    ///
    /// Exceeding it makes that image `Absent`; the run continues.
    pub image_timeout_secs: u64,

    /// Number of images fetched concurrently within one run. Default: 4.
    pub image_concurrency: usize,

    /// Directory that receives downloaded images. Default: `uploads`.
    ///
    /// May be shared by concurrent runs; file names are uuid-based.
    pub asset_dir: PathBuf,

    /// Directory holding legacy uploaded fragments. Default: none.
    pub fragments_dir: Option<PathBuf>,

    /// Use the fragment store when the generator is missing or fails.
    /// Default: true.
    pub fallback_to_fragments: bool,

    /// Language used when neither request nor generator names one. Default: "English".
    pub default_language: String,

    /// `chrono` format string for the cover date. Default: `%B %Y`.
    pub date_format: String,

    /// User agent sent with image requests.
    pub user_agent: String,

    /// Fixed strings used for synthesized headings and TOC entries.
    /// When `None`, chosen from the book's language via
    /// [`SectionLabels::for_language`].
    pub labels: Option<SectionLabels>,

    /// Optional per-run progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            generator: None,
            generator_command: None,
            generation_timeout_secs: 1200,
            image_timeout_secs: 60,
            image_concurrency: 4,
            asset_dir: PathBuf::from("uploads"),
            fragments_dir: None,
            fallback_to_fragments: true,
            default_language: "English".to_string(),
            date_format: "%B %Y".to_string(),
            user_agent: format!("bookgen/{}", env!("CARGO_PKG_VERSION")),
            labels: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AssemblyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyConfig")
            .field("generator", &self.generator.as_ref().map(|_| "<dyn ContentGenerator>"))
            .field("generator_command", &self.generator_command)
            .field("generation_timeout_secs", &self.generation_timeout_secs)
            .field("image_timeout_secs", &self.image_timeout_secs)
            .field("image_concurrency", &self.image_concurrency)
            .field("asset_dir", &self.asset_dir)
            .field("fragments_dir", &self.fragments_dir)
            .field("fallback_to_fragments", &self.fallback_to_fragments)
            .field("default_language", &self.default_language)
            .field("date_format", &self.date_format)
            .field("labels", &self.labels)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AssemblyProgressCallback>"),
            )
            .finish()
    }
}

impl AssemblyConfig {
    /// Create a new builder for `AssemblyConfig`.
    pub fn builder() -> AssemblyConfigBuilder {
        AssemblyConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AssemblyConfig`].
pub struct AssemblyConfigBuilder {
    config: AssemblyConfig,
}

impl fmt::Debug for AssemblyConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AssemblyConfigBuilder {
    pub fn generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.config.generator = Some(generator);
        self
    }

    pub fn generator_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut command = vec![program.into()];
        command.extend(args.into_iter().map(Into::into));
        self.config.generator_command = Some(command);
        self
    }

    pub fn generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.generation_timeout_secs = secs;
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs;
        self
    }

    pub fn image_concurrency(mut self, n: usize) -> Self {
        self.config.image_concurrency = n.max(1);
        self
    }

    pub fn asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.asset_dir = dir.into();
        self
    }

    pub fn fragments_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.fragments_dir = Some(dir.into());
        self
    }

    pub fn fallback_to_fragments(mut self, v: bool) -> Self {
        self.config.fallback_to_fragments = v;
        self
    }

    pub fn default_language(mut self, language: impl Into<String>) -> Self {
        self.config.default_language = language.into();
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.config.date_format = format.into();
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn labels(mut self, labels: SectionLabels) -> Self {
        self.config.labels = Some(labels);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssemblyConfig, BookError> {
        let c = &self.config;
        if c.generation_timeout_secs == 0 {
            return Err(BookError::InvalidConfig(
                "Generation timeout must be ≥ 1s".into(),
            ));
        }
        if c.image_timeout_secs == 0 {
            return Err(BookError::InvalidConfig(
                "Image timeout must be ≥ 1s".into(),
            ));
        }
        if let Some(ref cmd) = c.generator_command {
            if cmd.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(BookError::InvalidConfig(
                    "Generator command must name a program".into(),
                ));
            }
        }
        if c.date_format.trim().is_empty() {
            return Err(BookError::InvalidConfig("Date format must not be empty".into()));
        }
        if StrftimeItems::new(&c.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(BookError::InvalidConfig(format!(
                "Invalid date format '{}'",
                c.date_format
            )));
        }
        Ok(self.config)
    }
}

// ── Labels ───────────────────────────────────────────────────────────────

/// Localised fixed strings for synthesized headings and TOC entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionLabels {
    pub table_of_contents: String,
    pub introduction: String,
    pub conclusion: String,
    pub afterword: String,
    pub foreword: String,
    /// Prefix of the cover byline, e.g. "By".
    pub byline: String,
    /// Title used when no source provides one.
    pub untitled: String,
}

impl Default for SectionLabels {
    fn default() -> Self {
        Self::english()
    }
}

impl SectionLabels {
    pub fn english() -> Self {
        Self {
            table_of_contents: "Table of Contents".into(),
            introduction: "Introduction".into(),
            conclusion: "Conclusion".into(),
            afterword: "Afterword".into(),
            foreword: "Foreword".into(),
            byline: "By".into(),
            untitled: "Untitled".into(),
        }
    }

    pub fn german() -> Self {
        Self {
            table_of_contents: "Inhaltsverzeichnis".into(),
            introduction: "Einleitung".into(),
            conclusion: "Schluss".into(),
            afterword: "Nachwort".into(),
            foreword: "Vorwort".into(),
            byline: "Von".into(),
            untitled: "Ohne Titel".into(),
        }
    }

    /// Pick labels by language name or code; unknown languages get English.
    pub fn for_language(language: &str) -> Self {
        match language.trim().to_lowercase().as_str() {
            "german" | "deutsch" | "de" | "de-de" => Self::german(),
            _ => Self::english(),
        }
    }

    /// `pinned` labels when configured, otherwise the set for `language`.
    pub fn resolve(pinned: Option<&SectionLabels>, language: &str) -> Self {
        pinned
            .cloned()
            .unwrap_or_else(|| Self::for_language(language))
    }
}
