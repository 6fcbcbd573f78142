//! # bookgen
//!
//! Assemble generated or uploaded text into a print-ready book document.
//!
//! ## Why this crate?
//!
//! Language models write chapters quickly, but their output is not a book:
//! the markdown is inconsistent, images point at remote URLs, and nothing
//! decides where pages break or what goes into the table of contents. This
//! crate takes whatever the content source produced, normalises it into one
//! canonical [`Book`], pulls every illustration onto local disk, and composes
//! an ordered list of sections that an external page renderer can lay out
//! without any further decisions.
//!
//! ## Pipeline Overview
//!
//! ```text
//! BookRequest
//!  │
//!  ├─ 1. Content    external generator (JSON on stdout) or legacy fragments
//!  ├─ 2. Normalise  cleanup rules, defaults from the request → Book
//!  ├─ 3. Assets     concurrent image fetch, uuid-named files (or Absent)
//!  ├─ 4. Compose    Cover · TOC · Chapters · Afterword, escaped structure
//!  └─ 5. Hand-off   ComposedDocument + HTML page for the renderer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bookgen::{assemble, AssemblyConfig, BookRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AssemblyConfig::builder()
//!         .generator_command("python3", ["ai_generator.py"])
//!         .asset_dir("uploads")
//!         .build()?;
//!     let request = BookRequest::new("Ada Lovelace", ["Analytical engines"]);
//!     let output = assemble(&request, &config).await?;
//!     println!("{} sections", output.document.sections.len());
//!     eprintln!("images: {}/{}",
//!         output.stats.images_resolved,
//!         output.stats.images_requested);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bookgen` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! bookgen = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{
    assemble, assemble_from, assemble_sync, assemble_to_file, summarize, write_document,
    GENERATOR_CMD_ENV,
};
pub use config::{AssemblyConfig, AssemblyConfigBuilder, SectionLabels};
pub use error::{AssetError, BookError, ErrorKind};
pub use model::{
    Book, BookRequest, Chapter, Fragment, FragmentRole, GeneratedBook, GeneratedChapter,
    GeneratorResponse, ImageRef, ImageSlot, RawContent,
};
pub use output::{
    AssemblyOutput, AssemblyStats, AssemblySummary, BookSummary, ComposedDocument, ContentSource,
    DocumentMeta, InlineRun, Section, SectionKind, StructuralNode,
};
pub use pipeline::compose::{Composer, ResolvedImages};
pub use pipeline::generator::{CommandGenerator, ContentGenerator, GenerationRequest};
pub use progress::{AssemblyProgressCallback, NoopProgressCallback, ProgressCallback};
