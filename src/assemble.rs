//! Assembly entry points.
//!
//! One call runs the whole pipeline for one request:
//!
//! ```text
//! validate ─▶ content (generator | fragments) ─▶ normalize ─▶ assets ─▶ compose
//! ```
//!
//! Only input, generator, configuration and output failures escape as
//! [`BookError`]; everything about images is absorbed into
//! [`AssemblyOutput::asset_failures`].

use crate::config::AssemblyConfig;
use crate::error::BookError;
use crate::model::{BookRequest, RawContent};
use crate::output::{AssemblyOutput, AssemblyStats, AssemblySummary, ComposedDocument, ContentSource};
use crate::pipeline::assets::AssetResolver;
use crate::pipeline::compose::Composer;
use crate::pipeline::fragments::FragmentStore;
use crate::pipeline::generator::{CommandGenerator, ContentGenerator, GenerationRequest};
use crate::pipeline::normalize::{validate_request, Normalizer};
use crate::pipeline::render;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Environment variable holding a whitespace-separated generator command.
pub const GENERATOR_CMD_ENV: &str = "BOOKGEN_GENERATOR_CMD";

/// Assemble a book for `request`.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(AssemblyOutput)` on success, even if some images could not be
/// fetched (check `output.asset_failures`).
///
/// # Errors
/// Returns `Err(BookError)` only for fatal errors:
/// - blank author or no topics ([`BookError::Input`])
/// - generator failure or timeout with no usable fragment fallback
/// - invalid configuration
pub async fn assemble(
    request: &BookRequest,
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, BookError> {
    let total_start = Instant::now();
    info!(
        "Starting assembly: {} on [{}]",
        request.author,
        request.clean_topics().join(", ")
    );

    // ── Step 1: Validate before touching any content source ──────────────
    validate_request(request)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_assembly_start();
    }

    // ── Step 2: Obtain raw content ───────────────────────────────────────
    let generation_start = Instant::now();
    let (source, raw) = obtain_content(request, config).await?;
    let generation_duration_ms = generation_start.elapsed().as_millis() as u64;
    info!(
        "Content obtained from {:?} in {}ms",
        source, generation_duration_ms
    );

    finish(source, raw, request, config, total_start, generation_duration_ms).await
}

/// Assemble a book from content the caller already has, e.g. a saved
/// generator response. No generator or fragment store is consulted.
pub async fn assemble_from(
    raw: RawContent,
    request: &BookRequest,
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, BookError> {
    let total_start = Instant::now();
    info!("Starting assembly from supplied content");
    if let Some(ref cb) = config.progress_callback {
        cb.on_assembly_start();
    }
    finish(ContentSource::Supplied, raw, request, config, total_start, 0).await
}

/// Assemble a book and write the HTML hand-off to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn assemble_to_file(
    request: &BookRequest,
    output_path: impl AsRef<Path>,
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, BookError> {
    let output = assemble(request, config).await?;
    write_document(&output.document, output_path).await?;
    Ok(output)
}

/// Render `document` as HTML and write it atomically.
pub async fn write_document(
    document: &ComposedDocument,
    output_path: impl AsRef<Path>,
) -> Result<(), BookError> {
    let path = output_path.as_ref();
    let write_failed = |e: std::io::Error| BookError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(&write_failed)?;
    }

    let tmp_path = path.with_extension("html.tmp");
    tokio::fs::write(&tmp_path, render::to_html(document))
        .await
        .map_err(&write_failed)?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }

    info!("Wrote {}", path.display());
    Ok(())
}

/// Synchronous wrapper around [`assemble`].
///
/// Creates a temporary tokio runtime internally.
pub fn assemble_sync(
    request: &BookRequest,
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, BookError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BookError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(assemble(request, config))
}

/// Structured summary of a run for the calling boundary.
pub fn summarize(result: &Result<AssemblyOutput, BookError>) -> AssemblySummary {
    AssemblySummary::from_result(result)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Normalise, resolve images and compose.
async fn finish(
    source: ContentSource,
    raw: RawContent,
    request: &BookRequest,
    config: &AssemblyConfig,
    total_start: Instant,
    generation_duration_ms: u64,
) -> Result<AssemblyOutput, BookError> {
    // ── Step 3: Normalise ────────────────────────────────────────────────
    let book = Normalizer::new(config).normalize(raw, request)?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_content_ready(source, book.chapters.len());
    }

    // ── Step 4: Resolve images ───────────────────────────────────────────
    let asset_start = Instant::now();
    let assets = AssetResolver::new(config)?.resolve_all(&book).await;
    let asset_duration_ms = asset_start.elapsed().as_millis() as u64;

    // ── Step 5: Compose ──────────────────────────────────────────────────
    let document = Composer::new(config).compose(&book, &assets.images);

    let images_absent = assets.failures.len();
    let stats = AssemblyStats {
        chapter_count: book.chapters.len(),
        section_count: document.sections.len(),
        images_requested: assets.requested,
        images_resolved: assets.requested - images_absent,
        images_absent,
        total_words: book.total_words(),
        generation_duration_ms,
        asset_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Assembly complete: '{}', {} sections, {}/{} images, {}ms total",
        book.title,
        stats.section_count,
        stats.images_resolved,
        stats.images_requested,
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_assembly_complete(stats.section_count, stats.images_resolved);
    }

    Ok(AssemblyOutput {
        source,
        book,
        document,
        stats,
        asset_failures: assets.failures,
    })
}

/// Ask the generator for content, falling back to legacy fragments when the
/// generator is missing or fails and the request allows it.
async fn obtain_content(
    request: &BookRequest,
    config: &AssemblyConfig,
) -> Result<(ContentSource, RawContent), BookError> {
    let generated = match resolve_generator(config)? {
        Some(generator) => {
            let generation = GenerationRequest::book(request, &config.default_language);
            match generator.generate(&generation).await {
                Ok(RawContent::Failed { error }) => Err(BookError::generation(error)),
                other => other,
            }
        }
        None => {
            return match fragment_store(request, config) {
                Some(store) => {
                    warn!(
                        "No content generator configured; using {} legacy fragments",
                        request.fragments.len()
                    );
                    Ok((ContentSource::Fragments, load_fragments(&store, request).await))
                }
                None => Err(BookError::InvalidConfig(format!(
                    "No content generator configured.\n\
                     Set a generator command or {}, or name fragments with a fragments directory.",
                    GENERATOR_CMD_ENV
                ))),
            };
        }
    };

    match generated {
        Ok(raw) => Ok((ContentSource::Generator, raw)),
        Err(e) if e.is_generator_failure() => match fragment_store(request, config) {
            Some(store) => {
                warn!("{}; falling back to {} legacy fragments", e, request.fragments.len());
                Ok((ContentSource::Fragments, load_fragments(&store, request).await))
            }
            None => Err(e),
        },
        Err(e) => Err(e),
    }
}

async fn load_fragments(store: &FragmentStore, request: &BookRequest) -> RawContent {
    debug!("Loading fragments from {}", store.dir().display());
    RawContent::Fragments(store.load(&request.fragments).await)
}

/// The fragment store, when this request may use it.
fn fragment_store(request: &BookRequest, config: &AssemblyConfig) -> Option<FragmentStore> {
    if request.fragments.is_empty() || !config.fallback_to_fragments {
        return None;
    }
    config.fragments_dir.as_ref().map(FragmentStore::new)
}

/// Resolve the content generator, from most-specific to least-specific.
///
/// 1. **Pre-built generator** (`config.generator`): used as-is. Useful in
///    tests or when the caller wraps generation in its own service.
/// 2. **Configured command** (`config.generator_command`).
/// 3. **Environment** (`BOOKGEN_GENERATOR_CMD`): split on whitespace, so
///    deployments can point at a script without code changes.
/// 4. **None**: only legacy fragments can supply content.
fn resolve_generator(
    config: &AssemblyConfig,
) -> Result<Option<Arc<dyn ContentGenerator>>, BookError> {
    if let Some(ref generator) = config.generator {
        return Ok(Some(Arc::clone(generator)));
    }

    if let Some(ref command) = config.generator_command {
        let generator = CommandGenerator::from_command(command, config.generation_timeout_secs)?;
        return Ok(Some(Arc::new(generator)));
    }

    if let Ok(value) = std::env::var(GENERATOR_CMD_ENV) {
        let command: Vec<String> = value.split_whitespace().map(str::to_string).collect();
        if !command.is_empty() {
            debug!("Using generator from {}", GENERATOR_CMD_ENV);
            let generator = CommandGenerator::from_command(&command, config.generation_timeout_secs)?;
            return Ok(Some(Arc::new(generator)));
        }
    }

    Ok(None)
}
