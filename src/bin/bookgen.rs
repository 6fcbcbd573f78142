//! CLI binary for bookgen.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AssemblyConfig` and prints results.

use anyhow::{bail, Context, Result};
use bookgen::{
    assemble, assemble_from, summarize, write_document, AssemblyConfig, AssemblyOutput,
    AssemblyProgressCallback, BookRequest, ContentSource, GeneratorResponse, ImageSlot,
    ProgressCallback, RawContent,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while content is generated, then a
/// bar over the image downloads. Image events arrive out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-slot wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<ImageSlot, Instant>>,
    activated: AtomicBool,
    unavailable: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Generating");
        bar.set_message("Waiting for content…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            activated: AtomicBool::new(false),
            unavailable: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once the image count is known.
    fn activate_bar(&self, total: usize) {
        if self.activated.swap(true, Ordering::SeqCst) {
            return;
        }
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Fetching");
    }

    fn elapsed_secs(&self, slot: ImageSlot) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&slot))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AssemblyProgressCallback for CliProgressCallback {
    fn on_content_ready(&self, source: ContentSource, chapter_count: usize) {
        let from = match source {
            ContentSource::Generator => "generator",
            ContentSource::Fragments => "legacy fragments",
            ContentSource::Supplied => "supplied content",
        };
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{chapter_count} chapters from {from}"))
        ));
    }

    fn on_image_start(&self, slot: ImageSlot, total: usize) {
        self.activate_bar(total);
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(slot, Instant::now());
        }
        self.bar.set_message(slot.to_string());
    }

    fn on_image_resolved(&self, slot: ImageSlot, _total: usize) {
        let secs = self.elapsed_secs(slot);
        self.bar.println(format!(
            "  {} {:<12}  {}",
            green("✓"),
            slot.to_string(),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_unavailable(&self, slot: ImageSlot, _total: usize, error: &str) {
        let secs = self.elapsed_secs(slot);
        self.unavailable.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let mut s: String = error.chars().take(79).collect();
            s.push('\u{2026}');
            s
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<12}  {}  {}",
            red("✗"),
            slot.to_string(),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_assembly_complete(&self, section_count: usize, images_resolved: usize) {
        self.bar.finish_and_clear();
        let missing = self.unavailable.load(Ordering::SeqCst);
        if missing == 0 {
            eprintln!(
                "{} {} sections composed, {} images",
                green("✔"),
                bold(&section_count.to_string()),
                images_resolved
            );
        } else {
            eprintln!(
                "{} {} sections composed, {} images  ({} unavailable)",
                cyan("⚠"),
                bold(&section_count.to_string()),
                images_resolved,
                red(&missing.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generate and assemble a book (HTML on stdout)
  bookgen --author "Ada Lovelace" --topics "engines, looms" \
          --generator python3 ai_generator.py

  # Write the hand-off page to a file
  bookgen --author Ada --topics Rust -o book.html

  # Assemble a saved generator response, no generator call
  bookgen --author Ada --topics Rust --content response.json -o book.html

  # Legacy mode: assemble previously uploaded fragments
  bookgen --author Ada --topics Rust --fragments-dir uploads \
          --fragment Vorwort.html --fragment kapitel1.html --fragment Nachwort.html

  # Structured document as JSON, or just the run summary
  bookgen --author Ada --topics Rust --json > document.json
  bookgen --author Ada --topics Rust --summary

GENERATOR PROTOCOL:
  The generator is run as: <CMD…> book <author> <topics> <language>
  and must print one JSON object on stdout, either the book
  ({"title", "chapters": [{"title", "content", "image"}], …})
  or {"error": "message"}.

ENVIRONMENT VARIABLES:
  BOOKGEN_GENERATOR_CMD   Whitespace-separated generator command
  BOOKGEN_ASSET_DIR       Where downloaded images are stored
  RUST_LOG                Override log filter (e.g. bookgen=debug)
"#;

/// Assemble generated or uploaded content into a print-ready book.
#[derive(Parser, Debug)]
#[command(
    name = "bookgen",
    version,
    about = "Assemble generated or uploaded content into a print-ready book",
    long_about = "Assemble a book from an external content generator (or legacy uploaded \
fragments): normalise the text, download chapter and cover images, and compose cover, \
table of contents, chapters and afterword into one document for a page renderer.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Author name shown on the cover.
    #[arg(long, env = "BOOKGEN_AUTHOR")]
    author: String,

    /// Comma-separated topics.
    #[arg(long, env = "BOOKGEN_TOPICS", default_value = "")]
    topics: String,

    /// Book language (e.g. English, German).
    #[arg(long, env = "BOOKGEN_LANGUAGE")]
    language: Option<String>,

    /// Publisher line on the cover.
    #[arg(long, env = "BOOKGEN_PUBLISHER")]
    publisher: Option<String>,

    /// Title to use when the generator supplies none.
    #[arg(long)]
    title: Option<String>,

    /// Generator command and its leading arguments.
    #[arg(long, num_args = 1.., value_name = "CMD")]
    generator: Option<Vec<String>>,

    /// Read generator JSON from this file instead of running a generator.
    #[arg(long, value_name = "FILE", conflicts_with = "generator")]
    content: Option<PathBuf>,

    /// Directory holding legacy fragment files.
    #[arg(long, env = "BOOKGEN_FRAGMENTS_DIR")]
    fragments_dir: Option<PathBuf>,

    /// Fragment file name, in book order. Repeatable.
    #[arg(long = "fragment", value_name = "NAME")]
    fragments: Vec<String>,

    /// Never fall back to fragments when the generator fails.
    #[arg(long)]
    no_fallback: bool,

    /// Directory for downloaded images.
    #[arg(long, env = "BOOKGEN_ASSET_DIR", default_value = "uploads")]
    asset_dir: PathBuf,

    /// Per-image download timeout in seconds.
    #[arg(long, env = "BOOKGEN_IMAGE_TIMEOUT", default_value_t = 10)]
    image_timeout: u64,

    /// Generator timeout in seconds.
    #[arg(long, env = "BOOKGEN_GENERATION_TIMEOUT", default_value_t = 300)]
    generation_timeout: u64,

    /// Number of concurrent image downloads.
    #[arg(long, env = "BOOKGEN_IMAGE_CONCURRENCY", default_value_t = 4)]
    image_concurrency: usize,

    /// Date format for the cover (chrono strftime syntax).
    #[arg(long, env = "BOOKGEN_DATE_FORMAT")]
    date_format: Option<String>,

    /// Write the HTML hand-off to this file instead of stdout.
    #[arg(short, long, env = "BOOKGEN_OUTPUT")]
    output: Option<PathBuf>,

    /// Output the structured document (ComposedDocument) as JSON.
    #[arg(long, conflicts_with = "summary")]
    json: bool,

    /// Output only the run summary as JSON; never fails the process.
    #[arg(long)]
    summary: bool,

    /// Disable progress bar.
    #[arg(long, env = "BOOKGEN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BOOKGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BOOKGEN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.summary;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build request + config ───────────────────────────────────────────
    let request = build_request(&cli);

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AssemblyProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run assembly ─────────────────────────────────────────────────────
    let result = match cli.content {
        Some(ref path) => {
            let raw = read_content(path).await?;
            assemble_from(raw, &request, &config).await
        }
        None => assemble(&request, &config).await,
    };

    if cli.summary {
        let summary = summarize(&result);
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
        return Ok(());
    }

    let output = result.context("Assembly failed")?;

    if let Some(ref output_path) = cli.output {
        write_document(&output.document, output_path)
            .await
            .context("Failed to write document")?;
        if !cli.quiet {
            print_footer(&output, Some(output_path));
        }
    } else if cli.json {
        let json = serde_json::to_string_pretty(&output.document)
            .context("Failed to serialise document")?;
        println!("{json}");
    } else {
        let html = bookgen::pipeline::render::to_html(&output.document);
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(html.as_bytes())
            .context("Failed to write to stdout")?;
        if !cli.quiet && !show_progress {
            print_footer(&output, None);
        }
    }

    Ok(())
}

fn print_footer(output: &AssemblyOutput, path: Option<&PathBuf>) {
    let stats = &output.stats;
    let marker = if stats.images_absent == 0 {
        green("✔")
    } else {
        cyan("⚠")
    };
    let target = path
        .map(|p| format!("  →  {}", bold(&p.display().to_string())))
        .unwrap_or_default();
    eprintln!(
        "{}  '{}'  {} chapters  {}/{} images  {}ms{}",
        marker,
        output.book.title,
        stats.chapter_count,
        stats.images_resolved,
        stats.images_requested,
        stats.total_duration_ms,
        target,
    );
    for failure in &output.asset_failures {
        eprintln!("   {}", dim(&failure.to_string()));
    }
}

fn build_request(cli: &Cli) -> BookRequest {
    let mut request = BookRequest::new(cli.author.clone(), cli.topics.split(','))
        .with_fragments(cli.fragments.iter().cloned());
    if let Some(ref language) = cli.language {
        request = request.with_language(language.clone());
    }
    if let Some(ref publisher) = cli.publisher {
        request = request.with_publisher(publisher.clone());
    }
    if let Some(ref title) = cli.title {
        request = request.with_title(title.clone());
    }
    request
}

/// Map CLI args to `AssemblyConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AssemblyConfig> {
    let mut builder = AssemblyConfig::builder()
        .asset_dir(cli.asset_dir.clone())
        .image_timeout_secs(cli.image_timeout)
        .generation_timeout_secs(cli.generation_timeout)
        .image_concurrency(cli.image_concurrency)
        .fallback_to_fragments(!cli.no_fallback);

    if let Some(ref command) = cli.generator {
        let Some((program, args)) = command.split_first() else {
            bail!("--generator needs a command");
        };
        builder = builder.generator_command(program.clone(), args.iter().cloned());
    }
    if let Some(ref dir) = cli.fragments_dir {
        builder = builder.fragments_dir(dir.clone());
    }
    if let Some(ref language) = cli.language {
        builder = builder.default_language(language.clone());
    }
    if let Some(ref format) = cli.date_format {
        builder = builder.date_format(format.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse a saved generator response.
async fn read_content(path: &PathBuf) -> Result<RawContent> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read content from {:?}", path))?;
    let response: GeneratorResponse = serde_json::from_str(&text)
        .with_context(|| format!("{:?} is not a generator response", path))?;
    Ok(response.into())
}
