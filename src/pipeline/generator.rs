//! Content generation: the boundary to whatever writes the book text.
//!
//! The core never talks to a language model itself. It asks a
//! [`ContentGenerator`] for raw content and treats the answer as untrusted
//! data. [`CommandGenerator`] is the shipped implementation: it runs an
//! external program with the positional protocol
//!
//! ```text
//! <program> [args…] book <author> <topic, topic, …> <language>
//! ```
//!
//! and reads one JSON document from its stdout: either the book shape or
//! `{"error": "…"}`.
//!
//! ## Timeouts
//!
//! A whole book is several dozen completions on the generator side, so the
//! budget is large (20 minutes by default). When it runs out the child is
//! killed (`kill_on_drop`) and the run fails with
//! [`BookError::GenerationTimeout`], the only retryable error.

use crate::error::BookError;
use crate::model::{BookRequest, GeneratorResponse, RawContent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Characters of unparseable output quoted in the error message.
const OUTPUT_PREVIEW_CHARS: usize = 200;

/// What the generator is asked to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Always `"book"` for now.
    pub kind: String,
    pub author: String,
    pub topics: Vec<String>,
    pub language: String,
}

impl GenerationRequest {
    /// Build the generator request for `request`, falling back to
    /// `default_language` when the request names none.
    pub fn book(request: &BookRequest, default_language: &str) -> Self {
        let language = request
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(default_language);
        Self {
            kind: "book".to_string(),
            author: request.author.trim().to_string(),
            topics: request.clean_topics(),
            language: language.to_string(),
        }
    }
}

/// A source of structured book content.
///
/// Implementations return `Ok(RawContent::Failed { .. })` when the generator
/// answered with an error document, and `Err` when no usable answer arrived
/// at all.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<RawContent, BookError>;
}

/// Runs an external program and parses its stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout_secs: u64,
}

impl CommandGenerator {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout_secs: timeout_secs.max(1),
        }
    }

    /// Build from `[program, args…]`, as stored in the configuration.
    pub fn from_command(command: &[String], timeout_secs: u64) -> Result<Self, BookError> {
        match command.split_first() {
            Some((program, args)) if !program.trim().is_empty() => {
                Ok(Self::new(program.clone(), args.iter().cloned(), timeout_secs))
            }
            _ => Err(BookError::InvalidConfig(
                "Generator command must name a program".into(),
            )),
        }
    }
}

#[async_trait]
impl ContentGenerator for CommandGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<RawContent, BookError> {
        let start = Instant::now();
        info!(
            "Running generator '{}' for {} topics ({})",
            self.program,
            request.topics.len(),
            request.language
        );

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&request.kind)
            .arg(&request.author)
            .arg(request.topics.join(", "))
            .arg(&request.language)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BookError::generation(format!("failed to start '{}': {}", self.program, e))
            })?;

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| BookError::GenerationTimeout {
            secs: self.timeout_secs,
        })?
        .map_err(|e| BookError::generation(format!("generator I/O failed: {}", e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("Generator stderr: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_response(&stdout);
        if !output.status.success() {
            warn!("Generator exited with {}", output.status);
        }
        debug!(
            "Generator finished in {}ms",
            start.elapsed().as_millis()
        );
        parsed
    }
}

/// Parse generator stdout into raw content.
///
/// An `{"error": …}` document becomes [`RawContent::Failed`]; anything that
/// is not JSON is a [`BookError::Generation`] quoting the start of the
/// output.
pub fn parse_response(stdout: &str) -> Result<RawContent, BookError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(BookError::generation("generator produced no output"));
    }

    serde_json::from_str::<GeneratorResponse>(trimmed)
        .map(RawContent::from)
        .map_err(|_| {
            let preview: String = trimmed.chars().take(OUTPUT_PREVIEW_CHARS).collect();
            BookError::generation(format!("invalid generator output: {}", preview))
        })
}
