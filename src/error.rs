//! Error types for the bookgen library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BookError`] is **fatal**: the run cannot produce a document at all
//!   (missing author/topics, the generator reported an error or timed out,
//!   the output file could not be written). Returned as `Err(BookError)`
//!   from the top-level `assemble*` functions.
//!
//! * [`AssetError`] is **non-fatal**: a single image could not be fetched or
//!   stored. The image becomes [`crate::model::ImageRef::Absent`] and the
//!   error is recorded in [`crate::output::AssemblyOutput::asset_failures`]
//!   so callers can report it without losing the whole book.
//!
//! Malformed inline markdown is not an error at all: it degrades to literal
//! text inside [`crate::pipeline::markdown::convert`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the bookgen library.
///
/// Image-level failures use [`AssetError`] and never escalate here.
#[derive(Debug, Error)]
pub enum BookError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request or the normalized content lacks a required field.
    #[error("Invalid input: {reason}")]
    Input { reason: String },

    // ── Generator errors ──────────────────────────────────────────────────
    /// The content generator returned `{"error": …}`, a malformed response,
    /// or could not be started.
    #[error("Content generation failed: {message}")]
    Generation { message: String },

    /// The content generator did not answer within the configured budget.
    #[error("Content generation timed out after {secs}s\nIncrease --generation-timeout or retry later.")]
    GenerationTimeout { secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`BookError`], serialised into
/// [`crate::output::AssemblySummary`] for the calling boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Input,
    Generation,
    GenerationTimeout,
    Output,
    Config,
    Internal,
}

impl BookError {
    pub fn input(reason: impl Into<String>) -> Self {
        BookError::Input {
            reason: reason.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        BookError::Generation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BookError::Input { .. } => ErrorKind::Input,
            BookError::Generation { .. } => ErrorKind::Generation,
            BookError::GenerationTimeout { .. } => ErrorKind::GenerationTimeout,
            BookError::OutputWriteFailed { .. } => ErrorKind::Output,
            BookError::InvalidConfig(_) => ErrorKind::Config,
            BookError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Only a generator timeout is worth retrying unchanged; every other
    /// failure needs a different request or configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookError::GenerationTimeout { .. })
    }

    /// True for failures of the content source itself, which the legacy
    /// fragment store may substitute for.
    pub fn is_generator_failure(&self) -> bool {
        matches!(
            self,
            BookError::Generation { .. } | BookError::GenerationTimeout { .. }
        )
    }
}

/// A non-fatal error for a single image.
///
/// Stored in [`crate::output::AssemblyOutput::asset_failures`] when an image
/// resolves to `Absent`. Composition always continues.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum AssetError {
    /// The server answered with a non-2xx status.
    #[error("{slot}: HTTP {status} fetching '{url}'")]
    Http {
        slot: String,
        url: String,
        status: u16,
    },

    /// Connection, TLS or body-read failure.
    #[error("{slot}: failed to fetch '{url}': {detail}")]
    Network {
        slot: String,
        url: String,
        detail: String,
    },

    /// The response or data URI carried zero bytes.
    #[error("{slot}: empty image body from '{url}'")]
    EmptyBody { slot: String, url: String },

    /// The bytes are not a recognisable image format.
    #[error("{slot}: '{url}' did not return an image")]
    NotAnImage { slot: String, url: String },

    /// A `data:` URI that is not base64 image data.
    #[error("{slot}: invalid data URI: {detail}")]
    InvalidDataUri { slot: String, detail: String },

    /// A local file reference that does not exist.
    #[error("{slot}: local asset '{path}' not found")]
    MissingLocal { slot: String, path: PathBuf },

    /// The asset directory or file could not be written.
    #[error("{slot}: failed to store image: {detail}")]
    WriteFailed { slot: String, detail: String },

    /// Fetching exceeded the per-image budget.
    #[error("{slot}: fetching '{url}' timed out after {secs}s")]
    Timeout {
        slot: String,
        url: String,
        secs: u64,
    },
}
