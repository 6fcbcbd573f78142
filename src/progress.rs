//! Progress-callback trait for assembly events.
//!
//! Inject an [`Arc<dyn AssemblyProgressCallback>`] via
//! [`crate::config::AssemblyConfigBuilder::progress_callback`] to receive
//! events as a run moves from content generation through image resolution
//! to composition.
//!
//! # Example
//!
//! ```rust
//! use bookgen::{AssemblyConfig, AssemblyProgressCallback, ImageSlot};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     fetched: AtomicUsize,
//! }
//!
//! impl AssemblyProgressCallback for CountingCallback {
//!     fn on_image_resolved(&self, slot: ImageSlot, total: usize) {
//!         let done = self.fetched.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{slot} ready ({done}/{total})");
//!     }
//! }
//!
//! let config = AssemblyConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { fetched: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::model::ImageSlot;
use crate::output::ContentSource;
use std::sync::Arc;

/// Called by the assembly pipeline at each stage of a run.
///
/// Image events may arrive concurrently and out of order, since images are
/// fetched with bounded fan-out. All methods default to no-ops.
pub trait AssemblyProgressCallback: Send + Sync {
    /// Called once, before the content source is consulted.
    fn on_assembly_start(&self) {}

    /// Called when raw content has been normalised into a book.
    fn on_content_ready(&self, source: ContentSource, chapter_count: usize) {
        let _ = (source, chapter_count);
    }

    /// Called just before an image is fetched.
    ///
    /// # Arguments
    /// * `slot` : cover or chapter the image belongs to
    /// * `total`: number of images being resolved in this run
    fn on_image_start(&self, slot: ImageSlot, total: usize) {
        let _ = (slot, total);
    }

    /// Called when an image has been stored locally.
    fn on_image_resolved(&self, slot: ImageSlot, total: usize) {
        let _ = (slot, total);
    }

    /// Called when an image resolved to `Absent`.
    fn on_image_unavailable(&self, slot: ImageSlot, total: usize, error: &str) {
        let _ = (slot, total, error);
    }

    /// Called once after the sections have been composed.
    fn on_assembly_complete(&self, section_count: usize, images_resolved: usize) {
        let _ = (section_count, images_resolved);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AssemblyProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AssemblyConfig`].
pub type ProgressCallback = Arc<dyn AssemblyProgressCallback>;
