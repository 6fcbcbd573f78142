//! Pipeline stages for book assembly.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different content generator) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! generator ─┐
//!            ├─▶ normalize ──▶ assets ──▶ compose ──▶ render
//! fragments ─┘    (+clean)     (fetch)    (sections)  (HTML)
//! ```
//!
//! 1. [`generator`]: ask an external program for structured content; the
//!    only stage that spawns processes
//! 2. [`fragments`]: legacy alternative that reads uploaded fragment files
//! 3. [`clean`]: deterministic text rules for generator quirks
//! 4. [`normalize`]: merge raw content with the request into a `Book`
//! 5. [`assets`]: make every image local or `Absent`; the only stage
//!    with network I/O
//! 6. [`markdown`]: restricted markdown → escaped structural nodes
//! 7. [`compose`]: order sections, synthesize the table of contents
//! 8. [`render`]: HTML hand-off for the external page renderer

pub mod assets;
pub mod clean;
pub mod compose;
pub mod fragments;
pub mod generator;
pub mod markdown;
pub mod normalize;
pub mod render;
