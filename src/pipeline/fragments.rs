//! Legacy fragment store: previously uploaded chapter files.
//!
//! Before structured generation existed, books were assembled from loose
//! files in an upload directory. A request lists the file names it wants,
//! in order; each file becomes one [`Fragment`] whose role is decided here,
//! once, from its name.
//!
//! Unreadable files never fail a run. They load as empty fragments, which
//! the normaliser skips.

use crate::model::Fragment;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads named fragments from one directory.
#[derive(Debug, Clone)]
pub struct FragmentStore {
    dir: PathBuf,
}

impl FragmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load `names` in order.
    ///
    /// Bytes are decoded as UTF-8 lossily. A name that is missing, unreadable
    /// or tries to leave the store directory yields an empty fragment.
    pub async fn load(&self, names: &[String]) -> Vec<Fragment> {
        let mut fragments = Vec::with_capacity(names.len());
        for name in names {
            let text = match self.path_for(name) {
                Some(path) => match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        debug!("Loaded fragment '{}' ({} bytes)", name, bytes.len());
                        String::from_utf8_lossy(&bytes).into_owned()
                    }
                    Err(e) => {
                        warn!("Fragment '{}' unavailable: {}", name, e);
                        String::new()
                    }
                },
                None => {
                    warn!("Fragment name '{}' is not a plain file name", name);
                    String::new()
                }
            };
            fragments.push(Fragment::classified(name.clone(), text));
        }
        fragments
    }

    /// Only bare file names are looked up; anything with a directory part
    /// is refused.
    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let trimmed = name.trim();
        let file_name = Path::new(trimmed).file_name()?;
        if file_name != trimmed {
            return None;
        }
        Some(self.dir.join(file_name))
    }
}
