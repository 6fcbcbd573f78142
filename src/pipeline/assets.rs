//! Asset resolution: remote image references → local files.
//!
//! ## Why resolve before composing?
//!
//! The renderer runs offline and only understands local paths. Every image
//! the generator mentions is therefore fetched (or decoded, for `data:`
//! URIs), sniffed, and written into the asset directory before composition.
//! An image that cannot be made local becomes `Absent`; a missing picture
//! never fails a book.
//!
//! ## Concurrent writers
//!
//! Several runs may share one asset directory. Each image is written to a
//! [`NamedTempFile`] in that directory and then persisted under
//! `{slot}_{uuid}.{ext}`, so no writer ever sees another's partial file and
//! no locking is needed.

use super::compose::ResolvedImages;
use crate::config::AssemblyConfig;
use crate::error::{AssetError, BookError};
use crate::model::{Book, ImageRef, ImageSlot};
use crate::progress::ProgressCallback;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of resolving every image of a book.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAssets {
    pub images: ResolvedImages,
    /// One entry per image that ended up `Absent`, in slot order.
    pub failures: Vec<AssetError>,
    /// Number of image slots that were attempted.
    pub requested: usize,
}

/// Fetches and stores images for one or many runs.
pub struct AssetResolver {
    client: reqwest::Client,
    asset_dir: PathBuf,
    timeout_secs: u64,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for AssetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetResolver")
            .field("asset_dir", &self.asset_dir)
            .field("timeout_secs", &self.timeout_secs)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl AssetResolver {
    pub fn new(config: &AssemblyConfig) -> Result<Self, BookError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.image_timeout_secs))
            .build()
            .map_err(|e| BookError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            asset_dir: config.asset_dir.clone(),
            timeout_secs: config.image_timeout_secs,
            concurrency: config.image_concurrency.max(1),
            progress: config.progress_callback.clone(),
        })
    }

    /// Resolve one image, absorbing any failure into `Absent`.
    pub async fn resolve(&self, slot: ImageSlot, image: &ImageRef) -> ImageRef {
        match self.try_resolve(slot, image).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("{}", e);
                ImageRef::Absent
            }
        }
    }

    /// Resolve one image, reporting why it could not be made local.
    pub async fn try_resolve(
        &self,
        slot: ImageSlot,
        image: &ImageRef,
    ) -> Result<ImageRef, AssetError> {
        match image {
            ImageRef::Absent => Ok(ImageRef::Absent),
            ImageRef::LocalAsset { path } => {
                if tokio::fs::try_exists(path).await.unwrap_or(false) {
                    Ok(image.clone())
                } else {
                    Err(AssetError::MissingLocal {
                        slot: slot.to_string(),
                        path: path.clone(),
                    })
                }
            }
            ImageRef::RemoteImage { url } => {
                let bytes = if url.starts_with("data:") {
                    decode_data_uri(slot, url)?
                } else {
                    self.download(slot, url).await?
                };
                let path = self.store(slot, url, bytes).await?;
                debug!("Stored {} image at {}", slot, path.display());
                Ok(ImageRef::LocalAsset { path })
            }
        }
    }

    /// Resolve the cover and every chapter image with bounded fan-out.
    ///
    /// Waits for all images; the result holds one entry per slot.
    pub async fn resolve_all(&self, book: &Book) -> ResolvedAssets {
        let slots: Vec<(ImageSlot, ImageRef)> = book
            .image_slots()
            .into_iter()
            .map(|(slot, image)| (slot, image.clone()))
            .collect();
        let total = slots.len();
        if total == 0 {
            return ResolvedAssets::default();
        }
        info!("Resolving {} images into {}", total, self.asset_dir.display());

        let mut results: Vec<(ImageSlot, Result<ImageRef, AssetError>)> =
            stream::iter(slots.into_iter().map(|(slot, image)| async move {
                if let Some(ref cb) = self.progress {
                    cb.on_image_start(slot, total);
                }
                let result = self.try_resolve(slot, &image).await;
                if let Some(ref cb) = self.progress {
                    match &result {
                        Ok(_) => cb.on_image_resolved(slot, total),
                        Err(e) => cb.on_image_unavailable(slot, total, &e.to_string()),
                    }
                }
                (slot, result)
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        // Completion order is arbitrary; report failures in book order.
        results.sort_by_key(|(slot, _)| *slot);

        let mut assets = ResolvedAssets {
            requested: total,
            ..Default::default()
        };
        for (slot, result) in results {
            match result {
                Ok(image) => assets.images.insert(slot, image),
                Err(e) => {
                    warn!("{}", e);
                    assets.images.insert(slot, ImageRef::Absent);
                    assets.failures.push(e);
                }
            }
        }

        info!(
            "Images: {}/{} resolved",
            total - assets.failures.len(),
            total
        );
        assets
    }

    async fn download(&self, slot: ImageSlot, url: &str) -> Result<Vec<u8>, AssetError> {
        debug!("Downloading {} image from: {}", slot, url);

        let network_error = |e: reqwest::Error| {
            if e.is_timeout() {
                AssetError::Timeout {
                    slot: slot.to_string(),
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                AssetError::Network {
                    slot: slot.to_string(),
                    url: url.to_string(),
                    detail: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(&network_error)?;

        if !response.status().is_success() {
            return Err(AssetError::Http {
                slot: slot.to_string(),
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(&network_error)?;
        Ok(bytes.to_vec())
    }

    /// Sniff the format and write the bytes under a unique name.
    async fn store(
        &self,
        slot: ImageSlot,
        source: &str,
        bytes: Vec<u8>,
    ) -> Result<PathBuf, AssetError> {
        if bytes.is_empty() {
            return Err(AssetError::EmptyBody {
                slot: slot.to_string(),
                url: display_source(source),
            });
        }

        let format = image::guess_format(&bytes).map_err(|_| AssetError::NotAnImage {
            slot: slot.to_string(),
            url: display_source(source),
        })?;
        let ext = format.extensions_str().first().copied().unwrap_or("img");

        let dir = self.asset_dir.clone();
        let file_name = format!("{}_{}.{}", slot.file_prefix(), Uuid::new_v4(), ext);

        tokio::task::spawn_blocking(move || write_atomically(&dir, &file_name, &bytes))
            .await
            .map_err(|e| AssetError::WriteFailed {
                slot: slot.to_string(),
                detail: format!("Task join error: {}", e),
            })?
            .map_err(|e| AssetError::WriteFailed {
                slot: slot.to_string(),
                detail: e.to_string(),
            })
    }
}

fn write_atomically(dir: &Path, file_name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    let target = dir.join(file_name);
    tmp.persist(&target).map_err(|e| e.error)?;
    Ok(target)
}

/// Decode a base64 `data:` URI into raw bytes.
fn decode_data_uri(slot: ImageSlot, uri: &str) -> Result<Vec<u8>, AssetError> {
    let invalid = |detail: &str| AssetError::InvalidDataUri {
        slot: slot.to_string(),
        detail: detail.to_string(),
    };

    let rest = uri.strip_prefix("data:").ok_or_else(|| invalid("missing 'data:' prefix"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing ',' separator"))?;
    if !meta.to_ascii_lowercase().ends_with(";base64") {
        return Err(invalid("only base64 data URIs are supported"));
    }

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| invalid(&e.to_string()))
}

/// Data URIs are shortened in error messages.
fn display_source(source: &str) -> String {
    if source.starts_with("data:") {
        let head: String = source.chars().take(32).collect();
        format!("{}…", head)
    } else {
        source.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chapter;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(2, 2));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn png_data_uri() -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(png_bytes()))
    }

    fn resolver(dir: &Path) -> AssetResolver {
        let config = AssemblyConfig::builder()
            .asset_dir(dir)
            .image_timeout_secs(5)
            .build()
            .unwrap();
        AssetResolver::new(&config).unwrap()
    }

    fn remote(url: impl Into<String>) -> ImageRef {
        ImageRef::RemoteImage { url: url.into() }
    }

    #[tokio::test]
    async fn data_uri_png_is_stored_locally() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolver(dir.path())
            .try_resolve(ImageSlot::Cover, &remote(png_data_uri()))
            .await
            .unwrap();

        let path = resolved.local_path().unwrap();
        assert!(path.exists());
        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("cover_"));
        assert!(name.ends_with(".png"));
    }

    #[tokio::test]
    async fn unreachable_url_resolves_to_absent() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());
        let image = remote("http://127.0.0.1:9/x.png");

        let err = r.try_resolve(ImageSlot::Chapter(0), &image).await.unwrap_err();
        assert!(matches!(
            err,
            AssetError::Network { .. } | AssetError::Timeout { .. }
        ));
        assert_eq!(r.resolve(ImageSlot::Chapter(0), &image).await, ImageRef::Absent);
    }

    #[tokio::test]
    async fn non_image_data_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("data:text/plain;base64,{}", STANDARD.encode("hello world"));
        let err = resolver(dir.path())
            .try_resolve(ImageSlot::Cover, &remote(uri))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::NotAnImage { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_and_malformed_data_uris() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());

        let err = r
            .try_resolve(ImageSlot::Cover, &remote("data:image/png;base64,"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::EmptyBody { .. }));

        let err = r
            .try_resolve(ImageSlot::Cover, &remote("data:image/png,rawbytes"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidDataUri { .. }));

        let err = r
            .try_resolve(ImageSlot::Cover, &remote("data:image/png;base64,@@@"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidDataUri { .. }));
    }

    #[tokio::test]
    async fn local_assets_are_kept_only_if_present() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("cover.png");
        std::fs::write(&existing, png_bytes()).unwrap();
        let r = resolver(dir.path());

        let kept = ImageRef::LocalAsset {
            path: existing.clone(),
        };
        assert_eq!(r.resolve(ImageSlot::Cover, &kept).await, kept);

        let missing = ImageRef::LocalAsset {
            path: dir.path().join("nope.png"),
        };
        let err = r.try_resolve(ImageSlot::Cover, &missing).await.unwrap_err();
        assert!(matches!(err, AssetError::MissingLocal { .. }));
    }

    #[tokio::test]
    async fn resolve_all_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let book = Book {
            title: "T".into(),
            author: "A".into(),
            publisher: None,
            language: "English".into(),
            table_of_contents: String::new(),
            chapters: vec![
                Chapter {
                    title: "One".into(),
                    content: "x".into(),
                    image: remote("http://127.0.0.1:9/one.png"),
                },
                Chapter {
                    title: "Two".into(),
                    content: "y".into(),
                    image: ImageRef::Absent,
                },
                Chapter {
                    title: "Three".into(),
                    content: "z".into(),
                    image: remote(png_data_uri()),
                },
            ],
            afterword: None,
            topics: vec![],
            cover: remote(png_data_uri()),
        };

        let assets = resolver(dir.path()).resolve_all(&book).await;
        assert_eq!(assets.requested, 3);
        assert_eq!(assets.failures.len(), 1);
        assert!(assets.images.cover.local_path().is_some());
        assert_eq!(*assets.images.get(ImageSlot::Chapter(0)), ImageRef::Absent);
        assert_eq!(*assets.images.get(ImageSlot::Chapter(1)), ImageRef::Absent);
        assert!(assets.images.get(ImageSlot::Chapter(2)).local_path().is_some());
        assert_eq!(assets.images.local_count(), 2);
    }

    #[test]
    fn display_source_shortens_data_uris() {
        assert_eq!(display_source("https://x.test/a.png"), "https://x.test/a.png");
        assert!(display_source(&png_data_uri()).chars().count() <= 33);
    }
}
