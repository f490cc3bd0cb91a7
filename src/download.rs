//! Bounded-concurrency image downloader.
//!
//! Fetches selected image URLs in parallel, validates the declared content
//! type (the URL extension is not trusted), writes bytes under a
//! hash-derived collision-safe filename, then re-opens the written file and
//! confirms it decodes — a truncated or corrupt download is a failure even
//! though bytes landed on disk. One item's failure never cancels siblings,
//! and completion order is not input order.

use crate::extract::Candidate;
use crate::fetch::StaticFetcher;
use anyhow::{anyhow, Context, Result};
use fnv::FnvHasher;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Per-image result reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub url: String,
    /// Where the bytes were written. Present even for probe failures, so the
    /// caller can inspect or clean up.
    pub path: Option<PathBuf>,
    pub byte_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Detected image format (from the decoded bytes, not the extension).
    pub format: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl DownloadOutcome {
    fn failure(url: &str, path: Option<PathBuf>, byte_size: u64, error: String) -> Self {
        Self {
            url: url.to_string(),
            path,
            byte_size,
            width: None,
            height: None,
            format: None,
            success: false,
            error: Some(error),
        }
    }
}

/// Downloads image candidates with a bounded worker pool.
pub struct ParallelDownloader {
    fetcher: StaticFetcher,
    /// Per-item timeout covering fetch, write and probe.
    item_timeout_ms: u64,
}

impl ParallelDownloader {
    pub fn new(fetcher: StaticFetcher, item_timeout_ms: u64) -> Self {
        Self {
            fetcher,
            item_timeout_ms,
        }
    }

    /// Download every candidate into `destination` with at most `concurrency`
    /// in flight. Returns one outcome per submitted candidate; ordering
    /// follows completion, not input.
    pub async fn download_all(
        &self,
        candidates: &[Candidate],
        destination: &Path,
        concurrency: usize,
    ) -> Vec<DownloadOutcome> {
        if let Err(e) = tokio::fs::create_dir_all(destination).await {
            warn!("cannot create download destination: {e}");
            return candidates
                .iter()
                .map(|c| {
                    DownloadOutcome::failure(&c.url, None, 0, format!("destination unavailable: {e}"))
                })
                .collect();
        }

        let concurrency = concurrency.max(1);
        stream::iter(candidates.iter())
            .map(|candidate| {
                let url = candidate.url.clone();
                let dest = destination.to_path_buf();
                async move {
                    let work = self.download_one(&url, &dest);
                    match tokio::time::timeout(
                        Duration::from_millis(self.item_timeout_ms),
                        work,
                    )
                    .await
                    {
                        Ok(Ok(outcome)) => outcome,
                        Ok(Err(e)) => DownloadOutcome::failure(&url, None, 0, format!("{e:#}")),
                        Err(_) => DownloadOutcome::failure(
                            &url,
                            None,
                            0,
                            format!("timed out after {}ms", self.item_timeout_ms),
                        ),
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    async fn download_one(&self, url: &str, destination: &Path) -> Result<DownloadOutcome> {
        let fetched = self.fetcher.get_bytes(url, self.item_timeout_ms).await?;

        let content_type = fetched.content_type.clone().unwrap_or_default();
        if !content_type.trim().to_lowercase().starts_with("image/") {
            return Ok(DownloadOutcome::failure(
                url,
                None,
                0,
                format!("declared content type is not an image: {content_type:?}"),
            ));
        }

        let filename = derive_filename(url, &content_type);
        let path = destination.join(filename);
        let byte_size = fetched.bytes.len() as u64;

        tokio::fs::write(&path, &fetched.bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        // Probe the written file: declared content type is no guarantee the
        // bytes decode. `image` does blocking I/O, so off the async threads.
        let probe_path = path.clone();
        let probe = tokio::task::spawn_blocking(move || probe_image(&probe_path)).await?;

        match probe {
            Ok((width, height, format)) => {
                debug!(url, width, height, format = %format, "downloaded image");
                Ok(DownloadOutcome {
                    url: url.to_string(),
                    path: Some(path),
                    byte_size,
                    width: Some(width),
                    height: Some(height),
                    format: Some(format),
                    success: true,
                    error: None,
                })
            }
            Err(e) => Ok(DownloadOutcome::failure(
                url,
                Some(path),
                byte_size,
                format!("written bytes do not decode: {e:#}"),
            )),
        }
    }
}

/// Confirm the written file decodes and report dimensions and format.
fn probe_image(path: &Path) -> Result<(u32, u32, String)> {
    let reader = image::ImageReader::open(path)?
        .with_guessed_format()
        .context("probing image format")?;
    let format = reader
        .format()
        .ok_or_else(|| anyhow!("unrecognized image format"))?;
    let (width, height) = reader.into_dimensions().context("reading dimensions")?;
    Ok((width, height, format!("{format:?}").to_lowercase()))
}

/// Collision-safe filename: fnv64 of the full URL plus the sanitized
/// original basename. Hash-derived names keep the shared destination
/// directory lock-free across workers.
pub fn derive_filename(url: &str, content_type: &str) -> String {
    let mut hasher = FnvHasher::default();
    hasher.write(url.as_bytes());
    let hash = hasher.finish();

    let basename = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("image");

    let mut sanitized: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if !sanitized.contains('.') {
        sanitized.push_str(extension_for(content_type));
    }

    format!("{hash:016x}_{sanitized}")
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
        .as_str()
    {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "image/avif" => ".avif",
        _ => ".img",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filenames_are_collision_safe() {
        // Same basename on different hosts must not collide.
        let a = derive_filename("https://a.example.com/img/photo.jpg", "image/jpeg");
        let b = derive_filename("https://b.example.com/img/photo.jpg", "image/jpeg");
        assert_ne!(a, b);
        assert!(a.ends_with("_photo.jpg"));
        assert!(b.ends_with("_photo.jpg"));
    }

    #[test]
    fn test_filename_is_deterministic() {
        let a = derive_filename("https://e.com/x.png?w=100", "image/png");
        let b = derive_filename("https://e.com/x.png?w=100", "image/png");
        assert_eq!(a, b);
    }

    #[test]
    fn test_filename_sanitizes_and_extends() {
        let name = derive_filename("https://e.com/media/weird name%20", "image/webp");
        assert!(name.ends_with(".webp"));
        assert!(!name.contains(' '));
        assert!(!name.contains('%'));

        let bare = derive_filename("https://e.com/", "image/jpeg");
        assert!(bare.ends_with("image.jpg"));
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for("image/jpeg; charset=binary"), ".jpg");
        assert_eq!(extension_for("IMAGE/PNG"), ".png");
        assert_eq!(extension_for("image/x-exotic"), ".img");
    }

    #[test]
    fn test_probe_rejects_non_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.jpg");
        std::fs::write(&path, b"<html>not an image</html>").unwrap();
        assert!(probe_image(&path).is_err());
    }

    #[test]
    fn test_probe_accepts_valid_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.png");
        let img = image::RgbImage::new(4, 3);
        img.save(&path).unwrap();
        let (w, h, format) = probe_image(&path).unwrap();
        assert_eq!((w, h), (4, 3));
        assert_eq!(format, "png");
    }
}
