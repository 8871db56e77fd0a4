//! Durable storage for generated profile images.
//!
//! Providers hand back either inline bytes or a URL that expires within the
//! hour. Both are written under `{upload_dir}/friends/` keyed by friend id
//! and served from `/uploads`, so a friend's `imageUrl` keeps resolving.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("generated image is not a PNG, JPEG, WEBP or GIF")]
    UnsupportedFormat,
    #[error("failed to write image: {0}")]
    Io(#[from] std::io::Error),
}

/// An image written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: String,
    pub url: String,
}

/// Detects the image type from its leading bytes. Returns `(mime, extension)`.
pub fn detect_image_type(data: &[u8]) -> Option<(&'static str, &'static str)> {
    if data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF] {
        Some(("image/jpeg", "jpg"))
    } else if data.len() >= 8 && data[..8] == [137, 80, 78, 71, 13, 10, 26, 10] {
        Some(("image/png", "png"))
    } else if data.len() >= 6 && (&data[..6] == b"GIF87a" || &data[..6] == b"GIF89a") {
        Some(("image/gif", "gif"))
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some(("image/webp", "webp"))
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    upload_dir: PathBuf,
    public_url: String,
}

impl ImageStore {
    pub fn new(upload_dir: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Writes a friend's profile image and returns where it lives.
    pub async fn save_friend_image(
        &self,
        friend_id: &str,
        data: &[u8],
    ) -> Result<StoredImage, ImageStoreError> {
        let (_, ext) = detect_image_type(data).ok_or(ImageStoreError::UnsupportedFormat)?;

        let dir = self.upload_dir.join("friends");
        tokio::fs::create_dir_all(&dir).await?;

        let filename = format!("{}.{}", friend_id, ext);
        let path = dir.join(&filename);
        tokio::fs::write(&path, data).await?;

        tracing::debug!(friend_id, path = %path.display(), bytes = data.len(), "stored friend image");
        Ok(StoredImage {
            path: path.to_string_lossy().into_owned(),
            url: format!("{}/uploads/friends/{}", self.public_url, filename),
        })
    }

    /// Deletes a stored image. A file that is already gone is not an error.
    pub async fn remove(&self, path: &str) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path, "removed friend image"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path, error = %e, "failed to remove friend image"),
        }
    }
}
