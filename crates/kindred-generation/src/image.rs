//! Profile image generation.

use crate::GenerationError;
use async_trait::async_trait;
use base64::Engine;

/// Largest image we are willing to download from a transient URL.
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// What an image provider hands back.
///
/// Providers either inline the image or return a short-lived URL. Neither is
/// suitable for persisting directly; callers resolve it to bytes with
/// [`GeneratedImage::into_bytes`] and store those durably.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    Base64(String),
    Url(String),
}

impl GeneratedImage {
    /// Resolves the image to raw bytes, downloading it if necessary.
    pub async fn into_bytes(self, http: &reqwest::Client) -> Result<Vec<u8>, GenerationError> {
        match self {
            Self::Base64(data) => base64::engine::general_purpose::STANDARD
                .decode(data.trim())
                .map_err(|e| GenerationError::Malformed(format!("image is not base64: {e}"))),
            Self::Url(url) => {
                tracing::debug!(%url, "downloading generated image");
                let response = http.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(GenerationError::Upstream {
                        status: status.as_u16(),
                        message: format!("image download failed with {status}"),
                    });
                }
                let bytes = response.bytes().await?;
                if bytes.is_empty() {
                    return Err(GenerationError::Empty);
                }
                if bytes.len() > MAX_IMAGE_BYTES {
                    return Err(GenerationError::Malformed(format!(
                        "image is {} bytes (limit: {} bytes)",
                        bytes.len(),
                        MAX_IMAGE_BYTES
                    )));
                }
                Ok(bytes.to_vec())
            }
        }
    }
}

/// Something that draws a picture from a prompt.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError>;
}
