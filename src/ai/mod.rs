//! AI image generation
//!
//! Sends normalized style references and edit inputs to Gemini's image model
//! as inline base64 parts and extracts the generated image.

pub mod gemini;
pub mod mock;

pub use gemini::GeminiImageClient;
pub use mock::MockImageGenerationClient;

use crate::models::ImageBlob;
use crate::Result;
use async_trait::async_trait;

/// An image payload ready to embed in a request: MIME type plus base64 data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn from_blob(blob: &ImageBlob) -> Result<Self> {
        Ok(Self {
            mime_type: blob.mime_type.clone(),
            data: crate::image::to_base64(blob)?,
        })
    }
}

#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    /// Generates an image of `prompt` in the style of `style`.
    async fn generate_styled(&self, prompt: &str, style: &InlineImage) -> Result<ImageBlob>;

    /// Composites `overlay` into `base` following `instruction`.
    async fn edit_image(
        &self,
        base: &InlineImage,
        overlay: &InlineImage,
        instruction: &str,
    ) -> Result<ImageBlob>;
}
