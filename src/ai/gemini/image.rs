use super::client::GeminiHttpClient;
use super::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, InlineData, Part,
};
use crate::ai::{ImageGenerationService, InlineImage};
use crate::models::ImageBlob;
use crate::{prompts, Error, Result};
use async_trait::async_trait;
use std::time::Duration;

pub struct GeminiImageClient {
    http: GeminiHttpClient,
}

impl GeminiImageClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(
                api_key,
                model,
                Duration::from_secs(120),
                client,
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn image_part(image: &InlineImage) -> Part {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            },
        }
    }

    async fn request_image(&self, parts: Vec<Part>) -> Result<ImageBlob> {
        let request = GenerateContentRequest {
            contents: vec![Content { role: None, parts }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE".to_string()],
            },
        };

        tracing::debug!("Sending image request to Gemini ({})", self.http.model());
        let response: GenerateContentResponse = self.http.generate_content(&request).await?;

        Self::extract_image(response)
    }

    fn extract_image(response: GenerateContentResponse) -> Result<ImageBlob> {
        let parts = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .filter(|parts| !parts.is_empty());

        let Some(parts) = parts else {
            if let Some(reason) = response
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.clone())
            {
                return Err(Error::Blocked {
                    reason,
                    details: response
                        .prompt_feedback
                        .and_then(|f| f.block_reason_message),
                });
            }
            return Err(Error::AiProvider(
                "No usable candidate in Gemini response; revise the prompt and try again"
                    .to_string(),
            ));
        };

        let image_data = parts
            .into_iter()
            .find_map(|p| match p {
                Part::InlineData { inline_data } => Some(inline_data),
                Part::Text { .. } => None,
            })
            .ok_or_else(|| Error::AiProvider("Gemini response contained no image".to_string()))?;

        tracing::debug!(
            "Gemini returned image with mime_type: {}",
            image_data.mime_type
        );

        use base64::Engine as _;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&image_data.data)
            .map_err(|e| {
                Error::AiProvider(format!("Failed to decode Gemini base64 image: {}", e))
            })?;

        Ok(ImageBlob::new(bytes, image_data.mime_type))
    }
}

#[async_trait]
impl ImageGenerationService for GeminiImageClient {
    async fn generate_styled(&self, prompt: &str, style: &InlineImage) -> Result<ImageBlob> {
        let text = prompts::render(prompts::STYLE_TRANSFER, &[("prompt", prompt)]);

        self.request_image(vec![Self::image_part(style), Part::Text { text }])
            .await
    }

    async fn edit_image(
        &self,
        base: &InlineImage,
        overlay: &InlineImage,
        instruction: &str,
    ) -> Result<ImageBlob> {
        self.request_image(vec![
            Self::image_part(base),
            Self::image_part(overlay),
            Part::Text {
                text: instruction.to_string(),
            },
        ])
        .await
    }
}
