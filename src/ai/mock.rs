use super::{ImageGenerationService, InlineImage};
use crate::models::ImageBlob;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// A 1x1 white PNG, returned when no response is configured.
fn default_png() -> Result<Vec<u8>> {
    let pixel = image::RgbImage::from_pixel(1, 1, image::Rgb([255, 255, 255]));
    let mut bytes = Vec::new();
    pixel
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(bytes)
}

/// A recorded call to the mock, for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedRequest {
    Styled {
        prompt: String,
        style: InlineImage,
    },
    Edit {
        base: InlineImage,
        overlay: InlineImage,
        instruction: String,
    },
}

pub struct MockImageGenerationClient {
    image_responses: Arc<Mutex<Vec<ImageBlob>>>,
    failures_remaining: Arc<Mutex<usize>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockImageGenerationClient {
    pub fn new() -> Self {
        Self {
            image_responses: Arc::new(Mutex::new(Vec::new())),
            failures_remaining: Arc::new(Mutex::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_image_response(self, response: ImageBlob) -> Self {
        self.image_responses.lock().unwrap().push(response);
        self
    }

    /// Makes the next `count` calls fail with a provider error.
    pub fn with_failures(self, count: usize) -> Self {
        *self.failures_remaining.lock().unwrap() = count;
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, request: RecordedRequest) -> Result<ImageBlob> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);

        let mut failures = self.failures_remaining.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(Error::AiProvider("Mock failure".to_string()));
        }

        let responses = self.image_responses.lock().unwrap();
        if responses.is_empty() {
            Ok(ImageBlob::new(default_png()?, "image/png"))
        } else {
            let index = (requests.len() - 1) % responses.len();
            Ok(responses[index].clone())
        }
    }
}

impl Default for MockImageGenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageGenerationService for MockImageGenerationClient {
    async fn generate_styled(&self, prompt: &str, style: &InlineImage) -> Result<ImageBlob> {
        self.respond(RecordedRequest::Styled {
            prompt: prompt.to_string(),
            style: style.clone(),
        })
    }

    async fn edit_image(
        &self,
        base: &InlineImage,
        overlay: &InlineImage,
        instruction: &str,
    ) -> Result<ImageBlob> {
        self.respond(RecordedRequest::Edit {
            base: base.clone(),
            overlay: overlay.clone(),
            instruction: instruction.to_string(),
        })
    }
}
