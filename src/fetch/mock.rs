use super::ImageFetcher;
use crate::models::ImageBlob;
use crate::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

pub struct MockImageFetcher {
    response: Arc<Mutex<Option<ImageBlob>>>,
    requested_urls: Arc<Mutex<Vec<String>>>,
}

impl MockImageFetcher {
    pub fn new() -> Self {
        Self {
            response: Arc::new(Mutex::new(None)),
            requested_urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(self, blob: ImageBlob) -> Self {
        *self.response.lock().unwrap() = Some(blob);
        self
    }

    pub fn get_fetch_count(&self) -> usize {
        self.requested_urls.lock().unwrap().len()
    }

    pub fn get_requested_urls(&self) -> Vec<String> {
        self.requested_urls.lock().unwrap().clone()
    }
}

impl Default for MockImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for MockImageFetcher {
    async fn fetch_image(&self, url: &str) -> Result<ImageBlob> {
        self.requested_urls.lock().unwrap().push(url.to_string());

        self.response.lock().unwrap().clone().ok_or_else(|| {
            crate::Error::Fetch("mock fetcher has no response configured".to_string())
        })
    }
}
