//! Reference image retrieval
//!
//! Downloads style-reference images through an ordered list of CORS relay
//! endpoints, falling through to the next relay whenever one fails.

pub mod mock;
pub mod proxy;

pub use mock::MockImageFetcher;
pub use proxy::{FallbackFetcher, ProxyEndpoint};

use crate::models::ImageBlob;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<ImageBlob>;
}
