use super::ImageFetcher;
use crate::models::{ImageBlob, DEFAULT_PROXIES};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};

const URL_PLACEHOLDER: &str = "{url}";

/// A relay URL template with a `{url}` placeholder for the encoded target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    template: String,
}

impl ProxyEndpoint {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(URL_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "Proxy template '{}' is missing the {{url}} placeholder",
                template
            )));
        }
        Ok(Self { template })
    }

    /// Substitutes the percent-encoded target into the template.
    pub fn resolve(&self, target: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        self.template.replace(URL_PLACEHOLDER, &encoded)
    }
}

/// Why a single relay attempt was abandoned.
#[derive(Debug)]
enum ProxyFailure {
    NotFound(StatusCode),
    ProxyError(StatusCode),
    NotAnImage(String),
    Transport(reqwest::Error),
}

impl std::fmt::Display for ProxyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(status) => write!(
                f,
                "reference image not found or invalid (server responded {})",
                status.as_u16()
            ),
            Self::ProxyError(status) => write!(f, "proxy error (status {})", status.as_u16()),
            Self::NotAnImage(content_type) => write!(
                f,
                "URL does not point to an image (content type '{}')",
                content_type
            ),
            Self::Transport(e) => write!(f, "request failed: {}", e),
        }
    }
}

/// Fetches images by trying each relay in order until one returns image data.
pub struct FallbackFetcher {
    client: Client,
    proxies: Vec<ProxyEndpoint>,
}

impl FallbackFetcher {
    pub fn new(proxies: Vec<ProxyEndpoint>) -> Self {
        Self::new_with_client(proxies, Client::new())
    }

    pub fn new_with_client(proxies: Vec<ProxyEndpoint>, client: Client) -> Self {
        Self { client, proxies }
    }

    pub fn from_templates(templates: &[String], client: Client) -> Result<Self> {
        let proxies = templates
            .iter()
            .map(|t| ProxyEndpoint::new(t.as_str()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new_with_client(proxies, client))
    }

    pub fn with_default_proxies(client: Client) -> Self {
        let proxies = DEFAULT_PROXIES
            .iter()
            .map(|t| ProxyEndpoint {
                template: t.to_string(),
            })
            .collect();
        Self::new_with_client(proxies, client)
    }

    pub fn proxies(&self) -> &[ProxyEndpoint] {
        &self.proxies
    }

    async fn fetch_via(&self, proxy_url: &str) -> std::result::Result<ImageBlob, ProxyFailure> {
        let response = self
            .client
            .get(proxy_url)
            .send()
            .await
            .map_err(ProxyFailure::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(if status.is_client_error() {
                ProxyFailure::NotFound(status)
            } else {
                ProxyFailure::ProxyError(status)
            });
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .unwrap_or_default();

        if !mime_type.starts_with("image/") {
            return Err(ProxyFailure::NotAnImage(mime_type));
        }

        let bytes = response.bytes().await.map_err(ProxyFailure::Transport)?;
        Ok(ImageBlob::new(bytes.to_vec(), mime_type))
    }
}

#[async_trait]
impl ImageFetcher for FallbackFetcher {
    async fn fetch_image(&self, url: &str) -> Result<ImageBlob> {
        for proxy in &self.proxies {
            let proxy_url = proxy.resolve(url);
            tracing::debug!("Fetching reference image via {}", proxy_url);

            match self.fetch_via(&proxy_url).await {
                Ok(blob) => {
                    tracing::info!(
                        "Fetched reference image ({} bytes, {})",
                        blob.len(),
                        blob.mime_type
                    );
                    return Ok(blob);
                }
                Err(failure) => {
                    tracing::warn!("Proxy failed: {}. Trying next... ({})", proxy_url, failure);
                }
            }
        }

        Err(Error::Fetch(format!(
            "all {} proxy endpoints failed; check the network connection or try a different image URL",
            self.proxies.len()
        )))
    }
}
