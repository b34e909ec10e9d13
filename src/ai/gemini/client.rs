use crate::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Error fragments Gemini returns when the key is unusable.
const INVALID_KEY_MARKERS: &[&str] = &["API key not valid", "Requested entity was not found"];

/// Google's error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Posts `generateContent` requests for one image model.
///
/// Shares its `reqwest::Client` with the reference fetcher so both reuse one
/// connection pool.
pub struct GeminiHttpClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    /// `model` may be given bare (`gemini-2.5-flash-image`) or as `models/...`.
    pub fn new_with_client(
        api_key: String,
        model: String,
        timeout: Duration,
        client: Client,
    ) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();

        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    pub async fn generate_content<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        request: &Req,
    ) -> Result<Resp> {
        let response = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach Gemini: {}", e);
                e
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Unexpected Gemini response: {}\nBody: {}", e, body);
            Error::AiProvider(format!("Failed to parse Gemini response: {}", e))
        })
    }
}

/// Maps a non-success response to the error the caller should see.
fn classify_failure(status: StatusCode, body: &str) -> Error {
    tracing::error!("Gemini API error (status {}): {}", status, body);

    if INVALID_KEY_MARKERS.iter().any(|m| body.contains(m)) {
        return Error::InvalidApiKey;
    }

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => Error::AiProvider(format!(
            "Gemini API error (status {}, {}): {}",
            status.as_u16(),
            error.status.as_deref().unwrap_or("UNKNOWN"),
            error.message
        )),
        Err(_) => Error::AiProvider(format!(
            "Gemini API error (status {}): {}",
            status.as_u16(),
            body
        )),
    }
}
