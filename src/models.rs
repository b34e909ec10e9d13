//! Data models and structures
//!
//! Defines the request-scoped values that flow through the pipeline and the
//! environment-backed configuration.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Binary image payload plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Target frame ratio parsed from a `W:H` string. Both components are
/// strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    width: u32,
    height: u32,
}

impl AspectRatio {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidRatio(format!(
                "{}:{} must have positive components",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_f64(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl FromStr for AspectRatio {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidRatio(format!("'{}' (expected W:H, e.g. 16:9)", input));

        let (w, h) = input.split_once(':').ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;

        Self::new(width, height).map_err(|_| invalid())
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

pub const DEFAULT_PROXIES: &[&str] = &[
    "https://api.allorigins.win/raw?url={url}",
    "https://corsproxy.io/?{url}",
];

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub image_model: String,
    pub proxies: Vec<String>,
    pub generation_attempts: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .map_err(|_| Error::Config("GEMINI_API_KEY not set".to_string()))?;

        Self::from_vars(
            api_key,
            std::env::var("GEMINI_IMAGE_MODEL").ok(),
            std::env::var("SREF_PROXIES").ok(),
            std::env::var("GENERATION_ATTEMPTS").ok(),
        )
    }

    /// Builds a config from raw variable values, applying defaults for the
    /// optional ones.
    pub fn from_vars(
        api_key: String,
        image_model: Option<String>,
        proxies: Option<String>,
        generation_attempts: Option<String>,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("GEMINI_API_KEY is empty".to_string()));
        }

        let proxies = match proxies {
            Some(raw) => parse_proxy_list(&raw)?,
            None => DEFAULT_PROXIES.iter().map(|p| p.to_string()).collect(),
        };

        let generation_attempts = match generation_attempts {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(Error::Config(format!(
                        "GENERATION_ATTEMPTS must be a positive integer, got '{}'",
                        raw
                    )))
                }
            },
            None => 1,
        };

        Ok(Self {
            api_key,
            image_model: image_model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            proxies,
            generation_attempts,
        })
    }
}

fn parse_proxy_list(raw: &str) -> Result<Vec<String>> {
    let proxies: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    if proxies.is_empty() {
        return Err(Error::Config("SREF_PROXIES is empty".to_string()));
    }
    if let Some(bad) = proxies.iter().find(|p| !p.contains("{url}")) {
        return Err(Error::Config(format!(
            "Proxy template '{}' is missing the {{url}} placeholder",
            bad
        )));
    }
    Ok(proxies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aspect_ratio() {
        let ratio: AspectRatio = "16:9".parse().unwrap();
        assert_eq!(ratio.width(), 16);
        assert_eq!(ratio.height(), 9);
        assert_eq!(ratio.to_string(), "16:9");
    }

    #[test]
    fn test_parse_aspect_ratio_tolerates_whitespace() {
        let ratio: AspectRatio = " 4 : 3 ".parse().unwrap();
        assert_eq!(ratio, AspectRatio::new(4, 3).unwrap());
    }

    #[test]
    fn test_parse_aspect_ratio_rejects_malformed() {
        for input in ["abc", "16", "16:", ":9", "0:1", "1:0", "-1:2", "1:2:3", "1.5:1"] {
            let err = input.parse::<AspectRatio>().unwrap_err();
            assert!(
                matches!(err, Error::InvalidRatio(_)),
                "expected InvalidRatio for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_vars("key".to_string(), None, None, None).unwrap();
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.proxies.len(), 2);
        assert!(config.proxies[0].contains("allorigins"));
        assert_eq!(config.generation_attempts, 1);
    }

    #[test]
    fn test_config_custom_proxies() {
        let config = Config::from_vars(
            "key".to_string(),
            Some("custom-model".to_string()),
            Some("http://a/?u={url}, http://b/{url}".to_string()),
            Some("3".to_string()),
        )
        .unwrap();
        assert_eq!(config.image_model, "custom-model");
        assert_eq!(config.proxies, vec!["http://a/?u={url}", "http://b/{url}"]);
        assert_eq!(config.generation_attempts, 3);
    }

    #[test]
    fn test_config_rejects_proxy_without_placeholder() {
        let err =
            Config::from_vars("key".to_string(), None, Some("http://a/".to_string()), None)
                .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_rejects_zero_attempts() {
        let err = Config::from_vars("key".to_string(), None, None, Some("0".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_rejects_empty_key() {
        let err = Config::from_vars("  ".to_string(), None, None, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
