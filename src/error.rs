//! Error handling and custom error types
//!
//! Provides unified error handling across the pipeline using thiserror. Every
//! variant renders as a single human-readable failure reason.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to fetch reference image: {0}")]
    Fetch(String),

    #[error("Invalid aspect ratio: {0}")]
    InvalidRatio(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("AI provider error: {0}")]
    AiProvider(String),

    #[error("Generation blocked for safety reasons (reason: {reason}){}", format_details(.details))]
    Blocked {
        reason: String,
        details: Option<String>,
    },

    #[error("API key is not valid; select another project or create a new key")]
    InvalidApiKey,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid job transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_details(details: &Option<String>) -> String {
    details
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_message_includes_details() {
        let err = Error::Blocked {
            reason: "SAFETY".to_string(),
            details: Some("unsafe content".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Generation blocked for safety reasons (reason: SAFETY): unsafe content"
        );
    }

    #[test]
    fn test_blocked_message_without_details() {
        let err = Error::Blocked {
            reason: "OTHER".to_string(),
            details: None,
        };
        assert_eq!(
            err.to_string(),
            "Generation blocked for safety reasons (reason: OTHER)"
        );
    }
}
