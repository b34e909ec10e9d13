//! Style-referenced image generation with Gemini
//!
//! Fetches a style-reference image through fallback CORS relays, letterboxes it
//! to the requested aspect ratio, and sends it with a text prompt to Gemini's
//! image model. Generated images can then be edited by compositing a second
//! image under a text instruction.

pub mod ai;
pub mod app;
pub mod error;
pub mod fetch;
pub mod files;
pub mod image;
pub mod jobs;
pub mod models;
pub mod prompts;

pub use error::{Error, Result};
