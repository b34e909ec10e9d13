//! Reference image preparation
//!
//! Letterboxes fetched style references to the requested frame ratio and
//! encodes them as inline base64 payloads for the generation API.

pub mod encode;
pub mod mime;
pub mod normalize;

pub use encode::{blob_from_data_url, from_base64, to_base64, to_data_url};
pub use mime::detect_image_mime;
pub use normalize::{normalize, LetterboxLayout, NormalizedImage, MAX_DIMENSION};
