use crate::models::ImageBlob;
use crate::{Error, Result};
use base64::Engine as _;

/// Base64 text of the blob's payload bytes, without any data-URL prefix.
pub fn to_base64(blob: &ImageBlob) -> Result<String> {
    if blob.is_empty() {
        return Err(Error::Encode("image payload is empty".to_string()));
    }
    Ok(base64::engine::general_purpose::STANDARD.encode(&blob.bytes))
}

/// Decodes bare base64 or a `data:<mime>;base64,` URL into bytes.
pub fn from_base64(text: &str) -> Result<Vec<u8>> {
    let payload = match text.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => text,
    };

    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Decode(format!("invalid base64 payload: {}", e)))
}

/// MIME type declared in a `data:` URL header, if any.
pub fn data_url_mime(text: &str) -> Option<&str> {
    let header = text.strip_prefix("data:")?.split_once(',')?.0;
    let mime = header.split(';').next()?;
    (!mime.is_empty()).then_some(mime)
}

pub fn to_data_url(blob: &ImageBlob) -> Result<String> {
    Ok(format!("data:{};base64,{}", blob.mime_type, to_base64(blob)?))
}

pub fn blob_from_data_url(text: &str) -> Result<ImageBlob> {
    let mime_type = data_url_mime(text)
        .ok_or_else(|| Error::Decode("not a data URL with a MIME type".to_string()))?
        .to_string();
    Ok(ImageBlob::new(from_base64(text)?, mime_type))
}
