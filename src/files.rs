//! Local image files for the command-line front-end.

use crate::image::detect_image_mime;
use crate::models::ImageBlob;
use crate::{Error, Result};
use little_exif::metadata::Metadata;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads an image file, sniffing its MIME type from the contents.
pub fn load_image(path: &Path) -> Result<ImageBlob> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{} is empty",
            path.display()
        )));
    }
    let mime_type = detect_image_mime(&bytes);
    Ok(ImageBlob::new(bytes, mime_type))
}

/// File extension matching a MIME type.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Default output path `<stem>.<ext>` in the current directory.
pub fn default_output_path(stem: &str, image: &ImageBlob) -> PathBuf {
    PathBuf::from(format!("{}.{}", stem, extension_for_mime(&image.mime_type)))
}

/// Writes `image` to `path` atomically.
pub fn save_image(path: &Path, image: &ImageBlob) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(&image.bytes)?;
    staged.persist(path).map_err(|e| Error::Io(e.error))?;

    // Strip EXIF to prevent stale orientation tags from confusing viewers
    if matches!(image.mime_type.as_str(), "image/jpeg" | "image/webp") {
        if let Err(e) = Metadata::file_clear_metadata(&path.to_path_buf()) {
            tracing::warn!("Failed to strip EXIF from {}: {}", path.display(), e);
        }
    }

    tracing::info!("Saved {} ({} bytes)", path.display(), image.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([200, 100, 50]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.png");
        let blob = ImageBlob::new(png_bytes(), "image/png");

        save_image(&path, &blob).unwrap();
        let loaded = load_image(&path).unwrap();

        assert_eq!(loaded.mime_type, "image/png");
        let decoded = image::load_from_memory(&loaded.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }

    #[test]
    fn test_load_empty_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::write(&path, b"").unwrap();

        assert!(matches!(load_image(&path), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_image(&dir.path().join("missing.png")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_default_output_path_uses_mime_extension() {
        let blob = ImageBlob::new(vec![1], "image/jpeg");
        assert_eq!(
            default_output_path("job_abc", &blob),
            PathBuf::from("job_abc.jpg")
        );
    }
}
