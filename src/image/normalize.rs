use super::mime::{image_format_for_mime, mime_for_format};
use crate::models::{AspectRatio, ImageBlob};
use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;

/// Longest side a reference image is scaled down to before padding.
pub const MAX_DIMENSION: u32 = 1024;

/// Largest padded canvas side, matching common browser canvas limits.
pub const MAX_CANVAS_SIDE: u32 = 16384;

pub const JPEG_QUALITY: u8 = 95;

const PADDING: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Placement of a downscaled image inside a padded canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxLayout {
    pub scale: f64,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl LetterboxLayout {
    pub fn compute(width: u32, height: u32, ratio: AspectRatio) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Decode(format!(
                "image has zero dimension ({}x{})",
                width, height
            )));
        }

        let max = MAX_DIMENSION as f64;
        let scale = 1f64.min(max / width as f64).min(max / height as f64);

        let scaled_w = width as f64 * scale;
        let scaled_h = height as f64 * scale;
        let scaled_width = to_pixels(scaled_w);
        let scaled_height = to_pixels(scaled_h);

        let target = ratio.as_f64();
        let (canvas_width, canvas_height) = if scaled_w / scaled_h > target {
            let canvas_height = to_pixels(scaled_width as f64 / target).max(scaled_height);
            (scaled_width, canvas_height)
        } else {
            let canvas_width = to_pixels(scaled_height as f64 * target).max(scaled_width);
            (canvas_width, scaled_height)
        };

        if canvas_width > MAX_CANVAS_SIDE || canvas_height > MAX_CANVAS_SIDE {
            return Err(Error::Encode(format!(
                "{}x{} canvas for ratio {} exceeds the {}px limit",
                canvas_width, canvas_height, ratio, MAX_CANVAS_SIDE
            )));
        }

        Ok(Self {
            scale,
            scaled_width,
            scaled_height,
            canvas_width,
            canvas_height,
            offset_x: (canvas_width - scaled_width) / 2,
            offset_y: (canvas_height - scaled_height) / 2,
        })
    }
}

fn to_pixels(value: f64) -> u32 {
    (value.round() as u32).max(1)
}

/// An image letterboxed to a target ratio, re-encoded for upload.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub blob: ImageBlob,
    pub layout: LetterboxLayout,
}

/// Letterboxes `blob` onto a white canvas matching `ratio`.
///
/// Decoding, resampling and encoding run on the blocking pool.
pub async fn normalize(blob: ImageBlob, ratio: AspectRatio) -> Result<NormalizedImage> {
    tokio::task::spawn_blocking(move || normalize_sync(&blob, ratio))
        .await
        .map_err(|e| Error::Encode(format!("Image processing task join error: {}", e)))?
}

pub fn normalize_sync(blob: &ImageBlob, ratio: AspectRatio) -> Result<NormalizedImage> {
    let source = decode_oriented(&blob.bytes)?;

    let layout = LetterboxLayout::compute(source.width(), source.height(), ratio)?;
    tracing::debug!(
        "Letterboxing {}x{} to {} ({}x{} canvas, scale {:.3})",
        source.width(),
        source.height(),
        ratio,
        layout.canvas_width,
        layout.canvas_height,
        layout.scale
    );

    let canvas = render(&source, &layout);

    let format = image_format_for_mime(&blob.mime_type).unwrap_or_else(|| {
        tracing::warn!(
            "No encoder for {}, re-encoding reference image as PNG",
            blob.mime_type
        );
        ImageFormat::Png
    });
    let bytes = encode(canvas, format)?;

    Ok(NormalizedImage {
        blob: ImageBlob::new(bytes, mime_for_format(format)),
        layout,
    })
}

/// Decodes `bytes` and applies any EXIF orientation, so dimensions are as displayed.
fn decode_oriented(bytes: &[u8]) -> Result<DynamicImage> {
    let decode_err = |e: image::ImageError| Error::Decode(e.to_string());

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::Decode(e.to_string()))?
        .into_decoder()
        .map_err(decode_err)?;
    let orientation = decoder.orientation().unwrap_or_else(|e| {
        tracing::debug!("Ignoring unreadable orientation metadata: {}", e);
        Orientation::NoTransforms
    });

    let mut image = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    if orientation != Orientation::NoTransforms {
        tracing::debug!("Applying EXIF orientation {:?}", orientation);
        image.apply_orientation(orientation);
    }
    Ok(image)
}

fn render(source: &DynamicImage, layout: &LetterboxLayout) -> RgbaImage {
    let scaled = if layout.scaled_width == source.width()
        && layout.scaled_height == source.height()
    {
        source.to_rgba8()
    } else {
        source
            .resize_exact(
                layout.scaled_width,
                layout.scaled_height,
                FilterType::Lanczos3,
            )
            .to_rgba8()
    };

    let mut canvas = RgbaImage::from_pixel(layout.canvas_width, layout.canvas_height, PADDING);
    image::imageops::overlay(
        &mut canvas,
        &scaled,
        layout.offset_x as i64,
        layout.offset_y as i64,
    );
    canvas
}

fn encode(canvas: RgbaImage, format: ImageFormat) -> Result<Vec<u8>> {
    // The canvas is fully opaque, so the alpha channel carries nothing.
    let opaque = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut bytes = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
            encoder
                .encode_image(&opaque)
                .map_err(|e| Error::Encode(e.to_string()))?;
        }
        _ => {
            opaque
                .write_to(&mut Cursor::new(&mut bytes), format)
                .map_err(|e| Error::Encode(e.to_string()))?;
        }
    }

    Ok(bytes)
}
