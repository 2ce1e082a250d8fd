//! PNG encoding for page images: raw bytes for files on disk, base64
//! `ImageData` for vision-model requests.
//!
//! PNG is lossless; JPEG ringing around small glyphs makes vision models
//! misread exactly the characters an extractive answer has to reproduce.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode `img` as PNG bytes.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Encode a standardized page for a vision-model request.
///
/// `detail: "high"` keeps the provider from downsampling the canvas to a
/// single low-resolution tile.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let b64 = STANDARD.encode(png_bytes(img)?);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn png_bytes_round_trip_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(800, 600, Rgb([255, 255, 255])));
        let bytes = png_bytes(&img).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (800, 600));
    }

    #[test]
    fn encode_page_is_base64_png() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }
}
