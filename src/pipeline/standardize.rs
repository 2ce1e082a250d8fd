//! Image standardization: letterbox every page onto a fixed canvas.
//!
//! Image QA scores drift with input geometry: the same page rendered as an
//! A4 portrait and as a wide slide produces different token layouts. Feeding
//! every page through one canvas size keeps scores comparable across pages
//! and documents, which the cross-page "highest score wins" rule relies on.
//!
//! Pages are only ever scaled down. A page already smaller than the canvas
//! is centred at its native size.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

/// Letterbox fill colour.
pub const CANVAS_FILL: Rgb<u8> = Rgb([255, 255, 255]);

/// Fit `img` inside a `width × height` canvas without distortion.
///
/// The output is always exactly `width × height`.
pub fn standardize(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let fitted = if img.width() > width || img.height() > height {
        img.resize(width, height, FilterType::Lanczos3)
    } else {
        img.clone()
    };

    let mut canvas = RgbImage::from_pixel(width, height, CANVAS_FILL);
    let x = (width - fitted.width().min(width)) / 2;
    let y = (height - fitted.height().min(height)) / 2;
    imageops::overlay(&mut canvas, &fitted.to_rgb8(), i64::from(x), i64::from(y));

    DynamicImage::ImageRgb8(canvas)
}

/// Standardize every page, preserving order.
pub fn standardize_all(pages: &[DynamicImage], width: u32, height: u32) -> Vec<DynamicImage> {
    pages.iter().map(|p| standardize(p, width, height)).collect()
}
