//! Draw the answer box onto the display render of the winning page.
//!
//! Boxes arrive in point space; display images are rendered at
//! `display_dpi`. The only conversion is a uniform `dpi / 72` scale, which is
//! why the text layer is flipped to a top-left origin when it is loaded.

use crate::document::{BBox, POINTS_PER_INCH};
use crate::error::DocQaError;
use image::{DynamicImage, Rgba};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

pub const HIGHLIGHT_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Outline thickness in pixels.
pub const HIGHLIGHT_WIDTH: u32 = 2;

/// Pixels per point at `dpi`.
pub fn scale_factor(dpi: u32) -> f64 {
    f64::from(dpi) / POINTS_PER_INCH
}

/// `bbox` in the pixel space of an image rendered at `dpi`.
pub fn to_pixel_space(bbox: &BBox, dpi: u32) -> BBox {
    bbox.scaled(scale_factor(dpi))
}

/// Copy `pages`, outlining `bbox` on `pages[page_index]` only.
///
/// Every other page is returned exactly as given.
pub fn highlight_pages(
    pages: &[DynamicImage],
    page_index: usize,
    bbox: &BBox,
    dpi: u32,
) -> Result<Vec<DynamicImage>, DocQaError> {
    if page_index >= pages.len() {
        return Err(DocQaError::Internal(format!(
            "Highlight page {} out of range ({} pages)",
            page_index + 1,
            pages.len()
        )));
    }

    let mut out = pages.to_vec();
    let mut canvas = out[page_index].to_rgba8();
    let px = to_pixel_space(bbox, dpi);

    let x0 = px.x0.floor() as i32;
    let y0 = px.y0.floor() as i32;
    let w = (px.x1.ceil() - px.x0.floor()).max(1.0) as u32;
    let h = (px.y1.ceil() - px.y0.floor()).max(1.0) as u32;
    debug!(
        "Highlighting page {} at ({}, {}) {}x{} px",
        page_index + 1,
        x0,
        y0,
        w,
        h
    );

    for inset in 0..HIGHLIGHT_WIDTH {
        let rect = Rect::at(x0 + inset as i32, y0 + inset as i32).of_size(
            w.saturating_sub(2 * inset).max(1),
            h.saturating_sub(2 * inset).max(1),
        );
        draw_hollow_rect_mut(&mut canvas, rect, HIGHLIGHT_COLOR);
    }

    out[page_index] = DynamicImage::ImageRgba8(canvas);
    Ok(out)
}
