//! PDF access: rasterise pages and read their text layer via pdfium.
//!
//! Both collaborators sit behind [`DocumentBackend`] so the rest of the
//! pipeline can run against an in-memory document in tests.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so
//! rendering a long document never stalls the worker threads that drive
//! model calls.
//!
//! ## Coordinates
//!
//! PDF user space has its origin at the bottom-left of the page box, which
//! need not sit at `(0, 0)`, and pdfium renders pages turned by `/Rotate`.
//! Text bounds are moved into the visible box, rotated the same way and
//! flipped to a top-left origin here, once, so that multiplying by
//! `dpi / 72` maps them straight onto the rendered image.

use crate::document::{BBox, Document, Page, PageSize, PageText, TextChar, POINTS_PER_INCH};
use crate::error::DocQaError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Source of page text and page images for one document path.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Per-page point dimensions and text layer, in page order.
    async fn load_document(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Document, DocQaError>;

    /// Every page rasterised at `dpi`, in page order.
    async fn render_pages(
        &self,
        path: &Path,
        dpi: u32,
        password: Option<&str>,
    ) -> Result<Vec<DynamicImage>, DocQaError>;
}

/// [`DocumentBackend`] over the pdfium library.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumBackend;

#[async_trait]
impl DocumentBackend for PdfiumBackend {
    async fn load_document(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Document, DocQaError> {
        let path = path.to_path_buf();
        let password = password.map(str::to_string);

        tokio::task::spawn_blocking(move || load_document_blocking(&path, password.as_deref()))
            .await
            .map_err(|e| DocQaError::Internal(format!("Text task panicked: {}", e)))?
    }

    async fn render_pages(
        &self,
        path: &Path,
        dpi: u32,
        password: Option<&str>,
    ) -> Result<Vec<DynamicImage>, DocQaError> {
        let path = path.to_path_buf();
        let password = password.map(str::to_string);

        tokio::task::spawn_blocking(move || render_pages_blocking(&path, dpi, password.as_deref()))
            .await
            .map_err(|e| DocQaError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Bind to pdfium: `PDFIUM_LIB_PATH`, then a library next to the executable,
/// then the working directory, then the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, DocQaError> {
    if let Ok(lib) = std::env::var("PDFIUM_LIB_PATH") {
        if !lib.is_empty() {
            return Pdfium::bind_to_library(&lib)
                .map(Pdfium::new)
                .map_err(|e| DocQaError::PdfiumBindingFailed(format!("{}: {}", lib, e)));
        }
    }

    if let Some(lib) = library_next_to_executable() {
        if let Ok(bindings) = Pdfium::bind_to_library(&lib) {
            debug!("Bound pdfium from {}", lib.display());
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| DocQaError::PdfiumBindingFailed(e.to_string()))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, DocQaError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                DocQaError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                DocQaError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            DocQaError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    password: Option<&str>,
) -> Result<Vec<DynamicImage>, DocQaError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let render_config =
        PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / POINTS_PER_INCH as f32);

    let pages = document.pages();
    let mut images = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DocQaError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {} dpi → {}x{} px",
            idx + 1,
            dpi,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    info!("Rendered {} pages at {} dpi", images.len(), dpi);
    Ok(images)
}

fn load_document_blocking(pdf_path: &Path, password: Option<&str>) -> Result<Document, DocQaError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let mut pages = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let size = PageSize::new(page.width().value as f64, page.height().value as f64);
        let frame = page_frame(&page, size, idx);
        let text = page.text().map_err(|e| DocQaError::TextExtractionFailed {
            page: idx + 1,
            detail: format!("{:?}", e),
        })?;

        let chars: Vec<TextChar> = text
            .chars()
            .iter()
            .filter_map(|c| {
                let ch = c.unicode_char()?;
                let bbox = if ch.is_whitespace() {
                    None
                } else {
                    c.loose_bounds().ok().map(|r| {
                        frame.to_top_left(
                            r.left().value as f64,
                            r.bottom().value as f64,
                            r.right().value as f64,
                            r.top().value as f64,
                        )
                    })
                };
                Some(TextChar { ch, bbox })
            })
            .collect();

        debug!("Page {}: {} text chars", idx + 1, chars.len());
        pages.push(Page::new(idx, size, PageText::from_chars(chars)));
    }

    info!("Loaded text layer of {} pages from {}", pages.len(), pdf_path.display());
    Ok(Document::new(pages))
}

/// The visible page box in PDF user space and the page's `/Rotate`.
///
/// `width` and `height` are the box as stored, before rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PageFrame {
    left: f64,
    bottom: f64,
    width: f64,
    height: f64,
    /// Clockwise, one of 0, 90, 180, 270.
    rotation: u16,
}

impl PageFrame {
    /// Frame with its origin at `(0, 0)`, derived from the displayed size.
    fn from_size(size: PageSize, rotation: u16) -> Self {
        let (width, height) = match rotation {
            90 | 270 => (size.height, size.width),
            _ => (size.width, size.height),
        };
        Self {
            left: 0.0,
            bottom: 0.0,
            width,
            height,
            rotation,
        }
    }

    /// Convert a PDF rectangle to top-left-origin point space of the page
    /// as pdfium displays it.
    fn to_top_left(&self, left: f64, bottom: f64, right: f64, top: f64) -> BBox {
        let (u0, u1) = (left - self.left, right - self.left);
        let (v0, v1) = (bottom - self.bottom, top - self.bottom);
        match self.rotation {
            90 => BBox::new(v0, u0, v1, u1),
            180 => BBox::new(self.width - u1, v0, self.width - u0, v1),
            270 => BBox::new(self.height - v1, self.width - u1, self.height - v0, self.width - u0),
            _ => BBox::new(u0, self.height - v1, u1, self.height - v0),
        }
    }
}

fn page_frame(page: &PdfPage, size: PageSize, idx: usize) -> PageFrame {
    let rotation = match page.rotation() {
        Ok(PdfPageRenderRotation::Degrees90) => 90,
        Ok(PdfPageRenderRotation::Degrees180) => 180,
        Ok(PdfPageRenderRotation::Degrees270) => 270,
        _ => 0,
    };

    // pdfium shows the crop box when there is one, else the media box.
    let boundaries = page.boundaries();
    match boundaries.crop().or_else(|_| boundaries.media()) {
        Ok(b) => PageFrame {
            left: b.bounds.left().value as f64,
            bottom: b.bounds.bottom().value as f64,
            width: (b.bounds.right().value - b.bounds.left().value) as f64,
            height: (b.bounds.top().value - b.bounds.bottom().value) as f64,
            rotation,
        },
        Err(e) => {
            warn!("Page {}: no page box ({:?}); assuming origin (0, 0)", idx + 1, e);
            PageFrame::from_size(size, rotation)
        }
    }
}

fn library_next_to_executable() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?;
    let candidate = PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(dir));
    candidate.exists().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter(rotation: u16) -> PageFrame {
        PageFrame::from_size(PageSize::letter(), rotation)
    }

    #[test]
    fn flip_moves_origin_to_top_left() {
        // 10pt tall glyph sitting 700pt above the bottom of a letter page.
        let b = letter(0).to_top_left(72.0, 700.0, 144.0, 710.0);
        assert_eq!(b, BBox::new(72.0, 82.0, 144.0, 92.0));
    }

    #[test]
    fn flip_keeps_corners_ordered() {
        let b = letter(0).to_top_left(0.0, 0.0, 612.0, 792.0);
        assert_eq!(b.as_tuple(), (0.0, 0.0, 612.0, 792.0));
    }

    #[test]
    fn page_box_origin_is_subtracted() {
        let frame = PageFrame {
            left: 100.0,
            bottom: 50.0,
            width: 612.0,
            height: 792.0,
            rotation: 0,
        };
        let b = frame.to_top_left(172.0, 750.0, 244.0, 760.0);
        assert_eq!(b, BBox::new(72.0, 82.0, 144.0, 92.0));
    }

    #[test]
    fn rotated_pages_follow_the_display() {
        // Glyph near the top-left corner of the unrotated page.
        let (l, b, r, t) = (10.0, 772.0, 30.0, 782.0);

        // Displayed 792 x 612: the top-left corner turns to the top-right.
        assert_eq!(letter(90).to_top_left(l, b, r, t), BBox::new(772.0, 10.0, 782.0, 30.0));
        // Displayed 612 x 792: to the bottom-right.
        assert_eq!(letter(180).to_top_left(l, b, r, t), BBox::new(582.0, 772.0, 602.0, 782.0));
        // Displayed 792 x 612: to the bottom-left.
        assert_eq!(letter(270).to_top_left(l, b, r, t), BBox::new(10.0, 582.0, 20.0, 602.0));
    }

    #[test]
    fn frame_from_rotated_size_is_unrotated() {
        let f = PageFrame::from_size(PageSize::new(792.0, 612.0), 90);
        assert_eq!((f.width, f.height), (612.0, 792.0));
    }
}
