//! Document loading: PDF text extraction and page rasterization.
//!
//! The text backend extracts a single concatenated text string per
//! document via `pdf-extract`. The visual backend rasterizes each page to
//! an RGB PNG via MuPDF, in page order.
//!
//! Loader failures are terminal for the request: a missing path is
//! [`PipelineError::DocumentNotFound`], a corrupt document is
//! [`PipelineError::DocumentUnreadable`]. No retries.

use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::models::PageImage;

/// Render scale applied to each page (1.0 = 72 dpi). 2.0 keeps small
/// print legible for the image embedding model without huge PNGs.
pub const RENDER_SCALE: f32 = 2.0;

/// Read a document from disk. The only loader entry point that can
/// report `DocumentNotFound`.
pub fn read_document(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(PipelineError::DocumentNotFound(path.to_path_buf()));
    }
    std::fs::read(path).map_err(|e| PipelineError::DocumentUnreadable(e.to_string()))
}

/// Extract the concatenated text of every page.
pub fn load_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PipelineError::DocumentUnreadable(e.to_string()))
}

/// Rasterize every page to an RGB PNG, in page order.
pub fn render_pages(bytes: &[u8]) -> Result<Vec<PageImage>> {
    use mupdf::{Colorspace, Document, Matrix};

    let doc = Document::from_bytes(bytes, "application/pdf")
        .map_err(|e| PipelineError::DocumentUnreadable(e.to_string()))?;
    let page_count = doc
        .page_count()
        .map_err(|e| PipelineError::DocumentUnreadable(e.to_string()))?;

    let matrix = Matrix::new_scale(RENDER_SCALE, RENDER_SCALE);
    let mut pages = Vec::with_capacity(page_count as usize);

    for i in 0..page_count {
        let page = doc
            .load_page(i)
            .map_err(|e| PipelineError::DocumentUnreadable(e.to_string()))?;
        let pixmap = page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), 0.0, false)
            .map_err(|e| PipelineError::DocumentUnreadable(e.to_string()))?;

        let png = encode_png(pixmap.width() as u32, pixmap.height() as u32, pixmap.samples())?;
        pages.push(PageImage {
            page_index: i as usize,
            png,
        });
    }

    Ok(pages)
}

fn encode_png(width: u32, height: u32, rgb_samples: &[u8]) -> Result<Vec<u8>> {
    let img = image::RgbImage::from_raw(width, height, rgb_samples.to_vec()).ok_or_else(|| {
        PipelineError::DocumentUnreadable("pixmap sample buffer size mismatch".to_string())
    })?;

    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| PipelineError::DocumentUnreadable(e.to_string()))?;
    Ok(png)
}
