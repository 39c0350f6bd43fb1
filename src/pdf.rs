//! PDF encoder – serialises a composed [`Document`] with `printpdf` (v0.8
//! ops-based API). Each page carries its slice as one PNG image XObject,
//! spanning the full page width and placed at the slice's top offset.

use std::io::Cursor;

use ::image::{DynamicImage, ImageFormat, RgbaImage};
use printpdf::*;

use crate::compositor::Document;
use crate::error::{PaginateError, Result};
use crate::page::MM_PER_PT;

/// Encode `document` as PDF bytes.
///
/// A document without pages still yields a valid PDF with one blank page.
pub fn encode_pdf(document: &Document, title: &str) -> Result<Vec<u8>> {
    let page = document.page();
    let (page_w, page_h) = (Mm(page.width_mm), Mm(page.height_mm));
    let page_w_pt = page.width_pt();
    let page_h_pt = page.height_pt();

    let mut doc = PdfDocument::new(title);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let mut pages = Vec::with_capacity(document.page_count());

    for (index, slice) in document.slices().iter().enumerate() {
        let content = document.slice_image(index)?;
        let (px_w, px_h) = content.dimensions();
        let png = encode_png(content)?;
        let raw = RawImage::decode_from_bytes(&png, &mut warnings)
            .map_err(|e| PaginateError::Encode(format!("page {index}: {e}")))?;
        let xobj_id = doc.add_image(&raw);

        // At dpi=72 printpdf renders 1 px = 1 pt; stretch the slice across
        // the page width and keep its aspect ratio.
        let scale = if px_w > 0 { page_w_pt / px_w as f32 } else { 1.0 };
        let slice_h_pt = px_h as f32 * scale;
        let top_pt = slice.top_offset_mm / MM_PER_PT;
        // PDF origin is bottom-left; translate_y is the image's bottom edge.
        let bottom_pt = page_h_pt - top_pt - slice_h_pt;

        let ops = vec![Op::UseXobject {
            id: xobj_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(bottom_pt)),
                dpi: Some(72.0),
                scale_x: Some(scale),
                scale_y: Some(scale),
                rotate: None,
            },
        }];
        log::debug!("PDF page {index}: {px_w}x{px_h}px slice at {top_pt:.1}pt from top");
        pages.push(PdfPage::new(page_w, page_h, ops));
    }

    // Ensure at least one page.
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    for warning in &warnings {
        log::debug!("printpdf: {warning:?}");
    }
    log::info!("Encoded {} page PDF ({} bytes)", document.page_count().max(1), bytes.len());
    Ok(bytes)
}

/// Flatten onto RGB (pages are opaque) and encode as PNG.
fn encode_png(content: RgbaImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(content).to_rgb8();
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(rgb).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::PageCapacityCalculator;
    use crate::compositor::{ComposeOptions, DocumentCompositor, Segment};
    use crate::page::{MarginProfile, PhysicalPage, RenderScale};
    use crate::raster::MarkupRenderer;

    fn compose(segments: &[Segment]) -> Document {
        let mut renderer = MarkupRenderer::new(RenderScale(1.0));
        let calculator = PageCapacityCalculator::new(PhysicalPage::a4(), MarginProfile::default()).unwrap();
        DocumentCompositor::new(&mut renderer, calculator, ComposeOptions::default())
            .unwrap()
            .compose(segments)
            .unwrap()
    }

    #[test]
    fn empty_document_is_one_blank_page() {
        let doc = compose(&[]);
        let bytes = encode_pdf(&doc, "empty").unwrap();
        assert!(bytes.len() > 100, "PDF should have content");
        // PDF magic number
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn pages_are_embedded() {
        let doc = compose(&[Segment::new("<h1>Title</h1><p>Body text</p>")]);
        assert_eq!(doc.page_count(), 1);
        let bytes = encode_pdf(&doc, "one page").unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
        assert!(bytes.len() > 500);
    }
}
