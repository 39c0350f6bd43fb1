//! Raster rendering – the seam between pagination and whatever paints a
//! segment into pixels.
//!
//! The pagination stages only need two things from a render: the bitmap and
//! the boxes of elements carrying pagination markers. [`RasterRenderer`]
//! captures that; [`MarkupRenderer`] is the in-crate implementation built on
//! the Taffy layout pass.

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::{imageops, Rgba, RgbaImage};
use taffy::TaffyTree;
use thiserror::Error;

use crate::dom::{Markup, NodeId};
use crate::fonts::{FontError, FontManager};
use crate::layout::{compute_layout, BoxContent, BoxTree, LaidOutBox, LayoutError};
use crate::page::RenderScale;
use crate::style::{Color, TextAlign};

/// Tallest raster the reference renderer will allocate, in pixel rows.
pub const MAX_RASTER_HEIGHT_PX: u32 = 1 << 20;

/// Largest RGBA buffer the reference renderer will allocate (1 GiB).
pub const MAX_RASTER_BYTES: u64 = 1 << 30;

/// Failure reported by a [`RasterRenderer`].
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("viewport width must be at least one pixel")]
    InvalidViewport,

    #[error("layout failed: {0}")]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Font(#[from] FontError),

    #[error("raster of {width}x{height}px exceeds the renderer's limits")]
    TooLarge { width: u32, height: u32 },

    /// Free-form failure from an external renderer.
    #[error("renderer failed: {0}")]
    Backend(String),
}

/// The element classes the region scanner asks a render about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Elements that must start on a fresh page.
    ForcedBreak,
    /// Elements that must not be split across pages.
    AvoidSplit,
    /// Rows of a table body.
    TableBodyRow,
}

/// Bounding box of one matched element, in raster pixels from the top of
/// the segment raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBox {
    pub anchor: NodeId,
    pub offset_px: f64,
    pub height_px: f64,
}

/// An element box tagged with the selector it matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkedBox {
    pub selector: Selector,
    pub region: RegionBox,
}

/// The output of rendering one segment.
#[derive(Debug, Clone)]
pub struct RenderedSegment {
    image: RgbaImage,
    viewport_width_px: u32,
    marked: Vec<MarkedBox>,
}

impl RenderedSegment {
    pub fn new(image: RgbaImage, viewport_width_px: u32, marked: Vec<MarkedBox>) -> Self {
        Self {
            image,
            viewport_width_px,
            marked,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn width_px(&self) -> u32 {
        self.image.width()
    }

    pub fn height_px(&self) -> u32 {
        self.image.height()
    }

    pub fn viewport_width_px(&self) -> u32 {
        self.viewport_width_px
    }

    /// Raster pixels per CSS pixel actually realised by this render.
    pub fn scale(&self) -> f64 {
        if self.viewport_width_px == 0 {
            return 1.0;
        }
        self.image.width() as f64 / self.viewport_width_px as f64
    }

    /// Boxes of every element matching `selector`, in document order.
    pub fn query(&self, selector: Selector) -> Vec<RegionBox> {
        self.marked
            .iter()
            .filter(|m| m.selector == selector)
            .map(|m| m.region)
            .collect()
    }
}

/// Paints segment markup at a given viewport width.
///
/// One renderer may only serve one render at a time; share it through
/// [`crate::handle::RendererHandle`].
pub trait RasterRenderer {
    fn render(&mut self, markup: &Markup, viewport_width_px: u32) -> Result<RenderedSegment, RenderError>;
}

impl<R: RasterRenderer + ?Sized> RasterRenderer for Box<R> {
    fn render(&mut self, markup: &Markup, viewport_width_px: u32) -> Result<RenderedSegment, RenderError> {
        (**self).render(markup, viewport_width_px)
    }
}

// ---------------------------------------------------------------------------
// Reference renderer
// ---------------------------------------------------------------------------

/// Renders markup through the Taffy layout pass onto an RGBA canvas.
///
/// Text is painted as solid word bars at measured glyph advances, so the
/// output is deterministic and needs no system fonts.
pub struct MarkupRenderer {
    scale: RenderScale,
    fonts: FontManager,
    background: Color,
    taffy: TaffyTree<()>,
}

impl MarkupRenderer {
    pub fn new(scale: RenderScale) -> Self {
        Self {
            scale,
            fonts: FontManager::default(),
            background: Color::WHITE,
            taffy: TaffyTree::new(),
        }
    }

    pub fn with_fonts(mut self, fonts: FontManager) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }

    /// Load a TTF/OTF face for text measurement.
    pub fn load_font(&mut self, bytes: Vec<u8>, bold: bool) -> Result<(), RenderError> {
        Ok(self.fonts.load_font(bytes, bold)?)
    }

    pub fn scale(&self) -> RenderScale {
        self.scale
    }
}

impl Default for MarkupRenderer {
    fn default() -> Self {
        Self::new(RenderScale::default())
    }
}

impl RasterRenderer for MarkupRenderer {
    fn render(&mut self, markup: &Markup, viewport_width_px: u32) -> Result<RenderedSegment, RenderError> {
        if viewport_width_px == 0 {
            return Err(RenderError::InvalidViewport);
        }
        let styled = crate::style::build_styled_tree(markup.nodes(), None);
        let tree = compute_layout(&styled, viewport_width_px as f32, &self.fonts, &mut self.taffy)?;

        // Paint at the whole-pixel width the scale yields, and derive every
        // vertical measure from that same realised ratio.
        let width = ((viewport_width_px as f64 * self.scale.get() as f64).round() as u32).max(1);
        let ratio = width as f64 / viewport_width_px as f64;
        let height = (tree.height() as f64 * ratio).ceil().max(0.0) as u32;
        if height > MAX_RASTER_HEIGHT_PX || width as u64 * height as u64 * 4 > MAX_RASTER_BYTES {
            return Err(RenderError::TooLarge { width, height });
        }

        let mut canvas = Canvas {
            image: RgbaImage::from_pixel(width, height, Rgba(self.background.to_rgba8())),
            ratio,
        };
        let mut marked = Vec::new();
        for (index, lbox) in tree.boxes().iter().enumerate() {
            let origin = tree.absolute_origin(index);
            canvas.paint_box(lbox, origin, &self.fonts);
            collect_marks(&tree, index, origin.1, ratio, &mut marked);
        }

        log::debug!(
            "Rendered {}x{}px raster ({} marked boxes) at viewport {}px",
            width,
            height,
            marked.len(),
            viewport_width_px
        );
        Ok(RenderedSegment::new(canvas.image, viewport_width_px, marked))
    }
}

fn collect_marks(tree: &BoxTree, index: usize, top_css: f32, ratio: f64, out: &mut Vec<MarkedBox>) {
    let lbox = &tree.boxes()[index];
    let Some(anchor) = lbox.node else {
        return;
    };
    let region = RegionBox {
        anchor,
        offset_px: top_css as f64 * ratio,
        height_px: lbox.height as f64 * ratio,
    };
    let flags = [
        (lbox.markers.forced_break, Selector::ForcedBreak),
        (lbox.markers.avoid_split, Selector::AvoidSplit),
        (lbox.markers.table_body_row, Selector::TableBodyRow),
    ];
    for (set, selector) in flags {
        if set {
            out.push(MarkedBox { selector, region });
        }
    }
}

struct Canvas {
    image: RgbaImage,
    ratio: f64,
}

impl Canvas {
    fn px(&self, css: f32) -> f64 {
        css as f64 * self.ratio
    }

    fn paint_box(&mut self, lbox: &LaidOutBox, (x, y): (f32, f32), fonts: &FontManager) {
        let style = &lbox.style;
        if !style.background_color.is_transparent() {
            self.fill_rect(x, y, lbox.width, lbox.height, style.background_color);
        }

        let bw = style.border_width;
        if bw > 0.0 {
            let c = style.border_color;
            self.fill_rect(x, y, lbox.width, bw, c);
            self.fill_rect(x, y + lbox.height - bw, lbox.width, bw, c);
            self.fill_rect(x, y, bw, lbox.height, c);
            self.fill_rect(x + lbox.width - bw, y, bw, lbox.height, c);
        }

        match &lbox.content {
            BoxContent::Text { lines } => self.paint_text(lbox, (x, y), lines, fonts),
            BoxContent::Image { src } => self.paint_image(src, x, y, lbox.width, lbox.height),
            BoxContent::None | BoxContent::Spacer => {}
        }
    }

    fn paint_text(&mut self, lbox: &LaidOutBox, (x, y): (f32, f32), lines: &[String], fonts: &FontManager) {
        let s = &lbox.style;
        let bold = s.is_bold();
        let content_x = x + s.border_width + s.padding_left;
        let content_w = lbox.width - 2.0 * s.border_width - s.padding_left - s.padding_right;
        let line_h = fonts.line_height_px(s.font_size, s.line_height);
        let space = fonts.measure_text_width(" ", s.font_size, bold);
        // x-height band of the line
        let bar_h = s.font_size * 0.5;
        let color = Color { a: 1.0, ..s.color };

        let mut line_top = y + s.border_width + s.padding_top;
        for line in lines {
            let line_w = fonts.measure_text_width(line, s.font_size, bold);
            let mut cursor = match s.text_align {
                TextAlign::Left => content_x,
                TextAlign::Center => content_x + (content_w - line_w).max(0.0) / 2.0,
                TextAlign::Right => content_x + (content_w - line_w).max(0.0),
            };
            let bar_top = line_top + (line_h - bar_h) / 2.0;
            for word in line.split(' ').filter(|w| !w.is_empty()) {
                let w = fonts.measure_text_width(word, s.font_size, bold);
                self.fill_rect(cursor, bar_top, w, bar_h, color);
                cursor += w + space;
            }
            line_top += line_h;
        }
    }

    /// Images that are not base64 data URIs, or fail to decode, are skipped.
    fn paint_image(&mut self, src: &str, x: f32, y: f32, w: f32, h: f32) {
        let bytes = match decode_data_uri(src) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("Skipping image: {e}");
                return;
            }
        };
        let decoded = match image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Skipping image: decode error: {e}");
                return;
            }
        };
        let target_w = self.px(w).round() as u32;
        let target_h = self.px(h).round() as u32;
        if target_w == 0 || target_h == 0 {
            return;
        }
        let scaled = imageops::resize(&decoded.to_rgba8(), target_w, target_h, imageops::FilterType::Triangle);
        let (ox, oy) = (self.px(x).round() as i64, self.px(y).round() as i64);
        imageops::overlay(&mut self.image, &scaled, ox, oy);
    }

    /// Alpha-blend a CSS-pixel rectangle onto the canvas.
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        if w <= 0.0 || h <= 0.0 || color.is_transparent() {
            return;
        }
        let (iw, ih) = self.image.dimensions();
        let clamp = |v: f64, max: u32| v.round().clamp(0.0, max as f64) as u32;
        let x0 = clamp(self.px(x), iw);
        let y0 = clamp(self.px(y), ih);
        let x1 = clamp(self.px(x + w), iw);
        let y1 = clamp(self.px(y + h), ih);

        let [r, g, b, _] = color.to_rgba8();
        let alpha = color.a.clamp(0.0, 1.0);
        for py in y0..y1 {
            for px in x0..x1 {
                let dst = self.image.get_pixel_mut(px, py);
                let blend = |src: u8, dst: u8| (src as f32 * alpha + dst as f32 * (1.0 - alpha)).round() as u8;
                *dst = Rgba([blend(r, dst[0]), blend(g, dst[1]), blend(b, dst[2]), 255]);
            }
        }
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
///
/// Returns `Err` if `src` is not a data URI or does not use base64 encoding.
pub(crate) fn decode_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let Some(rest) = src.strip_prefix("data:") else {
        let preview: String = src.chars().take(80).collect();
        return Err(format!(
            "image src must be a base64 data URI (e.g. `data:image/png;base64,...`), got {preview:?}"
        ));
    };
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "invalid data URI: missing `,` between header and data".to_string())?;
    if !header.contains(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn render(html: &str, scale: f32, viewport: u32) -> RenderedSegment {
        MarkupRenderer::new(RenderScale(scale))
            .render(&Markup::parse(html), viewport)
            .unwrap()
    }

    fn red_png_data_uri() -> String {
        let img = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", BASE64_STD.encode(bytes))
    }

    #[test]
    fn raster_size_follows_scale() {
        let seg = render(r#"<div style="height:100px"></div>"#, 2.0, 400);
        assert_eq!(seg.width_px(), 800);
        assert_eq!(seg.height_px(), 200);
        assert_eq!(seg.scale(), 2.0);
    }

    #[test]
    fn fractional_scale_uses_realised_width() {
        let seg = render(r#"<div style="height:100px"></div>"#, 1.5, 793);
        // 793 × 1.5 = 1189.5 → 1190 columns
        assert_eq!(seg.width_px(), 1190);
        assert!((seg.scale() - 1190.0 / 793.0).abs() < 1e-9);
        assert_eq!(seg.height_px(), (100.0 * seg.scale()).ceil() as u32);
    }

    #[test]
    fn background_and_fills() {
        let seg = render(
            r#"<div style="height:10px"></div><div style="height:10px;background-color:#ff0000"></div>"#,
            1.0,
            50,
        );
        assert_eq!(seg.image().get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
        assert_eq!(seg.image().get_pixel(5, 15), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn query_reports_marked_boxes_in_raster_pixels() {
        let seg = render(
            r#"<div style="height:50px"></div>
               <div class="avoid-break" style="height:30px"></div>
               <div class="page-break-before" style="height:20px"></div>"#,
            2.0,
            200,
        );
        let avoid = seg.query(Selector::AvoidSplit);
        assert_eq!(avoid.len(), 1);
        assert_eq!(avoid[0].anchor, NodeId(1));
        assert_eq!(avoid[0].offset_px, 100.0);
        assert_eq!(avoid[0].height_px, 60.0);

        let forced = seg.query(Selector::ForcedBreak);
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].offset_px, 160.0);
        assert!(seg.query(Selector::TableBodyRow).is_empty());
    }

    #[test]
    fn text_paints_dark_pixels() {
        let seg = render("<p>Hello</p>", 1.0, 200);
        let dark = seg.image().pixels().filter(|p| p[0] < 128).count();
        assert!(dark > 0, "Expected some text pixels");
    }

    #[test]
    fn data_uri_images_are_painted() {
        let html = format!(r#"<img src="{}" style="width:10px;height:10px">"#, red_png_data_uri());
        let seg = render(&html, 1.0, 50);
        assert_eq!(seg.height_px(), 10);
        assert_eq!(seg.image().get_pixel(5, 5), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn remote_images_are_skipped() {
        let seg = render(r#"<img src="https://example.com/a.png" style="width:10px;height:10px">"#, 1.0, 50);
        assert_eq!(seg.image().get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn zero_viewport_is_rejected() {
        let err = MarkupRenderer::default().render(&Markup::parse("<p>x</p>"), 0);
        assert!(matches!(err, Err(RenderError::InvalidViewport)));
    }

    #[test]
    fn oversized_rasters_fail_before_allocating() {
        // 794000 columns by 10000 rows would need ~31 GB.
        let err = MarkupRenderer::new(RenderScale(1000.0)).render(&Markup::parse(r#"<div style="height:10px"></div>"#), 794);
        match err {
            Err(RenderError::TooLarge { width, height }) => assert_eq!((width, height), (794_000, 10_000)),
            other => panic!("Expected TooLarge, got {:?}", other.map(|s| s.height_px())),
        }

        let tall = format!(r#"<div style="height:{}px"></div>"#, MAX_RASTER_HEIGHT_PX + 1);
        let err = MarkupRenderer::new(RenderScale(1.0)).render(&Markup::parse(&tall), 10);
        assert!(matches!(err, Err(RenderError::TooLarge { .. })));
    }

    #[test]
    fn data_uri_parsing() {
        assert_eq!(decode_data_uri("data:text/plain;base64,aGk=").unwrap(), b"hi");
        assert!(decode_data_uri("data:text/plain,hi").is_err());
        assert!(decode_data_uri("logo.png").is_err());
    }
}
