//! Pipeline – ties together configuration, rendering, pagination and PDF
//! encoding into single function calls.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capacity::PageCapacityCalculator;
use crate::compositor::{ComposeOptions, Document, DocumentCompositor, Segment};
use crate::error::{PaginateError, Result};
use crate::handle::RendererHandle;
use crate::layout_config::DocumentLayout;
use crate::page::{MarginProfile, PageOrientation, PhysicalPage, RenderScale};
use crate::pdf::encode_pdf;
use crate::raster::{MarkupRenderer, RasterRenderer};
use crate::scanner::ReservePolicy;
use crate::spacer::StraddleModel;

/// Configuration for the pagination pipeline. Every field has a default, so
/// a JSON config only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Portrait page size in millimetres (default: A4).
    pub page: PhysicalPage,
    /// Swaps page width and height when `Landscape`.
    pub orientation: PageOrientation,
    pub margins: MarginProfile,
    /// CSS pixel width segments are laid out at (default: 794, A4 at 96dpi).
    pub viewport_width_px: u32,
    /// Raster pixels per CSS pixel.
    pub scale: RenderScale,
    pub reserves: ReservePolicy,
    pub straddle_model: StraddleModel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            title: "page-forge output".to_string(),
            page: PhysicalPage::a4(),
            orientation: PageOrientation::Portrait,
            margins: MarginProfile::default(),
            viewport_width_px: 794,
            scale: RenderScale::default(),
            reserves: ReservePolicy::default(),
            straddle_model: StraddleModel::default(),
        }
    }
}

impl PipelineConfig {
    /// Create an A4 landscape config.
    pub fn a4_landscape() -> Self {
        Self {
            orientation: PageOrientation::Landscape,
            ..Self::default()
        }
    }

    /// Page size after applying orientation.
    pub fn effective_page(&self) -> PhysicalPage {
        self.page.oriented(self.orientation)
    }

    /// Fail fast on values that would produce degenerate pages.
    pub fn validate(&self) -> Result<()> {
        let page = self.effective_page();
        page.validate()?;
        self.margins.validate(&page)?;
        self.scale.validate()?;
        if self.viewport_width_px == 0 {
            return Err(PaginateError::InvalidConfiguration(
                "viewport width must be at least one pixel".to_string(),
            ));
        }
        let reserves = [
            self.reserves.forced_break_px,
            self.reserves.avoid_split_px,
            self.reserves.table_row_px,
        ];
        if reserves.iter().any(|r| !(r.is_finite() && *r >= 0.0)) {
            return Err(PaginateError::InvalidConfiguration(format!(
                "reserves must be finite and >= 0, got {:?}",
                self.reserves
            )));
        }
        Ok(())
    }

    /// Load a JSON config file; missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            viewport_width_px: self.viewport_width_px,
            reserves: self.reserves,
            straddle_model: self.straddle_model,
        }
    }

    fn calculator(&self) -> Result<PageCapacityCalculator> {
        PageCapacityCalculator::new(self.effective_page(), self.margins)
    }
}

/// Compose `segments` with a fresh [`MarkupRenderer`] at the configured scale.
pub fn compose_document(segments: &[Segment], config: &PipelineConfig) -> Result<Document> {
    config.validate()?;
    let mut renderer = MarkupRenderer::new(config.scale);
    compose_with(&mut renderer, segments, config)
}

/// Compose `segments` with a caller-owned renderer.
pub fn compose_with<R: RasterRenderer + ?Sized>(
    renderer: &mut R,
    segments: &[Segment],
    config: &PipelineConfig,
) -> Result<Document> {
    config.validate()?;
    DocumentCompositor::new(renderer, config.calculator()?, config.compose_options())?.compose(segments)
}

/// Compose `segments` on a shared renderer. The renderer is held for the
/// whole document, so concurrent callers are serialised document by
/// document.
pub fn compose_shared<R: RasterRenderer>(
    handle: &RendererHandle<R>,
    segments: &[Segment],
    config: &PipelineConfig,
) -> Result<Document> {
    config.validate()?;
    let mut lease = handle.acquire()?;
    compose_with(&mut *lease, segments, config)
}

/// Full pipeline: segments → PDF bytes.
///
/// Returns the PDF together with the composed document.
pub fn generate_pdf(segments: &[Segment], config: &PipelineConfig) -> Result<(Vec<u8>, Document)> {
    let document = compose_document(segments, config)?;
    let bytes = encode_pdf(&document, &config.title)?;
    Ok((bytes, document))
}

/// Convenience: one HTML segment → PDF with the default A4 config.
pub fn generate_pdf_from_html(html: &str) -> Result<Vec<u8>> {
    let (bytes, _) = generate_pdf(&[Segment::new(html)], &PipelineConfig::default())?;
    Ok(bytes)
}

/// Compose only (no PDF encoding) and return the layout snapshot – useful
/// for testing.
pub fn compute_document_layout(segments: &[Segment], config: &PipelineConfig) -> Result<DocumentLayout> {
    let document = compose_document(segments, config)?;
    Ok(DocumentLayout::from_document(&document, &config.title))
}
