//! Document compositor – drives every segment through measure, scan, inject,
//! re-render and slice, and assembles the page slices into one document.

use image::{imageops, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::capacity::{Final, PageCapacity, PageCapacityCalculator, BOUNDARY_EPSILON_PX};
use crate::dom::Markup;
use crate::error::{PaginateError, Result};
use crate::page::{MarginProfile, PageRole, PhysicalPage};
use crate::raster::RasterRenderer;
use crate::scanner::{scan, ProtectedRegion, RegionKind, ReservePolicy};
use crate::slicer::{crop_slice, slice_segment, PageSlice};
use crate::spacer::{inject_spacers, plan_spacers, StraddleModel};

/// One independently rendered unit of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    markup: String,
}

impl Segment {
    pub fn new(markup: impl Into<String>) -> Self {
        Self { markup: markup.into() }
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }
}

impl From<&str> for Segment {
    fn from(markup: &str) -> Self {
        Self::new(markup)
    }
}

impl From<String> for Segment {
    fn from(markup: String) -> Self {
        Self::new(markup)
    }
}

/// Knobs of a composition pass that are not page geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComposeOptions {
    pub viewport_width_px: u32,
    pub reserves: ReservePolicy,
    pub straddle_model: StraddleModel,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            viewport_width_px: 794,
            reserves: ReservePolicy::default(),
            straddle_model: StraddleModel::default(),
        }
    }
}

/// The final raster of one composed segment and what was learned about it.
#[derive(Debug, Clone)]
pub struct SegmentRaster {
    pub segment_index: usize,
    pub image: RgbaImage,
    /// Regions as they sit in `image`, after spacer injection.
    pub regions: Vec<ProtectedRegion>,
    pub spacer_count: usize,
    pub capacity: PageCapacity<Final>,
    pub first_page: usize,
    pub page_count: usize,
}

/// Page span of one protected region in the composed document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionPlacement {
    pub segment_index: usize,
    pub anchor: u32,
    pub kind: RegionKind,
    pub offset_px: f64,
    pub height_px: f64,
    pub first_page: usize,
    pub last_page: usize,
}

impl RegionPlacement {
    pub fn is_split(&self) -> bool {
        self.first_page != self.last_page
    }
}

/// An ordered multi-page document: one slice per physical page.
#[derive(Debug, Clone)]
pub struct Document {
    page: PhysicalPage,
    margins: MarginProfile,
    slices: Vec<PageSlice>,
    parts: Vec<SegmentRaster>,
}

impl Document {
    pub fn page(&self) -> &PhysicalPage {
        &self.page
    }

    pub fn margins(&self) -> &MarginProfile {
        &self.margins
    }

    pub fn page_count(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn slices(&self) -> &[PageSlice] {
        &self.slices
    }

    /// Composed segments; skipped blank segments are absent.
    pub fn segments(&self) -> &[SegmentRaster] {
        &self.parts
    }

    fn part_of(&self, slice: &PageSlice) -> Option<&SegmentRaster> {
        self.parts.iter().find(|p| p.segment_index == slice.segment_index)
    }

    /// The rows of page `index`, cropped from its segment's raster.
    pub fn slice_image(&self, index: usize) -> Result<RgbaImage> {
        let slice = self.slices.get(index).ok_or(PaginateError::PageOutOfRange(index))?;
        let part = self.part_of(slice).ok_or(PaginateError::PageOutOfRange(index))?;
        Ok(crop_slice(&part.image, slice))
    }

    /// Full physical page `index` as a raster: a white page at the content's
    /// pixel density with the slice placed at its top offset.
    pub fn page_image(&self, index: usize) -> Result<RgbaImage> {
        let slice = self.slices.get(index).ok_or(PaginateError::PageOutOfRange(index))?;
        let content = self.slice_image(index)?;
        let px_per_mm = content.width() as f64 / self.page.width_mm as f64;
        let height = (self.page.height_mm as f64 * px_per_mm).round() as u32;
        let mut canvas = RgbaImage::from_pixel(content.width(), height, Rgba([255, 255, 255, 255]));
        let top = (slice.top_offset_mm as f64 * px_per_mm).round() as i64;
        imageops::overlay(&mut canvas, &content, 0, top);
        Ok(canvas)
    }

    pub fn page_images(&self) -> Result<Vec<RgbaImage>> {
        (0..self.page_count()).map(|i| self.page_image(i)).collect()
    }

    /// Page span of every protected region, in document order. Spans are
    /// taken over the pixel rows the region is painted on.
    pub fn region_placements(&self) -> Vec<RegionPlacement> {
        let mut placements = Vec::new();
        for part in &self.parts {
            let slices: Vec<&PageSlice> = self
                .slices
                .iter()
                .filter(|s| s.segment_index == part.segment_index)
                .collect();
            let Some(last_slice) = slices.last() else {
                continue;
            };
            let page_at = |px: f64, end: bool| {
                slices
                    .iter()
                    .find(|s| {
                        let (start, stop) = (s.pixel_start as f64, s.pixel_end as f64);
                        if end {
                            start < px && px <= stop
                        } else {
                            start <= px && px < stop
                        }
                    })
                    .map(|s| s.page_index)
                    .unwrap_or(last_slice.page_index)
            };
            for region in &part.regions {
                let first_page = page_at(region.offset_px.round(), false);
                let last_page = if region.height_px > 0.0 {
                    page_at(region.end_px().round(), true).max(first_page)
                } else {
                    first_page
                };
                placements.push(RegionPlacement {
                    segment_index: part.segment_index,
                    anchor: region.anchor.0,
                    kind: region.kind,
                    offset_px: region.offset_px,
                    height_px: region.height_px,
                    first_page,
                    last_page,
                });
            }
        }
        placements
    }
}

/// Runs segments through a renderer and collects their pages.
pub struct DocumentCompositor<'r, R: RasterRenderer + ?Sized> {
    renderer: &'r mut R,
    calculator: PageCapacityCalculator,
    options: ComposeOptions,
}

impl<'r, R: RasterRenderer + ?Sized> DocumentCompositor<'r, R> {
    pub fn new(renderer: &'r mut R, calculator: PageCapacityCalculator, options: ComposeOptions) -> Result<Self> {
        if options.viewport_width_px == 0 {
            return Err(PaginateError::InvalidConfiguration(
                "viewport width must be at least one pixel".to_string(),
            ));
        }
        Ok(Self {
            renderer,
            calculator,
            options,
        })
    }

    /// Compose `segments` in order. Blank segments contribute no pages; each
    /// other segment starts on a fresh page.
    pub fn compose(&mut self, segments: &[Segment]) -> Result<Document> {
        let mut slices = Vec::new();
        let mut parts = Vec::new();

        for (index, segment) in segments.iter().enumerate() {
            let Some((part, segment_slices)) = self.compose_segment(index, segment, slices.len())? else {
                continue;
            };
            slices.extend(segment_slices);
            parts.push(part);
        }

        log::info!(
            "Composed {} pages from {} of {} segments",
            slices.len(),
            parts.len(),
            segments.len()
        );
        Ok(Document {
            page: *self.calculator.page(),
            margins: *self.calculator.margins(),
            slices,
            parts,
        })
    }

    fn compose_segment(
        &mut self,
        index: usize,
        segment: &Segment,
        first_page: usize,
    ) -> Result<Option<(SegmentRaster, Vec<PageSlice>)>> {
        let mut markup = Markup::parse(segment.markup());
        if markup.is_blank() {
            log::info!("Segment {index} is blank; skipped");
            return Ok(None);
        }
        let viewport = self.options.viewport_width_px;
        let leading = if first_page == 0 {
            PageRole::First
        } else {
            PageRole::Continuation
        };

        // Measure, then plan spacers against the estimated grid.
        let measured = self.renderer.render(&markup, viewport)?;
        let estimated = self.calculator.estimate(measured.width_px())?;
        let regions = scan(&measured, &self.options.reserves);
        let plan = plan_spacers(&regions, &estimated.grid(leading), self.options.straddle_model);
        let spacer_count = inject_spacers(&mut markup, &plan, measured.scale());

        // An unchanged markup renders to the same raster; reuse it.
        let rendered = if spacer_count == 0 {
            measured
        } else {
            self.renderer.render(&markup, viewport)?
        };
        let capacity = self.calculator.finalize(rendered.width_px())?;
        if !estimated.agrees_with(&capacity) {
            log::warn!(
                "Segment {index}: estimated capacity {estimated:?} differs from final {capacity:?}; \
                 spacers may be misplaced"
            );
        }

        let final_regions = scan(&rendered, &self.options.reserves);
        check_placement(index, &final_regions, &capacity, leading);

        let segment_slices = slice_segment(index, rendered.height_px(), &capacity, self.calculator.margins(), first_page);
        if segment_slices.is_empty() {
            log::info!("Segment {index} rendered no rows; skipped");
            return Ok(None);
        }
        log::info!(
            "Segment {index}: {}x{}px, {} regions, {} spacers, {} pages",
            rendered.width_px(),
            rendered.height_px(),
            final_regions.len(),
            spacer_count,
            segment_slices.len()
        );

        let part = SegmentRaster {
            segment_index: index,
            page_count: segment_slices.len(),
            first_page,
            capacity,
            spacer_count,
            regions: final_regions,
            image: rendered.into_image(),
        };
        Ok(Some((part, segment_slices)))
    }
}

/// Warn about unsplittable regions that fit on a page yet still cross a
/// boundary in the final raster.
fn check_placement(index: usize, regions: &[ProtectedRegion], capacity: &PageCapacity<Final>, leading: PageRole) {
    let grid = capacity.grid(leading);
    for region in regions.iter().filter(|r| r.kind == RegionKind::Unsplittable) {
        let position = grid.locate(region.offset_px);
        let fits = region.height_px <= position.capacity_px as f64;
        if fits && position.position_px + region.height_px > position.capacity_px as f64 + BOUNDARY_EPSILON_PX {
            log::warn!(
                "Segment {index}: region {:?} at {:.1}px straddles page {} after spacer injection",
                region.anchor,
                region.offset_px,
                position.page
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::RenderScale;
    use crate::raster::{MarkupRenderer, RenderError, RenderedSegment};

    /// 100mm square pages at 1 px/mm: a 100px viewport at scale 1 gives
    /// 100px of capacity per page when there are no margins.
    fn calculator(margins: MarginProfile) -> PageCapacityCalculator {
        let page = PhysicalPage {
            width_mm: 100.0,
            height_mm: 100.0,
        };
        PageCapacityCalculator::new(page, margins).unwrap()
    }

    fn options() -> ComposeOptions {
        ComposeOptions {
            viewport_width_px: 100,
            ..ComposeOptions::default()
        }
    }

    fn compose(segments: &[Segment], margins: MarginProfile) -> Document {
        let mut renderer = MarkupRenderer::new(RenderScale(1.0));
        DocumentCompositor::new(&mut renderer, calculator(margins), options())
            .unwrap()
            .compose(segments)
            .unwrap()
    }

    fn block(height: u32) -> String {
        format!(r#"<div style="height:{height}px"></div>"#)
    }

    #[test]
    fn segments_start_on_fresh_pages() {
        let doc = compose(
            &[Segment::new(block(150)), Segment::new(block(50))],
            MarginProfile::uniform(0.0, 0.0),
        );
        assert_eq!(doc.page_count(), 3);
        let owners: Vec<usize> = doc.slices().iter().map(|s| s.segment_index).collect();
        assert_eq!(owners, vec![0, 0, 1]);
        assert_eq!(doc.slices()[2].pixel_start, 0);
        assert_eq!(doc.slices()[2].page_index, 2);
    }

    #[test]
    fn blank_segments_contribute_nothing() {
        let doc = compose(
            &[Segment::new("  "), Segment::new(block(50)), Segment::new("<!-- -->")],
            MarginProfile::uniform(0.0, 0.0),
        );
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.segments().len(), 1);
        assert_eq!(doc.slices()[0].segment_index, 1);
        assert_eq!(doc.slices()[0].role, PageRole::First);
    }

    #[test]
    fn straddling_block_moves_to_next_page() {
        let html = format!(r#"{}<div class="avoid-break" style="height:30px"></div>"#, block(90));
        let doc = compose(&[Segment::new(html)], MarginProfile::uniform(0.0, 0.0));
        assert_eq!(doc.segments()[0].spacer_count, 1);
        let placements = doc.region_placements();
        assert_eq!(placements.len(), 1);
        assert_eq!((placements[0].first_page, placements[0].last_page), (1, 1));
        assert_eq!(placements[0].offset_px, 100.0);
    }

    #[test]
    fn page_image_places_slice_at_top_margin() {
        let margins = MarginProfile {
            top_first: 0.0,
            top_other: 10.0,
            bottom_first: 0.0,
            bottom_other: 0.0,
        };
        let html = r#"<div style="height:100px"></div><div style="height:20px;background-color:#000000"></div>"#;
        let doc = compose(&[Segment::new(html)], margins);
        assert_eq!(doc.page_count(), 2);
        let second = doc.page_image(1).unwrap();
        assert_eq!(second.dimensions(), (100, 100));
        assert_eq!(second.get_pixel(50, 5), &Rgba([255, 255, 255, 255]));
        assert_eq!(second.get_pixel(50, 15), &Rgba([0, 0, 0, 255]));
        assert!(matches!(doc.page_image(2), Err(PaginateError::PageOutOfRange(2))));
    }

    struct OfflineRenderer;

    impl RasterRenderer for OfflineRenderer {
        fn render(&mut self, _: &Markup, _: u32) -> std::result::Result<RenderedSegment, RenderError> {
            Err(RenderError::Backend("offline".to_string()))
        }
    }

    #[test]
    fn render_failures_propagate() {
        let mut renderer = OfflineRenderer;
        let err = DocumentCompositor::new(&mut renderer, calculator(MarginProfile::default()), options())
            .unwrap()
            .compose(&[Segment::new(block(10))])
            .unwrap_err();
        assert!(matches!(err, PaginateError::Render(RenderError::Backend(_))));
    }

    #[test]
    fn blank_segments_never_reach_the_renderer() {
        let mut renderer = OfflineRenderer;
        let doc = DocumentCompositor::new(&mut renderer, calculator(MarginProfile::default()), options())
            .unwrap()
            .compose(&[Segment::new(""), Segment::new(" \n ")])
            .unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn zero_viewport_is_rejected() {
        let mut renderer = MarkupRenderer::default();
        let opts = ComposeOptions {
            viewport_width_px: 0,
            ..ComposeOptions::default()
        };
        assert!(DocumentCompositor::new(&mut renderer, calculator(MarginProfile::default()), opts).is_err());
    }
}
