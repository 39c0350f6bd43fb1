//! Protected region scanner – turns the marked boxes of a render into the
//! ordered list of regions the spacer injector must respect.

use serde::{Deserialize, Serialize};

use crate::dom::NodeId;
use crate::raster::{RegionBox, RenderedSegment, Selector};

/// Safety margin, in raster pixels, added below each kind of region before
/// the straddle test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservePolicy {
    /// Forced breaks push the whole remaining page, so they need none.
    pub forced_break_px: f64,
    pub avoid_split_px: f64,
    pub table_row_px: f64,
}

impl Default for ReservePolicy {
    fn default() -> Self {
        Self {
            forced_break_px: 0.0,
            avoid_split_px: 40.0,
            table_row_px: 12.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Must not be split across a page boundary.
    Unsplittable,
    /// Must start a fresh page.
    ForcedBreak,
}

/// A region of one segment's raster, in raster pixels from its top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectedRegion {
    pub anchor: NodeId,
    pub offset_px: f64,
    pub height_px: f64,
    pub kind: RegionKind,
    pub reserve_px: f64,
}

impl ProtectedRegion {
    pub fn end_px(&self) -> f64 {
        self.offset_px + self.height_px
    }
}

/// Collect every protected region of `segment`, ordered by ascending offset.
///
/// Ties keep a fixed order: forced breaks, then do-not-split blocks, then
/// table rows. An element matched twice as unsplittable is reported once.
pub fn scan(segment: &RenderedSegment, reserves: &ReservePolicy) -> Vec<ProtectedRegion> {
    let sources = [
        (Selector::ForcedBreak, RegionKind::ForcedBreak, reserves.forced_break_px),
        (Selector::AvoidSplit, RegionKind::Unsplittable, reserves.avoid_split_px),
        (Selector::TableBodyRow, RegionKind::Unsplittable, reserves.table_row_px),
    ];

    let mut regions: Vec<ProtectedRegion> = Vec::new();
    for (selector, kind, reserve_px) in sources {
        for RegionBox {
            anchor,
            offset_px,
            height_px,
        } in segment.query(selector)
        {
            if regions.iter().any(|r| r.anchor == anchor && r.kind == kind) {
                continue;
            }
            regions.push(ProtectedRegion {
                anchor,
                offset_px,
                height_px,
                kind,
                reserve_px,
            });
        }
    }
    regions.sort_by(|a, b| a.offset_px.total_cmp(&b.offset_px));

    log::debug!(
        "Scanned {} protected regions ({} forced breaks)",
        regions.len(),
        regions.iter().filter(|r| r.kind == RegionKind::ForcedBreak).count()
    );
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::MarkedBox;
    use image::RgbaImage;

    fn mark(selector: Selector, id: u32, offset_px: f64, height_px: f64) -> MarkedBox {
        MarkedBox {
            selector,
            region: RegionBox {
                anchor: NodeId(id),
                offset_px,
                height_px,
            },
        }
    }

    fn segment(marks: Vec<MarkedBox>) -> RenderedSegment {
        RenderedSegment::new(RgbaImage::new(10, 10), 10, marks)
    }

    #[test]
    fn regions_are_sorted_and_carry_reserves() {
        let seg = segment(vec![
            mark(Selector::TableBodyRow, 5, 300.0, 20.0),
            mark(Selector::AvoidSplit, 2, 100.0, 50.0),
            mark(Selector::ForcedBreak, 7, 500.0, 10.0),
        ]);
        let regions = scan(&seg, &ReservePolicy::default());
        let anchors: Vec<u32> = regions.iter().map(|r| r.anchor.0).collect();
        assert_eq!(anchors, vec![2, 5, 7]);
        assert_eq!(regions[0].reserve_px, 40.0);
        assert_eq!(regions[1].reserve_px, 12.0);
        assert_eq!(regions[2].kind, RegionKind::ForcedBreak);
        assert_eq!(regions[2].reserve_px, 0.0);
    }

    #[test]
    fn ties_put_forced_breaks_first() {
        let seg = segment(vec![
            mark(Selector::TableBodyRow, 3, 100.0, 20.0),
            mark(Selector::AvoidSplit, 2, 100.0, 20.0),
            mark(Selector::ForcedBreak, 1, 100.0, 20.0),
        ]);
        let kinds: Vec<u32> = scan(&seg, &ReservePolicy::default())
            .iter()
            .map(|r| r.anchor.0)
            .collect();
        assert_eq!(kinds, vec![1, 2, 3]);
    }

    #[test]
    fn doubly_marked_rows_are_reported_once() {
        let seg = segment(vec![
            mark(Selector::AvoidSplit, 4, 100.0, 20.0),
            mark(Selector::TableBodyRow, 4, 100.0, 20.0),
        ]);
        let regions = scan(&seg, &ReservePolicy::default());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].reserve_px, 40.0);
    }

    #[test]
    fn scans_a_real_render() {
        use crate::dom::Markup;
        use crate::page::RenderScale;
        use crate::raster::{MarkupRenderer, RasterRenderer};

        let markup = Markup::parse(
            r#"<div style="height:20px"></div>
               <table><tbody>
                 <tr><td style="height:40px">a</td></tr>
                 <tr><td style="height:40px">b</td></tr>
               </tbody></table>"#,
        );
        let seg = MarkupRenderer::new(RenderScale(2.0)).render(&markup, 300).unwrap();
        let regions = scan(&seg, &ReservePolicy::default());
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].offset_px, 40.0);
        assert_eq!(regions[1].offset_px, 120.0);
        assert_eq!(regions[1].height_px, 80.0);
        assert!(regions.iter().all(|r| r.kind == RegionKind::Unsplittable));
    }
}
