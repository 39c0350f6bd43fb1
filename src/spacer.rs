//! Spacer injection – pushes protected regions that would straddle a page
//! boundary onto the next page by inserting blank, height-only elements.
//!
//! Planning is a single forward pass over regions in ascending original
//! offset. Every spacer shifts all later regions by its height; the shift is
//! tracked in a running total instead of re-measuring the content.

use serde::{Deserialize, Serialize};

use crate::capacity::{Estimated, PageGrid};
use crate::dom::{Markup, NodeId};
use crate::scanner::{ProtectedRegion, RegionKind};

/// How a region's position within its page is derived from its offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StraddleModel {
    /// Walk the page grid: the leading page holds its own capacity, every
    /// later page the continuation capacity.
    #[default]
    PageAware,
    /// `offset mod continuation capacity` for every region. Misjudges regions
    /// on a leading page whose capacity differs.
    Uniform,
}

/// One blank spacer to insert before `anchor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spacer {
    pub anchor: NodeId,
    /// Index of the region it protects in the planned region list.
    pub region_index: usize,
    /// Height in raster pixels.
    pub height_px: u32,
}

/// The spacers decided by one planning pass, in region order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpacerPlan {
    spacers: Vec<Spacer>,
}

impl SpacerPlan {
    pub fn spacers(&self) -> &[Spacer] {
        &self.spacers
    }

    pub fn len(&self) -> usize {
        self.spacers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spacers.is_empty()
    }

    pub fn total_px(&self) -> u64 {
        self.spacers.iter().map(|s| s.height_px as u64).sum()
    }

    /// Where `regions` will sit once the plan is injected.
    pub fn shifted(&self, regions: &[ProtectedRegion]) -> Vec<ProtectedRegion> {
        let mut shift = 0.0;
        let mut pending = self.spacers.iter().peekable();
        regions
            .iter()
            .enumerate()
            .map(|(index, region)| {
                while let Some(spacer) = pending.next_if(|s| s.region_index <= index) {
                    shift += spacer.height_px as f64;
                }
                ProtectedRegion {
                    offset_px: region.offset_px + shift,
                    ..*region
                }
            })
            .collect()
    }
}

/// Decide which regions need a spacer under the estimated page grid.
///
/// `regions` must be in ascending offset order, as produced by
/// [`crate::scanner::scan`].
pub fn plan_spacers(regions: &[ProtectedRegion], grid: &PageGrid<Estimated>, model: StraddleModel) -> SpacerPlan {
    debug_assert!(
        regions.windows(2).all(|w| w[0].offset_px <= w[1].offset_px),
        "regions must be sorted by offset"
    );

    let mut spacers = Vec::new();
    let mut shift = 0.0;
    for (index, region) in regions.iter().enumerate() {
        let offset = region.offset_px + shift;
        let position = match model {
            StraddleModel::PageAware => grid.locate(offset),
            StraddleModel::Uniform => grid.locate_uniform(offset),
        };
        if position.at_page_top() {
            continue;
        }

        let capacity = position.capacity_px as f64;
        let needs_spacer = match region.kind {
            RegionKind::ForcedBreak => true,
            RegionKind::Unsplittable => position.position_px + region.height_px > capacity - region.reserve_px,
        };
        if !needs_spacer {
            continue;
        }

        let height_px = position.remaining_px().ceil() as u32;
        if height_px == 0 {
            continue;
        }
        log::debug!(
            "{:?} region {:?} at {:.1}px (page {}, {:.1}/{}px, height {:.1}px): spacer {}px",
            region.kind,
            region.anchor,
            offset,
            position.page,
            position.position_px,
            position.capacity_px,
            region.height_px,
            height_px
        );
        spacers.push(Spacer {
            anchor: region.anchor,
            region_index: index,
            height_px,
        });
        shift += height_px as f64;
    }
    SpacerPlan { spacers }
}

/// Insert the planned spacers into `markup`.
///
/// `scale` is the raster-pixels-per-CSS-pixel ratio of the render the plan
/// was measured on. Returns the number of spacers inserted; spacers whose
/// anchor is no longer in the markup are skipped with a warning.
pub fn inject_spacers(markup: &mut Markup, plan: &SpacerPlan, scale: f64) -> usize {
    let mut inserted = 0;
    for spacer in plan.spacers() {
        let height_css = (spacer.height_px as f64 / scale) as f32;
        if markup.insert_spacer_before(spacer.anchor, height_css) {
            inserted += 1;
        } else {
            log::warn!("Spacer anchor {:?} not found in markup; skipped", spacer.anchor);
        }
    }
    inserted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::PageCapacity;
    use crate::page::PageRole;

    fn grid(first: u32, other: u32) -> PageGrid<Estimated> {
        PageCapacity::<Estimated>::from_px(first, other, 100)
            .unwrap()
            .grid(PageRole::First)
    }

    fn row(id: u32, offset_px: f64, height_px: f64) -> ProtectedRegion {
        ProtectedRegion {
            anchor: NodeId(id),
            offset_px,
            height_px,
            kind: RegionKind::Unsplittable,
            reserve_px: 12.0,
        }
    }

    fn forced(id: u32, offset_px: f64) -> ProtectedRegion {
        ProtectedRegion {
            anchor: NodeId(id),
            offset_px,
            height_px: 10.0,
            kind: RegionKind::ForcedBreak,
            reserve_px: 0.0,
        }
    }

    fn heights(plan: &SpacerPlan) -> Vec<(u32, u32)> {
        plan.spacers().iter().map(|s| (s.anchor.0, s.height_px)).collect()
    }

    #[test]
    fn no_regions_no_spacers() {
        assert!(plan_spacers(&[], &grid(1000, 1000), StraddleModel::PageAware).is_empty());
    }

    #[test]
    fn fitting_region_is_left_alone() {
        let plan = plan_spacers(&[row(1, 100.0, 40.0)], &grid(1000, 1000), StraddleModel::PageAware);
        assert!(plan.is_empty());
    }

    #[test]
    fn reserve_pushes_region_near_the_bottom() {
        // 950 + 40 = 990 > 1000 - 12
        let plan = plan_spacers(&[row(1, 950.0, 40.0)], &grid(1000, 1000), StraddleModel::PageAware);
        assert_eq!(heights(&plan), vec![(1, 50)]);
    }

    #[test]
    fn fractional_remainder_is_rounded_up() {
        let plan = plan_spacers(&[row(1, 950.4, 40.0)], &grid(1000, 1000), StraddleModel::PageAware);
        assert_eq!(heights(&plan), vec![(1, 50)]);
    }

    #[test]
    fn later_regions_see_earlier_shifts() {
        // Row 1 is pushed by 50px; row 2 at 1900 then lands at 1950 on page 1
        // (950 into it) and straddles too.
        let regions = [row(1, 950.0, 40.0), row(2, 1900.0, 40.0)];
        let plan = plan_spacers(&regions, &grid(1000, 1000), StraddleModel::PageAware);
        assert_eq!(heights(&plan), vec![(1, 50), (2, 50)]);
        assert_eq!(plan.total_px(), 100);

        let shifted = plan.shifted(&regions);
        assert_eq!(shifted[0].offset_px, 1000.0);
        assert_eq!(shifted[1].offset_px, 2000.0);
    }

    #[test]
    fn forced_break_pushes_whole_remainder() {
        let plan = plan_spacers(&[forced(1, 300.0)], &grid(1000, 1000), StraddleModel::PageAware);
        assert_eq!(heights(&plan), vec![(1, 700)]);
    }

    #[test]
    fn forced_break_at_page_top_is_a_no_op() {
        let regions = [forced(1, 0.0), forced(2, 1000.0), forced(3, 2000.4)];
        let plan = plan_spacers(&regions, &grid(1000, 1000), StraddleModel::PageAware);
        assert!(plan.is_empty());
    }

    #[test]
    fn oversized_region_at_page_top_spans_pages() {
        let plan = plan_spacers(&[row(1, 1000.0, 2500.0)], &grid(1000, 1000), StraddleModel::PageAware);
        assert!(plan.is_empty());
    }

    #[test]
    fn oversized_region_mid_page_starts_a_fresh_page() {
        let plan = plan_spacers(&[row(1, 400.0, 2500.0)], &grid(1000, 1000), StraddleModel::PageAware);
        assert_eq!(heights(&plan), vec![(1, 600)]);
    }

    #[test]
    fn page_aware_model_honours_a_short_first_page() {
        let regions = [row(1, 680.0, 40.0)];
        let g = grid(700, 800);
        let aware = plan_spacers(&regions, &g, StraddleModel::PageAware);
        assert_eq!(heights(&aware), vec![(1, 20)]);

        // The uniform model measures against 800px and misses the straddle.
        let uniform = plan_spacers(&regions, &g, StraddleModel::Uniform);
        assert!(uniform.is_empty());
    }

    #[test]
    fn uniform_model_wraps_by_continuation_capacity() {
        let plan = plan_spacers(&[row(1, 1590.0, 40.0)], &grid(700, 800), StraddleModel::Uniform);
        // 1590 mod 800 = 790
        assert_eq!(heights(&plan), vec![(1, 10)]);
    }

    #[test]
    fn second_pass_over_satisfied_regions_is_empty() {
        let regions = [
            row(1, 120.0, 30.0),
            row(2, 975.5, 30.0),
            forced(3, 1400.0),
            row(4, 1980.0, 60.0),
            row(5, 2990.0, 30.0),
        ];
        let g = grid(1000, 1000);
        let plan = plan_spacers(&regions, &g, StraddleModel::PageAware);
        assert!(!plan.is_empty());
        let again = plan_spacers(&plan.shifted(&regions), &g, StraddleModel::PageAware);
        assert!(again.is_empty(), "Expected no spacers, got {:?}", again.spacers());
    }

    #[test]
    fn injection_converts_to_css_pixels() {
        let mut markup = Markup::parse("<p>a</p><p>b</p>");
        let plan = SpacerPlan {
            spacers: vec![Spacer {
                anchor: NodeId(1),
                region_index: 0,
                height_px: 50,
            }],
        };
        assert_eq!(inject_spacers(&mut markup, &plan, 2.0), 1);
        let spacer = markup.find(NodeId(2)).expect("spacer element");
        assert_eq!(spacer.spacer_height(), Some(25.0));
    }

    #[test]
    fn missing_anchor_is_skipped() {
        let mut markup = Markup::parse("<p>a</p>");
        let plan = SpacerPlan {
            spacers: vec![Spacer {
                anchor: NodeId(42),
                region_index: 0,
                height_px: 10,
            }],
        };
        assert_eq!(inject_spacers(&mut markup, &plan, 1.0), 0);
        assert_eq!(markup.spacer_count(), 0);
    }
}
