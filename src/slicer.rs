//! Page slicer – cuts a segment's final raster into page-sized row ranges.

use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::capacity::{Final, PageCapacity};
use crate::page::{MarginProfile, PageRole};

/// A contiguous band of raster rows mapped onto exactly one physical page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSlice {
    /// Global page number, continuous across segments.
    pub page_index: usize,
    pub segment_index: usize,
    /// First raster row, inclusive.
    pub pixel_start: u32,
    /// Last raster row, exclusive.
    pub pixel_end: u32,
    /// Distance from the physical page top to the slice, in millimetres.
    pub top_offset_mm: f32,
    pub role: PageRole,
}

impl PageSlice {
    pub fn height_px(&self) -> u32 {
        self.pixel_end - self.pixel_start
    }

    pub fn contains(&self, start_px: f64, end_px: f64) -> bool {
        start_px >= self.pixel_start as f64 && end_px <= self.pixel_end as f64
    }
}

/// Slice a raster of `raster_height_px` rows belonging to segment
/// `segment_index`, whose first page is global page `first_page_index`.
///
/// Only global page 0 takes the first-page role; every other page,
/// including the opening page of a later segment, is a continuation page.
pub fn slice_segment(
    segment_index: usize,
    raster_height_px: u32,
    capacity: &PageCapacity<Final>,
    margins: &MarginProfile,
    first_page_index: usize,
) -> Vec<PageSlice> {
    let leading = role_of(first_page_index);
    let grid = capacity.grid(leading);

    let mut slices = Vec::with_capacity(grid.page_count(raster_height_px));
    let mut start = 0u32;
    let mut page = 0usize;
    while start < raster_height_px {
        let end = start.saturating_add(grid.capacity_of(page)).min(raster_height_px);
        let page_index = first_page_index + page;
        let role = role_of(page_index);
        let slice = PageSlice {
            page_index,
            segment_index,
            pixel_start: start,
            pixel_end: end,
            top_offset_mm: margins.top(role),
            role,
        };
        log::debug!(
            "Segment {segment_index} page {page_index}: rows {start}..{end} at {}mm",
            slice.top_offset_mm
        );
        slices.push(slice);
        start = end;
        page += 1;
    }
    slices
}

fn role_of(page_index: usize) -> PageRole {
    if page_index == 0 {
        PageRole::First
    } else {
        PageRole::Continuation
    }
}

/// Copy the rows of `slice` out of the segment raster.
pub fn crop_slice(raster: &RgbaImage, slice: &PageSlice) -> RgbaImage {
    imageops::crop_imm(raster, 0, slice.pixel_start, raster.width(), slice.height_px()).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn capacity(first: u32, other: u32) -> PageCapacity<Final> {
        PageCapacity::<Final>::from_px(first, other, 100).unwrap()
    }

    fn ranges(slices: &[PageSlice]) -> Vec<(u32, u32)> {
        slices.iter().map(|s| (s.pixel_start, s.pixel_end)).collect()
    }

    #[test]
    fn first_page_uses_its_own_capacity() {
        let slices = slice_segment(0, 1000, &capacity(700, 800), &MarginProfile::default(), 0);
        assert_eq!(ranges(&slices), vec![(0, 700), (700, 1000)]);
        assert_eq!(slices[0].role, PageRole::First);
        assert_eq!(slices[0].top_offset_mm, 0.0);
        assert_eq!(slices[1].role, PageRole::Continuation);
        assert_eq!(slices[1].top_offset_mm, 12.0);
        assert_eq!(slices[1].page_index, 1);
    }

    #[test]
    fn later_segments_are_all_continuation_pages() {
        let slices = slice_segment(1, 1700, &capacity(700, 800), &MarginProfile::default(), 3);
        assert_eq!(ranges(&slices), vec![(0, 800), (800, 1600), (1600, 1700)]);
        assert!(slices.iter().all(|s| s.role == PageRole::Continuation));
        assert_eq!(
            slices.iter().map(|s| s.page_index).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
        assert!(slices.iter().all(|s| s.segment_index == 1));
    }

    #[test]
    fn slice_count_matches_formula() {
        let cap = capacity(700, 800);
        let grid = cap.grid(PageRole::First);
        for height in [1, 699, 700, 701, 1500, 1501, 4000] {
            let slices = slice_segment(0, height, &cap, &MarginProfile::default(), 0);
            assert_eq!(slices.len(), grid.page_count(height), "height {height}");
            assert_eq!(slices.last().map(|s| s.pixel_end), Some(height));
        }
    }

    #[test]
    fn empty_raster_has_no_slices() {
        assert!(slice_segment(0, 0, &capacity(700, 800), &MarginProfile::default(), 0).is_empty());
    }

    #[test]
    fn crop_takes_the_slice_rows() {
        let mut raster = RgbaImage::from_pixel(4, 10, Rgba([255, 255, 255, 255]));
        raster.put_pixel(0, 6, Rgba([0, 0, 0, 255]));
        let slices = slice_segment(0, 10, &capacity(5, 5), &MarginProfile::default(), 0);
        let second = crop_slice(&raster, &slices[1]);
        assert_eq!(second.dimensions(), (4, 5));
        assert_eq!(second.get_pixel(0, 1), &Rgba([0, 0, 0, 255]));
    }
}
