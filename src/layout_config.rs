//! Document layout – a serialisable snapshot of a composed document: which
//! rows of which segment land on each page, and where every protected
//! region ended up. Useful for inspecting pagination without the rasters.

use serde::{Deserialize, Serialize};

use crate::compositor::{Document, RegionPlacement};
use crate::error::Result;
use crate::page::PageRole;

/// A complete document layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLayout {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "DocumentLayout::default_title")]
    pub title: String,
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
    #[serde(default)]
    pub regions: Vec<RegionPlacement>,
}

/// One physical page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub segment_index: usize,
    pub role: PageRole,
    /// Raster rows `pixel_start..pixel_end` of the segment.
    pub pixel_start: u32,
    pub pixel_end: u32,
    pub top_offset_mm: f32,
}

impl DocumentLayout {
    pub fn from_document(document: &Document, title: &str) -> Self {
        let page = document.page();
        Self {
            title: title.to_string(),
            page_width_mm: page.width_mm,
            page_height_mm: page.height_mm,
            pages: document
                .slices()
                .iter()
                .map(|s| PageLayout {
                    page_index: s.page_index,
                    segment_index: s.segment_index,
                    role: s.role,
                    pixel_start: s.pixel_start,
                    pixel_end: s.pixel_end,
                    top_offset_mm: s.top_offset_mm,
                })
                .collect(),
            regions: document.region_placements(),
        }
    }

    fn default_title() -> String {
        "page-forge output".to_string()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Pages holding rows of segment `segment_index`.
    pub fn pages_of_segment(&self, segment_index: usize) -> impl Iterator<Item = &PageLayout> {
        self.pages.iter().filter(move |p| p.segment_index == segment_index)
    }

    /// Serialise to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::RegionKind;

    fn sample() -> DocumentLayout {
        DocumentLayout {
            title: "ledger".to_string(),
            page_width_mm: 210.0,
            page_height_mm: 297.0,
            pages: vec![
                PageLayout {
                    page_index: 0,
                    segment_index: 0,
                    role: PageRole::First,
                    pixel_start: 0,
                    pixel_end: 2155,
                    top_offset_mm: 0.0,
                },
                PageLayout {
                    page_index: 1,
                    segment_index: 1,
                    role: PageRole::Continuation,
                    pixel_start: 0,
                    pixel_end: 400,
                    top_offset_mm: 12.0,
                },
            ],
            regions: vec![RegionPlacement {
                segment_index: 1,
                anchor: 4,
                kind: RegionKind::ForcedBreak,
                offset_px: 0.0,
                height_px: 20.0,
                first_page: 1,
                last_page: 1,
            }],
        }
    }

    #[test]
    fn json_uses_snake_case_enums() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"role\": \"continuation\""));
        assert!(json.contains("\"kind\": \"forced_break\""));
        assert_eq!(DocumentLayout::from_json(&json).unwrap(), sample());
    }

    #[test]
    fn missing_title_and_regions_default() {
        let json = r#"{"page_width_mm": 210.0, "page_height_mm": 297.0, "pages": []}"#;
        let layout = DocumentLayout::from_json(json).unwrap();
        assert_eq!(layout.title, "page-forge output");
        assert!(layout.regions.is_empty());
        assert_eq!(layout.page_count(), 0);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(DocumentLayout::from_json("{ nope").is_err());
    }

    #[test]
    fn pages_by_segment() {
        let layout = sample();
        assert_eq!(layout.pages_of_segment(1).count(), 1);
        assert_eq!(layout.pages_of_segment(2).count(), 0);
    }
}
