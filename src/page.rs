//! Physical page geometry: page size, orientation, margins and render scale.
//!
//! All physical quantities are millimetres. Nothing here knows about pixels;
//! the conversion happens in [`crate::capacity`].

use serde::{Deserialize, Serialize};

use crate::error::{PaginateError, Result};

/// Millimetres per PDF point.
pub const MM_PER_PT: f32 = 0.352778;

/// Fixed physical page size, constant for the whole document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalPage {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl PhysicalPage {
    /// A4 portrait: 210mm × 297mm.
    pub const fn a4() -> Self {
        Self {
            width_mm: 210.0,
            height_mm: 297.0,
        }
    }

    /// Page size after applying `orientation`; swaps the axes for landscape.
    pub fn oriented(self, orientation: PageOrientation) -> Self {
        match orientation {
            PageOrientation::Portrait => self,
            PageOrientation::Landscape => Self {
                width_mm: self.height_mm,
                height_mm: self.width_mm,
            },
        }
    }

    pub fn width_pt(&self) -> f32 {
        self.width_mm / MM_PER_PT
    }

    pub fn height_pt(&self) -> f32 {
        self.height_mm / MM_PER_PT
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.width_mm.is_finite() && self.width_mm > 0.0) {
            return Err(PaginateError::InvalidConfiguration(format!(
                "page width must be positive, got {}mm",
                self.width_mm
            )));
        }
        if !(self.height_mm.is_finite() && self.height_mm > 0.0) {
            return Err(PaginateError::InvalidConfiguration(format!(
                "page height must be positive, got {}mm",
                self.height_mm
            )));
        }
        Ok(())
    }
}

impl Default for PhysicalPage {
    fn default() -> Self {
        Self::a4()
    }
}

/// Page orientation for the generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

/// Which margin pair a physical page uses.
///
/// Only the very first page of the whole document is `First`; every other
/// page, including the first page of a later segment, is `Continuation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageRole {
    First,
    Continuation,
}

/// Vertical margins in millimetres.
///
/// `top_first` is conventionally 0 and `bottom_first` reserves room for the
/// first page's footer. Continuation pages usually carry a top margin and no
/// bottom margin, relying on per-region reserves instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginProfile {
    pub top_first: f32,
    pub top_other: f32,
    pub bottom_first: f32,
    pub bottom_other: f32,
}

impl Default for MarginProfile {
    fn default() -> Self {
        Self {
            top_first: 0.0,
            top_other: 12.0,
            bottom_first: 12.0,
            bottom_other: 0.0,
        }
    }
}

impl MarginProfile {
    /// The same margins on every page.
    pub fn uniform(top: f32, bottom: f32) -> Self {
        Self {
            top_first: top,
            top_other: top,
            bottom_first: bottom,
            bottom_other: bottom,
        }
    }

    pub fn top(&self, role: PageRole) -> f32 {
        match role {
            PageRole::First => self.top_first,
            PageRole::Continuation => self.top_other,
        }
    }

    pub fn bottom(&self, role: PageRole) -> f32 {
        match role {
            PageRole::First => self.bottom_first,
            PageRole::Continuation => self.bottom_other,
        }
    }

    /// Vertical space left for content on a page of the given role.
    pub fn available_height(&self, page: &PhysicalPage, role: PageRole) -> f32 {
        page.height_mm - self.top(role) - self.bottom(role)
    }

    /// Rejects negative margins and margins that leave no room for content.
    pub fn validate(&self, page: &PhysicalPage) -> Result<()> {
        let fields = [
            ("top_first", self.top_first),
            ("top_other", self.top_other),
            ("bottom_first", self.bottom_first),
            ("bottom_other", self.bottom_other),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PaginateError::InvalidConfiguration(format!(
                    "margin {name} must be >= 0, got {value}mm"
                )));
            }
        }
        for role in [PageRole::First, PageRole::Continuation] {
            let available = self.available_height(page, role);
            if available <= 0.0 {
                return Err(PaginateError::InvalidConfiguration(format!(
                    "{role:?} page margins leave no content height ({available}mm of {}mm)",
                    page.height_mm
                )));
            }
        }
        Ok(())
    }
}

/// Raster pixels per CSS pixel used by the renderer (2.0 = "retina" quality).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderScale(pub f32);

impl RenderScale {
    pub fn get(self) -> f32 {
        self.0
    }

    pub fn validate(self) -> Result<()> {
        if self.0.is_finite() && self.0 > 0.0 {
            Ok(())
        } else {
            Err(PaginateError::InvalidConfiguration(format!(
                "render scale must be positive, got {}",
                self.0
            )))
        }
    }
}

impl Default for RenderScale {
    fn default() -> Self {
        Self(2.0)
    }
}
