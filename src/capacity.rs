//! Page capacity – how many raster pixel rows of content fit on a page.
//!
//! Content is rendered at a fixed pixel width, so the pixel-per-millimetre
//! ratio actually realised by the renderer is `content_width_px / page width`.
//! The available vertical space of each page role is converted through that
//! ratio and floored to whole pixel rows.
//!
//! Capacities carry a phase marker. [`Estimated`] capacities come from the
//! measuring render and drive spacer injection; [`Final`] capacities come
//! from the post-spacer render and drive slicing. The two are different
//! types so one cannot be passed where the other is expected.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{PaginateError, Result};
use crate::page::{MarginProfile, PageRole, PhysicalPage};

/// Tolerance for deciding that an offset sits exactly on a page boundary.
///
/// Spacer heights are rounded up to whole pixels, so a pushed region lands
/// less than one pixel past the boundary it was pushed to.
pub const BOUNDARY_EPSILON_PX: f64 = 1.0;

mod sealed {
    pub trait Sealed {}
}

/// Marker trait for the two capacity phases.
pub trait CapacityPhase: sealed::Sealed {
    const NAME: &'static str;
}

/// Capacity measured before spacers are injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimated;

/// Capacity measured on the raster that is actually sliced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Final;

impl sealed::Sealed for Estimated {}
impl sealed::Sealed for Final {}

impl CapacityPhase for Estimated {
    const NAME: &'static str = "estimated";
}

impl CapacityPhase for Final {
    const NAME: &'static str = "final";
}

/// Raster pixel budget of the first page and of continuation pages.
pub struct PageCapacity<P> {
    first_px: u32,
    other_px: u32,
    content_width_px: u32,
    _phase: PhantomData<P>,
}

// Manual impls: derives would put bounds on the phase marker.
impl<P> Clone for PageCapacity<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for PageCapacity<P> {}

impl<P> PartialEq for PageCapacity<P> {
    fn eq(&self, other: &Self) -> bool {
        self.first_px == other.first_px
            && self.other_px == other.other_px
            && self.content_width_px == other.content_width_px
    }
}

impl<P: CapacityPhase> fmt::Debug for PageCapacity<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCapacity")
            .field("phase", &P::NAME)
            .field("first_px", &self.first_px)
            .field("other_px", &self.other_px)
            .field("content_width_px", &self.content_width_px)
            .finish()
    }
}

impl<P: CapacityPhase> PageCapacity<P> {
    /// Build a capacity from raw pixel counts. Both must be non-zero.
    pub fn from_px(first_px: u32, other_px: u32, content_width_px: u32) -> Result<Self> {
        if first_px == 0 || other_px == 0 {
            return Err(PaginateError::InvalidConfiguration(format!(
                "page capacity must be at least one pixel row (first={first_px}, other={other_px})"
            )));
        }
        Ok(Self {
            first_px,
            other_px,
            content_width_px,
            _phase: PhantomData,
        })
    }

    pub fn first_px(&self) -> u32 {
        self.first_px
    }

    pub fn other_px(&self) -> u32 {
        self.other_px
    }

    pub fn content_width_px(&self) -> u32 {
        self.content_width_px
    }

    pub fn for_role(&self, role: PageRole) -> u32 {
        match role {
            PageRole::First => self.first_px,
            PageRole::Continuation => self.other_px,
        }
    }

    /// Page boundaries of a segment whose leading page has `leading` role.
    pub fn grid(&self, leading: PageRole) -> PageGrid<P> {
        PageGrid {
            first_px: self.for_role(leading),
            other_px: self.other_px,
            _phase: PhantomData,
        }
    }
}

impl PageCapacity<Estimated> {
    /// True when slicing will cut at exactly the boundaries spacers were
    /// planned against.
    pub fn agrees_with(&self, fin: &PageCapacity<Final>) -> bool {
        self.first_px == fin.first_px && self.other_px == fin.other_px
    }
}

/// Converts physical page space into raster pixel capacities.
#[derive(Debug, Clone, Copy)]
pub struct PageCapacityCalculator {
    page: PhysicalPage,
    margins: MarginProfile,
}

impl PageCapacityCalculator {
    pub fn new(page: PhysicalPage, margins: MarginProfile) -> Result<Self> {
        page.validate()?;
        margins.validate(&page)?;
        Ok(Self { page, margins })
    }

    pub fn page(&self) -> &PhysicalPage {
        &self.page
    }

    pub fn margins(&self) -> &MarginProfile {
        &self.margins
    }

    /// Capacity for the measuring pass, from the measured raster width.
    pub fn estimate(&self, content_width_px: u32) -> Result<PageCapacity<Estimated>> {
        self.compute(content_width_px)
    }

    /// Capacity for slicing, from the width of the raster being sliced.
    pub fn finalize(&self, content_width_px: u32) -> Result<PageCapacity<Final>> {
        self.compute(content_width_px)
    }

    /// Raster pixels per millimetre for content of the given width.
    pub fn px_per_mm(&self, content_width_px: u32) -> f64 {
        content_width_px as f64 / self.page.width_mm as f64
    }

    fn compute<P: CapacityPhase>(&self, content_width_px: u32) -> Result<PageCapacity<P>> {
        if content_width_px == 0 {
            return Err(PaginateError::InvalidConfiguration(
                "content width must be at least one pixel".to_string(),
            ));
        }
        let ratio = self.px_per_mm(content_width_px);
        let rows = |role: PageRole| -> u32 {
            let available = self.margins.available_height(&self.page, role) as f64;
            (available * ratio).floor().max(0.0) as u32
        };
        let capacity = PageCapacity::from_px(
            rows(PageRole::First),
            rows(PageRole::Continuation),
            content_width_px,
        )?;
        log::debug!("{} capacity: {capacity:?}", P::NAME);
        Ok(capacity)
    }
}

/// Where an absolute raster offset falls within a segment's pages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePosition {
    /// Page index relative to the segment's leading page.
    pub page: usize,
    /// Distance from the top of that page's content area, in raster pixels.
    pub position_px: f64,
    /// Capacity of that page.
    pub capacity_px: u32,
}

impl PagePosition {
    pub fn remaining_px(&self) -> f64 {
        self.capacity_px as f64 - self.position_px
    }

    pub fn at_page_top(&self) -> bool {
        self.position_px == 0.0
    }
}

/// Page boundaries of one segment: the leading page holds `first_px` rows,
/// every later page `other_px` rows.
pub struct PageGrid<P> {
    first_px: u32,
    other_px: u32,
    _phase: PhantomData<P>,
}

impl<P> Clone for PageGrid<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for PageGrid<P> {}

impl<P: CapacityPhase> fmt::Debug for PageGrid<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageGrid")
            .field("phase", &P::NAME)
            .field("first_px", &self.first_px)
            .field("other_px", &self.other_px)
            .finish()
    }
}

impl<P: CapacityPhase> PageGrid<P> {
    pub fn first_px(&self) -> u32 {
        self.first_px
    }

    pub fn other_px(&self) -> u32 {
        self.other_px
    }

    pub fn capacity_of(&self, page: usize) -> u32 {
        if page == 0 {
            self.first_px
        } else {
            self.other_px
        }
    }

    /// First raster row of `page`.
    pub fn page_start(&self, page: usize) -> u64 {
        if page == 0 {
            0
        } else {
            self.first_px as u64 + (page as u64 - 1) * self.other_px as u64
        }
    }

    /// Locate `offset_px`, honouring the leading page's own capacity.
    ///
    /// Offsets within [`BOUNDARY_EPSILON_PX`] of a boundary snap onto the top
    /// of the page that begins there.
    pub fn locate(&self, offset_px: f64) -> PagePosition {
        let offset = offset_px.max(0.0);
        let first = self.first_px as f64;
        let (page, position) = if offset < first {
            (0, offset)
        } else {
            let other = self.other_px as f64;
            let rest = offset - first;
            let index = (rest / other).floor();
            (1 + index as usize, rest - index * other)
        };
        self.snap(page, position)
    }

    /// Locate `offset_px` as if every page held `other_px` rows.
    pub fn locate_uniform(&self, offset_px: f64) -> PagePosition {
        let offset = offset_px.max(0.0);
        let other = self.other_px as f64;
        let index = (offset / other).floor();
        let position = offset - index * other;
        snap_position(index as usize, position, |_| self.other_px)
    }

    fn snap(&self, page: usize, position: f64) -> PagePosition {
        snap_position(page, position, |p| self.capacity_of(p))
    }

    /// Number of pages a raster of `height_px` rows occupies:
    /// `1 + ceil(max(0, H - first) / other)`, or 0 for an empty raster.
    pub fn page_count(&self, height_px: u32) -> usize {
        if height_px == 0 {
            return 0;
        }
        let overflow = height_px.saturating_sub(self.first_px);
        1 + overflow.div_ceil(self.other_px) as usize
    }
}

fn snap_position(page: usize, position: f64, capacity_of: impl Fn(usize) -> u32) -> PagePosition {
    let capacity = capacity_of(page);
    if capacity as f64 - position < BOUNDARY_EPSILON_PX {
        PagePosition {
            page: page + 1,
            position_px: 0.0,
            capacity_px: capacity_of(page + 1),
        }
    } else if position < BOUNDARY_EPSILON_PX {
        PagePosition {
            page,
            position_px: 0.0,
            capacity_px: capacity,
        }
    } else {
        PagePosition {
            page,
            position_px: position,
            capacity_px: capacity,
        }
    }
}
