//! # page-forge – paginate rendered HTML segments into fixed-size pages
//!
//! Long content is rendered to a tall raster, cut into page-sized slices and
//! assembled into a multi-page document without splitting table rows or
//! blocks marked as unsplittable. The pipeline stages are:
//!
//! 1. **Render** – markup → raster plus marked element boxes ([`raster`],
//!    built on [`dom`], [`style`], [`fonts`] and [`layout`])
//! 2. **Measure** – page capacity in raster pixels ([`capacity`])
//! 3. **Scan** – collect protected regions ([`scanner`])
//! 4. **Inject** – insert spacers before regions that would straddle a page
//!    boundary, then re-render ([`spacer`])
//! 5. **Slice** – cut the final raster into pages ([`slicer`])
//! 6. **Compose** – assemble segments into one document ([`compositor`])
//! 7. **Encode** – emit PDF bytes via printpdf ([`pdf`])
//!
//! [`pipeline`] runs all of it from a [`pipeline::PipelineConfig`].

pub mod capacity;
pub mod compositor;
pub mod dom;
pub mod error;
pub mod fonts;
pub mod handle;
pub mod layout;
pub mod layout_config;
pub mod page;
pub mod pdf;
pub mod pipeline;
pub mod raster;
pub mod scanner;
pub mod slicer;
pub mod spacer;
pub mod style;
pub mod templates;

// Re-exports for convenience
pub use compositor::{Document, DocumentCompositor, Segment};
pub use error::{PaginateError, Result};
pub use pipeline::{compose_document, generate_pdf, generate_pdf_from_html, PipelineConfig};
pub use raster::{MarkupRenderer, RasterRenderer};
