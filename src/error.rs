//! Error type shared by every stage of the pagination pipeline.

use thiserror::Error;

use crate::raster::RenderError;

/// Everything that can go wrong while producing a paginated document.
#[derive(Debug, Error)]
pub enum PaginateError {
    /// Page size, margins, viewport or scale are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The raster renderer failed; passed through untouched.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// A shared renderer could not be acquired (a previous holder panicked).
    #[error("renderer unavailable: {0}")]
    RendererUnavailable(String),

    #[error("page {0} is out of range")]
    PageOutOfRange(usize),

    #[error("encoding error: {0}")]
    Encode(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PaginateError>;
