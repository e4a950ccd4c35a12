use thiserror::Error;

/// Errors raised while building chart data. Computation over valid data never fails;
/// degenerate inputs produce empty results instead.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("grid dimensions must be non-zero, got {width}x{height}")]
    EmptyGrid { width: u32, height: u32 },

    #[error("grid dimensions {width}x{height} exceed the addressable cell count")]
    GridTooLarge { width: u32, height: u32 },

    #[error("grid buffer has {actual} cells, expected {expected}")]
    GridSizeMismatch { expected: usize, actual: usize },

    #[error("color id 0 is reserved for empty cells")]
    ReservedColorId,

    #[error("duplicate color id {0} in palette")]
    DuplicateColorId(u16),

    #[error("raster buffer has {actual} bytes, expected {expected}")]
    RasterSizeMismatch { expected: usize, actual: usize },

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to parse palette: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChartError>;
