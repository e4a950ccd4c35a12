//! stitchkit - stitch chart engine
//!
//! Turns raster images into cross-stitch charts over a fixed thread palette and
//! edits those charts interactively.
//!
//! ## Features
//!
//! - **Palette extraction** with deterministic OKLab k-means and diverse cluster selection
//! - **Image quantization** onto a grid with bilateral smoothing and speckle cleanup
//! - **Scanline flood fill** with cooperative, epoch-guarded chunking for large grids
//! - **Copy-on-write edits**: paint, replace, merge, delete colors and lasso fill
//!
//! ## Example
//!
//! ```rust,no_run
//! use stitchkit::{load_raster, ChartDocument, Palette, Placement, QuantizeConfig};
//!
//! let palette = Palette::from_json(r##"[{"id":1,"hex":"#FF0000"},{"id":2,"hex":"#0000FF"}]"##)?;
//! let image = load_raster(&std::fs::read("input.png")?)?;
//! let mut chart = ChartDocument::new(80, 60)?;
//! let placement = Placement::fit(80, 60, image.width(), image.height(), 1.0);
//! chart.quantize_image(&image, &palette, &placement, &QuantizeConfig::default());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod chart;
pub mod colors;
pub mod edits;
pub mod error;
pub mod extract;
pub mod fill;
pub mod grid;
pub mod mapper;
pub mod oklab;
pub mod quantize;
pub mod sampler;

pub use chart::ChartDocument;
pub use colors::{Color, LabTable, Palette};
pub use edits::{CanvasPoint, ColorUsage};
pub use error::{ChartError, Result};
pub use extract::{extract_palette, extract_palette_from_image, ExtractionConfig, SelectionWeights};
pub use fill::{
    fill_sync, FillConfig, FillEpoch, FillOutput, FillOutputKind, FillPoll, FillRequest, FillStart,
    FillState, FillTask, FloodFillEngine,
};
pub use grid::{FillRegion, GridPoint, StitchGrid, EMPTY};
pub use mapper::{map_to_palette, PaletteMatch};
pub use quantize::{quantize_image, Placement, QuantizeConfig, SmoothingProfile};
pub use sampler::{load_raster, raster_from_rgba, sample_image, Sample};
