//! Live chart state: a shared immutable grid plus the epoch that invalidates stale fills.

use crate::colors::Palette;
use crate::edits::{self, CanvasPoint, ColorUsage};
use crate::error::Result;
use crate::fill::{
    FillConfig, FillEpoch, FillOutput, FillPoll, FillRequest, FillStart, FillState, FillTask,
    FloodFillEngine,
};
use crate::grid::{FillRegion, GridPoint, StitchGrid};
use crate::quantize::{self, Placement, QuantizeConfig};
use image::RgbaImage;
use std::sync::Arc;

/// Owns the current grid. Every committed change installs a fresh `Arc` and bumps the
/// epoch, so readers holding an older grid keep a consistent snapshot.
#[derive(Debug, Clone)]
pub struct ChartDocument {
    grid: Arc<StitchGrid>,
    epoch: FillEpoch,
    engine: FloodFillEngine,
}

impl ChartDocument {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self::from_grid(StitchGrid::new(width, height)?))
    }

    pub fn from_grid(grid: StitchGrid) -> Self {
        Self {
            grid: Arc::new(grid),
            epoch: FillEpoch::default(),
            engine: FloodFillEngine::default(),
        }
    }

    pub fn with_fill_config(mut self, config: FillConfig) -> Self {
        self.engine = FloodFillEngine::new(config);
        self
    }

    pub fn grid(&self) -> &Arc<StitchGrid> {
        &self.grid
    }

    pub fn epoch(&self) -> FillEpoch {
        self.epoch
    }

    fn begin_action(&mut self) {
        self.epoch = self.epoch.next();
    }

    fn commit(&mut self, grid: StitchGrid) {
        self.grid = Arc::new(grid);
        self.epoch = self.epoch.next();
    }

    fn commit_edit(&mut self, edited: Option<StitchGrid>) -> bool {
        self.begin_action();
        match edited {
            Some(grid) => {
                self.commit(grid);
                true
            }
            None => false,
        }
    }

    /// Start a flood fill. Small grids are filled and committed immediately (`None`);
    /// larger ones return a task to be driven with [`poll_fill`](Self::poll_fill).
    pub fn begin_fill(&mut self, request: &FillRequest) -> Option<FillTask> {
        self.begin_action();
        match self.engine.start(&self.grid, self.epoch, request) {
            FillStart::Done(Some(output)) => {
                self.apply_fill(output);
                None
            }
            FillStart::Done(None) => None,
            FillStart::Chunked(task) => Some(task),
        }
    }

    /// Run one chunk of `task`, committing its result when it completes while still
    /// current.
    pub fn poll_fill(&mut self, task: &mut FillTask) -> FillState {
        match task.poll(self.epoch, &self.grid) {
            FillPoll::Pending => FillState::Running,
            FillPoll::Aborted => FillState::Aborted,
            FillPoll::Ready(output) => {
                if !task.is_current(self.epoch, &self.grid) {
                    return FillState::Aborted;
                }
                if let Some(output) = output {
                    self.apply_fill(output);
                }
                FillState::Completed
            }
        }
    }

    /// Drive `task` to a terminal state, calling `between_ticks` after every chunk that
    /// leaves it pending. The callback may start other edits on the document.
    pub fn drive_fill<F>(&mut self, mut task: FillTask, mut between_ticks: F) -> FillState
    where
        F: FnMut(&mut ChartDocument),
    {
        loop {
            match self.poll_fill(&mut task) {
                FillState::Running => between_ticks(self),
                state => return state,
            }
        }
    }

    /// Install a fill result. Returns whether the grid changed.
    pub fn apply_fill(&mut self, output: FillOutput) -> bool {
        match output {
            FillOutput::Grid(grid) => {
                if grid.width() != self.grid.width() || grid.height() != self.grid.height() {
                    log::warn!(
                        "Ignoring fill result of {}x{} for {}x{} grid",
                        grid.width(),
                        grid.height(),
                        self.grid.width(),
                        self.grid.height()
                    );
                    return false;
                }
                self.commit(grid);
                true
            }
            FillOutput::Cells { indices, color } => {
                let mut cells = self.grid.cells().to_vec();
                let mut changed = false;
                for idx in indices {
                    if let Some(cell) = cells.get_mut(idx) {
                        if *cell != color {
                            *cell = color;
                            changed = true;
                        }
                    }
                }
                if changed {
                    let grid = self.grid.with_cells(cells);
                    self.commit(grid);
                }
                changed
            }
        }
    }

    /// Quantize `image` over the current grid dimensions and commit the result.
    pub fn quantize_image(
        &mut self,
        image: &RgbaImage,
        palette: &Palette,
        placement: &Placement,
        config: &QuantizeConfig,
    ) -> bool {
        let quantized = quantize::quantize_image(image, &self.grid, palette, placement, config);
        self.commit_edit(quantized)
    }

    pub fn paint_cell(&mut self, point: GridPoint, color: u16, region: Option<FillRegion>) -> bool {
        let edited = edits::paint_cell(&self.grid, point, color, region);
        self.commit_edit(edited)
    }

    pub fn replace_color(&mut self, source: u16, target: u16, region: Option<FillRegion>) -> bool {
        let edited = edits::replace_color(&self.grid, source, target, region);
        self.commit_edit(edited)
    }

    pub fn merge_colors(
        &mut self,
        sources: &[u16],
        target: u16,
        region: Option<FillRegion>,
    ) -> bool {
        let edited = edits::merge_colors(&self.grid, sources, target, region);
        self.commit_edit(edited)
    }

    pub fn delete_colors(
        &mut self,
        palette: &Palette,
        deleted: &[u16],
        region: Option<FillRegion>,
    ) -> bool {
        let edited = edits::delete_colors(&self.grid, palette, deleted, region);
        self.commit_edit(edited)
    }

    pub fn fill_polygon(
        &mut self,
        polygon: &[CanvasPoint],
        cell_size: f32,
        color: u16,
        region: Option<FillRegion>,
    ) -> bool {
        let edited = edits::fill_polygon(&self.grid, polygon, cell_size, color, region);
        self.commit_edit(edited)
    }

    /// Replace the chart with an empty grid of new dimensions.
    pub fn reset(&mut self, width: u32, height: u32) -> Result<()> {
        let grid = StitchGrid::new(width, height)?;
        self.begin_action();
        self.commit(grid);
        Ok(())
    }

    pub fn used_colors(&self, region: Option<FillRegion>) -> Vec<ColorUsage> {
        edits::used_colors(&self.grid, region)
    }
}
