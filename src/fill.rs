//! Scanline flood fill with a synchronous path for small grids and a chunked,
//! epoch-guarded path for large ones.

use crate::grid::{FillRegion, GridPoint, StitchGrid};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FillConfig {
    /// Grids with at most this many cells are filled in one call.
    pub sync_cell_limit: usize,
    /// Stack pops processed per scheduling tick on the chunked path.
    pub pops_per_chunk: usize,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            sync_cell_limit: 240_000,
            pops_per_chunk: 1_800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FillOutputKind {
    #[default]
    Grid,
    Cells,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillRequest {
    pub seed: GridPoint,
    pub color: u16,
    pub region: Option<FillRegion>,
    pub output: FillOutputKind,
}

impl FillRequest {
    pub fn new(seed: GridPoint, color: u16) -> Self {
        Self {
            seed,
            color,
            region: None,
            output: FillOutputKind::Grid,
        }
    }

    pub fn within(mut self, region: FillRegion) -> Self {
        self.region = Some(region);
        self
    }

    pub fn as_cells(mut self) -> Self {
        self.output = FillOutputKind::Cells;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutput {
    Grid(StitchGrid),
    /// Flat indices repainted to `color`, in paint order.
    Cells { indices: Vec<usize>, color: u16 },
}

/// Monotonic counter bumped by every grid-mutating action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FillEpoch(pub u64);

impl FillEpoch {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Explicit-stack scanline fill over a private copy of the grid cells.
#[derive(Debug, Clone)]
struct ScanlineFill {
    width: usize,
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
    target: u16,
    replacement: u16,
    cells: Vec<u16>,
    changed: Vec<usize>,
    stack: Vec<(usize, usize)>,
    pops: usize,
}

impl ScanlineFill {
    /// `None` when the request cannot change anything.
    fn new(grid: &StitchGrid, request: &FillRequest) -> Option<Self> {
        let GridPoint { x, y } = request.seed;
        let target = grid.get(x, y)?;
        if target == request.color {
            return None;
        }
        let bounds = match request.region {
            Some(region) => {
                let region = region.clamped(grid.width(), grid.height());
                if !region.contains(x, y) {
                    return None;
                }
                region
            }
            None => FillRegion::new(0, 0, grid.width() - 1, grid.height() - 1),
        };

        let mut stack = Vec::with_capacity(grid.len());
        stack.push((x as usize, y as usize));
        Some(Self {
            width: grid.width() as usize,
            x0: bounds.x0 as usize,
            y0: bounds.y0 as usize,
            x1: bounds.x1 as usize,
            y1: bounds.y1 as usize,
            target,
            replacement: request.color,
            cells: grid.cells().to_vec(),
            changed: Vec::new(),
            stack,
            pops: 0,
        })
    }

    fn is_done(&self) -> bool {
        self.stack.is_empty()
    }

    /// Process up to `budget` pops. Returns true once the stack is exhausted.
    fn run(&mut self, budget: usize) -> bool {
        for _ in 0..budget {
            let Some((x, y)) = self.stack.pop() else {
                return true;
            };
            self.pops += 1;
            if x < self.x0 || x > self.x1 || y < self.y0 || y > self.y1 {
                continue;
            }
            let row = y * self.width;
            if self.cells[row + x] != self.target {
                continue;
            }

            let mut xl = x;
            while xl > self.x0 && self.cells[row + xl - 1] == self.target {
                xl -= 1;
            }
            let mut xr = x;
            while xr < self.x1 && self.cells[row + xr + 1] == self.target {
                xr += 1;
            }
            for idx in row + xl..=row + xr {
                self.cells[idx] = self.replacement;
                self.changed.push(idx);
            }

            if y > self.y0 {
                self.push_runs(y - 1, xl, xr);
            }
            if y < self.y1 {
                self.push_runs(y + 1, xl, xr);
            }
        }
        self.is_done()
    }

    /// One seed per contiguous target-colored run of row `y` within [xl, xr].
    fn push_runs(&mut self, y: usize, xl: usize, xr: usize) {
        let row = y * self.width;
        let mut in_run = false;
        for x in xl..=xr {
            if self.cells[row + x] == self.target {
                if !in_run {
                    self.stack.push((x, y));
                    in_run = true;
                }
            } else {
                in_run = false;
            }
        }
    }

    fn into_output(self, grid: &StitchGrid, kind: FillOutputKind) -> Option<FillOutput> {
        if self.changed.is_empty() {
            return None;
        }
        Some(match kind {
            FillOutputKind::Grid => FillOutput::Grid(grid.with_cells(self.cells)),
            FillOutputKind::Cells => FillOutput::Cells {
                indices: self.changed,
                color: self.replacement,
            },
        })
    }
}

/// Run a fill to completion regardless of grid size.
pub fn fill_sync(grid: &StitchGrid, request: &FillRequest) -> Option<FillOutput> {
    let mut fill = ScanlineFill::new(grid, request)?;
    fill.run(usize::MAX);
    fill.into_output(grid, request.output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    Running,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillPoll {
    Pending,
    Ready(Option<FillOutput>),
    Aborted,
}

/// A chunked fill bound to the epoch and grid reference it started from.
#[derive(Debug)]
pub struct FillTask {
    epoch: FillEpoch,
    snapshot: Arc<StitchGrid>,
    output: FillOutputKind,
    pops_per_chunk: usize,
    fill: Option<ScanlineFill>,
    state: FillState,
    chunks: usize,
    started: Instant,
}

impl FillTask {
    pub fn epoch(&self) -> FillEpoch {
        self.epoch
    }

    pub fn state(&self) -> FillState {
        self.state
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Stack pops performed so far, discarded seeds included.
    pub fn pops(&self) -> usize {
        self.fill.as_ref().map_or(0, |f| f.pops)
    }

    /// Whether this task still belongs to the live document state.
    pub fn is_current(&self, epoch: FillEpoch, live: &Arc<StitchGrid>) -> bool {
        self.epoch == epoch && Arc::ptr_eq(&self.snapshot, live)
    }

    /// Run one chunk if the task is still current.
    ///
    /// A finished task keeps reporting its terminal state: `Ready(None)` after
    /// completion, `Aborted` after an abort.
    pub fn poll(&mut self, epoch: FillEpoch, live: &Arc<StitchGrid>) -> FillPoll {
        match self.state {
            FillState::Completed => return FillPoll::Ready(None),
            FillState::Aborted => return FillPoll::Aborted,
            FillState::Running => {}
        }
        if !self.is_current(epoch, live) {
            log::debug!(
                "Fill from epoch {} aborted after {} chunks (live epoch {})",
                self.epoch.0,
                self.chunks,
                epoch.0
            );
            self.state = FillState::Aborted;
            self.fill = None;
            return FillPoll::Aborted;
        }

        let Some(fill) = self.fill.as_mut() else {
            self.state = FillState::Aborted;
            return FillPoll::Aborted;
        };
        self.chunks += 1;
        if !fill.run(self.pops_per_chunk) {
            return FillPoll::Pending;
        }

        self.state = FillState::Completed;
        let Some(fill) = self.fill.take() else {
            return FillPoll::Ready(None);
        };
        log::info!(
            "Chunked fill finished: {} cells in {} chunks ({} pops), {}ms",
            fill.changed.len(),
            self.chunks,
            fill.pops,
            self.started.elapsed().as_millis()
        );
        FillPoll::Ready(fill.into_output(&self.snapshot, self.output))
    }
}

pub enum FillStart {
    Done(Option<FillOutput>),
    Chunked(FillTask),
}

#[derive(Debug, Clone, Default)]
pub struct FloodFillEngine {
    config: FillConfig,
}

impl FloodFillEngine {
    pub fn new(config: FillConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FillConfig {
        &self.config
    }

    /// Pick the synchronous or chunked path by grid size.
    pub fn start(
        &self,
        grid: &Arc<StitchGrid>,
        epoch: FillEpoch,
        request: &FillRequest,
    ) -> FillStart {
        let Some(fill) = ScanlineFill::new(grid, request) else {
            return FillStart::Done(None);
        };
        if grid.len() <= self.config.sync_cell_limit {
            let mut fill = fill;
            fill.run(usize::MAX);
            return FillStart::Done(fill.into_output(grid, request.output));
        }

        log::debug!(
            "Starting chunked fill on {}x{} grid at epoch {}",
            grid.width(),
            grid.height(),
            epoch.0
        );
        FillStart::Chunked(FillTask {
            epoch,
            snapshot: Arc::clone(grid),
            output: request.output,
            pops_per_chunk: self.config.pops_per_chunk.max(1),
            fill: Some(fill),
            state: FillState::Running,
            chunks: 0,
            started: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_from(rows: &[&str]) -> StitchGrid {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let cells = rows
            .iter()
            .flat_map(|r| r.bytes().map(|b| (b - b'0') as u16))
            .collect();
        StitchGrid::from_cells(width, height, cells).unwrap()
    }

    fn filled_grid(output: Option<FillOutput>) -> StitchGrid {
        match output {
            Some(FillOutput::Grid(grid)) => grid,
            other => panic!("expected grid output, got {:?}", other),
        }
    }

    #[test]
    fn fills_enclosed_region_only() {
        let grid = grid_from(&["11111", "10001", "10101", "10001", "11111", "00000"]);
        let out = filled_grid(fill_sync(&grid, &FillRequest::new(GridPoint::new(1, 1), 7)));
        assert_eq!(
            out,
            grid_from(&["11111", "17771", "17171", "17771", "11111", "00000"])
        );
    }

    #[test]
    fn same_color_is_noop() {
        let grid = grid_from(&["112", "122"]);
        assert!(fill_sync(&grid, &FillRequest::new(GridPoint::new(0, 0), 1)).is_none());
    }

    #[test]
    fn isolated_cell_changes_alone() {
        let grid = grid_from(&["111", "131", "111"]);
        let out = fill_sync(&grid, &FillRequest::new(GridPoint::new(1, 1), 4).as_cells());
        assert_eq!(
            out,
            Some(FillOutput::Cells {
                indices: vec![4],
                color: 4
            })
        );
    }

    #[test]
    fn region_clips_the_fill() {
        let grid = StitchGrid::new(6, 4).unwrap();
        let request = FillRequest::new(GridPoint::new(2, 1), 3).within(FillRegion::new(1, 1, 3, 2));
        let out = filled_grid(fill_sync(&grid, &request));
        assert_eq!(
            out,
            grid_from(&["000000", "033300", "033300", "000000"])
        );
    }

    #[test]
    fn seed_outside_grid_or_region_is_noop() {
        let grid = StitchGrid::new(4, 4).unwrap();
        assert!(fill_sync(&grid, &FillRequest::new(GridPoint::new(4, 0), 2)).is_none());
        let request = FillRequest::new(GridPoint::new(0, 0), 2).within(FillRegion::new(1, 1, 3, 3));
        assert!(fill_sync(&grid, &request).is_none());
    }

    #[test]
    fn follows_winding_corridors() {
        let grid = grid_from(&["0000000", "1111110", "0000000", "0111111", "0000000"]);
        let out = fill_sync(&grid, &FillRequest::new(GridPoint::new(0, 0), 5).as_cells());
        let Some(FillOutput::Cells { mut indices, .. }) = out else {
            panic!("expected cells output");
        };
        indices.sort_unstable();
        let zeros: Vec<usize> = grid
            .cells()
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == 0)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(indices, zeros);
    }

    #[test]
    fn uniform_grid_needs_one_pop_per_row() {
        let grid = StitchGrid::new(50, 50).unwrap();
        let request = FillRequest::new(GridPoint::new(20, 30), 5);
        let mut fill = ScanlineFill::new(&grid, &request).unwrap();
        assert!(fill.run(usize::MAX));
        assert_eq!(fill.changed.len(), 2_500);
        assert!(fill.pops <= grid.len());
    }

    #[test]
    fn chunked_fill_matches_sync() {
        let grid = Arc::new(grid_from(&[
            "0001000", "0001000", "0111110", "0000000", "1111100", "0000000",
        ]));
        let request = FillRequest::new(GridPoint::new(0, 0), 9);
        let engine = FloodFillEngine::new(FillConfig {
            sync_cell_limit: 0,
            pops_per_chunk: 1,
        });
        let epoch = FillEpoch(3);
        let FillStart::Chunked(mut task) = engine.start(&grid, epoch, &request) else {
            panic!("expected chunked start");
        };

        let output = loop {
            match task.poll(epoch, &grid) {
                FillPoll::Pending => continue,
                FillPoll::Ready(output) => break output,
                FillPoll::Aborted => panic!("task should stay current"),
            }
        };
        assert!(task.chunks() > 1);
        assert_eq!(task.state(), FillState::Completed);
        assert_eq!(output, fill_sync(&grid, &request));
        assert_eq!(task.poll(epoch, &grid), FillPoll::Ready(None));
    }

    #[test]
    fn stale_task_aborts_at_chunk_boundary() {
        let grid = Arc::new(StitchGrid::new(8, 8).unwrap());
        let engine = FloodFillEngine::new(FillConfig {
            sync_cell_limit: 0,
            pops_per_chunk: 2,
        });
        let FillStart::Chunked(mut task) =
            engine.start(&grid, FillEpoch(1), &FillRequest::new(GridPoint::new(0, 0), 2))
        else {
            panic!("expected chunked start");
        };
        assert_eq!(task.poll(FillEpoch(1), &grid), FillPoll::Pending);

        // Same epoch but a different grid reference is stale too.
        let replaced = Arc::new(StitchGrid::new(8, 8).unwrap());
        assert_eq!(task.poll(FillEpoch(1), &replaced), FillPoll::Aborted);
        assert_eq!(task.state(), FillState::Aborted);
        assert_eq!(task.poll(FillEpoch(1), &grid), FillPoll::Aborted);
    }
}
