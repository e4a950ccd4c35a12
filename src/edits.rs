//! Copy-on-write editing operations. Each returns `None` when nothing changed.

use crate::colors::Palette;
use crate::grid::{FillRegion, GridPoint, StitchGrid, EMPTY};
use crate::oklab::{distance_sq, Lab};
use serde::{Deserialize, Serialize};

/// A point in canvas space, where cell (x, y) spans `[x, x + 1) * cell_size`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasPoint {
    pub x: f32,
    pub y: f32,
}

impl CanvasPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorUsage {
    pub id: u16,
    pub count: usize,
}

fn clamp_region(grid: &StitchGrid, region: Option<FillRegion>) -> Option<FillRegion> {
    region.map(|r| r.clamped(grid.width(), grid.height()))
}

/// Recolor every cell in the region for which `remap` yields a different id.
fn remap_cells<F>(grid: &StitchGrid, region: Option<FillRegion>, mut remap: F) -> Option<StitchGrid>
where
    F: FnMut(u16) -> Option<u16>,
{
    let region = clamp_region(grid, region);
    let mut cells = grid.cells().to_vec();
    let mut changed = false;
    for (idx, cell) in cells.iter_mut().enumerate() {
        if !grid.index_in_region(idx, region.as_ref()) {
            continue;
        }
        if let Some(next) = remap(*cell) {
            if next != *cell {
                *cell = next;
                changed = true;
            }
        }
    }
    changed.then(|| grid.with_cells(cells))
}

pub fn paint_cell(
    grid: &StitchGrid,
    point: GridPoint,
    color: u16,
    region: Option<FillRegion>,
) -> Option<StitchGrid> {
    let current = grid.get(point.x, point.y)?;
    if let Some(region) = clamp_region(grid, region) {
        if !region.contains(point.x, point.y) {
            return None;
        }
    }
    if current == color {
        return None;
    }
    let mut cells = grid.cells().to_vec();
    cells[grid.index(point.x, point.y)] = color;
    Some(grid.with_cells(cells))
}

pub fn replace_color(
    grid: &StitchGrid,
    source: u16,
    target: u16,
    region: Option<FillRegion>,
) -> Option<StitchGrid> {
    if source == target {
        return None;
    }
    remap_cells(grid, region, |id| (id == source).then_some(target))
}

/// Merge several colors into `target`. `target` itself may appear among `sources`.
pub fn merge_colors(
    grid: &StitchGrid,
    sources: &[u16],
    target: u16,
    region: Option<FillRegion>,
) -> Option<StitchGrid> {
    let sources: Vec<u16> = sources.iter().copied().filter(|&id| id != target).collect();
    if sources.is_empty() {
        return None;
    }
    remap_cells(grid, region, |id| sources.contains(&id).then_some(target))
}

/// Histogram of non-empty ids in the region, most used first. Ties keep scan order.
pub fn used_colors(grid: &StitchGrid, region: Option<FillRegion>) -> Vec<ColorUsage> {
    let region = clamp_region(grid, region);
    let mut usage: Vec<ColorUsage> = Vec::new();
    for (idx, &id) in grid.cells().iter().enumerate() {
        if id == EMPTY || !grid.index_in_region(idx, region.as_ref()) {
            continue;
        }
        match usage.iter_mut().find(|u| u.id == id) {
            Some(entry) => entry.count += 1,
            None => usage.push(ColorUsage { id, count: 1 }),
        }
    }
    usage.sort_by(|a, b| b.count.cmp(&a.count));
    usage
}

/// Remove colors from the chart, replacing each with the nearest remaining used color.
///
/// Candidates are the palette colors still used in the region. A deleted id without a
/// usable hex falls back to the first candidate (the most used one).
pub fn delete_colors(
    grid: &StitchGrid,
    palette: &Palette,
    deleted: &[u16],
    region: Option<FillRegion>,
) -> Option<StitchGrid> {
    if deleted.is_empty() {
        return None;
    }
    let available: Vec<u16> = used_colors(grid, region)
        .into_iter()
        .map(|u| u.id)
        .filter(|id| !deleted.contains(id) && palette.get(*id).is_some())
        .collect();
    let &first = available.first()?;

    let lab_of = |id: u16| -> Option<Lab> { palette.get(id).and_then(|c| c.lab()) };
    let candidates: Vec<(u16, Lab)> = available
        .iter()
        .filter_map(|&id| lab_of(id).map(|lab| (id, lab)))
        .collect();
    let fallback = candidates.first().map_or(first, |(id, _)| *id);

    let replacements: Vec<(u16, u16)> = deleted
        .iter()
        .map(|&id| {
            let replacement = lab_of(id)
                .and_then(|lab| {
                    candidates
                        .iter()
                        .map(|(cid, clab)| (*cid, distance_sq(lab, *clab)))
                        .fold(None, |best: Option<(u16, f32)>, (cid, dist)| match best {
                            Some((_, best_dist)) if best_dist <= dist => best,
                            _ => Some((cid, dist)),
                        })
                })
                .map_or(fallback, |(cid, _)| cid);
            (id, replacement)
        })
        .collect();

    log::debug!("Deleting {} colors: {:?}", replacements.len(), replacements);
    remap_cells(grid, region, |id| {
        replacements
            .iter()
            .find(|(from, _)| *from == id)
            .map(|(_, to)| *to)
    })
}

/// Even-odd point-in-polygon test.
pub fn point_in_polygon(point: CanvasPoint, polygon: &[CanvasPoint]) -> bool {
    let mut inside = false;
    let mut j = polygon.len().wrapping_sub(1);
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > point.y) != (b.y > point.y)
            && point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Lasso fill: paint every cell whose center lies inside the polygon.
pub fn fill_polygon(
    grid: &StitchGrid,
    polygon: &[CanvasPoint],
    cell_size: f32,
    color: u16,
    region: Option<FillRegion>,
) -> Option<StitchGrid> {
    if polygon.len() < 3 || !(cell_size > 0.0) {
        return None;
    }
    let region = clamp_region(grid, region);
    let width = grid.width() as usize;
    let mut cells = grid.cells().to_vec();
    let mut changed = false;
    for (idx, cell) in cells.iter_mut().enumerate() {
        if *cell == color || !grid.index_in_region(idx, region.as_ref()) {
            continue;
        }
        let center = CanvasPoint::new(
            ((idx % width) as f32 + 0.5) * cell_size,
            ((idx / width) as f32 + 0.5) * cell_size,
        );
        if point_in_polygon(center, polygon) {
            *cell = color;
            changed = true;
        }
    }
    changed.then(|| grid.with_cells(cells))
}
