//! Image to stitch-grid quantization.
//!
//! Pipeline: per-cell sampling through the placement, bilateral smoothing, nearest
//! allowed-palette assignment, edge-aware speckle cleanup and majority-vote smoothing.

use crate::colors::{LabTable, Palette};
use crate::extract::{extract_palette_from_image, ExtractionConfig};
use crate::grid::{StitchGrid, EMPTY};
use crate::mapper::matched_ids;
use crate::oklab::{distance_sq, rgb_to_oklab, Lab};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Affine placement of the source image over the grid canvas.
///
/// Cell (x, y) has its center at `((x + 0.5) * cell_size, (y + 0.5) * cell_size)` in
/// canvas space; the image is drawn at `offset` and scaled uniformly by `scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub offset_x: f32,
    pub offset_y: f32,
    pub scale: f32,
    pub cell_size: f32,
}

impl Placement {
    /// One image pixel per cell, anchored at the top-left corner.
    pub fn identity() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
            cell_size: 1.0,
        }
    }

    /// Scale the image to fit inside the grid canvas and center it.
    pub fn fit(
        grid_width: u32,
        grid_height: u32,
        image_width: u32,
        image_height: u32,
        cell_size: f32,
    ) -> Self {
        let canvas_w = grid_width as f32 * cell_size;
        let canvas_h = grid_height as f32 * cell_size;
        if image_width == 0 || image_height == 0 {
            return Self {
                offset_x: 0.0,
                offset_y: 0.0,
                scale: 1.0,
                cell_size,
            };
        }
        let scale = (canvas_w / image_width as f32).min(canvas_h / image_height as f32);
        Self {
            offset_x: (canvas_w - image_width as f32 * scale) / 2.0,
            offset_y: (canvas_h - image_height as f32 * scale) / 2.0,
            scale,
            cell_size,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.scale.is_finite()
            && self.scale > 0.0
            && self.cell_size.is_finite()
            && self.cell_size > 0.0
            && self.offset_x.is_finite()
            && self.offset_y.is_finite()
    }

    /// Image-space position of the center of cell (x, y).
    pub fn image_point(&self, x: u32, y: u32) -> (f32, f32) {
        let cx = (x as f32 + 0.5) * self.cell_size;
        let cy = (y as f32 + 0.5) * self.cell_size;
        ((cx - self.offset_x) / self.scale, (cy - self.offset_y) / self.scale)
    }
}

/// Smoothing and cleanup parameters. Empirical defaults derived from one strength value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmoothingProfile {
    pub bilateral: bool,
    pub radius: u32,
    pub spatial_sigma: f32,
    pub range_sigma: f32,
    /// Components at or below this size are speckle candidates.
    pub min_blob_size: usize,
    /// OKLab distance above which a cell counts as a true color boundary.
    pub edge_threshold: f32,
    pub majority_passes: u32,
    /// Neighbor votes (out of 8) needed to flip a cell.
    pub majority_votes: u32,
}

impl SmoothingProfile {
    /// Monotonic mapping: higher strength widens the filter, raises the speckle size
    /// and lowers the edge threshold so more cells take part in smoothing.
    pub fn from_strength(strength: f32) -> Self {
        let s = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let radius = if s > 0.66 { 2 } else { 1 };
        Self {
            bilateral: s > 0.01,
            radius,
            spatial_sigma: if radius == 2 { 1.6 } else { 1.0 },
            range_sigma: 0.04 + 0.12 * s,
            min_blob_size: ((2.0 + s * 6.0).round() as usize).max(2),
            edge_threshold: 0.1 + (1.0 - s) * 0.08,
            majority_passes: if s > 0.7 { 2 } else { 1 },
            majority_votes: 5,
        }
    }

    /// Crisp: light filtering for pixel-art style sources.
    pub fn crisp() -> Self {
        Self::from_strength(0.2)
    }

    /// Balanced: everyday photo conversion.
    pub fn balanced() -> Self {
        Self::from_strength(0.5)
    }

    /// Soft: wide filter and aggressive speckle removal for noisy photos.
    pub fn soft() -> Self {
        Self::from_strength(0.85)
    }
}

impl Default for SmoothingProfile {
    fn default() -> Self {
        Self::balanced()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuantizeConfig {
    pub max_colors: usize,
    pub smoothing_strength: f32,
    pub alpha_cutoff: u8,
    /// Overrides the profile derived from `smoothing_strength`.
    pub profile: Option<SmoothingProfile>,
    pub extraction: ExtractionConfig,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self {
            max_colors: 16,
            smoothing_strength: 0.5,
            alpha_cutoff: 10,
            profile: None,
            extraction: ExtractionConfig::default(),
        }
    }
}

impl QuantizeConfig {
    pub fn profile(&self) -> SmoothingProfile {
        self.profile
            .unwrap_or_else(|| SmoothingProfile::from_strength(self.smoothing_strength))
    }
}

/// Per-cell colors sampled from the image. Unmasked cells carry no color.
struct CellColors {
    mask: Vec<bool>,
    rgb: Vec<[f32; 3]>,
    lab: Vec<Lab>,
}

fn sample_cells(
    image: &RgbaImage,
    width: usize,
    height: usize,
    placement: &Placement,
    alpha_cutoff: u8,
) -> CellColors {
    let n = width * height;
    let mut cells = CellColors {
        mask: vec![false; n],
        rgb: vec![[0.0; 3]; n],
        lab: vec![Lab::new(0.0, 0.0, 0.0); n],
    };
    let img_w = image.width() as f32;
    let img_h = image.height() as f32;

    for y in 0..height {
        for x in 0..width {
            let (img_x, img_y) = placement.image_point(x as u32, y as u32);
            if !(img_x >= 0.0 && img_x < img_w && img_y >= 0.0 && img_y < img_h) {
                continue;
            }
            let p = image.get_pixel(img_x.floor() as u32, img_y.floor() as u32);
            if p[3] < alpha_cutoff {
                continue;
            }
            let idx = y * width + x;
            let rgb = [
                p[0] as f32 / 255.0,
                p[1] as f32 / 255.0,
                p[2] as f32 / 255.0,
            ];
            cells.mask[idx] = true;
            cells.rgb[idx] = rgb;
            cells.lab[idx] = rgb_to_oklab(rgb);
        }
    }
    cells
}

/// Edge-preserving average of masked neighbors: spatial Gaussian times a range
/// Gaussian over OKLab distance.
fn bilateral_smooth(
    cells: &CellColors,
    width: usize,
    height: usize,
    profile: &SmoothingProfile,
) -> Vec<Lab> {
    if !profile.bilateral {
        return cells.lab.clone();
    }

    let radius = profile.radius as i64;
    let spatial_2 = 2.0 * profile.spatial_sigma * profile.spatial_sigma;
    let range_2 = 2.0 * profile.range_sigma * profile.range_sigma;
    let mut offsets = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist2 = (dx * dx + dy * dy) as f32;
            offsets.push((dx, dy, (-dist2 / spatial_2).exp()));
        }
    }

    let mut smoothed = cells.lab.clone();
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if !cells.mask[idx] {
                continue;
            }
            let base = cells.lab[idx];
            let mut sum = [0.0f32; 3];
            let mut sum_w = 0.0f32;
            for &(dx, dy, spatial_w) in &offsets {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let n_idx = ny as usize * width + nx as usize;
                if !cells.mask[n_idx] {
                    continue;
                }
                let range_w = (-distance_sq(cells.lab[n_idx], base) / range_2).exp();
                let w = spatial_w * range_w;
                let rgb = cells.rgb[n_idx];
                sum[0] += rgb[0] * w;
                sum[1] += rgb[1] * w;
                sum[2] += rgb[2] * w;
                sum_w += w;
            }
            if sum_w > 0.0 {
                smoothed[idx] = rgb_to_oklab([sum[0] / sum_w, sum[1] / sum_w, sum[2] / sum_w]);
            }
        }
    }
    smoothed
}

/// Palette entries the quantizer may use. When fewer colors than the palette holds
/// are requested, representative colors are extracted from the image and mapped onto
/// distinct palette entries.
pub fn allowed_palette(
    image: &RgbaImage,
    palette: &Palette,
    max_colors: usize,
    extraction: &ExtractionConfig,
) -> LabTable {
    let table = palette.to_lab_table();
    if table.is_empty() {
        return table;
    }
    let max_colors = max_colors.min(table.len()).max(2);
    if max_colors >= table.len() {
        return table;
    }

    let hexes = extract_palette_from_image(image, max_colors, extraction);
    let picked = matched_ids(&hexes, &table);
    if picked.is_empty() {
        return table;
    }
    let subset = table.retain_ids(&picked);
    if subset.is_empty() {
        table
    } else {
        subset
    }
}

/// Maximum squared OKLab distance to the 4-connected masked neighbors.
fn edge_strength(labs: &[Lab], mask: &[bool], width: usize, height: usize) -> Vec<f32> {
    let mut edges = vec![0.0f32; labs.len()];
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if !mask[idx] {
                continue;
            }
            let mut max_dist = 0.0f32;
            let mut visit = |n_idx: usize| {
                if mask[n_idx] {
                    max_dist = max_dist.max(distance_sq(labs[idx], labs[n_idx]));
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < width {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - width);
            }
            if y + 1 < height {
                visit(idx + width);
            }
            edges[idx] = max_dist;
        }
    }
    edges
}

/// Insertion-ordered color tally.
#[derive(Default)]
struct Tally {
    counts: Vec<(u16, u32)>,
}

impl Tally {
    fn add(&mut self, id: u16) {
        match self.counts.iter_mut().find(|(c, _)| *c == id) {
            Some(entry) => entry.1 += 1,
            None => self.counts.push((id, 1)),
        }
    }

    fn clear(&mut self) {
        self.counts.clear();
    }

    /// Most frequent id; ties go to the id closest to `current` in OKLab, then to the
    /// first one seen.
    fn most_frequent(&self, current: u16, table: &LabTable) -> Option<(u16, u32)> {
        let current_lab = table.lab_of(current);
        let mut best: Option<(u16, u32)> = None;
        for &(id, count) in &self.counts {
            let Some((best_id, best_count)) = best else {
                best = Some((id, count));
                continue;
            };
            if count > best_count {
                best = Some((id, count));
            } else if count == best_count {
                if let (Some(cur), Some(a), Some(b)) =
                    (current_lab, table.lab_of(id), table.lab_of(best_id))
                {
                    if distance_sq(cur, a) < distance_sq(cur, b) {
                        best = Some((id, count));
                    }
                }
            }
        }
        best
    }
}

/// Reassign small, low-contrast 4-connected components to their most frequent
/// neighboring color. Returns the number of components merged.
fn remove_speckles(
    labels: &mut [u16],
    edges: &[f32],
    width: usize,
    height: usize,
    profile: &SmoothingProfile,
    table: &LabTable,
) -> usize {
    let n = labels.len();
    let edge_threshold_sq = profile.edge_threshold * profile.edge_threshold;
    let min_blob = profile.min_blob_size;
    let mut visited = vec![false; n];
    let mut stack = Vec::with_capacity(n);
    let mut component = Vec::with_capacity(min_blob);
    let mut neighbors = Tally::default();
    let mut merged = 0;

    for start in 0..n {
        let color = labels[start];
        if color == EMPTY || visited[start] {
            continue;
        }

        visited[start] = true;
        stack.push(start);
        component.clear();
        neighbors.clear();
        let mut size = 0usize;
        let mut max_edge = 0.0f32;

        while let Some(idx) = stack.pop() {
            size += 1;
            if size <= min_blob {
                component.push(idx);
            }
            max_edge = max_edge.max(edges[idx]);

            let x = idx % width;
            let y = idx / width;
            let mut check = |n_idx: usize| {
                let n_color = labels[n_idx];
                if n_color == color {
                    if !visited[n_idx] {
                        visited[n_idx] = true;
                        stack.push(n_idx);
                    }
                } else if n_color != EMPTY {
                    neighbors.add(n_color);
                }
            };
            if x > 0 {
                check(idx - 1);
            }
            if x + 1 < width {
                check(idx + 1);
            }
            if y > 0 {
                check(idx - width);
            }
            if y + 1 < height {
                check(idx + width);
            }
        }

        if size <= min_blob && max_edge < edge_threshold_sq {
            if let Some((replacement, _)) = neighbors.most_frequent(color, table) {
                for &idx in &component {
                    labels[idx] = replacement;
                }
                merged += 1;
            }
        }
    }

    merged
}

/// One majority-vote pass over non-boundary cells. Reads `labels`, writes a new buffer.
fn majority_pass(
    labels: &[u16],
    mask: &[bool],
    edges: &[f32],
    width: usize,
    height: usize,
    profile: &SmoothingProfile,
    table: &LabTable,
) -> (Vec<u16>, usize) {
    let edge_threshold_sq = profile.edge_threshold * profile.edge_threshold;
    let mut updated = labels.to_vec();
    let mut votes = Tally::default();
    let mut changed = 0;

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if !mask[idx] || edges[idx] >= edge_threshold_sq {
                continue;
            }
            votes.clear();
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let n_idx = ny as usize * width + nx as usize;
                    if mask[n_idx] && labels[n_idx] != EMPTY {
                        votes.add(labels[n_idx]);
                    }
                }
            }
            let current = labels[idx];
            if let Some((winner, count)) = votes.most_frequent(current, table) {
                if winner != current && count >= profile.majority_votes {
                    updated[idx] = winner;
                    changed += 1;
                }
            }
        }
    }

    (updated, changed)
}

/// Quantize `image` onto a grid with the dimensions of `grid`.
///
/// Returns `None` when nothing can be produced (invalid placement, no usable palette
/// colors, or no cell covered by an opaque pixel); the caller keeps its grid.
pub fn quantize_image(
    image: &RgbaImage,
    grid: &StitchGrid,
    palette: &Palette,
    placement: &Placement,
    config: &QuantizeConfig,
) -> Option<StitchGrid> {
    if !placement.is_valid() || image.width() == 0 || image.height() == 0 {
        return None;
    }
    let start = Instant::now();
    let width = grid.width() as usize;
    let height = grid.height() as usize;
    let profile = config.profile();

    let allowed = allowed_palette(image, palette, config.max_colors, &config.extraction);
    if allowed.is_empty() {
        log::debug!("Quantization skipped: palette has no usable colors");
        return None;
    }

    let cells = sample_cells(image, width, height, placement, config.alpha_cutoff);
    let masked = cells.mask.iter().filter(|m| **m).count();
    if masked == 0 {
        log::debug!("Quantization skipped: image covers no grid cells");
        return None;
    }

    let smoothed = bilateral_smooth(&cells, width, height, &profile);

    let mut labels = vec![EMPTY; width * height];
    for (idx, label) in labels.iter_mut().enumerate() {
        if cells.mask[idx] {
            *label = allowed.nearest(smoothed[idx]).unwrap_or(EMPTY);
        }
    }

    let edges = edge_strength(&smoothed, &cells.mask, width, height);
    let merged = remove_speckles(&mut labels, &edges, width, height, &profile, &allowed);

    let mut flipped = 0;
    for _ in 0..profile.majority_passes {
        let (next, changed) =
            majority_pass(&labels, &cells.mask, &edges, width, height, &profile, &allowed);
        labels = next;
        flipped += changed;
    }

    log::debug!(
        "Cleanup merged {} speckle components and flipped {} cells",
        merged,
        flipped
    );
    log::info!(
        "Quantized {}x{} image onto {}x{} grid: {} cells, {} colors, {}ms",
        image.width(),
        image.height(),
        width,
        height,
        masked,
        allowed.len(),
        start.elapsed().as_millis()
    );

    Some(grid.with_cells(labels))
}
