//! Representative palette extraction.
//!
//! Samples are over-clustered with deterministic k-means in OKLab, then a diverse,
//! perceptually spread subset of the cluster centers is chosen greedily.

use crate::oklab::{chroma, distance_sq, hue, oklab_to_hex, Lab};
use crate::sampler::{sample_image, Sample};
use image::RgbaImage;
use palette::Oklab;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f32::consts::{PI, TAU};
use std::time::Instant;

/// Weights of the greedy diverse-subset score. Empirical defaults, not derived constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionWeights {
    /// Minimum OKLab distance to the already selected centers.
    pub distance: f32,
    /// Log-scaled cluster population.
    pub importance: f32,
    /// Boost for far-away clusters with little population.
    pub rarity: f32,
    /// Angular distance to the nearest selected hue.
    pub hue: f32,
    /// Chroma of unimportant clusters, so small saturated accents survive.
    pub chroma: f32,
    pub hue_bins: usize,
    /// Penalty per selection already sitting in the candidate's hue bin.
    pub bin_penalty: f32,
    /// Chroma at which the hue term reaches half strength.
    pub chroma_softening: f32,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self {
            distance: 1.8,
            importance: 0.6,
            rarity: 1.2,
            hue: 0.6,
            chroma: 0.5,
            hue_bins: 12,
            bin_penalty: 0.8,
            chroma_softening: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionConfig {
    pub max_samples: usize,
    pub alpha_cutoff: u8,
    pub iterations: usize,
    /// Cluster counts are sized for at least this many output colors.
    pub min_colors: usize,
    /// Upper cap on the number of extracted colors.
    pub max_colors: usize,
    /// Over-clustering multiplier applied to the requested color count.
    pub over_cluster_factor: f32,
    /// Lower bound of the over-clustering multiplier.
    pub over_cluster_floor: usize,
    pub weights: SelectionWeights,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_samples: 40_000,
            alpha_cutoff: 16,
            iterations: 8,
            min_colors: 2,
            max_colors: 32,
            over_cluster_factor: 6.0,
            over_cluster_floor: 5,
            weights: SelectionWeights::default(),
        }
    }
}

/// A k-means center and the number of samples assigned to it in the last pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub center: Lab,
    pub count: usize,
}

#[derive(Clone)]
struct KMeansCenter {
    lab: Lab,
    sum_l: f64,
    sum_a: f64,
    sum_b: f64,
    count: usize,
}

impl KMeansCenter {
    fn new(lab: Lab) -> Self {
        Self {
            lab,
            sum_l: 0.0,
            sum_a: 0.0,
            sum_b: 0.0,
            count: 0,
        }
    }

    fn reset(&mut self) {
        self.sum_l = 0.0;
        self.sum_a = 0.0;
        self.sum_b = 0.0;
        self.count = 0;
    }

    fn add_sample(&mut self, lab: Lab) {
        self.sum_l += lab.l as f64;
        self.sum_a += lab.a as f64;
        self.sum_b += lab.b as f64;
        self.count += 1;
    }

    fn mean(&self) -> Lab {
        let n = self.count as f64;
        Oklab::new(
            (self.sum_l / n) as f32,
            (self.sum_a / n) as f32,
            (self.sum_b / n) as f32,
        )
    }
}

/// Deterministic k-means over OKLab samples.
pub struct KMeans<'a> {
    samples: &'a [Lab],
    centers: Vec<KMeansCenter>,
}

impl<'a> KMeans<'a> {
    /// Farthest-point seeding: the first center is the sample farthest from the global
    /// mean, every further center the sample farthest from all centers chosen so far.
    pub fn seeded(samples: &'a [Lab], k: usize) -> Self {
        let k = k.min(samples.len());
        if k == 0 {
            return Self {
                samples,
                centers: Vec::new(),
            };
        }

        let n = samples.len() as f64;
        let (mut mean_l, mut mean_a, mut mean_b) = (0.0f64, 0.0f64, 0.0f64);
        for s in samples {
            mean_l += s.l as f64;
            mean_a += s.a as f64;
            mean_b += s.b as f64;
        }
        let mean = Oklab::new((mean_l / n) as f32, (mean_a / n) as f32, (mean_b / n) as f32);

        let first = farthest_index(samples.iter().map(|s| distance_sq(*s, mean)));
        let mut centers = Vec::with_capacity(k);
        centers.push(KMeansCenter::new(samples[first]));

        let mut nearest: Vec<f32> = samples
            .iter()
            .map(|s| distance_sq(*s, samples[first]))
            .collect();

        while centers.len() < k {
            let next = farthest_index(nearest.iter().copied());
            let lab = samples[next];
            for (d, s) in nearest.iter_mut().zip(samples) {
                let dist = distance_sq(*s, lab);
                if dist < *d {
                    *d = dist;
                }
            }
            centers.push(KMeansCenter::new(lab));
        }

        Self { samples, centers }
    }

    /// One Lloyd iteration: assign, recompute means, reseed empty centers at the
    /// sample currently farthest from every center.
    pub fn step(&mut self) {
        if self.centers.is_empty() {
            return;
        }
        for center in &mut self.centers {
            center.reset();
        }
        for sample in self.samples {
            let best = nearest_center(&self.centers, *sample);
            self.centers[best].add_sample(*sample);
        }
        for c in 0..self.centers.len() {
            if self.centers[c].count > 0 {
                self.centers[c].lab = self.centers[c].mean();
            } else {
                let farthest = farthest_index(self.samples.iter().map(|s| {
                    self.centers
                        .iter()
                        .map(|center| distance_sq(*s, center.lab))
                        .fold(f32::INFINITY, f32::min)
                }));
                self.centers[c].lab = self.samples[farthest];
            }
        }
    }

    /// Sum of squared distances from every sample to its nearest center.
    pub fn inertia(&self) -> f64 {
        if self.centers.is_empty() {
            return 0.0;
        }
        self.samples
            .iter()
            .map(|s| {
                let best = nearest_center(&self.centers, *s);
                distance_sq(*s, self.centers[best].lab) as f64
            })
            .sum()
    }

    pub fn clusters(&self) -> Vec<Cluster> {
        self.centers
            .iter()
            .map(|c| Cluster {
                center: c.lab,
                count: c.count,
            })
            .collect()
    }
}

fn nearest_center(centers: &[KMeansCenter], sample: Lab) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f32::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let dist = distance_sq(sample, center.lab);
        if dist < best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }
    best_idx
}

/// Index of the largest value; the earliest index wins ties.
fn farthest_index(distances: impl Iterator<Item = f32>) -> usize {
    let mut best_idx = 0;
    let mut best = f32::NEG_INFINITY;
    for (i, d) in distances.enumerate() {
        if d > best {
            best = d;
            best_idx = i;
        }
    }
    best_idx
}

/// Run seeding plus a fixed number of Lloyd iterations.
pub fn kmeans_oklab(samples: &[Lab], k: usize, iterations: usize) -> Vec<Cluster> {
    if samples.is_empty() || k == 0 {
        return Vec::new();
    }
    let mut kmeans = KMeans::seeded(samples, k);
    for _ in 0..iterations.max(1) {
        kmeans.step();
    }
    kmeans.clusters()
}

fn hue_bin(hue: f32, bins: usize) -> usize {
    ((hue / TAU * bins as f32).floor() as usize).min(bins - 1)
}

/// Greedily pick `target` populated clusters that are both important and spread out.
///
/// Returns cluster indices in selection order. When at most `target` clusters are
/// populated, all of them are returned.
pub fn select_diverse(
    clusters: &[Cluster],
    target: usize,
    weights: &SelectionWeights,
) -> Vec<usize> {
    let available: Vec<usize> = (0..clusters.len())
        .filter(|&i| clusters[i].count > 0)
        .collect();
    if available.len() <= target {
        return available;
    }
    if target == 0 {
        return Vec::new();
    }

    let bins = weights.hue_bins.max(1);
    let max_count = available.iter().map(|&i| clusters[i].count).max().unwrap_or(1);
    let log_max = (max_count as f32).ln_1p();

    let hues: Vec<f32> = clusters.iter().map(|c| hue(c.center)).collect();
    let chromas: Vec<f32> = clusters.iter().map(|c| chroma(c.center)).collect();

    let mut start = available[0];
    for &idx in &available {
        if clusters[idx].count > clusters[start].count {
            start = idx;
        }
    }

    let mut selected = vec![start];
    let mut is_selected = vec![false; clusters.len()];
    is_selected[start] = true;
    let mut bin_counts = vec![0u32; bins];
    bin_counts[hue_bin(hues[start], bins)] += 1;

    while selected.len() < target {
        let mut best: Option<(usize, f32)> = None;
        for &idx in &available {
            if is_selected[idx] {
                continue;
            }
            let importance = if log_max > 0.0 {
                (clusters[idx].count as f32).ln_1p() / log_max
            } else {
                1.0
            };

            let mut min_dist = f32::INFINITY;
            let mut min_hue_dist = f32::INFINITY;
            for &sel in &selected {
                let dist = distance_sq(clusters[idx].center, clusters[sel].center).sqrt();
                min_dist = min_dist.min(dist);
                let diff = (hues[idx] - hues[sel]).abs();
                min_hue_dist = min_hue_dist.min(diff.min(2.0 * PI - diff));
            }

            let chroma = chromas[idx];
            let chroma_factor = if chroma > 0.0 {
                chroma / (chroma + weights.chroma_softening)
            } else {
                0.0
            };
            let hue_score = weights.hue * min_hue_dist * chroma_factor;
            let crowding = bin_counts[hue_bin(hues[idx], bins)] as f32;
            let bin_penalty = 1.0 / (1.0 + crowding * weights.bin_penalty);

            let score = (weights.importance * importance
                + weights.distance * min_dist
                + weights.rarity * (1.0 - importance) * min_dist
                + hue_score
                + weights.chroma * chroma * (1.0 - importance))
                * bin_penalty;

            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((idx, score));
            }
        }

        let Some((next, _)) = best else {
            break;
        };
        selected.push(next);
        is_selected[next] = true;
        bin_counts[hue_bin(hues[next], bins)] += 1;
    }

    selected
}

/// Extract up to `k` unique "#RRGGBB" colors representing `samples`.
pub fn extract_palette(samples: &[Sample], k: usize, config: &ExtractionConfig) -> Vec<String> {
    if samples.is_empty() || k == 0 {
        return Vec::new();
    }

    let target = k.min(config.max_colors.max(1)).min(samples.len());
    let sizing = target.max(config.min_colors);
    let over_cluster = samples.len().min(
        (sizing * config.over_cluster_floor)
            .max((sizing as f32 * config.over_cluster_factor).round() as usize),
    );
    log::debug!(
        "Extracting {} colors from {} samples via {} clusters",
        target,
        samples.len(),
        over_cluster
    );

    let labs: Vec<Lab> = samples.iter().map(|s| s.lab).collect();
    let clusters = kmeans_oklab(&labs, over_cluster, config.iterations);
    let selected = select_diverse(&clusters, target, &config.weights);

    let mut seen = HashSet::new();
    let mut palette = Vec::with_capacity(target);
    for idx in selected {
        let hex = oklab_to_hex(clusters[idx].center);
        if seen.insert(hex.clone()) {
            palette.push(hex);
        }
        if palette.len() >= target {
            break;
        }
    }

    if palette.len() < target {
        let mut order: Vec<usize> = (0..clusters.len()).collect();
        order.sort_by(|a, b| clusters[*b].count.cmp(&clusters[*a].count));
        for idx in order {
            let hex = oklab_to_hex(clusters[idx].center);
            if seen.insert(hex.clone()) {
                palette.push(hex);
            }
            if palette.len() >= target {
                break;
            }
        }
    }

    palette
}

/// Sample `image` and extract up to `k` representative colors.
pub fn extract_palette_from_image(
    image: &RgbaImage,
    k: usize,
    config: &ExtractionConfig,
) -> Vec<String> {
    let start = Instant::now();
    let samples = sample_image(image, config.max_samples, config.alpha_cutoff);
    let palette = extract_palette(&samples, k, config);
    log::info!(
        "Extracted {} colors from {}x{} image ({} samples) in {}ms",
        palette.len(),
        image.width(),
        image.height(),
        samples.len(),
        start.elapsed().as_millis()
    );
    palette
}
