//! sRGB <-> OKLab conversion primitives.
//!
//! Every distance the engine measures (clustering, palette lookup, edge strength,
//! bilateral range weights) is a squared Euclidean distance in OKLab.

use palette::{FromColor, LinSrgb, Oklab, Srgb};
use std::f32::consts::TAU;

pub type Lab = Oklab<f32>;

fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Convert sRGB channels in [0, 1] to OKLab. Out-of-range input is clamped first.
pub fn rgb_to_oklab(rgb: [f32; 3]) -> Lab {
    let linear: LinSrgb<f32> = Srgb::new(unit(rgb[0]), unit(rgb[1]), unit(rgb[2])).into_linear();
    Oklab::from_color(linear)
}

pub fn rgb8_to_oklab(rgb: [u8; 3]) -> Lab {
    rgb_to_oklab([
        rgb[0] as f32 / 255.0,
        rgb[1] as f32 / 255.0,
        rgb[2] as f32 / 255.0,
    ])
}

/// Convert OKLab back to sRGB in [0, 1]. Colors outside the sRGB gamut are clamped.
pub fn oklab_to_rgb(lab: Lab) -> [f32; 3] {
    let linear = LinSrgb::from_color(lab);
    let srgb: Srgb<f32> = Srgb::from_linear(linear);
    [unit(srgb.red), unit(srgb.green), unit(srgb.blue)]
}

pub fn oklab_to_rgb8(lab: Lab) -> [u8; 3] {
    let [r, g, b] = oklab_to_rgb(lab);
    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}

#[inline]
pub fn distance_sq(a: Lab, b: Lab) -> f32 {
    let dl = a.l - b.l;
    let da = a.a - b.a;
    let db = a.b - b.b;
    dl * dl + da * da + db * db
}

/// Magnitude of the (a, b) vector.
#[inline]
pub fn chroma(lab: Lab) -> f32 {
    (lab.a * lab.a + lab.b * lab.b).sqrt()
}

/// Polar angle of (a, b) in [0, 2π). Achromatic colors report 0.
#[inline]
pub fn hue(lab: Lab) -> f32 {
    let angle = lab.b.atan2(lab.a);
    if !angle.is_finite() {
        return 0.0;
    }
    if angle < 0.0 {
        angle + TAU
    } else {
        angle
    }
}

/// Parse "#RRGGBB" (the leading '#' is optional). Anything else is rejected.
pub fn hex_to_rgb(hex: &str) -> Option<[u8; 3]> {
    let trimmed = hex.trim();
    let trimmed = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if trimmed.len() != 6 || !trimmed.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&trimmed[0..2], 16).ok()?;
    let g = u8::from_str_radix(&trimmed[2..4], 16).ok()?;
    let b = u8::from_str_radix(&trimmed[4..6], 16).ok()?;
    Some([r, g, b])
}

pub fn rgb_to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2])
}

pub fn hex_to_oklab(hex: &str) -> Option<Lab> {
    hex_to_rgb(hex).map(rgb8_to_oklab)
}

pub fn oklab_to_hex(lab: Lab) -> String {
    rgb_to_hex(oklab_to_rgb8(lab))
}
