//! Thread palette model and its OKLab lookup table.

use crate::error::{ChartError, Result};
use crate::oklab::{distance_sq, hex_to_oklab, Lab};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single palette entry. Id 0 is reserved for empty cells and never appears here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Color {
    pub fn new(id: u16, hex: impl Into<String>) -> Self {
        Self {
            id,
            name: None,
            hex: hex.into(),
            family: None,
            code: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_code(mut self, family: impl Into<String>, code: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self.code = Some(code.into());
        self
    }

    pub fn lab(&self) -> Option<Lab> {
        hex_to_oklab(&self.hex)
    }
}

/// Ordered collection of colors with unique, non-zero ids.
///
/// Hex strings are not validated here: a malformed entry simply drops out of every
/// color lookup instead of invalidating the whole palette.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Palette {
    colors: Vec<Color>,
}

impl Palette {
    pub fn new(colors: Vec<Color>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(colors.len());
        for color in &colors {
            if color.id == 0 {
                return Err(ChartError::ReservedColorId);
            }
            if !seen.insert(color.id) {
                return Err(ChartError::DuplicateColorId(color.id));
            }
        }
        Ok(Self { colors })
    }

    /// Parse a JSON array of `{id, hex, name?, family?, code?}` entries.
    pub fn from_json(json: &str) -> Result<Self> {
        let colors: Vec<Color> = serde_json::from_str(json)?;
        Self::new(colors)
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, id: u16) -> Option<&Color> {
        self.colors.iter().find(|c| c.id == id)
    }

    pub fn to_lab_table(&self) -> LabTable {
        LabTable::from_palette(self)
    }
}

impl<'de> Deserialize<'de> for Palette {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let colors = Vec::<Color>::deserialize(deserializer)?;
        Palette::new(colors).map_err(serde::de::Error::custom)
    }
}

/// Palette entry with its precomputed OKLab value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabEntry {
    pub id: u16,
    pub lab: Lab,
}

/// Palette colors converted once to OKLab, skipping entries with malformed hex.
#[derive(Debug, Clone, Default)]
pub struct LabTable {
    entries: Vec<LabEntry>,
}

impl LabTable {
    pub fn from_palette(palette: &Palette) -> Self {
        let entries = palette
            .colors()
            .iter()
            .filter_map(|color| match color.lab() {
                Some(lab) => Some(LabEntry { id: color.id, lab }),
                None => {
                    log::warn!(
                        "Skipping palette color {} with malformed hex {:?}",
                        color.id,
                        color.hex
                    );
                    None
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[LabEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lab_of(&self, id: u16) -> Option<Lab> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.lab)
    }

    /// Keep only the entries whose id is listed, preserving table order.
    pub fn retain_ids(&self, ids: &[u16]) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|e| ids.contains(&e.id))
            .copied()
            .collect();
        Self { entries }
    }

    /// Nearest entry by squared OKLab distance; ties resolve to the earlier entry.
    pub fn nearest(&self, target: Lab) -> Option<u16> {
        let mut best: Option<(u16, f32)> = None;
        for entry in &self.entries {
            let dist = distance_sq(target, entry.lab);
            if best.map_or(true, |(_, best_dist)| dist < best_dist) {
                best = Some((entry.id, dist));
            }
        }
        best.map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_rejects_reserved_and_duplicate_ids() {
        assert!(matches!(
            Palette::new(vec![Color::new(0, "#000000")]),
            Err(ChartError::ReservedColorId)
        ));
        assert!(matches!(
            Palette::new(vec![Color::new(3, "#000000"), Color::new(3, "#FFFFFF")]),
            Err(ChartError::DuplicateColorId(3))
        ));
    }

    #[test]
    fn palette_parses_json_contract() {
        let palette = Palette::from_json(
            r##"[
                {"id": 1, "name": "Black", "hex": "#000000", "family": "DMC", "code": "310"},
                {"id": 2, "hex": "#FFFFFF"}
            ]"##,
        )
        .unwrap();
        assert_eq!(palette.len(), 2);
        assert_eq!(palette.get(1).unwrap().code.as_deref(), Some("310"));
        assert!(palette.get(2).unwrap().name.is_none());
        assert!(Palette::from_json(r##"[{"id": 0, "hex": "#000000"}]"##).is_err());
    }

    #[test]
    fn lab_table_skips_malformed_hex() {
        let palette = Palette::new(vec![
            Color::new(1, "#FF0000"),
            Color::new(2, "not-a-color"),
            Color::new(3, "#0000FF"),
        ])
        .unwrap();
        let table = palette.to_lab_table();
        assert_eq!(table.len(), 2);
        assert!(table.lab_of(2).is_none());
    }

    #[test]
    fn nearest_picks_closest_entry() {
        let palette = Palette::new(vec![
            Color::new(1, "#000000"),
            Color::new(2, "#FFFFFF"),
            Color::new(3, "#FF0000"),
        ])
        .unwrap();
        let table = palette.to_lab_table();
        let dark_red = hex_to_oklab("#D01010").unwrap();
        assert_eq!(table.nearest(dark_red), Some(3));
        let light_gray = hex_to_oklab("#E0E0E0").unwrap();
        assert_eq!(table.nearest(light_gray), Some(2));
        assert_eq!(LabTable::default().nearest(light_gray), None);
    }
}
