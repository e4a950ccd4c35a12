//! Greedy one-to-one mapping of candidate colors onto a fixed thread palette.

use crate::colors::LabTable;
use crate::oklab::{distance_sq, hex_to_oklab};
use serde::{Deserialize, Serialize};

/// Candidate color and the palette entry it was matched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteMatch {
    pub source_hex: String,
    pub color_id: u16,
}

/// Map each candidate, in order, to the nearest palette entry not already taken.
///
/// Malformed candidates produce no match. Once every palette entry is used the
/// remaining candidates are unmatched as well.
pub fn map_to_palette<S: AsRef<str>>(candidates: &[S], table: &LabTable) -> Vec<PaletteMatch> {
    let mut used = vec![false; table.len()];
    let mut matches = Vec::with_capacity(candidates.len().min(table.len()));

    for candidate in candidates {
        let hex = candidate.as_ref();
        let Some(lab) = hex_to_oklab(hex) else {
            log::warn!("Skipping malformed candidate color {:?}", hex);
            continue;
        };

        let mut best: Option<(usize, f32)> = None;
        for (i, entry) in table.entries().iter().enumerate() {
            if used[i] {
                continue;
            }
            let dist = distance_sq(lab, entry.lab);
            if best.map_or(true, |(_, best_dist)| dist < best_dist) {
                best = Some((i, dist));
            }
        }

        let Some((i, _)) = best else {
            continue;
        };
        used[i] = true;
        matches.push(PaletteMatch {
            source_hex: hex.to_string(),
            color_id: table.entries()[i].id,
        });
    }

    matches
}

/// Ids of the matched palette entries, in candidate order.
pub fn matched_ids<S: AsRef<str>>(candidates: &[S], table: &LabTable) -> Vec<u16> {
    map_to_palette(candidates, table)
        .into_iter()
        .map(|m| m.color_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::{Color, Palette};

    fn table() -> LabTable {
        Palette::new(vec![
            Color::new(1, "#FF0000"),
            Color::new(2, "#C00000"),
            Color::new(3, "#0000FF"),
        ])
        .unwrap()
        .to_lab_table()
    }

    #[test]
    fn distinct_candidates_do_not_collapse() {
        // Both reds are nearest to #FF0000; the second falls back to the darker red.
        let ids = matched_ids(&["#FE0101", "#F80000"], &table());
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn order_decides_who_gets_the_closest_entry() {
        let ids = matched_ids(&["#C10000", "#FE0000"], &table());
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn malformed_candidates_are_skipped() {
        let matches = map_to_palette(&["#12", "#0000F0", "zzzzzz"], &table());
        assert_eq!(
            matches,
            vec![PaletteMatch {
                source_hex: "#0000F0".to_string(),
                color_id: 3
            }]
        );
    }

    #[test]
    fn exhausted_palette_stops_matching() {
        let ids = matched_ids(&["#FF0000", "#FF0000", "#FF0000", "#FF0000"], &table());
        assert_eq!(ids.len(), 3);
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3]);
    }
}
