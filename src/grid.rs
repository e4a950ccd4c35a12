use crate::error::{ChartError, Result};
use serde::{Deserialize, Serialize};

/// Color id of an empty (unstitched) cell.
pub const EMPTY: u16 = 0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: u32,
    pub y: u32,
}

impl GridPoint {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Inclusive cell rectangle limiting which cells an edit may touch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillRegion {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl FillRegion {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Clamp a user rectangle into a `width` x `height` grid, normalizing reversed corners.
    pub fn clamped(self, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1);
        let max_y = height.saturating_sub(1);
        let x0 = self.x0.min(max_x);
        let y0 = self.y0.min(max_y);
        let x1 = self.x1.min(max_x);
        let y1 = self.y1.min(max_y);
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

/// Row-major grid of color ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitchGrid {
    width: u32,
    height: u32,
    cells: Vec<u16>,
}

impl StitchGrid {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::filled(width, height, EMPTY)
    }

    pub fn filled(width: u32, height: u32, color: u16) -> Result<Self> {
        let len = cell_count(width, height)?;
        Ok(Self {
            width,
            height,
            cells: vec![color; len],
        })
    }

    pub fn from_cells(width: u32, height: u32, cells: Vec<u16>) -> Result<Self> {
        let expected = cell_count(width, height)?;
        if cells.len() != expected {
            return Err(ChartError::GridSizeMismatch {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Build a grid of identical dimensions around a replacement buffer.
    pub(crate) fn with_cells(&self, cells: Vec<u16>) -> Self {
        debug_assert_eq!(cells.len(), self.cells.len());
        Self {
            width: self.width,
            height: self.height,
            cells,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[u16] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<u16> {
        self.cells
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u16> {
        self.contains(x, y).then(|| self.cells[self.index(x, y)])
    }

    /// Whether the flat index lies inside the optional region.
    pub fn index_in_region(&self, idx: usize, region: Option<&FillRegion>) -> bool {
        match region {
            None => true,
            Some(r) => {
                let width = self.width as usize;
                r.contains((idx % width) as u32, (idx / width) as u32)
            }
        }
    }
}

#[derive(Deserialize)]
struct RawGrid {
    width: u32,
    height: u32,
    cells: Vec<u16>,
}

impl<'de> Deserialize<'de> for StitchGrid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawGrid::deserialize(deserializer)?;
        StitchGrid::from_cells(raw.width, raw.height, raw.cells).map_err(serde::de::Error::custom)
    }
}

fn cell_count(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(ChartError::EmptyGrid { width, height });
    }
    (width as usize)
        .checked_mul(height as usize)
        .ok_or(ChartError::GridTooLarge { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_row_major() {
        let grid = StitchGrid::new(7, 3).unwrap();
        assert_eq!(grid.len(), 21);
        assert_eq!(grid.index(0, 0), 0);
        assert_eq!(grid.index(6, 0), 6);
        assert_eq!(grid.index(2, 2), 16);
    }

    #[test]
    fn from_cells_checks_length() {
        assert!(StitchGrid::from_cells(2, 2, vec![1, 2, 3, 4]).is_ok());
        assert!(matches!(
            StitchGrid::from_cells(2, 2, vec![1, 2, 3]),
            Err(ChartError::GridSizeMismatch {
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            StitchGrid::new(0, 5),
            Err(ChartError::EmptyGrid { .. })
        ));
    }

    #[test]
    fn region_clamp_normalizes_corners() {
        let region = FillRegion::new(12, 9, 3, 1).clamped(10, 5);
        assert_eq!(region, FillRegion::new(3, 1, 9, 4));
        assert!(region.contains(3, 1));
        assert!(region.contains(9, 4));
        assert!(!region.contains(2, 1));
    }

    #[test]
    fn deserialize_checks_buffer_length() {
        let grid: StitchGrid =
            serde_json::from_str(r#"{"width":2,"height":1,"cells":[3,0]}"#).unwrap();
        assert_eq!(grid.get(0, 0), Some(3));
        assert_eq!(
            serde_json::to_string(&grid).unwrap(),
            r#"{"width":2,"height":1,"cells":[3,0]}"#
        );

        let short = r#"{"width":10,"height":10,"cells":[]}"#;
        assert!(serde_json::from_str::<StitchGrid>(short).is_err());
        let empty = r#"{"width":0,"height":0,"cells":[]}"#;
        assert!(serde_json::from_str::<StitchGrid>(empty).is_err());
    }

    #[test]
    fn get_respects_bounds() {
        let grid = StitchGrid::filled(3, 2, 4).unwrap();
        assert_eq!(grid.get(2, 1), Some(4));
        assert_eq!(grid.get(3, 0), None);
        assert!(grid.index_in_region(5, Some(&FillRegion::new(1, 1, 2, 1))));
        assert!(!grid.index_in_region(0, Some(&FillRegion::new(1, 1, 2, 1))));
    }
}
