//! Bounded 2-D influence grid over the unit square.

use crate::model::Attractor;
use contextfield_core::Location;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct InfluenceGrid {
    resolution: usize,
    cells: Vec<f64>,
}

/// Strongest cell of the grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GridPeak {
    pub location: Location,
    pub influence: f64,
}

impl InfluenceGrid {
    pub fn new(resolution: usize) -> Self {
        let resolution = resolution.max(1);
        Self {
            resolution,
            cells: vec![0.0; resolution * resolution],
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    fn cell_center(&self, col: usize, row: usize) -> Location {
        let r = self.resolution as f64;
        Location::new((col as f64 + 0.5) / r, (row as f64 + 0.5) / r)
    }

    fn cell_index(&self, location: &Location) -> usize {
        let r = self.resolution;
        let col = ((location.x * r as f64) as usize).min(r - 1);
        let row = ((location.y * r as f64) as usize).min(r - 1);
        row * r + col
    }

    /// Recompute every cell from attractor strength with Gaussian falloff
    /// scaled by basin width. Cells saturate at 1.0.
    pub fn rebuild<'a>(&mut self, attractors: impl Iterator<Item = &'a Attractor>) {
        self.cells.iter_mut().for_each(|c| *c = 0.0);
        let min_sigma = 1.0 / self.resolution as f64;
        for attractor in attractors {
            let sigma = (attractor.basin_width() * 0.25).max(min_sigma);
            let two_sigma_sq = 2.0 * sigma * sigma;
            for row in 0..self.resolution {
                for col in 0..self.resolution {
                    let d = self.cell_center(col, row).distance(&attractor.location);
                    let idx = row * self.resolution + col;
                    self.cells[idx] += attractor.strength() * (-(d * d) / two_sigma_sq).exp();
                }
            }
        }
        self.cells.iter_mut().for_each(|c| *c = c.min(1.0));
    }

    pub fn value_at(&self, location: &Location) -> f64 {
        self.cells[self.cell_index(location)]
    }

    pub fn peak(&self) -> GridPeak {
        let (idx, influence) = self
            .cells
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0), |best, (i, v)| if v > best.1 { (i, v) } else { best });
        let (row, col) = (idx / self.resolution, idx % self.resolution);
        GridPeak {
            location: self.cell_center(col, row),
            influence,
        }
    }

    pub fn mean(&self) -> f64 {
        self.cells.iter().sum::<f64>() / self.cells.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_grid_is_zero() {
        let mut grid = InfluenceGrid::new(8);
        grid.rebuild(std::iter::empty());
        assert_eq!(grid.peak().influence, 0.0);
        assert_eq!(grid.mean(), 0.0);
    }

    #[test]
    fn peak_sits_near_attractor() {
        let location = Location::new(0.8, 0.2);
        let a = Attractor::new("a".into(), "p", "semantic", location, 0.9, 0.4, Utc::now(), 0);
        let mut grid = InfluenceGrid::new(16);
        grid.rebuild([&a].into_iter());
        let peak = grid.peak();
        assert!(peak.location.distance(&a.location) < 0.1);
        assert!(peak.influence > 0.8);
        assert!(grid.value_at(&Location::new(0.0, 1.0)) < peak.influence);
    }
}
