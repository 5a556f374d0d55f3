use geo::{Area, BooleanOps, Coord, Intersects, MultiPolygon, Polygon, Rect};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geo_core::{meters_to_deg_lat, meters_to_deg_lon, BoundingBox};

pub const DEFAULT_CELL_WIDTH_M: f64 = 800.0;
pub const DEFAULT_CELL_HEIGHT_M: f64 = 800.0;

/// Axis-aligned grid cell in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridCell {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl GridCell {
    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.x0,
                y: self.y0,
            },
            Coord {
                x: self.x1,
                y: self.y1,
            },
        )
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        self.rect().to_polygon()
    }

    /// Part of `polygon` covered by this cell
    pub fn clip(&self, polygon: &Polygon<f64>) -> MultiPolygon<f64> {
        self.to_polygon().intersection(polygon)
    }
}

/// Lazy row-major tiling of a bounding box.
///
/// Starts at (min_x, min_y); a row is emitted while its origin y is below
/// max_y, a cell while its origin x is below max_x. Edge cells keep their full
/// size and may overhang the box.
#[derive(Debug, Clone)]
pub struct CandidateCells {
    bbox: BoundingBox,
    dx: f64,
    dy: f64,
    col: u64,
    row: u64,
}

pub fn candidate_cells(bbox: BoundingBox, dx: f64, dy: f64) -> CandidateCells {
    CandidateCells {
        bbox,
        dx,
        dy,
        col: 0,
        row: 0,
    }
}

impl Iterator for CandidateCells {
    type Item = GridCell;

    fn next(&mut self) -> Option<GridCell> {
        if !(self.dx > 0.0 && self.dy > 0.0) {
            return None;
        }
        // Origins are computed from indices so steps do not accumulate error
        let mut x = self.bbox.min_x + self.col as f64 * self.dx;
        if x >= self.bbox.max_x {
            self.col = 0;
            self.row += 1;
            x = self.bbox.min_x;
        }
        let y = self.bbox.min_y + self.row as f64 * self.dy;
        if y >= self.bbox.max_y || x >= self.bbox.max_x {
            return None;
        }
        self.col += 1;
        Some(GridCell {
            x0: x,
            y0: y,
            x1: x + self.dx,
            y1: y + self.dy,
        })
    }
}

/// Keep the cells sharing a positive area with `polygon`, order preserved.
pub fn retain_intersecting<'a, I>(
    cells: I,
    polygon: &'a Polygon<f64>,
) -> impl Iterator<Item = GridCell> + 'a
where
    I: IntoIterator<Item = GridCell>,
    I::IntoIter: 'a,
{
    cells.into_iter().filter(move |cell| {
        let rect = cell.rect();
        rect.intersects(polygon) && cell.clip(polygon).unsigned_area() > 0.0
    })
}

/// Tile the polygon's bounding box into cells of `cell_width_m` x
/// `cell_height_m` metres and keep those intersecting the polygon.
///
/// Metres are converted with the fixed equirectangular factors. The number of
/// cells is not capped.
pub fn generate_grid(
    polygon: &Polygon<f64>,
    cell_width_m: f64,
    cell_height_m: f64,
) -> Result<Vec<GridCell>> {
    for (name, value) in [("width", cell_width_m), ("height", cell_height_m)] {
        if !(value.is_finite() && value > 0.0) {
            return Err(Error::computation(format!(
                "Cell {} must be a positive number of metres, got {}",
                name, value
            )));
        }
    }
    let bbox = BoundingBox::from_polygon(polygon)
        .ok_or_else(|| Error::format("Cannot tile an empty polygon"))?;

    let dx = meters_to_deg_lon(cell_width_m);
    let dy = meters_to_deg_lat(cell_height_m);
    let cells: Vec<GridCell> =
        retain_intersecting(candidate_cells(bbox, dx, dy), polygon).collect();

    debug!(dx, dy, cells = cells.len(), "Grid generated");
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn unit_square(side: f64) -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: side, y: 0.0),
            (x: side, y: side),
            (x: 0.0, y: side),
        ]
    }

    #[test]
    fn test_candidate_count_exact_tiling() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 0.5);
        let cells: Vec<_> = candidate_cells(bbox, 0.25, 0.125).collect();
        assert_eq!(cells.len(), 4 * 4);
        // Row-major: ascending y then ascending x
        assert_eq!(cells[0].x0, 0.0);
        assert_eq!(cells[1].x0, 0.25);
        assert_eq!(cells[4].y0, 0.125);
        assert_eq!(cells[4].x0, 0.0);
    }

    #[test]
    fn test_candidate_partial_edge_cells() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let cells: Vec<_> = candidate_cells(bbox, 0.4, 0.4).collect();
        // Origins 0.0, 0.4, 0.8 on each axis
        assert_eq!(cells.len(), 9);
        let last = cells.last().unwrap();
        assert!((last.x1 - 1.2).abs() < 1e-12);
        assert!((last.y1 - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_candidate_degenerate_steps() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(candidate_cells(bbox, 0.0, 0.1).count(), 0);
        // Zero-height box yields no rows
        let flat = BoundingBox::new(0.0, 0.0, 1.0, 0.0);
        assert_eq!(candidate_cells(flat, 0.1, 0.1).count(), 0);
    }

    #[test]
    fn test_square_grid_exact_count() {
        // 4 x 3 cells of exactly 800 m
        let dx = meters_to_deg_lon(800.0);
        let dy = meters_to_deg_lat(800.0);
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0 * dx, y: 0.0),
            (x: 4.0 * dx, y: 3.0 * dy),
            (x: 0.0, y: 3.0 * dy),
        ];
        let cells = generate_grid(&poly, 800.0, 800.0).unwrap();
        assert_eq!(cells.len(), 12);
    }

    #[test]
    fn test_small_square_two_by_two() {
        let poly = unit_square(0.01);
        let cells = generate_grid(&poly, DEFAULT_CELL_WIDTH_M, DEFAULT_CELL_HEIGHT_M).unwrap();
        assert_eq!(cells.len(), 4);
        for cell in &cells {
            assert!(cell.rect().intersects(&poly));
            assert!(cell.clip(&poly).unsigned_area() > 0.0);
        }
        // Cells cover the square
        let covered: f64 = cells.iter().map(|c| c.clip(&poly).unsigned_area()).sum();
        assert!((covered - poly.unsigned_area()).abs() < 1e-12);
    }

    #[test]
    fn test_only_intersecting_cells() {
        // Right triangle: cells above the hypotenuse are dropped
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 0.05, y: 0.0),
            (x: 0.0, y: 0.05),
        ];
        let all = candidate_cells(BoundingBox::from_polygon(&poly).unwrap(), 0.01, 0.01).count();
        let kept = generate_grid(&poly, 1113.2, 1105.4).unwrap();
        assert!(kept.len() < all);
        for cell in &kept {
            assert!(cell.clip(&poly).unsigned_area() > 0.0);
        }
    }

    #[test]
    fn test_touching_cells_are_dropped() {
        // A cell that only shares the polygon's corner has no area in common
        let poly = unit_square(1.0);
        let cells = vec![
            GridCell { x0: 0.5, y0: 0.5, x1: 1.5, y1: 1.5 },
            GridCell { x0: 1.0, y0: 1.0, x1: 2.0, y1: 2.0 },
            GridCell { x0: 3.0, y0: 3.0, x1: 4.0, y1: 4.0 },
        ];
        let kept: Vec<_> = retain_intersecting(cells, &poly).collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].x0, 0.5);
    }

    #[test]
    fn test_invalid_cell_size() {
        let poly = unit_square(0.01);
        assert!(matches!(
            generate_grid(&poly, 0.0, 800.0),
            Err(Error::Computation(_))
        ));
        assert!(generate_grid(&poly, 800.0, f64::NAN).is_err());
    }
}
