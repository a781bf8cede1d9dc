//! Grid traversal along a ray segment.

use crate::core::types::Point;
use crate::map::GridIndex;

/// Visits every grid cell a ray segment passes through, start to end.
///
/// Input coordinates are pre-scaled by the inverse cell size, so the same
/// caster traverses voxels or blocks depending on the scale. The traversal
/// is the standard incremental one: step along whichever axis crosses its
/// next cell boundary first.
#[derive(Debug)]
pub struct RayCaster {
    current: GridIndex,
    end: GridIndex,
    step: [i32; 3],
    t_max: [f32; 3],
    t_delta: [f32; 3],
    steps_remaining: u32,
    done: bool,
}

impl RayCaster {
    /// Caster from `start_scaled` to `end_scaled` (world coordinates divided
    /// by the cell size).
    pub fn new(start_scaled: &Point, end_scaled: &Point) -> Self {
        let current = GridIndex::new(
            start_scaled.x.floor() as i32,
            start_scaled.y.floor() as i32,
            start_scaled.z.floor() as i32,
        );
        let end = GridIndex::new(
            end_scaled.x.floor() as i32,
            end_scaled.y.floor() as i32,
            end_scaled.z.floor() as i32,
        );

        let dir = end_scaled - start_scaled;
        let mut step = [0i32; 3];
        let mut t_max = [f32::INFINITY; 3];
        let mut t_delta = [f32::INFINITY; 3];

        let start = [start_scaled.x, start_scaled.y, start_scaled.z];
        let cur = [current.x, current.y, current.z];
        for axis in 0..3 {
            let d = dir[axis];
            if d > 0.0 {
                step[axis] = 1;
                t_max[axis] = (cur[axis] as f32 + 1.0 - start[axis]) / d;
                t_delta[axis] = 1.0 / d;
            } else if d < 0.0 {
                step[axis] = -1;
                t_max[axis] = (cur[axis] as f32 - start[axis]) / d;
                t_delta[axis] = -1.0 / d;
            }
        }

        // Upper bound on visited cells; guards against float corner cases
        // where t_max comparisons would otherwise walk past the end.
        let manhattan = (end.x - current.x).abs()
            + (end.y - current.y).abs()
            + (end.z - current.z).abs();

        Self {
            current,
            end,
            step,
            t_max,
            t_delta,
            steps_remaining: manhattan as u32 + 1,
            done: false,
        }
    }
}

impl Iterator for RayCaster {
    type Item = GridIndex;

    fn next(&mut self) -> Option<GridIndex> {
        if self.done {
            return None;
        }
        let out = self.current;

        if self.current == self.end || self.steps_remaining == 0 {
            self.done = true;
            return Some(out);
        }
        self.steps_remaining -= 1;

        // Advance along the axis whose boundary is crossed first.
        let axis = if self.t_max[0] < self.t_max[1] {
            if self.t_max[0] < self.t_max[2] {
                0
            } else {
                2
            }
        } else if self.t_max[1] < self.t_max[2] {
            1
        } else {
            2
        };
        match axis {
            0 => self.current.x += self.step[0],
            1 => self.current.y += self.step[1],
            _ => self.current.z += self.step[2],
        }
        self.t_max[axis] += self.t_delta[axis];

        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_aligned_ray() {
        let cells: Vec<GridIndex> =
            RayCaster::new(&Point::new(0.5, 0.5, 0.5), &Point::new(4.5, 0.5, 0.5)).collect();
        assert_eq!(cells.len(), 5);
        assert_eq!(cells[0], GridIndex::new(0, 0, 0));
        assert_eq!(cells[4], GridIndex::new(4, 0, 0));
    }

    #[test]
    fn test_single_cell_ray() {
        let cells: Vec<GridIndex> =
            RayCaster::new(&Point::new(0.2, 0.2, 0.2), &Point::new(0.8, 0.8, 0.8)).collect();
        assert_eq!(cells, vec![GridIndex::zero()]);
    }

    #[test]
    fn test_negative_direction() {
        let cells: Vec<GridIndex> =
            RayCaster::new(&Point::new(0.5, 0.5, 0.5), &Point::new(-2.5, 0.5, 0.5)).collect();
        assert_eq!(cells.first(), Some(&GridIndex::new(0, 0, 0)));
        assert_eq!(cells.last(), Some(&GridIndex::new(-3, 0, 0)));
        assert_eq!(cells.len(), 4);
    }

    #[test]
    fn test_diagonal_ray_connectivity() {
        let cells: Vec<GridIndex> =
            RayCaster::new(&Point::new(0.1, 0.1, 0.1), &Point::new(3.9, 2.9, 1.9)).collect();
        // Each consecutive pair differs by exactly one axis step.
        for pair in cells.windows(2) {
            let d = pair[1] - pair[0];
            assert_eq!(d.x.abs() + d.y.abs() + d.z.abs(), 1, "non-face step in {:?}", pair);
        }
        assert_eq!(cells.first(), Some(&GridIndex::new(0, 0, 0)));
        assert_eq!(cells.last(), Some(&GridIndex::new(3, 2, 1)));
    }

    #[test]
    fn test_covers_start_and_end_once() {
        let cells: Vec<GridIndex> =
            RayCaster::new(&Point::new(-0.5, -0.5, -0.5), &Point::new(2.5, 2.5, 2.5)).collect();
        assert_eq!(
            cells.iter().filter(|c| **c == GridIndex::new(-1, -1, -1)).count(),
            1
        );
        assert_eq!(
            cells.iter().filter(|c| **c == GridIndex::new(2, 2, 2)).count(),
            1
        );
    }
}
