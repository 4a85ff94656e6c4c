//! Raycast results

use bitflags::bitflags;

use super::PolyRef;

bitflags! {
    /// Raycast behavior options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RaycastOptions: u8 {
        /// Accumulate the filter cost of the visited segments in [`RaycastHit::path_cost`]
        const USE_COSTS = 0x01;
    }
}

/// Result of a raycast along the mesh surface
#[derive(Debug, Clone, PartialEq)]
pub struct RaycastHit {
    /// Hit parameter along the ray; `f32::INFINITY` when the end point was reached
    pub t: f32,
    /// Normal of the wall that was hit, zero when nothing was hit
    pub hit_normal: [f32; 3],
    /// Edge of the last polygon that was hit
    pub hit_edge_index: Option<usize>,
    /// Visited polygons, starting with the start polygon
    pub path: Vec<PolyRef>,
    /// Accumulated cost, only with [`RaycastOptions::USE_COSTS`]
    pub path_cost: f32,
}

impl RaycastHit {
    pub fn new() -> Self {
        Self {
            t: 0.0,
            hit_normal: [0.0; 3],
            hit_edge_index: None,
            path: Vec::new(),
            path_cost: 0.0,
        }
    }

    /// True if the ray stopped at a wall before reaching its end point.
    ///
    /// A zero-length ray reports `t == 0` with the start polygon as its path
    /// and no hit edge; it never counts as a wall hit.
    pub fn hit_wall(&self) -> bool {
        let zero_length = self.t == 0.0 && self.hit_edge_index.is_none() && !self.path.is_empty();
        self.t.is_finite() && !zero_length
    }

    /// Point where the ray stopped, for a ray from `start` to `end`
    pub fn hit_position(&self, start: &[f32; 3], end: &[f32; 3]) -> [f32; 3] {
        if self.hit_wall() {
            navtile_common::vlerp(start, end, self.t)
        } else {
            *end
        }
    }
}

impl Default for RaycastHit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_position() {
        let mut hit = RaycastHit::new();
        hit.t = 0.25;
        assert!(hit.hit_wall());
        assert_eq!(hit.hit_position(&[0.0; 3], &[4.0, 0.0, 0.0]), [1.0, 0.0, 0.0]);

        hit.t = f32::INFINITY;
        assert!(!hit.hit_wall());
        assert_eq!(hit.hit_position(&[0.0; 3], &[4.0, 0.0, 0.0]), [4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_wall_at_ray_start() {
        // Start outside the start polygon: blocked immediately
        let mut hit = RaycastHit::new();
        assert!(hit.hit_wall());

        // Start on an edge, heading out through it
        hit.path.push(PolyRef::new(1));
        hit.hit_edge_index = Some(0);
        assert!(hit.hit_wall());

        // Degenerate ray that never left its start polygon
        hit.hit_edge_index = None;
        assert!(!hit.hit_wall());
        assert_eq!(hit.hit_position(&[1.0, 0.0, 1.0], &[1.0, 0.0, 1.0]), [1.0, 0.0, 1.0]);
    }
}
