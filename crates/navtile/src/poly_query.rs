//! Visitors for polygons found by spatial queries
//!
//! [`NavMeshQuery::query_polygons_with`](crate::NavMeshQuery::query_polygons_with)
//! hands the polygons overlapping a box to a [`PolyQuery`] in batches, one
//! tile at a time.

use navtile_common::vsub;

use super::poly_ref::decode_poly;
use super::{MeshTile, Poly, PolyRef};

/// Receives batches of polygons touched by a spatial query
pub trait PolyQuery {
    /// Called once per batch; `polys[i]` is the polygon of `refs[i]`
    fn process(&mut self, tile: &MeshTile, polys: &[&Poly], refs: &[PolyRef]);
}

/// Collects polygon references up to a fixed capacity
#[derive(Debug, Clone, Default)]
pub struct CollectPolysQuery {
    polys: Vec<PolyRef>,
    max_polys: usize,
    overflow: bool,
}

impl CollectPolysQuery {
    pub fn new(max_polys: usize) -> Self {
        Self {
            polys: Vec::with_capacity(max_polys.min(256)),
            max_polys,
            overflow: false,
        }
    }

    pub fn polys(&self) -> &[PolyRef] {
        &self.polys
    }

    pub fn into_polys(self) -> Vec<PolyRef> {
        self.polys
    }

    /// True if more polygons were found than fit
    pub fn overflow(&self) -> bool {
        self.overflow
    }
}

impl PolyQuery for CollectPolysQuery {
    fn process(&mut self, _tile: &MeshTile, _polys: &[&Poly], refs: &[PolyRef]) {
        let room = self.max_polys.saturating_sub(self.polys.len());
        if refs.len() > room {
            self.overflow = true;
        }
        self.polys.extend_from_slice(&refs[..refs.len().min(room)]);
    }
}

/// Tracks the polygon nearest to a point.
///
/// A point standing over a polygon within walkable climb counts as distance
/// zero, so a polygon right below the point wins over a closer one off to
/// the side.
#[derive(Debug, Clone)]
pub struct FindNearestPolyQuery {
    center: [f32; 3],
    nearest_ref: PolyRef,
    nearest_point: [f32; 3],
    nearest_distance_sqr: f32,
    over_poly: bool,
}

impl FindNearestPolyQuery {
    pub fn new(center: [f32; 3]) -> Self {
        Self {
            center,
            nearest_ref: PolyRef::NULL,
            nearest_point: center,
            nearest_distance_sqr: f32::MAX,
            over_poly: false,
        }
    }

    pub fn nearest_ref(&self) -> PolyRef {
        self.nearest_ref
    }

    pub fn nearest_point(&self) -> [f32; 3] {
        self.nearest_point
    }

    /// True if the center lies over the nearest polygon
    pub fn is_over_poly(&self) -> bool {
        self.over_poly
    }
}

impl PolyQuery for FindNearestPolyQuery {
    fn process(&mut self, tile: &MeshTile, _polys: &[&Poly], refs: &[PolyRef]) {
        let climb = tile.walkable_climb();
        for &r in refs {
            let (closest, over_poly) = tile.closest_point_on_poly(decode_poly(r) as usize, &self.center);
            let diff = vsub(&self.center, &closest);
            let d = if over_poly {
                let d = diff[1].abs() - climb;
                if d > 0.0 {
                    d * d
                } else {
                    0.0
                }
            } else {
                diff[0] * diff[0] + diff[1] * diff[1] + diff[2] * diff[2]
            };

            if d < self.nearest_distance_sqr {
                self.nearest_point = closest;
                self.nearest_distance_sqr = d;
                self.nearest_ref = r;
                self.over_poly = over_poly;
            }
        }
    }
}
