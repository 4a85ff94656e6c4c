//! Traversal policy: polygon filtering, edge costs and the A* heuristic

use navtile_common::vdist;

use super::{MeshTile, Poly, PolyFlags, PolyRef, MAX_AREAS};

/// A polygon together with its reference and tile, as seen by cost functions
#[derive(Debug, Clone, Copy)]
pub struct PolyContext<'a> {
    pub reference: PolyRef,
    pub tile: &'a MeshTile,
    pub poly: &'a Poly,
}

impl<'a> PolyContext<'a> {
    pub fn new(reference: PolyRef, tile: &'a MeshTile, poly: &'a Poly) -> Self {
        Self { reference, tile, poly }
    }
}

/// Decides which polygons a query may visit and what moving across them costs
pub trait QueryFilter {
    /// Returns true if the polygon can be visited
    fn pass_filter(&self, reference: PolyRef, tile: &MeshTile, poly: &Poly) -> bool;

    /// Cost of moving from `pa` to `pb` across `cur`.
    ///
    /// `pa` lies on the edge shared by `prev` and `cur`, `pb` on the edge
    /// shared by `cur` and `next`. `prev` is `None` at the start of a path,
    /// `next` at its end.
    fn get_cost(
        &self,
        pa: &[f32; 3],
        pb: &[f32; 3],
        prev: Option<PolyContext<'_>>,
        cur: PolyContext<'_>,
        next: Option<PolyContext<'_>>,
    ) -> f32;
}

impl<T: QueryFilter + ?Sized> QueryFilter for &T {
    fn pass_filter(&self, reference: PolyRef, tile: &MeshTile, poly: &Poly) -> bool {
        (**self).pass_filter(reference, tile, poly)
    }

    fn get_cost(
        &self,
        pa: &[f32; 3],
        pb: &[f32; 3],
        prev: Option<PolyContext<'_>>,
        cur: PolyContext<'_>,
        next: Option<PolyContext<'_>>,
    ) -> f32 {
        (**self).get_cost(pa, pb, prev, cur, next)
    }
}

/// Flag and area based filter
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultQueryFilter {
    /// A polygon passes only if it has at least one of these flags
    pub include_flags: PolyFlags,
    /// A polygon with any of these flags is rejected
    pub exclude_flags: PolyFlags,
    /// Cost multiplier per area id
    pub area_cost: [f32; MAX_AREAS],
}

impl Default for DefaultQueryFilter {
    fn default() -> Self {
        Self {
            include_flags: PolyFlags::ALL,
            exclude_flags: PolyFlags::empty(),
            area_cost: [1.0; MAX_AREAS],
        }
    }
}

impl DefaultQueryFilter {
    pub fn new(include_flags: PolyFlags, exclude_flags: PolyFlags) -> Self {
        Self {
            include_flags,
            exclude_flags,
            ..Self::default()
        }
    }

    /// Cost multiplier of an area, 0 for ids out of range
    pub fn get_area_cost(&self, area: usize) -> f32 {
        self.area_cost.get(area).copied().unwrap_or(0.0)
    }

    /// Sets the cost multiplier of an area; ids out of range are ignored
    pub fn set_area_cost(&mut self, area: usize, cost: f32) {
        if let Some(c) = self.area_cost.get_mut(area) {
            *c = cost;
        }
    }
}

impl QueryFilter for DefaultQueryFilter {
    fn pass_filter(&self, _reference: PolyRef, _tile: &MeshTile, poly: &Poly) -> bool {
        poly.flags.intersects(self.include_flags) && !poly.flags.intersects(self.exclude_flags)
    }

    fn get_cost(
        &self,
        pa: &[f32; 3],
        pb: &[f32; 3],
        _prev: Option<PolyContext<'_>>,
        cur: PolyContext<'_>,
        _next: Option<PolyContext<'_>>,
    ) -> f32 {
        vdist(pa, pb) * self.get_area_cost(cur.poly.area as usize)
    }
}

/// Estimated remaining cost used to order the A* open list
pub trait QueryHeuristic {
    fn get_cost(&self, neighbour_pos: &[f32; 3], end_pos: &[f32; 3]) -> f32;
}

/// Straight-line distance scaled slightly below 1 so that ties resolve
/// towards the goal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultQueryHeuristic {
    pub scale: f32,
}

impl DefaultQueryHeuristic {
    pub const DEFAULT_SCALE: f32 = 0.999;

    pub fn new(scale: f32) -> Self {
        Self { scale }
    }
}

impl Default for DefaultQueryHeuristic {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SCALE)
    }
}

impl QueryHeuristic for DefaultQueryHeuristic {
    fn get_cost(&self, neighbour_pos: &[f32; 3], end_pos: &[f32; 3]) -> f32 {
        vdist(neighbour_pos, end_pos) * self.scale
    }
}

impl<F> QueryHeuristic for F
where
    F: Fn(&[f32; 3], &[f32; 3]) -> f32,
{
    fn get_cost(&self, neighbour_pos: &[f32; 3], end_pos: &[f32; 3]) -> f32 {
        self(neighbour_pos, end_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PolyType;

    fn poly_with(flags: PolyFlags, area: u8) -> Poly {
        Poly::new(area, PolyType::Ground, flags)
    }

    #[test]
    fn test_include_exclude() {
        let tile = MeshTile::default();
        let filter = DefaultQueryFilter::new(PolyFlags::WALK | PolyFlags::SWIM, PolyFlags::DISABLED);

        assert!(filter.pass_filter(PolyRef::NULL, &tile, &poly_with(PolyFlags::WALK, 0)));
        assert!(!filter.pass_filter(PolyRef::NULL, &tile, &poly_with(PolyFlags::DOOR, 0)));
        assert!(!filter.pass_filter(
            PolyRef::NULL,
            &tile,
            &poly_with(PolyFlags::WALK | PolyFlags::DISABLED, 0)
        ));
        // No flags at all never passes
        assert!(!filter.pass_filter(PolyRef::NULL, &tile, &poly_with(PolyFlags::empty(), 0)));
    }

    #[test]
    fn test_cost_scales_by_area() {
        let tile = MeshTile::default();
        let poly = poly_with(PolyFlags::WALK, 3);
        let mut filter = DefaultQueryFilter::default();
        filter.set_area_cost(3, 2.5);
        filter.set_area_cost(MAX_AREAS, 9.0);

        let cur = PolyContext::new(PolyRef::NULL, &tile, &poly);
        let cost = filter.get_cost(&[0.0, 0.0, 0.0], &[3.0, 0.0, 4.0], None, cur, None);
        assert!((cost - 12.5).abs() < 1e-5);
        assert_eq!(filter.get_area_cost(MAX_AREAS), 0.0);
    }

    #[test]
    fn test_heuristics() {
        let h = DefaultQueryHeuristic::default();
        assert!((h.get_cost(&[0.0; 3], &[10.0, 0.0, 0.0]) - 9.99).abs() < 1e-4);

        let zero = |_: &[f32; 3], _: &[f32; 3]| 0.0f32;
        assert_eq!(zero.get_cost(&[0.0; 3], &[10.0, 0.0, 0.0]), 0.0);
    }
}
