//! Random point sampling on the mesh

use glam::Vec3;
use log::debug;
use navtile_common::{dist_point_segment_sqr_2d_with_t, random_point_in_convex_poly, tri_area_2d_vec3, visfinite};

use super::poly_ref::encode_poly_ref;
use super::{
    MeshTile, NavMeshQuery, Poly, PolyRef, PolygonByCircleConstraint, QueryFilter, RandomSource, Result, Status,
    StatusDetail,
};

/// Corners of a polygon as vectors
fn poly_points(tile: &MeshTile, poly: &Poly) -> Vec<Vec3> {
    (0..poly.vert_count as usize)
        .map(|k| Vec3::from(tile.poly_vertex(poly, k)))
        .collect()
}

/// Twice the area of a convex polygon on the XZ plane
fn convex_area(pts: &[Vec3]) -> f32 {
    (2..pts.len()).map(|k| tri_area_2d_vec3(pts[0], pts[k - 1], pts[k])).sum()
}

impl NavMeshQuery<'_> {
    /// Uniformly random point on the mesh.
    ///
    /// A tile is picked with equal weight, then a ground polygon of it that
    /// passes the filter weighted by area, then a point inside that polygon.
    pub fn find_random_point<F, R>(&self, filter: &F, rng: &mut R) -> Result<(PolyRef, [f32; 3])>
    where
        F: QueryFilter + ?Sized,
        R: RandomSource + ?Sized,
    {
        let nav = self.nav_mesh();

        let mut tile = None;
        let mut tile_sum = 0.0f32;
        for t in nav.tiles() {
            tile_sum += 1.0;
            if rng.next_f32() * tile_sum <= 1.0 {
                tile = Some(t);
            }
        }
        let tile = tile.ok_or(Status::FAILURE)?;

        let mut chosen = None;
        let mut area_sum = 0.0f32;
        for (i, poly) in tile.polys.iter().enumerate() {
            if poly.is_off_mesh_connection() {
                continue;
            }
            let r = encode_poly_ref(tile.salt, tile.index as u32, i as u32);
            if !filter.pass_filter(r, tile, poly) {
                continue;
            }

            let pts = poly_points(tile, poly);
            let area = convex_area(&pts);
            area_sum += area;
            if rng.next_f32() * area_sum <= area {
                chosen = Some((r, pts));
            }
        }
        let (r, pts) = chosen.ok_or(Status::FAILURE)?;

        let s = rng.next_f32();
        let t = rng.next_f32();
        let pt = random_point_in_convex_poly(&pts, s, t).to_array();
        let (pt, _) = self.closest_point_on_poly(r, &pt)?;
        Ok((r, pt))
    }

    /// Random point within reach of `start_ref` around `center`.
    ///
    /// Candidate polygons are those a circle search of `max_radius` reaches;
    /// `constraint` decides whether whole polygons or only their parts inside
    /// the circle are sampled. The result is not guaranteed to lie inside the
    /// circle with [`PolygonByCircleConstraint::NoOp`].
    #[allow(clippy::too_many_arguments)]
    pub fn find_random_point_around_circle<F, R>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        max_radius: f32,
        filter: &F,
        rng: &mut R,
        constraint: PolygonByCircleConstraint,
    ) -> Result<(PolyRef, [f32; 3])>
    where
        F: QueryFilter + ?Sized,
        R: RandomSource + ?Sized,
    {
        let nav = self.nav_mesh();
        if !nav.is_valid_poly_ref(start_ref) || !visfinite(center) || !max_radius.is_finite() || max_radius < 0.0 {
            return Err(Status::invalid_param());
        }
        let start = self.context(start_ref);
        if !filter.pass_filter(start_ref, start.tile, start.poly) {
            return Err(Status::invalid_param());
        }

        let radius_sqr = max_radius * max_radius;
        let center_v = Vec3::from(*center);
        let mut chosen: Option<(PolyRef, Vec<Vec3>)> = None;
        let mut area_sum = 0.0f32;

        let details = self.expand_area(
            start_ref,
            center,
            filter,
            |va, vb| dist_point_segment_sqr_2d_with_t(center, va, vb).0 <= radius_sqr,
            |cur, _, _| {
                if cur.poly.is_off_mesh_connection() {
                    return;
                }
                let pts = poly_points(cur.tile, cur.poly);
                let Some(region) = constraint.apply(&pts, center_v, max_radius) else {
                    return;
                };
                let area = convex_area(&region);
                area_sum += area;
                if rng.next_f32() * area_sum <= area {
                    chosen = Some((cur.reference, region));
                }
            },
        );
        if details.contains(StatusDetail::OUT_OF_NODES) {
            debug!("random point around {start_ref}: node pool exhausted, sampling the polygons reached");
        }

        let (r, region) = chosen.ok_or(Status::FAILURE)?;
        let s = rng.next_f32();
        let t = rng.next_f32();
        let pt = random_point_in_convex_poly(&region, s, t).to_array();
        let (pt, _) = self.closest_point_on_poly(r, &pt)?;
        Ok((r, pt))
    }
}
