//! 2D geometry operations on the XZ plane
//!
//! These are the primitives used by tile linking and by the navigation queries:
//! triangle areas, point/segment distances, segment/polygon clipping and the
//! separating-axis polygon overlap test. Polygons are stored as flat `xyz`
//! float arrays and are expected to use the navigation mesh winding, where a
//! point inside the polygon lies on the non-negative side of every edge as
//! measured by [`vec_perp_2d`].

/// Squared distance under which two points are considered equal
const EQUAL_THRESHOLD_SQR: f32 = (1.0 / 16384.0) * (1.0 / 16384.0);

/// Calculate twice the signed area of a 2D triangle on the XZ plane.
///
/// Positive for triangles wound the same way as navigation mesh polygons.
#[inline]
pub fn tri_area_2d(a: &[f32], b: &[f32], c: &[f32]) -> f32 {
    let abx = b[0] - a[0];
    let abz = b[2] - a[2];
    let acx = c[0] - a[0];
    let acz = c[2] - a[2];
    acx * abz - abx * acz
}

/// Perp-dot of two vectors on the XZ plane, `u.z * v.x - u.x * v.z`
#[inline]
pub fn vec_perp_2d(u: &[f32], v: &[f32]) -> f32 {
    u[2] * v[0] - u[0] * v[2]
}

/// Perp-dot with the opposite sign convention, `u.x * v.z - u.z * v.x`
#[inline]
pub fn vec_perp_xz(u: &[f32], v: &[f32]) -> f32 {
    u[0] * v[2] - u[2] * v[0]
}

/// Dot product on the XZ plane
#[inline]
pub fn dot_2d(u: &[f32], v: &[f32]) -> f32 {
    u[0] * v[0] + u[2] * v[2]
}

/// Squared distance between two points on the XZ plane
#[inline]
pub fn dist_sqr_2d(a: &[f32], b: &[f32]) -> f32 {
    let dx = b[0] - a[0];
    let dz = b[2] - a[2];
    dx * dx + dz * dz
}

/// Squared 3D distance
#[inline]
pub fn vdist_sqr(a: &[f32], b: &[f32]) -> f32 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let dz = b[2] - a[2];
    dx * dx + dy * dy + dz * dz
}

/// 3D distance
#[inline]
pub fn vdist(a: &[f32], b: &[f32]) -> f32 {
    vdist_sqr(a, b).sqrt()
}

/// Linear interpolation between two points
#[inline]
pub fn vlerp(a: &[f32], b: &[f32], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// `a + d * s`
#[inline]
pub fn vmad(a: &[f32], d: &[f32], s: f32) -> [f32; 3] {
    [a[0] + d[0] * s, a[1] + d[1] * s, a[2] + d[2] * s]
}

/// Component-wise difference `a - b`
#[inline]
pub fn vsub(a: &[f32], b: &[f32]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Component-wise sum `a + b`
#[inline]
pub fn vadd(a: &[f32], b: &[f32]) -> [f32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Returns true when two points are closer than a small fixed threshold
#[inline]
pub fn vequal(a: &[f32], b: &[f32]) -> bool {
    vdist_sqr(a, b) < EQUAL_THRESHOLD_SQR
}

/// Returns true when all three components are finite
#[inline]
pub fn visfinite(v: &[f32]) -> bool {
    v[0].is_finite() && v[1].is_finite() && v[2].is_finite()
}

/// Next power of two greater or equal to `v` (returns 1 for 0)
#[inline]
pub fn next_pow2(v: u32) -> u32 {
    v.max(1).next_power_of_two()
}

/// Squared distance from a point to a segment on the XZ plane.
///
/// Returns `(distance_sqr, t)` where `t` is the clamped parametric position of
/// the closest point along `a -> b`.
pub fn dist_point_segment_sqr_2d_with_t(p: &[f32], a: &[f32], b: &[f32]) -> (f32, f32) {
    let pqx = b[0] - a[0];
    let pqz = b[2] - a[2];
    let dx = p[0] - a[0];
    let dz = p[2] - a[2];

    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);

    let ex = a[0] + t * pqx - p[0];
    let ez = a[2] + t * pqz - p[2];
    (ex * ex + ez * ez, t)
}

/// Crossing-number point in polygon test on the XZ plane
pub fn point_in_polygon_2d(p: &[f32], verts: &[f32], nverts: usize) -> bool {
    let mut inside = false;
    let mut j = nverts.wrapping_sub(1);
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        if ((vi[2] > p[2]) != (vj[2] > p[2]))
            && (p[0] < (vj[0] - vi[0]) * (p[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Point in polygon test that also reports the distance to every edge.
///
/// Edge `j` runs from vertex `j` to vertex `j + 1`. Returns
/// `(inside, edge_dist_sqr, edge_t)`.
pub fn distance_pt_poly_edges_sqr(
    pt: &[f32],
    verts: &[f32],
    nverts: usize,
) -> (bool, Vec<f32>, Vec<f32>) {
    let mut edge_dists = vec![0.0; nverts];
    let mut edge_ts = vec![0.0; nverts];

    let mut inside = false;
    let mut j = nverts.wrapping_sub(1);
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        let (d, t) = dist_point_segment_sqr_2d_with_t(pt, vj, vi);
        edge_dists[j] = d;
        edge_ts[j] = t;
        j = i;
    }

    (inside, edge_dists, edge_ts)
}

/// Clips the segment `p0 -> p1` against a convex polygon on the XZ plane.
///
/// Returns `(tmin, tmax, seg_min, seg_max)` where `tmin`/`tmax` are the entry
/// and exit parameters along the segment and `seg_min`/`seg_max` the indices
/// of the entry and exit edges (`-1` when the segment starts or ends inside).
/// Returns `None` when the segment misses the polygon.
pub fn intersect_segment_poly_2d(
    p0: &[f32],
    p1: &[f32],
    verts: &[f32],
    nverts: usize,
) -> Option<(f32, f32, i32, i32)> {
    const EPS: f32 = 0.000001;

    let mut tmin = 0.0;
    let mut tmax = 1.0;
    let mut seg_min = -1;
    let mut seg_max = -1;

    let dir = vsub(p1, p0);

    let mut j = nverts.wrapping_sub(1);
    for i in 0..nverts {
        let edge = vsub(&verts[i * 3..], &verts[j * 3..]);
        let diff = vsub(p0, &verts[j * 3..]);
        let n = vec_perp_2d(&edge, &diff);
        let d = vec_perp_2d(&dir, &edge);

        if d.abs() < EPS {
            // Nearly parallel to this edge
            if n < 0.0 {
                return None;
            }
            j = i;
            continue;
        }

        let t = n / d;
        if d < 0.0 {
            // Entering across this edge
            if t > tmin {
                tmin = t;
                seg_min = j as i32;
                if tmin > tmax {
                    return None;
                }
            }
        } else if t < tmax {
            // Leaving across this edge
            tmax = t;
            seg_max = j as i32;
            if tmax < tmin {
                return None;
            }
        }
        j = i;
    }

    Some((tmin, tmax, seg_min, seg_max))
}

/// Intersects segments `ap -> aq` and `bp -> bq` on the XZ plane.
///
/// Returns the parameters `(s, t)` along each segment, or `None` when the
/// segments are parallel. The parameters are not clamped.
pub fn intersect_seg_seg_2d(ap: &[f32], aq: &[f32], bp: &[f32], bq: &[f32]) -> Option<(f32, f32)> {
    let u = vsub(aq, ap);
    let v = vsub(bq, bp);
    let w = vsub(ap, bp);
    let d = vec_perp_xz(&u, &v);
    if d.abs() < 1e-6 {
        return None;
    }
    Some((vec_perp_xz(&v, &w) / d, vec_perp_xz(&u, &w) / d))
}

/// Height of the triangle `abc` below or above `p`, if `p` projects inside it
pub fn closest_height_point_triangle(p: &[f32], a: &[f32], b: &[f32], c: &[f32]) -> Option<f32> {
    const EPS: f32 = 1e-6;

    let v0 = vsub(c, a);
    let v1 = vsub(b, a);
    let v2 = vsub(p, a);

    let mut denom = v0[0] * v1[2] - v0[2] * v1[0];
    if denom.abs() < EPS {
        return None;
    }

    let mut u = v1[2] * v2[0] - v1[0] * v2[2];
    let mut v = v0[0] * v2[2] - v0[2] * v2[0];
    if denom < 0.0 {
        denom = -denom;
        u = -u;
        v = -v;
    }

    if u >= 0.0 && v >= 0.0 && (u + v) <= denom {
        Some(a[1] + (v0[1] * u + v1[1] * v) / denom)
    } else {
        None
    }
}

/// Projects a polygon onto an XZ axis and returns the covered interval
pub fn project_poly_2d(axis: &[f32], verts: &[f32], nverts: usize) -> (f32, f32) {
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for i in 0..nverts {
        let d = dot_2d(axis, &verts[i * 3..]);
        min = min.min(d);
        max = max.max(d);
    }
    (min, max)
}

/// Interval overlap with an inward tolerance
#[inline]
pub fn overlap_range(amin: f32, amax: f32, bmin: f32, bmax: f32, eps: f32) -> bool {
    !((amin + eps) > bmax || (amax - eps) < bmin)
}

/// Separating-axis overlap test between two convex polygons on the XZ plane.
///
/// Polygons that merely touch along an edge are not considered overlapping.
pub fn overlap_poly_poly_2d(polya: &[f32], npolya: usize, polyb: &[f32], npolyb: usize) -> bool {
    const EPS: f32 = 1e-4;

    for (poly, npoly) in [(polya, npolya), (polyb, npolyb)] {
        let mut j = npoly.wrapping_sub(1);
        for i in 0..npoly {
            let va = &poly[j * 3..j * 3 + 3];
            let vb = &poly[i * 3..i * 3 + 3];
            let n = [vb[2] - va[2], 0.0, -(vb[0] - va[0])];
            let (amin, amax) = project_poly_2d(&n, polya, npolya);
            let (bmin, bmax) = project_poly_2d(&n, polyb, npolyb);
            if !overlap_range(amin, amax, bmin, bmax, EPS) {
                return false;
            }
            j = i;
        }
    }
    true
}

/// Axis-aligned box overlap test
#[inline]
pub fn overlap_bounds(amin: &[f32], amax: &[f32], bmin: &[f32], bmax: &[f32]) -> bool {
    !(amin[0] > bmax[0]
        || amax[0] < bmin[0]
        || amin[1] > bmax[1]
        || amax[1] < bmin[1]
        || amin[2] > bmax[2]
        || amax[2] < bmin[2])
}

/// Overlap test for boxes stored in quantized tile-local coordinates
#[inline]
pub fn overlap_quant_bounds(amin: &[u16; 3], amax: &[u16; 3], bmin: &[u16; 3], bmax: &[u16; 3]) -> bool {
    !(amin[0] > bmax[0]
        || amax[0] < bmin[0]
        || amin[1] > bmax[1]
        || amax[1] < bmin[1]
        || amin[2] > bmax[2]
        || amax[2] < bmin[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    // Unit square in navigation mesh winding
    const SQUARE: [f32; 12] = [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0];

    #[test]
    fn test_tri_area_sign_matches_winding() {
        let a = [0.0, 0.0, 0.0];
        let b = [0.0, 0.0, 1.0];
        let c = [1.0, 0.0, 1.0];
        assert!(tri_area_2d(&a, &b, &c) > 0.0);
        assert!(tri_area_2d(&a, &c, &b) < 0.0);
        assert_eq!(tri_area_2d(&a, &a, &b), 0.0);
    }

    #[test]
    fn test_point_segment_distance() {
        let (d, t) = dist_point_segment_sqr_2d_with_t(&[0.5, 3.0, 1.0], &[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((d - 1.0).abs() < 1e-6);
        assert!((t - 0.5).abs() < 1e-6);

        let (d, t) = dist_point_segment_sqr_2d_with_t(&[-2.0, 0.0, 0.0], &[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((d - 4.0).abs() < 1e-6);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn test_point_in_polygon() {
        assert!(point_in_polygon_2d(&[0.5, 0.0, 0.5], &SQUARE, 4));
        assert!(!point_in_polygon_2d(&[1.5, 0.0, 0.5], &SQUARE, 4));
    }

    #[test]
    fn test_segment_poly_clip() {
        // Starts inside, leaves through the +x edge (vertex 2 -> 3)
        let (tmin, tmax, seg_min, seg_max) =
            intersect_segment_poly_2d(&[0.5, 0.0, 0.5], &[1.5, 0.0, 0.5], &SQUARE, 4).unwrap();
        assert_eq!(tmin, 0.0);
        assert!((tmax - 0.5).abs() < 1e-5);
        assert_eq!(seg_min, -1);
        assert_eq!(seg_max, 2);

        // Fully inside
        let (_, tmax, _, seg_max) =
            intersect_segment_poly_2d(&[0.2, 0.0, 0.2], &[0.8, 0.0, 0.8], &SQUARE, 4).unwrap();
        assert_eq!(tmax, 1.0);
        assert_eq!(seg_max, -1);

        // Misses
        assert!(intersect_segment_poly_2d(&[2.0, 0.0, 0.0], &[3.0, 0.0, 1.0], &SQUARE, 4).is_none());
    }

    #[test]
    fn test_seg_seg_intersection() {
        let (s, t) = intersect_seg_seg_2d(
            &[0.0, 0.0, 0.0],
            &[2.0, 0.0, 0.0],
            &[1.0, 0.0, -1.0],
            &[1.0, 0.0, 1.0],
        )
        .unwrap();
        assert!((s - 0.5).abs() < 1e-6);
        assert!((t - 0.5).abs() < 1e-6);

        assert!(intersect_seg_seg_2d(
            &[0.0, 0.0, 0.0],
            &[1.0, 0.0, 0.0],
            &[0.0, 0.0, 1.0],
            &[1.0, 0.0, 1.0]
        )
        .is_none());
    }

    #[test]
    fn test_closest_height_on_sloped_triangle() {
        let a = [0.0, 0.0, 0.0];
        let b = [0.0, 0.0, 1.0];
        let c = [1.0, 1.0, 0.0];
        let h = closest_height_point_triangle(&[0.5, 10.0, 0.25], &a, &b, &c).unwrap();
        assert!((h - 0.5).abs() < 1e-5);
        assert!(closest_height_point_triangle(&[2.0, 0.0, 2.0], &a, &b, &c).is_none());
    }

    #[test]
    fn test_poly_overlap_ignores_touching_edges() {
        let shifted: Vec<f32> = SQUARE
            .chunks(3)
            .flat_map(|v| [v[0] + 1.0, v[1], v[2]])
            .collect();
        assert!(!overlap_poly_poly_2d(&SQUARE, 4, &shifted, 4));

        let overlapping: Vec<f32> = SQUARE
            .chunks(3)
            .flat_map(|v| [v[0] + 0.5, v[1], v[2] + 0.5])
            .collect();
        assert!(overlap_poly_poly_2d(&SQUARE, 4, &overlapping, 4));
    }

    #[test]
    fn test_quant_bounds() {
        assert!(overlap_quant_bounds(&[0, 0, 0], &[4, 4, 4], &[4, 0, 4], &[8, 2, 8]));
        assert!(!overlap_quant_bounds(&[0, 0, 0], &[4, 4, 4], &[5, 0, 0], &[8, 2, 8]));
    }

    #[test]
    fn test_next_pow2() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(5), 8);
        assert_eq!(next_pow2(16), 16);
    }
}
