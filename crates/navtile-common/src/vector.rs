//! Vector utilities built on glam
//!
//! Polygon sampling and clipping helpers used by the random point queries.

use glam::Vec3;

/// Twice the signed XZ area of a triangle given as `Vec3` points
#[inline]
pub fn tri_area_2d_vec3(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let ab = b - a;
    let ac = c - a;
    ac.x * ab.z - ab.x * ac.z
}

/// Picks a point inside a convex polygon.
///
/// The polygon is fanned into triangles from its first vertex, one triangle is
/// chosen with probability proportional to its area using `s`, and a point
/// inside that triangle is chosen using `t`. Both inputs are expected in `[0, 1)`.
pub fn random_point_in_convex_poly(pts: &[Vec3], s: f32, t: f32) -> Vec3 {
    let npts = pts.len();
    if npts < 3 {
        return pts.first().copied().unwrap_or(Vec3::ZERO);
    }

    let mut areas = vec![0.0f32; npts];
    let mut area_sum = 0.0;
    for i in 2..npts {
        areas[i] = tri_area_2d_vec3(pts[0], pts[i - 1], pts[i]);
        area_sum += areas[i].max(0.001);
    }

    let thr = s * area_sum;
    let mut acc = 0.0;
    let mut u = 1.0;
    let mut tri = npts - 1;
    for (i, &dacc) in areas.iter().enumerate().skip(2) {
        if thr >= acc && thr < acc + dacc {
            u = (thr - acc) / dacc;
            tri = i;
            break;
        }
        acc += dacc;
    }

    let v = t.sqrt();
    let a = 1.0 - v;
    let b = (1.0 - u) * v;
    let c = u * v;
    pts[0] * a + pts[tri - 1] * b + pts[tri] * c
}

/// Regular polygon approximating a circle on the XZ plane, in navigation mesh winding
pub fn circle_polygon(center: Vec3, radius: f32, segments: usize) -> Vec<Vec3> {
    (0..segments)
        .map(|i| {
            let a = i as f32 * std::f32::consts::TAU / segments as f32;
            Vec3::new(center.x + a.cos() * radius, center.y, center.z - a.sin() * radius)
        })
        .collect()
}

/// Clips `subject` against the convex polygon `clip` on the XZ plane.
///
/// Both polygons use navigation mesh winding. Heights of new vertices are
/// interpolated along the subject edges. Returns an empty list when the
/// polygons do not overlap.
pub fn clip_polygon_2d(subject: &[Vec3], clip: &[Vec3]) -> Vec<Vec3> {
    let mut output = subject.to_vec();
    let n = clip.len();
    for i in 0..n {
        if output.is_empty() {
            break;
        }
        let a = clip[i];
        let b = clip[(i + 1) % n];
        // Non-positive on the inner side of the clip edge
        let side = |p: Vec3| {
            let e = b - a;
            let d = p - a;
            e.x * d.z - e.z * d.x
        };
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        let mut prev_side = side(prev);
        for &cur in &input {
            let cur_side = side(cur);
            if cur_side <= 0.0 {
                if prev_side > 0.0 {
                    output.push(prev.lerp(cur, prev_side / (prev_side - cur_side)));
                }
                output.push(cur);
            } else if prev_side <= 0.0 {
                output.push(prev.lerp(cur, prev_side / (prev_side - cur_side)));
            }
            prev = cur;
            prev_side = cur_side;
        }
    }
    if output.len() < 3 {
        output.clear();
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f32) -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, size),
            Vec3::new(size, 0.0, size),
            Vec3::new(size, 0.0, 0.0),
        ]
    }

    fn area(poly: &[Vec3]) -> f32 {
        (2..poly.len())
            .map(|i| tri_area_2d_vec3(poly[0], poly[i - 1], poly[i]))
            .sum::<f32>()
            * 0.5
    }

    #[test]
    fn test_random_point_stays_inside() {
        let poly = square(2.0);
        for &(s, t) in &[(0.0, 0.0), (0.3, 0.7), (0.99, 0.99), (0.5, 0.01)] {
            let p = random_point_in_convex_poly(&poly, s, t);
            assert!(p.x >= -1e-5 && p.x <= 2.0 + 1e-5);
            assert!(p.z >= -1e-5 && p.z <= 2.0 + 1e-5);
        }
    }

    #[test]
    fn test_circle_polygon_winding() {
        let circle = circle_polygon(Vec3::ZERO, 1.0, 12);
        assert_eq!(circle.len(), 12);
        assert!(area(&circle) > 0.0);
    }

    #[test]
    fn test_clip_fully_inside_keeps_polygon() {
        let inner = square(1.0);
        let outer: Vec<Vec3> = square(4.0).iter().map(|v| *v - Vec3::new(1.0, 0.0, 1.0)).collect();
        let clipped = clip_polygon_2d(&inner, &outer);
        assert_eq!(clipped.len(), 4);
        assert!((area(&clipped) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_clip_partial_overlap() {
        let a = square(2.0);
        let b: Vec<Vec3> = square(2.0).iter().map(|v| *v + Vec3::new(1.0, 0.0, 1.0)).collect();
        let clipped = clip_polygon_2d(&a, &b);
        assert!((area(&clipped) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_clip_disjoint_is_empty() {
        let a = square(1.0);
        let b: Vec<Vec3> = square(1.0).iter().map(|v| *v + Vec3::new(5.0, 0.0, 0.0)).collect();
        assert!(clip_polygon_2d(&a, &b).is_empty());
    }
}
