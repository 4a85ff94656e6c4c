//! Random sources and the polygon/circle constraint used by sampling queries

use glam::Vec3;
use navtile_common::{circle_polygon, clip_polygon_2d, dist_sqr_2d};

/// Source of uniformly distributed numbers in `[0, 1)`
pub trait RandomSource {
    fn next_f32(&mut self) -> f32;
}

/// Default source backed by `fastrand`
#[derive(Debug, Clone)]
pub struct FastRandSource {
    rng: fastrand::Rng,
}

impl FastRandSource {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    /// Deterministic source for reproducible sampling
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl Default for FastRandSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for FastRandSource {
    fn next_f32(&mut self) -> f32 {
        self.rng.f32()
    }
}

impl<F> RandomSource for F
where
    F: FnMut() -> f32,
{
    fn next_f32(&mut self) -> f32 {
        self()
    }
}

/// Segments of the polygon approximating the search circle
const CIRCLE_SEGMENTS: usize = 12;

/// How candidate polygons are limited to the search circle when sampling
/// around a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolygonByCircleConstraint {
    /// Sample whole polygons touched by the circle
    #[default]
    NoOp,
    /// Sample only the part of each polygon inside the circle
    Strict,
}

impl PolygonByCircleConstraint {
    /// Sampling region of polygon `verts`, or `None` if nothing of it lies
    /// within the circle
    pub fn apply(&self, verts: &[Vec3], center: Vec3, radius: f32) -> Option<Vec<Vec3>> {
        match self {
            Self::NoOp => Some(verts.to_vec()),
            Self::Strict => {
                let radius_sqr = radius * radius;
                let c = center.to_array();
                if verts.iter().all(|v| dist_sqr_2d(&c, &v.to_array()) <= radius_sqr) {
                    return Some(verts.to_vec());
                }
                let circle = circle_polygon(center, radius, CIRCLE_SEGMENTS);
                let clipped = clip_polygon_2d(verts, &circle);
                (!clipped.is_empty()).then_some(clipped)
            }
        }
    }
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

    #[test]
    fn test_seeded_source_is_reproducible() {
        let mut a = FastRandSource::with_seed(42);
        let mut b = FastRandSource::with_seed(42);
        for _ in 0..16 {
            let v = a.next_f32();
            assert!((0.0..1.0).contains(&v));
            assert_eq!(v, b.next_f32());
        }
    }

    #[test]
    fn test_closure_source() {
        let mut calls = 0;
        let mut source = || {
            calls += 1;
            0.25f32
        };
        assert_eq!(source.next_f32(), 0.25);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_strict_keeps_polygon_inside_circle() {
        let poly = square(1.0);
        let out = PolygonByCircleConstraint::Strict.apply(&poly, Vec3::new(0.5, 0.0, 0.5), 5.0);
        assert_eq!(out, Some(poly));
    }

    #[test]
    fn test_strict_clips_to_circle() {
        let poly = square(10.0);
        let out = PolygonByCircleConstraint::Strict
            .apply(&poly, Vec3::new(5.0, 0.0, 5.0), 1.0)
            .unwrap();
        // Area of the inscribed 12-gon is 3 r^2
        let area: f32 = (2..out.len())
            .map(|i| navtile_common::tri_area_2d_vec3(out[0], out[i - 1], out[i]))
            .sum::<f32>()
            * 0.5;
        assert!((area - 3.0).abs() < 1e-3);
        assert!(out.iter().all(|v| (v.x - 5.0).abs() <= 1.0 + 1e-4 && (v.z - 5.0).abs() <= 1.0 + 1e-4));

        assert!(PolygonByCircleConstraint::Strict
            .apply(&poly, Vec3::new(50.0, 0.0, 50.0), 1.0)
            .is_none());
    }

    #[test]
    fn test_noop_passes_through() {
        let poly = square(10.0);
        let out = PolygonByCircleConstraint::NoOp.apply(&poly, Vec3::new(50.0, 0.0, 50.0), 1.0);
        assert_eq!(out, Some(poly));
    }
}
