//! Straight path extraction (string pulling)
//!
//! Reduces a polygon corridor to the shortest polyline through it with the
//! funnel algorithm: the funnel apex starts at the start point and narrows
//! across each portal until one side crosses the other, at which point the
//! crossed corner becomes a path vertex and the new apex.

use std::ops::ControlFlow;

use bitflags::bitflags;
use navtile_common::{dist_point_segment_sqr_2d_with_t, intersect_seg_seg_2d, tri_area_2d, vequal, visfinite, vlerp};

use super::nav_mesh_query::portal_points;
use super::{NavMeshQuery, PolyContext, PolyRef, PolyType, Result, Status, StatusDetail};

bitflags! {
    /// Flags of a straight path vertex
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StraightPathFlags: u8 {
        /// The vertex is the start position
        const START = 0x01;
        /// The vertex is the end position
        const END = 0x02;
        /// The vertex is the start of an off-mesh connection
        const OFFMESH_CONNECTION = 0x04;
    }
}

bitflags! {
    /// Extra vertices to emit along the straight path
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StraightPathOptions: u8 {
        /// A vertex wherever the path crosses into a polygon of another area
        const AREA_CROSSINGS = 0x01;
        /// A vertex at every portal the path crosses
        const ALL_CROSSINGS = 0x02;
    }
}

/// One vertex of a straight path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StraightPathPoint {
    pub pos: [f32; 3],
    pub flags: StraightPathFlags,
    /// Polygon entered at this vertex; null for the end point
    pub reference: PolyRef,
}

/// Distance below which the start point counts as lying on the first portal
const PORTAL_SNAP_DIST: f32 = 0.001;

/// Output buffer of a straight path search
struct StraightPath {
    points: Vec<StraightPathPoint>,
    max_points: usize,
}

impl StraightPath {
    fn new(max_points: usize) -> Self {
        Self {
            points: Vec::with_capacity(max_points.min(256)),
            max_points,
        }
    }

    fn is_full(&self) -> bool {
        self.points.len() >= self.max_points
    }

    /// Appends a vertex, or updates the last one if it sits at the same spot.
    /// Breaks once the buffer is full or the end vertex was written.
    fn append_vertex(&mut self, pos: [f32; 3], flags: StraightPathFlags, reference: PolyRef) -> ControlFlow<Status> {
        if let Some(last) = self.points.last_mut() {
            if vequal(&last.pos, &pos) {
                last.flags = flags;
                last.reference = reference;
                return ControlFlow::Continue(());
            }
        }

        self.points.push(StraightPathPoint { pos, flags, reference });
        if self.is_full() {
            return ControlFlow::Break(Status::success(StatusDetail::BUFFER_TOO_SMALL));
        }
        if flags == StraightPathFlags::END {
            return ControlFlow::Break(Status::SUCCESS);
        }
        ControlFlow::Continue(())
    }

    fn finish(self, status: Status) -> (Vec<StraightPathPoint>, Status) {
        (self.points, status)
    }
}

/// Flags of a funnel corner entering polygon `reference` of type `poly_type`
fn corner_flags(reference: PolyRef, poly_type: PolyType) -> StraightPathFlags {
    if reference.is_null() {
        StraightPathFlags::END
    } else if poly_type == PolyType::OffMeshConnection {
        StraightPathFlags::OFFMESH_CONNECTION
    } else {
        StraightPathFlags::empty()
    }
}

impl NavMeshQuery<'_> {
    /// Finds the straight path from `start_pos` to `end_pos` through the
    /// polygon corridor `path`.
    ///
    /// The start and end points are first clamped to the first and last
    /// polygon. A corridor that breaks off (an unlinked pair) yields the path
    /// up to the break with PARTIAL_RESULT. At most `max_straight_path`
    /// vertices are written; a full buffer is reported as BUFFER_TOO_SMALL.
    pub fn find_straight_path(
        &self,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        path: &[PolyRef],
        max_straight_path: usize,
        options: StraightPathOptions,
    ) -> Result<(Vec<StraightPathPoint>, Status)> {
        if !visfinite(start_pos)
            || !visfinite(end_pos)
            || path.first().map_or(true, |r| r.is_null())
            || max_straight_path == 0
        {
            return Err(Status::invalid_param());
        }

        let closest_start = self.closest_point_on_poly_boundary(path[0], start_pos)?;
        let mut closest_end = self.closest_point_on_poly_boundary(path[path.len() - 1], end_pos)?;
        let crossings = options.intersects(StraightPathOptions::AREA_CROSSINGS | StraightPathOptions::ALL_CROSSINGS);

        let mut out = StraightPath::new(max_straight_path);
        if let ControlFlow::Break(status) = out.append_vertex(closest_start, StraightPathFlags::START, path[0]) {
            return Ok(out.finish(status));
        }

        if path.len() > 1 {
            let mut apex = closest_start;
            let mut portal_left = apex;
            let mut portal_right = apex;
            let mut apex_index = 0;
            let mut left_index = 0;
            let mut right_index = 0;
            let mut left_type = PolyType::Ground;
            let mut right_type = PolyType::Ground;
            let mut left_ref = path[0];
            let mut right_ref = path[0];

            let mut i = 0;
            while i < path.len() {
                let left;
                let right;
                let to_type;

                if i + 1 < path.len() {
                    match self.corridor_portal(path[i], path[i + 1]) {
                        Some((l, r, t)) => {
                            left = l;
                            right = r;
                            to_type = t;
                        }
                        None => {
                            // path[i + 1] is gone; end the path on path[i]
                            closest_end = self.closest_point_on_poly_boundary(path[i], end_pos)?;
                            if crossings {
                                let _ = self.append_portals(&mut out, apex_index, i, &closest_end, path, options)?;
                            }
                            let _ = out.append_vertex(closest_end, StraightPathFlags::empty(), path[i]);
                            let mut status = Status::success(StatusDetail::PARTIAL_RESULT);
                            if out.is_full() {
                                status |= StatusDetail::BUFFER_TOO_SMALL;
                            }
                            return Ok(out.finish(status));
                        }
                    }

                    if i == 0 {
                        let (d, _) = dist_point_segment_sqr_2d_with_t(&apex, &left, &right);
                        if d < PORTAL_SNAP_DIST * PORTAL_SNAP_DIST {
                            i += 1;
                            continue;
                        }
                    }
                } else {
                    left = closest_end;
                    right = closest_end;
                    to_type = PolyType::Ground;
                }

                // Right side of the funnel
                if tri_area_2d(&apex, &portal_right, &right) <= 0.0 {
                    if vequal(&apex, &portal_right) || tri_area_2d(&apex, &portal_left, &right) > 0.0 {
                        portal_right = right;
                        right_ref = path.get(i + 1).copied().unwrap_or(PolyRef::NULL);
                        right_type = to_type;
                        right_index = i;
                    } else {
                        if crossings {
                            if let ControlFlow::Break(status) =
                                self.append_portals(&mut out, apex_index, left_index, &portal_left, path, options)?
                            {
                                return Ok(out.finish(status));
                            }
                        }

                        apex = portal_left;
                        apex_index = left_index;
                        if let ControlFlow::Break(status) =
                            out.append_vertex(apex, corner_flags(left_ref, left_type), left_ref)
                        {
                            return Ok(out.finish(status));
                        }

                        portal_left = apex;
                        portal_right = apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                // Left side of the funnel
                if tri_area_2d(&apex, &portal_left, &left) >= 0.0 {
                    if vequal(&apex, &portal_left) || tri_area_2d(&apex, &portal_right, &left) < 0.0 {
                        portal_left = left;
                        left_ref = path.get(i + 1).copied().unwrap_or(PolyRef::NULL);
                        left_type = to_type;
                        left_index = i;
                    } else {
                        if crossings {
                            if let ControlFlow::Break(status) =
                                self.append_portals(&mut out, apex_index, right_index, &portal_right, path, options)?
                            {
                                return Ok(out.finish(status));
                            }
                        }

                        apex = portal_right;
                        apex_index = right_index;
                        if let ControlFlow::Break(status) =
                            out.append_vertex(apex, corner_flags(right_ref, right_type), right_ref)
                        {
                            return Ok(out.finish(status));
                        }

                        portal_left = apex;
                        portal_right = apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                i += 1;
            }

            if crossings {
                if let ControlFlow::Break(status) =
                    self.append_portals(&mut out, apex_index, path.len() - 1, &closest_end, path, options)?
                {
                    return Ok(out.finish(status));
                }
            }
        }

        let _ = out.append_vertex(closest_end, StraightPathFlags::END, PolyRef::NULL);
        let status = if out.is_full() {
            Status::success(StatusDetail::BUFFER_TOO_SMALL)
        } else {
            Status::SUCCESS
        };
        Ok(out.finish(status))
    }

    /// Portal between two corridor polygons and the type of the second one
    fn corridor_portal(&self, from: PolyRef, to: PolyRef) -> Option<([f32; 3], [f32; 3], PolyType)> {
        let (from_tile, from_poly) = self.nav_mesh().get_tile_and_poly_by_ref(from).ok()?;
        let (to_tile, to_poly) = self.nav_mesh().get_tile_and_poly_by_ref(to).ok()?;
        let (left, right) = portal_points(
            PolyContext::new(from, from_tile, from_poly),
            PolyContext::new(to, to_tile, to_poly),
        )?;
        Some((left, right, to_poly.poly_type))
    }

    /// Emits the portal crossings of the segment from the last vertex to
    /// `end_pos`, for corridor polygons `start_idx..end_idx`
    fn append_portals(
        &self,
        out: &mut StraightPath,
        start_idx: usize,
        end_idx: usize,
        end_pos: &[f32; 3],
        path: &[PolyRef],
        options: StraightPathOptions,
    ) -> Result<ControlFlow<Status>> {
        let Some(start_pos) = out.points.last().map(|p| p.pos) else {
            return Ok(ControlFlow::Continue(()));
        };

        for i in start_idx..end_idx {
            let (from_tile, from_poly) = self.nav_mesh().get_tile_and_poly_by_ref(path[i])?;
            let (to_tile, to_poly) = self.nav_mesh().get_tile_and_poly_by_ref(path[i + 1])?;

            let Some((left, right)) = portal_points(
                PolyContext::new(path[i], from_tile, from_poly),
                PolyContext::new(path[i + 1], to_tile, to_poly),
            ) else {
                break;
            };

            if options.contains(StraightPathOptions::AREA_CROSSINGS) && from_poly.area == to_poly.area {
                continue;
            }

            if let Some((_, t)) = intersect_seg_seg_2d(&start_pos, end_pos, &left, &right) {
                let pt = vlerp(&left, &right, t);
                if let ControlFlow::Break(status) = out.append_vertex(pt, StraightPathFlags::empty(), path[i + 1]) {
                    return Ok(ControlFlow::Break(status));
                }
            }
        }

        Ok(ControlFlow::Continue(()))
    }
}
