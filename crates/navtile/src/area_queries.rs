//! Dijkstra style area searches around a polygon
//!
//! These queries expand outwards from a start polygon with a uniform cost
//! search (no heuristic) and stop expanding wherever the connecting portal
//! leaves the query region. They also cover the local searches driven by the
//! small node pool: the local neighbourhood, wall segments and constrained
//! movement along the surface.

use std::collections::VecDeque;

use glam::Vec3;
use navtile_common::{
    dist_point_segment_sqr_2d_with_t, intersect_segment_poly_2d, overlap_poly_poly_2d,
    point_in_polygon_2d, vdist, visfinite, vlerp,
};

use super::nav_mesh_query::{edge_mid_point, portal_points};
use super::node_pool::{NodeFlags, NULL_NODE};
use super::poly_ref::encode_poly_ref;
use super::{
    MeshTile, NavMesh, NavMeshQuery, Poly, PolyContext, PolyRef, QueryFilter, Result, Status,
    StatusDetail, EXT_LINK, MAX_VERTS_PER_POLY,
};

/// Polygons kept in flight by the stack based local searches
const MAX_LOCAL_STACK: usize = 48;

/// Portal intervals tracked per polygon edge by [`NavMeshQuery::get_poly_wall_segments`]
const MAX_EDGE_INTERVALS: usize = 16;

/// A polygon reached by an area search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisitedPoly {
    pub reference: PolyRef,
    /// Polygon it was reached from; null for the start polygon
    pub parent: PolyRef,
    /// Accumulated cost from the search center
    pub cost: f32,
}

/// Nearest wall found by [`NavMeshQuery::find_distance_to_wall`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallHit {
    /// Distance to the wall, or the search radius when none was found
    pub distance: f32,
    /// Closest point on the wall, or the center when none was found
    pub position: [f32; 3],
    /// Unit vector from the wall point to the center, zero when none was found
    pub normal: [f32; 3],
}

/// A wall or portal segment of a polygon outline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallSegment {
    pub start: [f32; 3],
    pub end: [f32; 3],
    /// Polygon across a portal segment; null for walls
    pub neighbour: PolyRef,
}

/// Polygons reached across edge `edge` of `poly` that pass the filter, with
/// the byte range of the edge each one covers
fn edge_neighbours<F: QueryFilter + ?Sized>(
    nav: &NavMesh,
    tile: &MeshTile,
    poly: &Poly,
    edge: usize,
    filter: &F,
) -> Vec<(PolyRef, u8, u8)> {
    let nei = poly.neis[edge];
    if nei & EXT_LINK != 0 {
        tile.poly_links(poly)
            .map(|(_, l)| l)
            .filter(|l| l.edge as usize == edge && l.reference.is_some())
            .filter(|l| {
                let (t, p) = nav.tile_and_poly(l.reference);
                filter.pass_filter(l.reference, t, p)
            })
            .map(|l| (l.reference, l.bmin, l.bmax))
            .collect()
    } else if nei != 0 {
        let idx = (nei - 1) as usize;
        let r = encode_poly_ref(tile.salt, tile.index as u32, idx as u32);
        match tile.polys.get(idx) {
            Some(p) if filter.pass_filter(r, tile, p) => vec![(r, 0, 255)],
            _ => Vec::new(),
        }
    } else {
        Vec::new()
    }
}

/// Portal interval along an edge, in bytes of the edge length
#[derive(Debug, Clone, Copy)]
struct EdgeInterval {
    reference: PolyRef,
    tmin: i16,
    tmax: i16,
}

/// Inserts an interval keeping the list sorted; drops it when the list is full
fn insert_interval(ints: &mut Vec<EdgeInterval>, tmin: i16, tmax: i16, reference: PolyRef) {
    if ints.len() + 1 > MAX_EDGE_INTERVALS {
        return;
    }
    let idx = ints.iter().position(|i| tmax <= i.tmin).unwrap_or(ints.len());
    ints.insert(idx, EdgeInterval { reference, tmin, tmax });
}

impl<'a> NavMeshQuery<'a> {
    /// Uniform cost expansion from `start_ref`.
    ///
    /// A neighbour is entered only if `touches` accepts the portal to it.
    /// `visit` sees every polygon as it is closed, with its parent and cost.
    pub(crate) fn expand_area<F, A, V>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        filter: &F,
        mut touches: A,
        mut visit: V,
    ) -> StatusDetail
    where
        F: QueryFilter + ?Sized,
        A: FnMut(&[f32; 3], &[f32; 3]) -> bool,
        V: FnMut(PolyContext<'a>, PolyRef, f32),
    {
        self.node_pool.clear();
        self.open_list.clear();

        let Some(start) = self.node_pool.get_node(start_ref, 0) else {
            return StatusDetail::OUT_OF_NODES;
        };
        let node = self.node_pool.node_mut(start);
        node.pos = *center;
        node.pidx = NULL_NODE;
        node.cost = 0.0;
        node.total = 0.0;
        node.flags = NodeFlags::OPEN;
        self.open_list.push(&self.node_pool, start);

        let mut details = StatusDetail::empty();

        while let Some(current) = self.open_list.pop(&self.node_pool) {
            let node = self.node_pool.node_mut(current);
            node.flags.remove(NodeFlags::OPEN);
            node.flags.insert(NodeFlags::CLOSED);
            let (cur_ref, cur_pos, cur_total, cur_pidx) = (node.id, node.pos, node.total, node.pidx);

            let cur = self.context(cur_ref);
            let parent_ref = self.node_pool.node_at_idx(cur_pidx).map_or(PolyRef::NULL, |p| p.id);
            let parent = parent_ref.is_some().then(|| self.context(parent_ref));

            visit(cur, parent_ref, cur_total);

            for (_, link) in cur.tile.poly_links(cur.poly) {
                let neighbour_ref = link.reference;
                if neighbour_ref.is_null() || neighbour_ref == parent_ref {
                    continue;
                }

                let next = self.context(neighbour_ref);
                if !filter.pass_filter(neighbour_ref, next.tile, next.poly) {
                    continue;
                }

                let Some((va, vb)) = portal_points(cur, next) else {
                    continue;
                };
                if !touches(&va, &vb) {
                    continue;
                }

                let Some(neighbour) = self.node_pool.get_node(neighbour_ref, 0) else {
                    details |= StatusDetail::OUT_OF_NODES;
                    continue;
                };

                let n = self.node_pool.node(neighbour);
                if n.flags.contains(NodeFlags::CLOSED) {
                    continue;
                }
                let pos = if n.flags.is_empty() { vlerp(&va, &vb, 0.5) } else { n.pos };
                let total = cur_total + filter.get_cost(&cur_pos, &pos, parent, cur, Some(next));
                if n.flags.contains(NodeFlags::OPEN) && total >= n.total {
                    continue;
                }
                let was_open = n.flags.contains(NodeFlags::OPEN);

                let node = self.node_pool.node_mut(neighbour);
                node.pos = pos;
                node.pidx = current;
                node.cost = total;
                node.total = total;

                if was_open {
                    self.open_list.modify(&self.node_pool, neighbour);
                } else {
                    self.node_pool.node_mut(neighbour).flags.insert(NodeFlags::OPEN);
                    self.open_list.push(&self.node_pool, neighbour);
                }
            }
        }

        details
    }

    /// Polygons reachable from `start_ref` through portals that touch the
    /// circle, in order of increasing cost
    pub fn find_polys_around_circle<F: QueryFilter + ?Sized>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        radius: f32,
        filter: &F,
        max_result: usize,
    ) -> Result<(Vec<VisitedPoly>, Status)> {
        if !self.nav_mesh().is_valid_poly_ref(start_ref) || !visfinite(center) || !radius.is_finite() || radius < 0.0 {
            return Err(Status::invalid_param());
        }

        let radius_sqr = radius * radius;
        let mut result = Vec::new();
        let mut overflow = false;

        let details = self.expand_area(
            start_ref,
            center,
            filter,
            |va, vb| dist_point_segment_sqr_2d_with_t(center, va, vb).0 <= radius_sqr,
            |cur, parent, cost| collect_visit(&mut result, &mut overflow, max_result, cur.reference, parent, cost),
        );

        Ok((result, visit_status(details, overflow)))
    }

    /// Polygons reachable from `start_ref` through portals that touch the
    /// convex polygon `verts`, in order of increasing cost
    pub fn find_polys_around_shape<F: QueryFilter + ?Sized>(
        &mut self,
        start_ref: PolyRef,
        verts: &[[f32; 3]],
        filter: &F,
        max_result: usize,
    ) -> Result<(Vec<VisitedPoly>, Status)> {
        if !self.nav_mesh().is_valid_poly_ref(start_ref) || verts.len() < 3 || !verts.iter().all(|v| visfinite(v)) {
            return Err(Status::invalid_param());
        }

        let center = (verts.iter().map(|v| Vec3::from(*v)).sum::<Vec3>() / verts.len() as f32).to_array();
        let flat: Vec<f32> = verts.iter().flatten().copied().collect();
        let nverts = verts.len();

        let mut result = Vec::new();
        let mut overflow = false;

        let details = self.expand_area(
            start_ref,
            &center,
            filter,
            |va, vb| {
                intersect_segment_poly_2d(va, vb, &flat, nverts)
                    .is_some_and(|(tmin, tmax, _, _)| tmin <= 1.0 && tmax >= 0.0)
            },
            |cur, parent, cost| collect_visit(&mut result, &mut overflow, max_result, cur.reference, parent, cost),
        );

        Ok((result, visit_status(details, overflow)))
    }

    /// Non-overlapping polygons around `center` within `radius`.
    ///
    /// Grows a patch breadth first and drops any polygon that overlaps an
    /// accepted one it is not linked to, so the patch never stacks layers.
    /// Returns `(polygon, parent)` pairs; the start polygon has a null parent.
    pub fn find_local_neighbourhood<F: QueryFilter + ?Sized>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        radius: f32,
        filter: &F,
        max_result: usize,
    ) -> Result<(Vec<(PolyRef, PolyRef)>, Status)> {
        if !self.nav_mesh().is_valid_poly_ref(start_ref) || !visfinite(center) || !radius.is_finite() || radius < 0.0 {
            return Err(Status::invalid_param());
        }

        let radius_sqr = radius * radius;
        let mut status = Status::SUCCESS;
        let mut result: Vec<(PolyRef, PolyRef)> = Vec::new();

        self.tiny_node_pool.clear();
        let start = self
            .tiny_node_pool
            .get_node(start_ref, 0)
            .ok_or_else(|| Status::failure(StatusDetail::OUT_OF_NODES))?;
        self.tiny_node_pool.node_mut(start).flags = NodeFlags::CLOSED;

        let mut stack = VecDeque::with_capacity(MAX_LOCAL_STACK);
        stack.push_back(start);

        if max_result > 0 {
            result.push((start_ref, PolyRef::NULL));
        } else {
            status |= StatusDetail::BUFFER_TOO_SMALL;
        }

        let mut pa = [0.0f32; MAX_VERTS_PER_POLY * 3];
        let mut pb = [0.0f32; MAX_VERTS_PER_POLY * 3];

        while let Some(current) = stack.pop_front() {
            let cur_ref = self.tiny_node_pool.node(current).id;
            let cur = self.context(cur_ref);

            for (_, link) in cur.tile.poly_links(cur.poly) {
                let neighbour_ref = link.reference;
                if neighbour_ref.is_null() {
                    continue;
                }

                let Some(neighbour) = self.tiny_node_pool.get_node(neighbour_ref, 0) else {
                    continue;
                };
                if self.tiny_node_pool.node(neighbour).flags.contains(NodeFlags::CLOSED) {
                    continue;
                }

                let next = self.context(neighbour_ref);
                if next.poly.is_off_mesh_connection() || !filter.pass_filter(neighbour_ref, next.tile, next.poly) {
                    continue;
                }

                let Some((va, vb)) = portal_points(cur, next) else {
                    continue;
                };
                if dist_point_segment_sqr_2d_with_t(center, &va, &vb).0 > radius_sqr {
                    continue;
                }

                // Closed before the overlap test so a rejected polygon is not retried
                let node = self.tiny_node_pool.node_mut(neighbour);
                node.flags.insert(NodeFlags::CLOSED);
                node.pidx = current;

                let npa = next.tile.collect_poly_verts(next.poly, &mut pa);
                let overlaps = result.iter().any(|&(past_ref, _)| {
                    let connected = cur.tile.poly_links(cur.poly).any(|(_, l)| l.reference == past_ref);
                    if connected {
                        return false;
                    }
                    let past = self.context(past_ref);
                    let npb = past.tile.collect_poly_verts(past.poly, &mut pb);
                    overlap_poly_poly_2d(&pa, npa, &pb, npb)
                });
                if overlaps {
                    continue;
                }

                if result.len() < max_result {
                    result.push((neighbour_ref, cur_ref));
                } else {
                    status |= StatusDetail::BUFFER_TOO_SMALL;
                }

                if stack.len() < MAX_LOCAL_STACK {
                    stack.push_back(neighbour);
                }
            }
        }

        Ok((result, status))
    }

    /// Distance from `center` to the nearest wall within `max_radius`.
    ///
    /// A wall is a polygon edge that leads nowhere the filter allows. The
    /// search radius shrinks as closer walls are found.
    pub fn find_distance_to_wall<F: QueryFilter + ?Sized>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        max_radius: f32,
        filter: &F,
    ) -> Result<(WallHit, Status)> {
        let nav = self.nav_mesh();
        if !nav.is_valid_poly_ref(start_ref) || !visfinite(center) || !max_radius.is_finite() || max_radius < 0.0 {
            return Err(Status::invalid_param());
        }

        self.node_pool.clear();
        self.open_list.clear();
        let start = self
            .node_pool
            .get_node(start_ref, 0)
            .ok_or_else(|| Status::failure(StatusDetail::OUT_OF_NODES))?;
        let node = self.node_pool.node_mut(start);
        node.pos = *center;
        node.pidx = NULL_NODE;
        node.cost = 0.0;
        node.total = 0.0;
        node.flags = NodeFlags::OPEN;
        self.open_list.push(&self.node_pool, start);

        let mut radius_sqr = max_radius * max_radius;
        let mut hit_pos = *center;
        let mut details = StatusDetail::empty();

        while let Some(current) = self.open_list.pop(&self.node_pool) {
            let node = self.node_pool.node_mut(current);
            node.flags.remove(NodeFlags::OPEN);
            node.flags.insert(NodeFlags::CLOSED);
            let (cur_ref, cur_pos, cur_total, cur_pidx) = (node.id, node.pos, node.total, node.pidx);

            let cur = self.context(cur_ref);
            let parent_ref = self.node_pool.node_at_idx(cur_pidx).map_or(PolyRef::NULL, |p| p.id);
            let nv = cur.poly.vert_count as usize;

            let mut j = nv.wrapping_sub(1);
            for i in 0..nv {
                if edge_neighbours(nav, cur.tile, cur.poly, j, filter).is_empty() {
                    let vj = cur.tile.poly_vertex(cur.poly, j);
                    let vi = cur.tile.poly_vertex(cur.poly, i);
                    let (d, t) = dist_point_segment_sqr_2d_with_t(center, &vj, &vi);
                    if d <= radius_sqr {
                        radius_sqr = d;
                        hit_pos = vlerp(&vj, &vi, t);
                    }
                }
                j = i;
            }

            for (_, link) in cur.tile.poly_links(cur.poly) {
                let neighbour_ref = link.reference;
                if neighbour_ref.is_null() || neighbour_ref == parent_ref {
                    continue;
                }

                let next = self.context(neighbour_ref);
                let e = link.edge as usize;
                if next.poly.is_off_mesh_connection() || e >= nv {
                    continue;
                }

                let va = cur.tile.poly_vertex(cur.poly, e);
                let vb = cur.tile.poly_vertex(cur.poly, (e + 1) % nv);
                if dist_point_segment_sqr_2d_with_t(center, &va, &vb).0 > radius_sqr {
                    continue;
                }
                if !filter.pass_filter(neighbour_ref, next.tile, next.poly) {
                    continue;
                }

                let Some(neighbour) = self.node_pool.get_node(neighbour_ref, 0) else {
                    details |= StatusDetail::OUT_OF_NODES;
                    continue;
                };
                let n = self.node_pool.node(neighbour);
                if n.flags.contains(NodeFlags::CLOSED) {
                    continue;
                }
                let pos = if n.flags.is_empty() {
                    edge_mid_point(cur, next).unwrap_or(n.pos)
                } else {
                    n.pos
                };
                let total = cur_total + vdist(&cur_pos, &pos);
                if n.flags.contains(NodeFlags::OPEN) && total >= n.total {
                    continue;
                }
                let was_open = n.flags.contains(NodeFlags::OPEN);

                let node = self.node_pool.node_mut(neighbour);
                node.pos = pos;
                node.pidx = current;
                node.cost = total;
                node.total = total;

                if was_open {
                    self.open_list.modify(&self.node_pool, neighbour);
                } else {
                    self.node_pool.node_mut(neighbour).flags.insert(NodeFlags::OPEN);
                    self.open_list.push(&self.node_pool, neighbour);
                }
            }
        }

        let normal = (Vec3::from(*center) - Vec3::from(hit_pos)).normalize_or_zero().to_array();
        let hit = WallHit {
            distance: radius_sqr.sqrt(),
            position: hit_pos,
            normal,
        };
        Ok((hit, Status::success(details)))
    }

    /// Wall segments of a polygon's outline, optionally with the portal
    /// segments leading to neighbours that pass the filter
    pub fn get_poly_wall_segments<F: QueryFilter + ?Sized>(
        &self,
        r: PolyRef,
        filter: &F,
        store_portals: bool,
        max_segments: usize,
    ) -> Result<(Vec<WallSegment>, Status)> {
        let nav = self.nav_mesh();
        let (tile, poly) = nav.get_tile_and_poly_by_ref(r)?;

        let mut segments = Vec::new();
        let mut status = Status::SUCCESS;
        let mut push = |segments: &mut Vec<WallSegment>, start, end, neighbour| {
            if segments.len() < max_segments {
                segments.push(WallSegment { start, end, neighbour });
            } else {
                status |= StatusDetail::BUFFER_TOO_SMALL;
            }
        };

        let nv = poly.vert_count as usize;
        let mut ints: Vec<EdgeInterval> = Vec::with_capacity(MAX_EDGE_INTERVALS);
        let mut j = nv.wrapping_sub(1);
        for i in 0..nv {
            let vj = tile.poly_vertex(poly, j);
            let vi = tile.poly_vertex(poly, i);
            let neighbours = edge_neighbours(nav, tile, poly, j, filter);

            if poly.neis[j] & EXT_LINK == 0 {
                // Internal edge or wall
                let neighbour = neighbours.first().map_or(PolyRef::NULL, |n| n.0);
                if neighbour.is_null() || store_portals {
                    push(&mut segments, vj, vi, neighbour);
                }
                j = i;
                continue;
            }

            ints.clear();
            for (reference, bmin, bmax) in neighbours {
                insert_interval(&mut ints, bmin as i16, bmax as i16, reference);
            }
            // Sentinels at both ends of the edge
            insert_interval(&mut ints, -1, 0, PolyRef::NULL);
            insert_interval(&mut ints, 255, 256, PolyRef::NULL);

            for k in 1..ints.len() {
                if store_portals && ints[k].reference.is_some() {
                    let tmin = ints[k].tmin as f32 / 255.0;
                    let tmax = ints[k].tmax as f32 / 255.0;
                    push(&mut segments, vlerp(&vj, &vi, tmin), vlerp(&vj, &vi, tmax), ints[k].reference);
                }

                let imin = ints[k - 1].tmax;
                let imax = ints[k].tmin;
                if imin != imax {
                    let tmin = imin as f32 / 255.0;
                    let tmax = imax as f32 / 255.0;
                    push(&mut segments, vlerp(&vj, &vi, tmin), vlerp(&vj, &vi, tmax), PolyRef::NULL);
                }
            }
            j = i;
        }

        Ok((segments, status))
    }

    /// Moves from `start_pos` towards `end_pos` while staying on the mesh.
    ///
    /// Returns the reached position and the polygons visited on the way, at
    /// most `max_visited`. The result is not height corrected; the search
    /// stays within the circle spanned by the two points.
    pub fn move_along_surface<F: QueryFilter + ?Sized>(
        &mut self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &F,
        max_visited: usize,
    ) -> Result<([f32; 3], Vec<PolyRef>, Status)> {
        let nav = self.nav_mesh();
        if !nav.is_valid_poly_ref(start_ref) || !visfinite(start_pos) || !visfinite(end_pos) || max_visited == 0 {
            return Err(Status::invalid_param());
        }

        let mut status = Status::SUCCESS;

        self.tiny_node_pool.clear();
        let start = self
            .tiny_node_pool
            .get_node(start_ref, 0)
            .ok_or_else(|| Status::failure(StatusDetail::OUT_OF_NODES))?;
        let node = self.tiny_node_pool.node_mut(start);
        node.pidx = NULL_NODE;
        node.cost = 0.0;
        node.total = 0.0;
        node.flags = NodeFlags::CLOSED;

        let mut stack = VecDeque::with_capacity(MAX_LOCAL_STACK);
        stack.push_back(start);

        let mut best_pos = *start_pos;
        let mut best_dist = f32::MAX;
        let mut best_node = NULL_NODE;

        let search_pos = vlerp(start_pos, end_pos, 0.5);
        let search_rad = vdist(start_pos, end_pos) / 2.0 + 0.001;
        let search_rad_sqr = search_rad * search_rad;

        let mut verts = [0.0f32; MAX_VERTS_PER_POLY * 3];

        while let Some(current) = stack.pop_front() {
            let cur = self.context(self.tiny_node_pool.node(current).id);
            let nverts = cur.tile.collect_poly_verts(cur.poly, &mut verts);

            if point_in_polygon_2d(end_pos, &verts, nverts) {
                best_node = current;
                best_pos = *end_pos;
                break;
            }

            let mut j = nverts.wrapping_sub(1);
            for i in 0..nverts {
                let vj = &verts[j * 3..j * 3 + 3];
                let vi = &verts[i * 3..i * 3 + 3];
                let neighbours = edge_neighbours(nav, cur.tile, cur.poly, j, filter);

                if neighbours.is_empty() {
                    let (d, t) = dist_point_segment_sqr_2d_with_t(end_pos, vj, vi);
                    if d < best_dist {
                        best_pos = vlerp(vj, vi, t);
                        best_dist = d;
                        best_node = current;
                    }
                } else {
                    for (neighbour_ref, _, _) in neighbours {
                        let Some(neighbour) = self.tiny_node_pool.get_node(neighbour_ref, 0) else {
                            continue;
                        };
                        if self.tiny_node_pool.node(neighbour).flags.contains(NodeFlags::CLOSED) {
                            continue;
                        }
                        if dist_point_segment_sqr_2d_with_t(&search_pos, vj, vi).0 > search_rad_sqr {
                            continue;
                        }
                        if stack.len() < MAX_LOCAL_STACK {
                            let node = self.tiny_node_pool.node_mut(neighbour);
                            node.pidx = current;
                            node.flags.insert(NodeFlags::CLOSED);
                            stack.push_back(neighbour);
                        }
                    }
                }
                j = i;
            }
        }

        let mut visited = Vec::new();
        let mut cur = best_node;
        while let Some(node) = self.tiny_node_pool.node_at_idx(cur) {
            visited.push(node.id);
            cur = node.pidx;
        }
        visited.reverse();
        if visited.len() > max_visited {
            visited.truncate(max_visited);
            status |= StatusDetail::BUFFER_TOO_SMALL;
        }

        Ok((best_pos, visited, status))
    }
}

/// Records one polygon of an area search, up to `max_result`
fn collect_visit(
    result: &mut Vec<VisitedPoly>,
    overflow: &mut bool,
    max_result: usize,
    reference: PolyRef,
    parent: PolyRef,
    cost: f32,
) {
    if result.len() < max_result {
        result.push(VisitedPoly { reference, parent, cost });
    } else {
        *overflow = true;
    }
}

fn visit_status(details: StatusDetail, overflow: bool) -> Status {
    let mut status = Status::success(details);
    if overflow {
        status |= StatusDetail::BUFFER_TOO_SMALL;
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_interval_keeps_order() {
        let mut ints = Vec::new();
        let a = PolyRef::new(1);
        let b = PolyRef::new(2);
        insert_interval(&mut ints, 128, 255, b);
        insert_interval(&mut ints, 0, 100, a);
        insert_interval(&mut ints, -1, 0, PolyRef::NULL);
        insert_interval(&mut ints, 255, 256, PolyRef::NULL);
        let order: Vec<(i16, i16)> = ints.iter().map(|i| (i.tmin, i.tmax)).collect();
        assert_eq!(order, vec![(-1, 0), (0, 100), (128, 255), (255, 256)]);
    }

    #[test]
    fn test_insert_interval_drops_when_full() {
        let mut ints = Vec::new();
        for k in 0..(MAX_EDGE_INTERVALS as i16 + 4) {
            insert_interval(&mut ints, k * 10, k * 10 + 5, PolyRef::new(1));
        }
        assert_eq!(ints.len(), MAX_EDGE_INTERVALS);
    }
}
