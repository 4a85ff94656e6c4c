//! Navigation mesh queries
//!
//! [`NavMeshQuery`] borrows a [`NavMesh`] and owns the search scratch: a node
//! pool for path searches, a small pool for local searches and the open list.
//! This module holds the query core (validation, spatial lookups, portals,
//! A* and raycast). The remaining query families live in their own modules as
//! further `impl NavMeshQuery` blocks.

use std::fmt;

use glam::Vec3;
use log::debug;
use navtile_common::{
    dist_point_segment_sqr_2d_with_t, distance_pt_poly_edges_sqr, intersect_seg_seg_2d,
    intersect_segment_poly_2d, vadd, vdist_sqr, visfinite, vlerp, vmad, vsub,
};

use super::bvh_tree;
use super::node_pool::{NodeFlags, NodeIndex, NodePool, NodeQueue, MAX_NODE_POOL_SIZE, NULL_NODE};
use super::poly_ref::{decode_poly, encode_poly_ref};
use super::sliced_pathfinding::SlicedQuery;
use super::{
    CollectPolysQuery, DefaultQueryHeuristic, FindNearestPolyQuery, MeshTile, NavMesh, Poly,
    PolyContext, PolyQuery, PolyRef, QueryFilter, QueryHeuristic, RaycastHit, RaycastOptions,
    Result, Status, StatusDetail, LINK_SIDE_INTERNAL, MAX_VERTS_PER_POLY,
    RAYCAST_LIMIT_PROPORTIONS,
};

/// Capacity of the node pool used by local searches
pub(crate) const TINY_NODE_POOL_SIZE: usize = 64;

/// Polygons handed to a [`PolyQuery`] per call
const QUERY_BATCH_SIZE: usize = 32;

/// Options for [`NavMeshQuery::find_path`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FindPathOptions {
    /// Try to shortcut the corridor with raycasts from each node's parent
    pub any_angle: bool,
    /// Maximum raycast length for any-angle shortcuts. `None` derives it from
    /// the walkable radius of the start tile.
    pub raycast_limit: Option<f32>,
}

impl FindPathOptions {
    /// Any-angle search with the derived raycast limit
    pub fn any_angle() -> Self {
        Self {
            any_angle: true,
            raycast_limit: None,
        }
    }
}

/// Goal and shortcut settings shared by the synchronous and sliced A*
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchGoal {
    pub end_ref: PolyRef,
    pub end_pos: [f32; 3],
    pub any_angle: bool,
    pub raycast_limit_sqr: f32,
}

/// Query engine over a navigation mesh
pub struct NavMeshQuery<'a> {
    nav_mesh: &'a NavMesh,
    pub(crate) node_pool: NodePool,
    pub(crate) tiny_node_pool: NodePool,
    pub(crate) open_list: NodeQueue,
    pub(crate) sliced: SlicedQuery<'a>,
}

impl fmt::Debug for NavMeshQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavMeshQuery")
            .field("max_nodes", &self.node_pool.max_nodes())
            .field("node_count", &self.node_pool.node_count())
            .field("open_list", &self.open_list.len())
            .field("sliced", &self.sliced)
            .finish()
    }
}

impl<'a> NavMeshQuery<'a> {
    /// Creates a query with room for `max_nodes` search nodes (1..=65535)
    pub fn new(nav_mesh: &'a NavMesh, max_nodes: usize) -> Result<Self> {
        if max_nodes == 0 || max_nodes > MAX_NODE_POOL_SIZE {
            return Err(Status::invalid_param());
        }
        Ok(Self {
            nav_mesh,
            node_pool: NodePool::new(max_nodes),
            tiny_node_pool: NodePool::new(TINY_NODE_POOL_SIZE),
            open_list: NodeQueue::new(max_nodes),
            sliced: SlicedQuery::default(),
        })
    }

    /// The mesh this query runs against
    pub fn nav_mesh(&self) -> &'a NavMesh {
        self.nav_mesh
    }

    /// Node pool of the last path search, for inspection
    pub fn node_pool(&self) -> &NodePool {
        &self.node_pool
    }

    /// Returns true if `r` addresses a live polygon that passes `filter`
    pub fn is_valid_poly_ref<F: QueryFilter + ?Sized>(&self, r: PolyRef, filter: &F) -> bool {
        match self.nav_mesh.get_tile_and_poly_by_ref(r) {
            Ok((tile, poly)) => filter.pass_filter(r, tile, poly),
            Err(_) => false,
        }
    }

    /// Returns true if the last path search closed a node of `r`
    pub fn is_in_closed_list(&self, r: PolyRef) -> bool {
        self.node_pool
            .find_nodes(r)
            .into_iter()
            .any(|i| self.node_pool.node(i).flags.contains(NodeFlags::CLOSED))
    }

    /// Tile/polygon context of a validated reference
    pub(crate) fn context(&self, r: PolyRef) -> PolyContext<'a> {
        let (tile, poly) = self.nav_mesh.tile_and_poly(r);
        PolyContext::new(r, tile, poly)
    }

    /// Visits every polygon passing `filter` whose bounds overlap the box
    pub fn query_polygons_with<F, Q>(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &F,
        query: &mut Q,
    ) -> Result<()>
    where
        F: QueryFilter + ?Sized,
        Q: PolyQuery + ?Sized,
    {
        if !visfinite(center) || !visfinite(half_extents) || half_extents.iter().any(|&e| e < 0.0) {
            return Err(Status::invalid_param());
        }

        let bmin = vsub(center, half_extents);
        let bmax = vadd(center, half_extents);
        let (minx, miny) = self.nav_mesh.calc_tile_loc(&bmin);
        let (maxx, maxy) = self.nav_mesh.calc_tile_loc(&bmax);

        for y in miny..=maxy {
            for x in minx..=maxx {
                for tile in self.nav_mesh.get_tiles_at(x, y) {
                    query_polygons_in_tile(tile, &bmin, &bmax, filter, query);
                }
            }
        }
        Ok(())
    }

    /// Polygons overlapping the box, up to `max_polys`
    pub fn query_polygons<F: QueryFilter + ?Sized>(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &F,
        max_polys: usize,
    ) -> Result<(Vec<PolyRef>, Status)> {
        let mut collector = CollectPolysQuery::new(max_polys);
        self.query_polygons_with(center, half_extents, filter, &mut collector)?;
        let status = if collector.overflow() {
            Status::success(StatusDetail::BUFFER_TOO_SMALL)
        } else {
            Status::SUCCESS
        };
        Ok((collector.into_polys(), status))
    }

    /// Nearest polygon to `center` inside the box, with the closest point on
    /// it. Returns a null reference when nothing was found.
    pub fn find_nearest_poly<F: QueryFilter + ?Sized>(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &F,
    ) -> Result<(PolyRef, [f32; 3])> {
        let (r, pt, _) = self.find_nearest_poly_extended(center, half_extents, filter)?;
        Ok((r, pt))
    }

    /// Like [`find_nearest_poly`](Self::find_nearest_poly), also reporting
    /// whether `center` lies over the polygon
    pub fn find_nearest_poly_extended<F: QueryFilter + ?Sized>(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &F,
    ) -> Result<(PolyRef, [f32; 3], bool)> {
        let mut query = FindNearestPolyQuery::new(*center);
        self.query_polygons_with(center, half_extents, filter, &mut query)?;
        Ok((query.nearest_ref(), query.nearest_point(), query.is_over_poly()))
    }

    /// Closest point on a polygon's detail surface, and whether `pos` lies
    /// over the polygon
    pub fn closest_point_on_poly(&self, r: PolyRef, pos: &[f32; 3]) -> Result<([f32; 3], bool)> {
        if !visfinite(pos) {
            return Err(Status::invalid_param());
        }
        let (tile, _) = self.nav_mesh.get_tile_and_poly_by_ref(r)?;
        Ok(tile.closest_point_on_poly(decode_poly(r) as usize, pos))
    }

    /// `pos` if it lies inside the polygon in XZ, else the closest point on its outline.
    /// Ignores the detail mesh.
    pub fn closest_point_on_poly_boundary(&self, r: PolyRef, pos: &[f32; 3]) -> Result<[f32; 3]> {
        if !visfinite(pos) {
            return Err(Status::invalid_param());
        }
        let (tile, poly) = self.nav_mesh.get_tile_and_poly_by_ref(r)?;
        let mut verts = [0.0f32; MAX_VERTS_PER_POLY * 3];
        let nv = tile.collect_poly_verts(poly, &mut verts);

        let (inside, edge_dist, edge_t) = distance_pt_poly_edges_sqr(pos, &verts, nv);
        if inside {
            return Ok(*pos);
        }

        let mut imin = 0;
        for i in 1..nv {
            if edge_dist[i] < edge_dist[imin] {
                imin = i;
            }
        }
        let va = &verts[imin * 3..imin * 3 + 3];
        let j = (imin + 1) % nv;
        let vb = &verts[j * 3..j * 3 + 3];
        Ok(vlerp(va, vb, edge_t[imin]))
    }

    /// Height of the polygon surface at `pos`.
    ///
    /// Off-mesh connections interpolate between their end points. Fails with
    /// INVALID_PARAM when `pos` is not over the polygon.
    pub fn get_poly_height(&self, r: PolyRef, pos: &[f32; 3]) -> Result<f32> {
        if !visfinite(pos) {
            return Err(Status::invalid_param());
        }
        let (tile, poly) = self.nav_mesh.get_tile_and_poly_by_ref(r)?;
        if poly.is_off_mesh_connection() {
            let v0 = tile.poly_vertex(poly, 0);
            let v1 = tile.poly_vertex(poly, 1);
            let (_, t) = dist_point_segment_sqr_2d_with_t(pos, &v0, &v1);
            return Ok(v0[1] + (v1[1] - v0[1]) * t);
        }
        tile.poly_height(decode_poly(r) as usize, pos)
            .ok_or_else(Status::invalid_param)
    }

    /// Left and right end of the portal from polygon `from` to polygon `to`
    pub fn get_portal_points(&self, from: PolyRef, to: PolyRef) -> Result<([f32; 3], [f32; 3])> {
        let (from_tile, from_poly) = self.nav_mesh.get_tile_and_poly_by_ref(from)?;
        let (to_tile, to_poly) = self.nav_mesh.get_tile_and_poly_by_ref(to)?;
        portal_points(
            PolyContext::new(from, from_tile, from_poly),
            PolyContext::new(to, to_tile, to_poly),
        )
        .ok_or_else(Status::invalid_param)
    }

    /// Midpoint of the portal between two polygons
    pub fn get_edge_mid_point(&self, from: PolyRef, to: PolyRef) -> Result<[f32; 3]> {
        let (left, right) = self.get_portal_points(from, to)?;
        Ok(vlerp(&left, &right, 0.5))
    }

    /// Finds a polygon corridor from `start_ref` to `end_ref` with A*.
    ///
    /// Returns the corridor and a success status. PARTIAL_RESULT means the
    /// goal was not reached and the corridor leads to the polygon closest to
    /// it; BUFFER_TOO_SMALL means the corridor was cut to `max_path` polygons.
    #[allow(clippy::too_many_arguments)]
    pub fn find_path<F: QueryFilter + ?Sized>(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &F,
        options: &FindPathOptions,
        max_path: usize,
    ) -> Result<(Vec<PolyRef>, Status)> {
        self.find_path_with_heuristic(
            start_ref,
            end_ref,
            start_pos,
            end_pos,
            filter,
            &DefaultQueryHeuristic::default(),
            options,
            max_path,
        )
    }

    /// [`find_path`](Self::find_path) with a custom heuristic
    #[allow(clippy::too_many_arguments)]
    pub fn find_path_with_heuristic<F, H>(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &F,
        heuristic: &H,
        options: &FindPathOptions,
        max_path: usize,
    ) -> Result<(Vec<PolyRef>, Status)>
    where
        F: QueryFilter + ?Sized,
        H: QueryHeuristic + ?Sized,
    {
        if !self.nav_mesh.is_valid_poly_ref(start_ref)
            || !self.nav_mesh.is_valid_poly_ref(end_ref)
            || !visfinite(start_pos)
            || !visfinite(end_pos)
            || max_path == 0
        {
            return Err(Status::invalid_param());
        }

        if start_ref == end_ref {
            return Ok((vec![start_ref], Status::SUCCESS));
        }

        let goal = SearchGoal {
            end_ref,
            end_pos: *end_pos,
            any_angle: options.any_angle,
            raycast_limit_sqr: self.raycast_limit_sqr(start_ref, options),
        };

        self.node_pool.clear();
        self.open_list.clear();

        let start = self.seed_start_node(start_ref, start_pos, heuristic.get_cost(start_pos, end_pos))?;
        let mut best = (start, self.node_pool.node(start).total);
        let mut details = StatusDetail::empty();

        while let Some(current) = self.open_list.pop(&self.node_pool) {
            let node = self.node_pool.node_mut(current);
            node.flags.remove(NodeFlags::OPEN);
            node.flags.insert(NodeFlags::CLOSED);

            if node.id == end_ref {
                best.0 = current;
                break;
            }

            details |= self.expand_path_node(current, &goal, filter, heuristic, &mut best);
        }

        let (path, mut status) = self.path_to_node(best.0, max_path);
        if self.node_pool.node(best.0).id != end_ref {
            status |= StatusDetail::PARTIAL_RESULT;
        }
        status |= details;

        if status.has_detail(StatusDetail::PARTIAL_RESULT) || status.has_detail(StatusDetail::OUT_OF_NODES) {
            debug!(
                "find_path {} -> {} ended early: {} ({} nodes)",
                start_ref,
                end_ref,
                status,
                self.node_pool.node_count()
            );
        }
        Ok((path, status))
    }

    /// Squared raycast limit for any-angle searches
    pub(crate) fn raycast_limit_sqr(&self, start_ref: PolyRef, options: &FindPathOptions) -> f32 {
        if !options.any_angle {
            return f32::MAX;
        }
        let limit = options.raycast_limit.unwrap_or_else(|| {
            let radius = self
                .nav_mesh
                .get_tile_by_ref(start_ref)
                .and_then(|t| t.header.as_ref())
                .map_or(0.0, |h| h.walkable_radius);
            radius * RAYCAST_LIMIT_PROPORTIONS
        });
        limit * limit
    }

    /// Allocates and opens the start node of a search
    pub(crate) fn seed_start_node(
        &mut self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        heuristic: f32,
    ) -> Result<NodeIndex> {
        let start = self
            .node_pool
            .get_node(start_ref, 0)
            .ok_or_else(|| Status::failure(StatusDetail::OUT_OF_NODES))?;
        let node = self.node_pool.node_mut(start);
        node.pos = *start_pos;
        node.pidx = NULL_NODE;
        node.cost = 0.0;
        node.total = heuristic;
        node.flags = NodeFlags::OPEN;
        self.node_pool.clear_shortcut(start);
        self.open_list.push(&self.node_pool, start);
        Ok(start)
    }

    /// Relaxes the neighbours of the closed node `current`.
    ///
    /// `best` tracks the node with the lowest heuristic seen so far. Returns
    /// OUT_OF_NODES if a neighbour could not get a node.
    pub(crate) fn expand_path_node<F, H>(
        &mut self,
        current: NodeIndex,
        goal: &SearchGoal,
        filter: &F,
        heuristic: &H,
        best: &mut (NodeIndex, f32),
    ) -> StatusDetail
    where
        F: QueryFilter + ?Sized,
        H: QueryHeuristic + ?Sized,
    {
        let nav = self.nav_mesh;
        let (cur_ref, cur_pos, cur_cost, cur_pidx) = {
            let n = self.node_pool.node(current);
            (n.id, n.pos, n.cost, n.pidx)
        };
        let cur = self.context(cur_ref);

        let (parent_ref, parent_pos, parent_cost, grandpa_ref) = match self.node_pool.node_at_idx(cur_pidx) {
            Some(p) => (
                p.id,
                p.pos,
                p.cost,
                self.node_pool.node_at_idx(p.pidx).map_or(PolyRef::NULL, |g| g.id),
            ),
            None => (PolyRef::NULL, [0.0; 3], 0.0, PolyRef::NULL),
        };
        let parent = parent_ref.is_some().then(|| self.context(parent_ref));

        let try_los = goal.any_angle
            && parent_ref.is_some()
            && (goal.raycast_limit_sqr >= f32::MAX || vdist_sqr(&parent_pos, &cur_pos) < goal.raycast_limit_sqr);

        let mut details = StatusDetail::empty();

        for (_, link) in cur.tile.poly_links(cur.poly) {
            let neighbour_ref = link.reference;
            if neighbour_ref.is_null() || neighbour_ref == parent_ref {
                continue;
            }

            let (neighbour_tile, neighbour_poly) = nav.tile_and_poly(neighbour_ref);
            if !filter.pass_filter(neighbour_ref, neighbour_tile, neighbour_poly) {
                continue;
            }
            let next = PolyContext::new(neighbour_ref, neighbour_tile, neighbour_poly);

            let Some(neighbour) = self.node_pool.get_node(neighbour_ref, 0) else {
                details |= StatusDetail::OUT_OF_NODES;
                continue;
            };

            // Already reached from the same parent
            let n = self.node_pool.node(neighbour);
            if n.pidx != NULL_NODE && n.pidx == cur_pidx {
                continue;
            }

            let portal = if neighbour_ref == goal.end_ref {
                edge_intersection_point(&cur_pos, cur, &goal.end_pos, next)
            } else {
                edge_mid_point(cur, next)
            };
            let neighbour_pos = portal.unwrap_or(n.pos);

            let mut shortcut = None;
            if try_los {
                if let Ok(hit) = self.raycast(
                    parent_ref,
                    &parent_pos,
                    &neighbour_pos,
                    filter,
                    RaycastOptions::USE_COSTS,
                    grandpa_ref,
                ) {
                    if hit.t >= 1.0 {
                        shortcut = Some((parent_cost + hit.path_cost, hit.path));
                    }
                }
            }

            let mut cost = match &shortcut {
                Some((cost, _)) => *cost,
                None => cur_cost + filter.get_cost(&cur_pos, &neighbour_pos, parent, cur, Some(next)),
            };

            let h = if neighbour_ref == goal.end_ref {
                cost += filter.get_cost(&neighbour_pos, &goal.end_pos, Some(cur), next, None);
                0.0
            } else {
                heuristic.get_cost(&neighbour_pos, &goal.end_pos)
            };
            let total = cost + h;

            let n = self.node_pool.node(neighbour);
            if n.flags.intersects(NodeFlags::OPEN | NodeFlags::CLOSED) && total >= n.total {
                continue;
            }
            let was_open = n.flags.contains(NodeFlags::OPEN);

            let node = self.node_pool.node_mut(neighbour);
            node.pidx = if shortcut.is_some() { cur_pidx } else { current };
            node.flags.remove(NodeFlags::CLOSED | NodeFlags::PARENT_DETACHED);
            node.cost = cost;
            node.total = total;
            node.pos = neighbour_pos;
            match shortcut {
                Some((_, path)) => {
                    node.flags.insert(NodeFlags::PARENT_DETACHED);
                    self.node_pool.set_shortcut(neighbour, &path);
                }
                None => self.node_pool.clear_shortcut(neighbour),
            }

            if was_open {
                self.open_list.modify(&self.node_pool, neighbour);
            } else {
                self.node_pool.node_mut(neighbour).flags.insert(NodeFlags::OPEN);
                self.open_list.push(&self.node_pool, neighbour);
            }

            if h < best.1 {
                *best = (neighbour, h);
            }
        }

        details
    }

    /// Walks parent links back from `end`, expanding raycast shortcuts.
    ///
    /// Keeps the first `max_path` polygons and flags BUFFER_TOO_SMALL if
    /// the corridor was longer.
    pub(crate) fn path_to_node(&self, end: NodeIndex, max_path: usize) -> (Vec<PolyRef>, Status) {
        let mut path = Vec::new();
        let mut cur = end;
        while let Some(node) = self.node_pool.node_at_idx(cur) {
            path.push(node.id);
            let parent_id = self.node_pool.node_at_idx(node.pidx).map(|p| p.id);
            for &id in self.node_pool.shortcut(cur).iter().rev() {
                if id != node.id && Some(id) != parent_id {
                    path.push(id);
                }
            }
            cur = node.pidx;
        }
        path.reverse();

        let mut status = Status::SUCCESS;
        if path.len() > max_path {
            path.truncate(max_path);
            status |= StatusDetail::BUFFER_TOO_SMALL;
        }
        (path, status)
    }

    /// Casts a ray along the mesh surface from `start_pos` towards `end_pos`.
    ///
    /// The walk happens in XZ, polygon by polygon across portals, and stops at
    /// the first wall. Off-mesh connections are never crossed. `prev_ref` is
    /// the polygon the ray is considered to come from, used only for costs.
    pub fn raycast<F: QueryFilter + ?Sized>(
        &self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &F,
        options: RaycastOptions,
        prev_ref: PolyRef,
    ) -> Result<RaycastHit> {
        let nav = self.nav_mesh;
        if !nav.is_valid_poly_ref(start_ref)
            || !visfinite(start_pos)
            || !visfinite(end_pos)
            || (prev_ref.is_some() && !nav.is_valid_poly_ref(prev_ref))
        {
            return Err(Status::invalid_param());
        }

        let mut hit = RaycastHit::new();
        if start_pos[0] == end_pos[0] && start_pos[2] == end_pos[2] {
            hit.path.push(start_ref);
            return Ok(hit);
        }

        let use_costs = options.contains(RaycastOptions::USE_COSTS);
        let dir = vsub(end_pos, start_pos);
        let mut cur_pos = *start_pos;
        let mut verts = [0.0f32; MAX_VERTS_PER_POLY * 3];
        let mut prev_ref = prev_ref;
        let mut cur_ref = start_ref;

        while cur_ref.is_some() {
            let cur = self.context(cur_ref);
            let nv = cur.tile.collect_poly_verts(cur.poly, &mut verts);

            let Some((_, tmax, _, seg_max)) = intersect_segment_poly_2d(start_pos, end_pos, &verts, nv) else {
                // Missed the polygon; keep the last t
                return Ok(hit);
            };
            hit.hit_edge_index = usize::try_from(seg_max).ok();
            if tmax > hit.t {
                hit.t = tmax;
            }
            hit.path.push(cur_ref);

            let prev = prev_ref.is_some().then(|| self.context(prev_ref));

            let Some(seg) = hit.hit_edge_index else {
                // End point inside this polygon
                hit.t = f32::INFINITY;
                if use_costs {
                    hit.path_cost += filter.get_cost(&cur_pos, end_pos, prev, cur, Some(cur));
                }
                return Ok(hit);
            };

            let left = &verts[seg * 3..seg * 3 + 3];
            let j = (seg + 1) % nv;
            let right = &verts[j * 3..j * 3 + 3];

            let mut next = None;
            for (_, link) in cur.tile.poly_links(cur.poly) {
                if link.edge as usize != seg {
                    continue;
                }
                let (next_tile, next_poly) = nav.tile_and_poly(link.reference);
                if next_poly.is_off_mesh_connection() || !filter.pass_filter(link.reference, next_tile, next_poly) {
                    continue;
                }
                let candidate = PolyContext::new(link.reference, next_tile, next_poly);

                if link.side == LINK_SIDE_INTERNAL || (link.bmin == 0 && link.bmax == 255) {
                    next = Some(candidate);
                    break;
                }

                // Partial portal on a tile border; the crossing must lie inside it
                let axis = match link.side {
                    0 | 4 => 2,
                    2 | 6 => 0,
                    _ => continue,
                };
                const S: f32 = 1.0 / 255.0;
                let mut lmin = left[axis] + (right[axis] - left[axis]) * (link.bmin as f32 * S);
                let mut lmax = left[axis] + (right[axis] - left[axis]) * (link.bmax as f32 * S);
                if lmin > lmax {
                    std::mem::swap(&mut lmin, &mut lmax);
                }
                let p = start_pos[axis] + (end_pos[axis] - start_pos[axis]) * tmax;
                if p >= lmin && p <= lmax {
                    next = Some(candidate);
                    break;
                }
            }

            if use_costs {
                // Exit point on the hit edge, with the height taken from the edge
                let last_pos = cur_pos;
                cur_pos = vmad(start_pos, &dir, hit.t);
                let e_dir = vsub(right, left);
                let diff = vsub(&cur_pos, left);
                let s = if e_dir[0] * e_dir[0] > e_dir[2] * e_dir[2] {
                    diff[0] / e_dir[0]
                } else {
                    diff[2] / e_dir[2]
                };
                cur_pos[1] = left[1] + e_dir[1] * s;
                hit.path_cost += filter.get_cost(&last_pos, &cur_pos, prev, cur, next);
            }

            let Some(next) = next else {
                let dx = right[0] - left[0];
                let dz = right[2] - left[2];
                hit.hit_normal = Vec3::new(dz, 0.0, -dx).normalize_or_zero().to_array();
                return Ok(hit);
            };

            prev_ref = cur_ref;
            cur_ref = next.reference;
        }

        Ok(hit)
    }
}

/// Hands the polygons of one tile that overlap the box and pass the filter
/// to `query`, in batches
fn query_polygons_in_tile<F, Q>(tile: &MeshTile, qmin: &[f32; 3], qmax: &[f32; 3], filter: &F, query: &mut Q)
where
    F: QueryFilter + ?Sized,
    Q: PolyQuery + ?Sized,
{
    let mut refs: Vec<PolyRef> = Vec::with_capacity(QUERY_BATCH_SIZE);
    let mut polys: Vec<&Poly> = Vec::with_capacity(QUERY_BATCH_SIZE);

    for ip in bvh_tree::query_polygons_in_tile(tile, qmin, qmax) {
        let r = encode_poly_ref(tile.salt, tile.index as u32, ip as u32);
        let poly = &tile.polys[ip];
        if !filter.pass_filter(r, tile, poly) {
            continue;
        }
        refs.push(r);
        polys.push(poly);
        if refs.len() == QUERY_BATCH_SIZE {
            query.process(tile, &polys, &refs);
            refs.clear();
            polys.clear();
        }
    }

    if !refs.is_empty() {
        query.process(tile, &polys, &refs);
    }
}

/// Left and right end of the portal between two linked polygons.
///
/// Off-mesh connections collapse the portal to the connection end point.
/// Border links are clamped to the overlapping part of the edge.
pub(crate) fn portal_points(from: PolyContext<'_>, to: PolyContext<'_>) -> Option<([f32; 3], [f32; 3])> {
    let (_, link) = from
        .tile
        .poly_links(from.poly)
        .find(|(_, l)| l.reference == to.reference)?;

    if from.poly.is_off_mesh_connection() {
        let v = from.tile.poly_vertex(from.poly, link.edge as usize);
        return Some((v, v));
    }

    if to.poly.is_off_mesh_connection() {
        let (_, back) = to
            .tile
            .poly_links(to.poly)
            .find(|(_, l)| l.reference == from.reference)?;
        let v = to.tile.poly_vertex(to.poly, back.edge as usize);
        return Some((v, v));
    }

    let nv = from.poly.vert_count as usize;
    let e = link.edge as usize;
    if e >= nv {
        return None;
    }
    let v0 = from.tile.poly_vertex(from.poly, e);
    let v1 = from.tile.poly_vertex(from.poly, (e + 1) % nv);

    if link.side != LINK_SIDE_INTERNAL && (link.bmin != 0 || link.bmax != 255) {
        const S: f32 = 1.0 / 255.0;
        let tmin = link.bmin as f32 * S;
        let tmax = link.bmax as f32 * S;
        return Some((vlerp(&v0, &v1, tmin), vlerp(&v0, &v1, tmax)));
    }

    Some((v0, v1))
}

/// Midpoint of the portal between two linked polygons
pub(crate) fn edge_mid_point(from: PolyContext<'_>, to: PolyContext<'_>) -> Option<[f32; 3]> {
    let (left, right) = portal_points(from, to)?;
    Some(vlerp(&left, &right, 0.5))
}

/// Point where the segment `from_pos -> to_pos` crosses the portal, kept
/// away from the portal ends
pub(crate) fn edge_intersection_point(
    from_pos: &[f32; 3],
    from: PolyContext<'_>,
    to_pos: &[f32; 3],
    to: PolyContext<'_>,
) -> Option<[f32; 3]> {
    let (left, right) = portal_points(from, to)?;
    let t = intersect_seg_seg_2d(from_pos, to_pos, &left, &right)
        .map_or(0.5, |(_, t)| t.clamp(0.1, 0.9));
    Some(vlerp(&left, &right, t))
}
