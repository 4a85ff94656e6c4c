//! Sliced path search
//!
//! The same A* as [`NavMeshQuery::find_path`], split into an init call, any
//! number of budgeted update calls and a finalize call, so a long search can
//! be spread over several frames.
//!
//! The query keeps only references between calls. Every update re-validates
//! them, so a search whose polygons disappeared fails instead of walking
//! stale data. Finalizing resets the state; each init is finalized once.

use std::fmt;

use log::debug;
use navtile_common::visfinite;

use super::nav_mesh_query::SearchGoal;
use super::node_pool::{NodeFlags, NodeIndex, NULL_NODE};
use super::{
    DefaultQueryHeuristic, FindPathOptions, NavMeshQuery, Outcome, PolyRef, QueryFilter,
    QueryHeuristic, Result, Status, StatusDetail,
};

/// State of the sliced search owned by a [`NavMeshQuery`]
pub(crate) struct SlicedQuery<'a> {
    status: Status,
    start_ref: PolyRef,
    goal: SearchGoal,
    /// Node with the lowest heuristic so far and that heuristic
    best: (NodeIndex, f32),
    filter: Option<Box<dyn QueryFilter + 'a>>,
    heuristic: Option<Box<dyn QueryHeuristic + 'a>>,
}

impl Default for SlicedQuery<'_> {
    fn default() -> Self {
        Self {
            status: Status::FAILURE,
            start_ref: PolyRef::NULL,
            goal: SearchGoal {
                end_ref: PolyRef::NULL,
                end_pos: [0.0; 3],
                any_angle: false,
                raycast_limit_sqr: f32::MAX,
            },
            best: (NULL_NODE, f32::MAX),
            filter: None,
            heuristic: None,
        }
    }
}

impl fmt::Debug for SlicedQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlicedQuery")
            .field("status", &self.status)
            .field("start_ref", &self.start_ref)
            .field("end_ref", &self.goal.end_ref)
            .field("best", &self.best)
            .finish_non_exhaustive()
    }
}

impl<'a> NavMeshQuery<'a> {
    /// Starts a sliced path search with the default heuristic.
    ///
    /// The filter is kept until the search is finalized; pass a reference to
    /// keep using it elsewhere. Returns IN_PROGRESS, or SUCCESS right away
    /// when start and end are the same polygon.
    pub fn init_sliced_find_path<F>(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: F,
        options: &FindPathOptions,
    ) -> Result<Status>
    where
        F: QueryFilter + 'a,
    {
        self.init_sliced_find_path_with_heuristic(
            start_ref,
            end_ref,
            start_pos,
            end_pos,
            filter,
            DefaultQueryHeuristic::default(),
            options,
        )
    }

    /// [`init_sliced_find_path`](Self::init_sliced_find_path) with a custom heuristic
    #[allow(clippy::too_many_arguments)]
    pub fn init_sliced_find_path_with_heuristic<F, H>(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: F,
        heuristic: H,
        options: &FindPathOptions,
    ) -> Result<Status>
    where
        F: QueryFilter + 'a,
        H: QueryHeuristic + 'a,
    {
        self.sliced = SlicedQuery::default();

        let nav = self.nav_mesh();
        if !nav.is_valid_poly_ref(start_ref)
            || !nav.is_valid_poly_ref(end_ref)
            || !visfinite(start_pos)
            || !visfinite(end_pos)
        {
            return Err(Status::invalid_param());
        }

        let goal = SearchGoal {
            end_ref,
            end_pos: *end_pos,
            any_angle: options.any_angle,
            raycast_limit_sqr: self.raycast_limit_sqr(start_ref, options),
        };
        let start_heuristic = heuristic.get_cost(start_pos, end_pos);

        self.sliced.start_ref = start_ref;
        self.sliced.goal = goal;
        self.sliced.filter = Some(Box::new(filter));
        self.sliced.heuristic = Some(Box::new(heuristic));

        if start_ref == end_ref {
            self.sliced.status = Status::SUCCESS;
            return Ok(self.sliced.status);
        }

        self.node_pool.clear();
        self.open_list.clear();
        let start = self.seed_start_node(start_ref, start_pos, start_heuristic)?;

        self.sliced.best = (start, start_heuristic);
        self.sliced.status = Status::IN_PROGRESS;
        Ok(self.sliced.status)
    }

    /// Status of the current sliced search
    pub fn sliced_status(&self) -> Status {
        self.sliced.status
    }

    /// Runs up to `max_iter` iterations of the sliced search.
    ///
    /// Returns the iterations performed and the new status: IN_PROGRESS while
    /// nodes remain, SUCCESS once the goal was reached or the open list ran
    /// dry. Fails if a polygon of the search became invalid.
    pub fn update_sliced_find_path(&mut self, max_iter: usize) -> Result<(usize, Status)> {
        if self.sliced.status.is_failure() {
            return Err(self.sliced.status);
        }
        if !self.sliced.status.is_in_progress() {
            return Ok((0, self.sliced.status));
        }

        let nav = self.nav_mesh();
        if !nav.is_valid_poly_ref(self.sliced.start_ref) || !nav.is_valid_poly_ref(self.sliced.goal.end_ref) {
            return Err(self.abandon_sliced());
        }

        let (Some(filter), Some(heuristic)) = (self.sliced.filter.take(), self.sliced.heuristic.take()) else {
            return Err(self.abandon_sliced());
        };

        let result = self.run_slice(max_iter, filter.as_ref(), heuristic.as_ref());
        if result.is_err() {
            return Err(self.abandon_sliced());
        }

        self.sliced.filter = Some(filter);
        self.sliced.heuristic = Some(heuristic);
        result
    }

    /// Drops a failed search along with its filter and heuristic
    fn abandon_sliced(&mut self) -> Status {
        debug!("sliced search {} -> {} failed", self.sliced.start_ref, self.sliced.goal.end_ref);
        self.sliced = SlicedQuery::default();
        self.sliced.status
    }

    fn run_slice(
        &mut self,
        max_iter: usize,
        filter: &dyn QueryFilter,
        heuristic: &dyn QueryHeuristic,
    ) -> Result<(usize, Status)> {
        let nav = self.nav_mesh();
        let goal = self.sliced.goal;
        let mut best = self.sliced.best;
        let mut iter = 0;

        while iter < max_iter {
            let Some(current) = self.open_list.pop(&self.node_pool) else {
                break;
            };
            iter += 1;

            let node = self.node_pool.node_mut(current);
            node.flags.remove(NodeFlags::OPEN);
            node.flags.insert(NodeFlags::CLOSED);
            let (cur_ref, cur_pidx) = (node.id, node.pidx);

            if cur_ref == goal.end_ref {
                self.sliced.best = (current, 0.0);
                self.sliced.status = self.sliced.status.with_outcome(Outcome::Success);
                return Ok((iter, self.sliced.status));
            }

            // Polygons of the search may have been removed between slices
            let parent = self.node_pool.node_at_idx(cur_pidx);
            let parent_ok = parent.map_or(true, |p| nav.is_valid_poly_ref(p.id));
            let grandpa_ok = parent
                .and_then(|p| self.node_pool.node_at_idx(p.pidx))
                .map_or(true, |g| nav.is_valid_poly_ref(g.id));
            if !nav.is_valid_poly_ref(cur_ref) || !parent_ok || !grandpa_ok {
                return Err(Status::FAILURE);
            }

            let details = self.expand_path_node(current, &goal, filter, heuristic, &mut best);
            self.sliced.status |= details;
        }

        self.sliced.best = best;
        if self.open_list.is_empty() {
            self.sliced.status = self.sliced.status.with_outcome(Outcome::Success);
        }
        Ok((iter, self.sliced.status))
    }

    /// Corridor of a finished (or abandoned) sliced search.
    ///
    /// Leads to the goal, or to the closest polygon reached with
    /// PARTIAL_RESULT. Resets the sliced state.
    pub fn finalize_sliced_find_path(&mut self, max_path: usize) -> Result<(Vec<PolyRef>, Status)> {
        let query = std::mem::take(&mut self.sliced);
        if query.status.is_failure() || max_path == 0 {
            return Err(Status::FAILURE);
        }

        let (path, status) = if query.start_ref == query.goal.end_ref {
            (vec![query.start_ref], Status::SUCCESS)
        } else {
            let (path, mut status) = self.finish_sliced_path(&query, query.best.0, max_path);
            if self.node_pool.node_at_idx(query.best.0).map(|n| n.id) != Some(query.goal.end_ref) {
                status |= StatusDetail::PARTIAL_RESULT;
            }
            (path, status)
        };

        debug!(
            "sliced search {} -> {} finalized: {} polys, {}",
            query.start_ref,
            query.goal.end_ref,
            path.len(),
            status
        );
        Ok((path, status))
    }

    /// Like [`finalize_sliced_find_path`](Self::finalize_sliced_find_path),
    /// but ends at the furthest polygon of `existing` that the search
    /// visited. Falls back to the closest polygon reached, with
    /// PARTIAL_RESULT, if none was visited.
    pub fn finalize_sliced_find_path_partial(
        &mut self,
        existing: &[PolyRef],
        max_path: usize,
    ) -> Result<(Vec<PolyRef>, Status)> {
        let query = std::mem::take(&mut self.sliced);
        if existing.is_empty() || query.status.is_failure() || max_path == 0 {
            return Err(Status::FAILURE);
        }

        let (path, status) = if query.start_ref == query.goal.end_ref {
            (vec![query.start_ref], Status::SUCCESS)
        } else {
            let visited = existing
                .iter()
                .rev()
                .find_map(|&r| self.node_pool.find_nodes(r).first().copied());
            match visited {
                Some(node) => self.finish_sliced_path(&query, node, max_path),
                None => {
                    let (path, status) = self.finish_sliced_path(&query, query.best.0, max_path);
                    (path, status | StatusDetail::PARTIAL_RESULT)
                }
            }
        };

        debug!(
            "sliced search {} -> {} finalized from {} existing polys: {} polys, {}",
            query.start_ref,
            query.goal.end_ref,
            existing.len(),
            path.len(),
            status
        );
        Ok((path, status))
    }

    fn finish_sliced_path(&self, query: &SlicedQuery<'_>, end: NodeIndex, max_path: usize) -> (Vec<PolyRef>, Status) {
        let (path, status) = self.path_to_node(end, max_path);
        (path, status.with_details(query.status.details))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_mesh_helpers::{grid_tile, mesh_with_tiles, poly_ref_at};
    use crate::{encode_poly_ref, DefaultQueryFilter, FindPathOptions, NavMeshQuery, PolyRef, Result, Status};

    const START: [f32; 3] = [1.25, 0.0, 5.0];
    const END: [f32; 3] = [8.75, 0.0, 5.0];

    fn assert_reset(query: &NavMeshQuery<'_>) {
        assert_eq!(query.sliced.status, Status::FAILURE);
        assert_eq!(query.sliced.start_ref, PolyRef::NULL);
        assert_eq!(query.sliced.goal.end_ref, PolyRef::NULL);
        assert!(query.sliced.filter.is_none());
        assert!(query.sliced.heuristic.is_none());
    }

    #[test]
    fn test_stale_goal_drops_search_state() -> Result<()> {
        let nav_mesh = mesh_with_tiles(4, vec![grid_tile(0, 0, 4, 1)?])?;
        let filter = DefaultQueryFilter::default();
        let mut query = NavMeshQuery::new(&nav_mesh, 64)?;
        let start = poly_ref_at(&nav_mesh, 0, 0, 0);
        let end = poly_ref_at(&nav_mesh, 0, 0, 3);

        query.init_sliced_find_path(start, end, &START, &END, &filter, &FindPathOptions::default())?;
        assert!(query.sliced.filter.is_some());

        query.sliced.goal.end_ref = encode_poly_ref(1, 3, 0);
        assert_eq!(query.update_sliced_find_path(4).unwrap_err(), Status::FAILURE);
        assert_reset(&query);

        // Nothing left to run or finalize
        assert_eq!(query.update_sliced_find_path(4).unwrap_err(), Status::FAILURE);
        assert!(query.finalize_sliced_find_path(8).is_err());
        Ok(())
    }

    #[test]
    fn test_stale_node_drops_search_state() -> Result<()> {
        let nav_mesh = mesh_with_tiles(4, vec![grid_tile(0, 0, 4, 1)?])?;
        let filter = DefaultQueryFilter::default();
        let mut query = NavMeshQuery::new(&nav_mesh, 64)?;
        let start = poly_ref_at(&nav_mesh, 0, 0, 0);
        let end = poly_ref_at(&nav_mesh, 0, 0, 3);

        query.init_sliced_find_path(start, end, &START, &END, &filter, &FindPathOptions::default())?;
        let root = query.node_pool.find_node(start, 0).expect("root node");
        query.node_pool.node_mut(root).id = encode_poly_ref(1, 3, 0);

        assert_eq!(query.update_sliced_find_path(4).unwrap_err(), Status::FAILURE);
        assert_reset(&query);
        assert!(query.sliced_status().is_failure());
        Ok(())
    }
}
