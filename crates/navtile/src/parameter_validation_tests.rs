//! Rejection of malformed query arguments
//!
//! Every query validates its references and coordinates up front and reports
//! INVALID_PARAM without touching the search state.

#[cfg(test)]
mod tests {
    use crate::test_mesh_helpers::{mesh_with_tiles, poly_ref_at, square_tile};
    use crate::{
        encode_poly_ref, DefaultQueryFilter, FindPathOptions, NavMesh, NavMeshQuery, PolyRef, RaycastOptions,
        Result, Status, StraightPathOptions,
    };

    const P: [f32; 3] = [5.0, 0.0, 5.0];
    const NAN: [f32; 3] = [f32::NAN, 0.0, 5.0];

    fn mesh() -> Result<NavMesh> {
        mesh_with_tiles(4, vec![square_tile(0, 0)?])
    }

    fn rejected<T>(result: Result<T>) -> bool {
        matches!(result, Err(status) if status == Status::invalid_param())
    }

    /// Reference into an empty tile slot
    fn stale_ref() -> PolyRef {
        encode_poly_ref(1, 3, 0)
    }

    #[test]
    fn test_query_needs_nodes() -> Result<()> {
        let nav_mesh = mesh()?;
        assert_eq!(NavMeshQuery::new(&nav_mesh, 0).err(), Some(Status::invalid_param()));
        Ok(())
    }

    #[test]
    fn test_find_path_arguments() -> Result<()> {
        let nav_mesh = mesh()?;
        let mut query = NavMeshQuery::new(&nav_mesh, 16)?;
        let filter = DefaultQueryFilter::default();
        let options = FindPathOptions::default();
        let r = poly_ref_at(&nav_mesh, 0, 0, 0);

        let cases = [
            (PolyRef::NULL, r, P, P, 8),
            (r, PolyRef::NULL, P, P, 8),
            (stale_ref(), r, P, P, 8),
            (r, r, NAN, P, 8),
            (r, r, P, NAN, 8),
            (r, r, P, P, 0),
        ];
        for (start, end, start_pos, end_pos, max_path) in cases {
            let err = query
                .find_path(start, end, &start_pos, &end_pos, &filter, &options, max_path)
                .unwrap_err();
            assert_eq!(err, Status::invalid_param());
        }
        Ok(())
    }

    #[test]
    fn test_raycast_arguments() -> Result<()> {
        let nav_mesh = mesh()?;
        let query = NavMeshQuery::new(&nav_mesh, 16)?;
        let filter = DefaultQueryFilter::default();
        let r = poly_ref_at(&nav_mesh, 0, 0, 0);

        for (start, start_pos, end_pos) in [(PolyRef::NULL, P, P), (stale_ref(), P, P), (r, NAN, P), (r, P, NAN)] {
            let err = query
                .raycast(start, &start_pos, &end_pos, &filter, RaycastOptions::empty(), PolyRef::NULL)
                .unwrap_err();
            assert_eq!(err, Status::invalid_param());
        }
        Ok(())
    }

    #[test]
    fn test_area_query_arguments() -> Result<()> {
        let nav_mesh = mesh()?;
        let mut query = NavMeshQuery::new(&nav_mesh, 16)?;
        let filter = DefaultQueryFilter::default();
        let r = poly_ref_at(&nav_mesh, 0, 0, 0);

        assert!(rejected(query.find_polys_around_circle(r, &P, -1.0, &filter, 8)));
        assert!(rejected(query.find_polys_around_circle(r, &P, f32::NAN, &filter, 8)));
        assert!(rejected(query.find_polys_around_circle(PolyRef::NULL, &P, 1.0, &filter, 8)));
        assert!(rejected(query.find_polys_around_circle(r, &NAN, 1.0, &filter, 8)));

        let line = [[1.0, 0.0, 1.0], [9.0, 0.0, 9.0]];
        assert!(rejected(query.find_polys_around_shape(r, &line, &filter, 8)));

        assert!(rejected(query.find_local_neighbourhood(r, &P, f32::INFINITY, &filter, 8)));
        assert!(rejected(query.find_distance_to_wall(r, &P, -2.0, &filter)));
        assert!(rejected(query.find_distance_to_wall(stale_ref(), &P, 2.0, &filter)));
        assert!(rejected(query.move_along_surface(r, &P, &[6.0, 0.0, 5.0], &filter, 0)));
        assert!(rejected(query.move_along_surface(r, &P, &NAN, &filter, 4)));
        assert!(rejected(query.get_poly_wall_segments(stale_ref(), &filter, false, 8)));
        Ok(())
    }

    #[test]
    fn test_sliced_search_arguments() -> Result<()> {
        let nav_mesh = mesh()?;
        let filter = DefaultQueryFilter::default();
        let mut query = NavMeshQuery::new(&nav_mesh, 16)?;
        let r = poly_ref_at(&nav_mesh, 0, 0, 0);
        let options = FindPathOptions::default();

        let err = query
            .init_sliced_find_path(PolyRef::NULL, r, &P, &P, &filter, &options)
            .unwrap_err();
        assert_eq!(err, Status::invalid_param());
        let err = query
            .init_sliced_find_path(r, stale_ref(), &P, &P, &filter, &options)
            .unwrap_err();
        assert_eq!(err, Status::invalid_param());

        // A rejected init leaves nothing to run or finalize
        assert!(query.sliced_status().is_failure());
        assert!(query.update_sliced_find_path(4).is_err());
        assert!(query.finalize_sliced_find_path(8).is_err());
        Ok(())
    }

    #[test]
    fn test_straight_path_arguments() -> Result<()> {
        let nav_mesh = mesh()?;
        let query = NavMeshQuery::new(&nav_mesh, 16)?;
        let r = poly_ref_at(&nav_mesh, 0, 0, 0);
        let options = StraightPathOptions::empty();

        assert_eq!(query.find_straight_path(&P, &P, &[], 8, options).unwrap_err(), Status::invalid_param());
        assert_eq!(
            query.find_straight_path(&P, &P, &[PolyRef::NULL], 8, options).unwrap_err(),
            Status::invalid_param()
        );
        assert_eq!(query.find_straight_path(&P, &P, &[r], 0, options).unwrap_err(), Status::invalid_param());
        assert_eq!(query.find_straight_path(&NAN, &P, &[r], 8, options).unwrap_err(), Status::invalid_param());
        Ok(())
    }

    #[test]
    fn test_spatial_query_arguments() -> Result<()> {
        let nav_mesh = mesh()?;
        let query = NavMeshQuery::new(&nav_mesh, 16)?;
        let filter = DefaultQueryFilter::default();

        assert_eq!(
            query.find_nearest_poly(&P, &[-1.0, 1.0, 1.0], &filter).unwrap_err(),
            Status::invalid_param()
        );
        assert_eq!(
            query.find_nearest_poly(&NAN, &[1.0, 1.0, 1.0], &filter).unwrap_err(),
            Status::invalid_param()
        );
        assert_eq!(query.closest_point_on_poly(stale_ref(), &P).unwrap_err(), Status::invalid_param());
        Ok(())
    }
}
