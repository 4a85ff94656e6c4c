//! Off-mesh connection tests
//!
//! The islands fixture has two strips with no shared edge; the only way
//! across is the jump connection from (3, 0, 5) to (7, 0, 5).

#[cfg(test)]
mod tests {
    use crate::test_mesh_helpers::{islands_tile, mesh_with_tiles, poly_ref_at};
    use crate::{
        DefaultQueryFilter, FindPathOptions, NavMeshQuery, PolyFlags, PolyRef, Result, Status, StatusDetail,
        StraightPathFlags, StraightPathOptions,
    };

    const LEFT: [f32; 3] = [1.0, 0.0, 5.0];
    const RIGHT: [f32; 3] = [9.0, 0.0, 5.0];

    #[test]
    fn test_connection_links() -> Result<()> {
        let nav_mesh = mesh_with_tiles(1, vec![islands_tile(false)?])?;
        let a = poly_ref_at(&nav_mesh, 0, 0, 0);
        let b = poly_ref_at(&nav_mesh, 0, 0, 1);
        let con = poly_ref_at(&nav_mesh, 0, 0, 2);

        let (tile, poly) = nav_mesh.get_tile_and_poly_by_ref(a)?;
        let to_con: Vec<_> = tile.poly_links(poly).map(|(_, l)| l).filter(|l| l.reference == con).collect();
        assert_eq!(to_con.len(), 1);
        assert_eq!(to_con[0].edge, 0xff);

        let (tile, poly) = nav_mesh.get_tile_and_poly_by_ref(con)?;
        assert!(poly.is_off_mesh_connection());
        let mut ends: Vec<(u8, PolyRef)> = tile.poly_links(poly).map(|(_, l)| (l.edge, l.reference)).collect();
        ends.sort_unstable_by_key(|(edge, _)| *edge);
        assert_eq!(ends, vec![(0, a), (1, b)]);

        // One-way: nothing leads back from the landing polygon
        let (tile, poly) = nav_mesh.get_tile_and_poly_by_ref(b)?;
        assert!(tile.poly_links(poly).all(|(_, l)| l.reference != con));

        let con_data = nav_mesh.get_off_mesh_connection_by_ref(con).expect("connection");
        assert_eq!(con_data.user_id, 7);
        assert_eq!(nav_mesh.get_poly_flags(con)?, PolyFlags::JUMP);
        Ok(())
    }

    #[test]
    fn test_bidirectional_connection_links_back() -> Result<()> {
        let nav_mesh = mesh_with_tiles(1, vec![islands_tile(true)?])?;
        let b = poly_ref_at(&nav_mesh, 0, 0, 1);
        let con = poly_ref_at(&nav_mesh, 0, 0, 2);

        let (tile, poly) = nav_mesh.get_tile_and_poly_by_ref(b)?;
        let back: Vec<_> = tile.poly_links(poly).map(|(_, l)| l).filter(|l| l.reference == con).collect();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].edge, 0xff);
        Ok(())
    }

    #[test]
    fn test_path_uses_connection() -> Result<()> {
        let nav_mesh = mesh_with_tiles(1, vec![islands_tile(false)?])?;
        let mut query = NavMeshQuery::new(&nav_mesh, 64)?;
        let filter = DefaultQueryFilter::default();
        let a = poly_ref_at(&nav_mesh, 0, 0, 0);
        let b = poly_ref_at(&nav_mesh, 0, 0, 1);
        let con = poly_ref_at(&nav_mesh, 0, 0, 2);

        let (path, status) = query.find_path(a, b, &LEFT, &RIGHT, &filter, &FindPathOptions::default(), 8)?;
        assert_eq!(status, Status::SUCCESS);
        assert_eq!(path, vec![a, con, b]);

        let (straight, _) = query.find_straight_path(&LEFT, &RIGHT, &path, 8, StraightPathOptions::empty())?;
        assert_eq!(straight.len(), 4);
        assert_eq!(straight[0].flags, StraightPathFlags::START);
        assert_eq!(straight[0].pos, LEFT);
        assert_eq!(straight[1].flags, StraightPathFlags::OFFMESH_CONNECTION);
        assert_eq!(straight[1].reference, con);
        assert!((straight[1].pos[0] - 3.0).abs() < 1e-4);
        assert!((straight[2].pos[0] - 7.0).abs() < 1e-4);
        assert_eq!(straight[3].flags, StraightPathFlags::END);
        assert_eq!(straight[3].pos, RIGHT);
        Ok(())
    }

    #[test]
    fn test_one_way_connection_is_not_walked_back() -> Result<()> {
        let nav_mesh = mesh_with_tiles(1, vec![islands_tile(false)?])?;
        let mut query = NavMeshQuery::new(&nav_mesh, 64)?;
        let filter = DefaultQueryFilter::default();
        let a = poly_ref_at(&nav_mesh, 0, 0, 0);
        let b = poly_ref_at(&nav_mesh, 0, 0, 1);

        let (path, status) = query.find_path(b, a, &RIGHT, &LEFT, &filter, &FindPathOptions::default(), 8)?;
        assert!(status.has_detail(StatusDetail::PARTIAL_RESULT));
        assert_eq!(path, vec![b]);
        Ok(())
    }

    #[test]
    fn test_bidirectional_connection_is_walked_back() -> Result<()> {
        let nav_mesh = mesh_with_tiles(1, vec![islands_tile(true)?])?;
        let mut query = NavMeshQuery::new(&nav_mesh, 64)?;
        let filter = DefaultQueryFilter::default();
        let a = poly_ref_at(&nav_mesh, 0, 0, 0);
        let b = poly_ref_at(&nav_mesh, 0, 0, 1);
        let con = poly_ref_at(&nav_mesh, 0, 0, 2);

        let (path, status) = query.find_path(b, a, &RIGHT, &LEFT, &filter, &FindPathOptions::default(), 8)?;
        assert_eq!(status, Status::SUCCESS);
        assert_eq!(path, vec![b, con, a]);
        Ok(())
    }

    #[test]
    fn test_excluded_connection_blocks_path() -> Result<()> {
        let nav_mesh = mesh_with_tiles(1, vec![islands_tile(true)?])?;
        let mut query = NavMeshQuery::new(&nav_mesh, 64)?;
        let filter = DefaultQueryFilter::new(PolyFlags::WALK, PolyFlags::empty());
        let a = poly_ref_at(&nav_mesh, 0, 0, 0);
        let b = poly_ref_at(&nav_mesh, 0, 0, 1);

        let (path, status) = query.find_path(a, b, &LEFT, &RIGHT, &filter, &FindPathOptions::default(), 8)?;
        assert!(status.has_detail(StatusDetail::PARTIAL_RESULT));
        assert_eq!(path, vec![a]);
        Ok(())
    }

    #[test]
    fn test_end_points_follow_travel_direction() -> Result<()> {
        let nav_mesh = mesh_with_tiles(1, vec![islands_tile(true)?])?;
        let a = poly_ref_at(&nav_mesh, 0, 0, 0);
        let b = poly_ref_at(&nav_mesh, 0, 0, 1);
        let con = poly_ref_at(&nav_mesh, 0, 0, 2);

        let (from, to) = nav_mesh.get_off_mesh_connection_poly_end_points(a, con)?;
        assert_eq!(from, [3.0, 0.0, 5.0]);
        assert_eq!(to, [7.0, 0.0, 5.0]);

        let (from, to) = nav_mesh.get_off_mesh_connection_poly_end_points(b, con)?;
        assert_eq!(from, [7.0, 0.0, 5.0]);
        assert_eq!(to, [3.0, 0.0, 5.0]);

        // Ground polygons have no connection end points
        assert!(nav_mesh.get_off_mesh_connection_poly_end_points(a, b).is_err());
        Ok(())
    }

    #[test]
    fn test_raycast_ignores_connection() -> Result<()> {
        let nav_mesh = mesh_with_tiles(1, vec![islands_tile(true)?])?;
        let query = NavMeshQuery::new(&nav_mesh, 64)?;
        let a = poly_ref_at(&nav_mesh, 0, 0, 0);

        let hit = query.raycast(
            a,
            &LEFT,
            &RIGHT,
            &DefaultQueryFilter::default(),
            Default::default(),
            PolyRef::NULL,
        )?;
        assert!(hit.hit_wall());
        assert!((hit.t - 0.375).abs() < 1e-4);
        assert_eq!(hit.path, vec![a]);
        Ok(())
    }
}
