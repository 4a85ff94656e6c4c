//! Test mesh fixtures built through the tile-data builder
//!
//! All fixtures live on a grid of 10x10 tiles anchored at the origin with
//! flat ground at height 0.

use navtile_common::Result;

use crate::nav_mesh_builder::{create_tile_data, OffMeshConnectionParams, TileCreateParams};
use crate::poly_ref::{decode_salt, decode_tile, encode_poly_ref};
use crate::{NavMesh, NavMeshParams, PolyFlags, PolyRef, TileData, TileFlags, EXT_LINK, MESH_NULL_IDX};

pub const TILE_SIZE: f32 = 10.0;

const NVP: usize = 6;

/// Grid parameters with `max_tiles` slots
pub fn grid_params(max_tiles: usize) -> NavMeshParams {
    NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: TILE_SIZE,
        tile_height: TILE_SIZE,
        max_tiles,
        max_polys_per_tile: 64,
    }
}

fn base_params(x: i32, y: i32) -> TileCreateParams {
    let x0 = x as f32 * TILE_SIZE;
    let z0 = y as f32 * TILE_SIZE;
    TileCreateParams {
        nvp: NVP,
        tile_x: x,
        tile_y: y,
        bmin: [x0, -1.0, z0],
        bmax: [x0 + TILE_SIZE, 1.0, z0 + TILE_SIZE],
        walkable_height: 2.0,
        walkable_radius: 0.5,
        walkable_climb: 0.5,
        cs: 0.5,
        build_bv_tree: true,
        ..TileCreateParams::default()
    }
}

/// Appends a quad with its four neighbor codes, padded to the polygon stride
fn push_quad(params: &mut TileCreateParams, verts: [u16; 4], neis: [u16; 4]) {
    params.polys.extend_from_slice(&verts);
    params.polys.extend(std::iter::repeat(MESH_NULL_IDX).take(NVP - 4));
    params.polys.extend_from_slice(&neis);
    params.polys.extend(std::iter::repeat(MESH_NULL_IDX).take(NVP - 4));
    params.poly_flags.push(PolyFlags::WALK);
    params.poly_areas.push(0);
}

/// Tile `(x, y)` split into `nx * nz` square polygons.
///
/// Polygon `cz * nx + cx` covers cell `(cx, cz)`; every tile border edge is a
/// portal so neighbouring grid tiles link up.
pub fn grid_tile(x: i32, y: i32, nx: usize, nz: usize) -> Result<TileData> {
    let mut params = base_params(x, y);
    let (x0, z0) = (params.bmin[0], params.bmin[2]);

    for j in 0..=nz {
        for i in 0..=nx {
            params.verts.extend_from_slice(&[
                x0 + i as f32 * TILE_SIZE / nx as f32,
                0.0,
                z0 + j as f32 * TILE_SIZE / nz as f32,
            ]);
        }
    }

    let vert = |i: usize, j: usize| (j * (nx + 1) + i) as u16;
    let poly = |i: usize, j: usize| (j * nx + i) as u16;
    for cz in 0..nz {
        for cx in 0..nx {
            let verts = [vert(cx, cz), vert(cx, cz + 1), vert(cx + 1, cz + 1), vert(cx + 1, cz)];
            let neis = [
                if cx > 0 { poly(cx - 1, cz) } else { EXT_LINK | 4 },
                if cz + 1 < nz { poly(cx, cz + 1) } else { EXT_LINK | 2 },
                if cx + 1 < nx { poly(cx + 1, cz) } else { EXT_LINK },
                if cz > 0 { poly(cx, cz - 1) } else { EXT_LINK | 6 },
            ];
            push_quad(&mut params, verts, neis);
        }
    }

    create_tile_data(&params)
}

/// Tile `(x, y)` covered by a single square polygon
pub fn square_tile(x: i32, y: i32) -> Result<TileData> {
    grid_tile(x, y, 1, 1)
}

/// Tile (0, 0) with two strips, x in 0..4 and 6..10, joined only by an
/// off-mesh connection from (3, 0, 5) to (7, 0, 5)
pub fn islands_tile(bidirectional: bool) -> Result<TileData> {
    let mut params = base_params(0, 0);
    params.verts = vec![
        0.0, 0.0, 0.0, //
        0.0, 0.0, 10.0, //
        4.0, 0.0, 10.0, //
        4.0, 0.0, 0.0, //
        6.0, 0.0, 0.0, //
        6.0, 0.0, 10.0, //
        10.0, 0.0, 10.0, //
        10.0, 0.0, 0.0,
    ];
    push_quad(&mut params, [0, 1, 2, 3], [EXT_LINK | 4, EXT_LINK | 2, MESH_NULL_IDX, EXT_LINK | 6]);
    push_quad(&mut params, [4, 5, 6, 7], [MESH_NULL_IDX, EXT_LINK | 2, EXT_LINK, EXT_LINK | 6]);
    params.off_mesh_connections.push(OffMeshConnectionParams {
        start: [3.0, 0.0, 5.0],
        end: [7.0, 0.0, 5.0],
        radius: 0.5,
        bidirectional,
        area: 0,
        flags: PolyFlags::JUMP,
        user_id: 7,
    });

    create_tile_data(&params)
}

/// Mesh holding the given tiles
pub fn mesh_with_tiles(max_tiles: usize, tiles: Vec<TileData>) -> crate::Result<NavMesh> {
    let mut nav_mesh = NavMesh::new(grid_params(max_tiles))?;
    for data in tiles {
        nav_mesh.add_tile(data, TileFlags::empty(), PolyRef::NULL)?;
    }
    Ok(nav_mesh)
}

/// Reference of polygon `poly` in the tile at grid cell `(x, y)`
pub fn poly_ref_at(nav_mesh: &NavMesh, x: i32, y: i32, poly: u32) -> PolyRef {
    let base = nav_mesh.get_tile_ref_at(x, y, 0);
    encode_poly_ref(decode_salt(base), decode_tile(base), poly)
}
