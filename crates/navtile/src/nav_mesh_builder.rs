//! Tile data assembly
//!
//! Turns a world-space polygon mesh, as produced by a mesh generation
//! pipeline, into the [`TileData`] layout consumed by
//! [`NavMesh::add_tile`](crate::NavMesh::add_tile): ground polygons followed
//! by off-mesh connection polygons, a detail triangulation for every ground
//! polygon, and an optional bounding volume tree.

use navtile_common::{Error, Result};

use super::bvh_tree::{build_bv_tree, BVItem};
use super::{
    OffMeshConnection, Poly, PolyDetail, PolyFlags, PolyType, TileData, TileHeader,
    DETAIL_EDGE_BOUNDARY, EXT_LINK, LINK_SIDE_INTERNAL, MAX_AREAS, MAX_VERTS_PER_POLY,
    MESH_NULL_IDX, OFFMESH_CON_BIDIR,
};

/// Off-mesh connection input
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct OffMeshConnectionParams {
    pub start: [f32; 3],
    pub end: [f32; 3],
    /// Radius around each end point used when anchoring to the mesh
    pub radius: f32,
    /// Traversable from end to start as well
    pub bidirectional: bool,
    pub area: u8,
    pub flags: PolyFlags,
    pub user_id: u32,
}

/// Input for [`create_tile_data`]
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TileCreateParams {
    /// World-space vertices, flat `xyz`
    pub verts: Vec<f32>,
    /// `nvp * 2` entries per polygon: vertex indices padded with
    /// [`MESH_NULL_IDX`], then neighbor codes. A neighbor code is
    /// [`MESH_NULL_IDX`] for a wall, `EXT_LINK | side` for a portal to tile
    /// side 0-7, and the neighbor polygon index otherwise.
    pub polys: Vec<u16>,
    pub poly_flags: Vec<PolyFlags>,
    pub poly_areas: Vec<u8>,
    /// Maximum vertices per polygon in `polys`
    pub nvp: usize,

    /// Optional detail mesh: per polygon `[vert_base, vert_count, tri_base, tri_count]`.
    /// Each sub-mesh starts with copies of the polygon vertices.
    pub detail_meshes: Vec<[u32; 4]>,
    pub detail_verts: Vec<f32>,
    /// Four bytes per triangle: three sub-mesh vertex indices and edge flags
    pub detail_tris: Vec<u8>,

    pub off_mesh_connections: Vec<OffMeshConnectionParams>,

    pub user_id: u32,
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_layer: i32,
    /// World-space tile bounds
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],

    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    /// Cell size, sets the BV tree quantization
    pub cs: f32,

    pub build_bv_tree: bool,
}

impl TileCreateParams {
    /// Number of polygons described by `polys`
    pub fn poly_count(&self) -> usize {
        if self.nvp == 0 {
            0
        } else {
            self.polys.len() / (self.nvp * 2)
        }
    }

    /// Number of vertices described by `verts`
    pub fn vert_count(&self) -> usize {
        self.verts.len() / 3
    }
}

/// Outcode bits of [`classify_off_mesh_point`]
const XP: u8 = 1 << 0;
const ZP: u8 = 1 << 1;
const XM: u8 = 1 << 2;
const ZM: u8 = 1 << 3;

/// Tile side a point lies beyond, or [`LINK_SIDE_INTERNAL`] when inside the
/// tile footprint
fn classify_off_mesh_point(pt: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> u8 {
    let mut outcode = 0;
    if pt[0] >= bmax[0] {
        outcode |= XP;
    }
    if pt[2] >= bmax[2] {
        outcode |= ZP;
    }
    if pt[0] < bmin[0] {
        outcode |= XM;
    }
    if pt[2] < bmin[2] {
        outcode |= ZM;
    }

    match outcode {
        XP => 0,
        o if o == XP | ZP => 1,
        ZP => 2,
        o if o == XM | ZP => 3,
        XM => 4,
        o if o == XM | ZM => 5,
        ZM => 6,
        o if o == XP | ZM => 7,
        _ => LINK_SIDE_INTERNAL,
    }
}

/// Builder for navigation mesh tile data
pub struct NavMeshBuilder;

impl NavMeshBuilder {
    /// Validates `params` and assembles the tile data
    pub fn create_tile_data(params: &TileCreateParams) -> Result<TileData> {
        Self::validate_params(params)?;

        let nvp = params.nvp;
        let ground_count = params.poly_count();
        let vert_count = params.vert_count();

        // Vertical extent of the mesh, padded by climb, bounds off-mesh start points
        let mut hmin = f32::MAX;
        let mut hmax = f32::MIN;
        for v in params.verts.chunks_exact(3).chain(params.detail_verts.chunks_exact(3)) {
            hmin = hmin.min(v[1]);
            hmax = hmax.max(v[1]);
        }
        hmin -= params.walkable_climb;
        hmax += params.walkable_climb;
        let class_bmin = [params.bmin[0], hmin, params.bmin[2]];
        let class_bmax = [params.bmax[0], hmax, params.bmax[2]];

        let mut stored_cons = Vec::new();
        let mut off_mesh_link_count = 0;
        for con in &params.off_mesh_connections {
            let mut start_class = classify_off_mesh_point(&con.start, &class_bmin, &class_bmax);
            let end_class = classify_off_mesh_point(&con.end, &class_bmin, &class_bmax);

            // A start point inside the footprint but outside the height range can never touch the mesh
            if start_class == LINK_SIDE_INTERNAL && (con.start[1] < class_bmin[1] || con.start[1] > class_bmax[1]) {
                start_class = 0;
            }

            if start_class == LINK_SIDE_INTERNAL {
                off_mesh_link_count += 1;
                stored_cons.push((con, end_class));
            }
            if end_class == LINK_SIDE_INTERNAL {
                off_mesh_link_count += 1;
            }
        }

        let mut edge_count = 0;
        let mut portal_count = 0;
        for i in 0..ground_count {
            let p = &params.polys[i * nvp * 2..(i + 1) * nvp * 2];
            for j in 0..nvp {
                if p[j] == MESH_NULL_IDX {
                    break;
                }
                edge_count += 1;
                let nei = p[nvp + j];
                if nei != MESH_NULL_IDX && (nei & EXT_LINK) != 0 {
                    portal_count += 1;
                }
            }
        }
        let max_link_count = edge_count + portal_count * 2 + off_mesh_link_count * 2;

        // Vertices: mesh vertices, then two per stored off-mesh connection
        let mut verts = params.verts.clone();
        for (con, _) in &stored_cons {
            verts.extend_from_slice(&con.start);
            verts.extend_from_slice(&con.end);
        }

        let mut polys = Vec::with_capacity(ground_count + stored_cons.len());
        for i in 0..ground_count {
            let p = &params.polys[i * nvp * 2..(i + 1) * nvp * 2];
            let mut poly = Poly::new(params.poly_areas[i], PolyType::Ground, params.poly_flags[i]);
            for j in 0..nvp {
                if p[j] == MESH_NULL_IDX {
                    break;
                }
                poly.verts[j] = p[j];
                let nei = p[nvp + j];
                poly.neis[j] = if nei == MESH_NULL_IDX {
                    0
                } else if (nei & EXT_LINK) != 0 {
                    EXT_LINK | (nei & 0x7)
                } else {
                    nei + 1
                };
                poly.vert_count += 1;
            }
            polys.push(poly);
        }

        let mut off_mesh_cons = Vec::with_capacity(stored_cons.len());
        for (n, (con, end_class)) in stored_cons.iter().enumerate() {
            let mut poly = Poly::new(con.area, PolyType::OffMeshConnection, con.flags);
            poly.verts[0] = (vert_count + n * 2) as u16;
            poly.verts[1] = (vert_count + n * 2 + 1) as u16;
            poly.vert_count = 2;
            polys.push(poly);

            let mut pos = [0.0; 6];
            pos[..3].copy_from_slice(&con.start);
            pos[3..].copy_from_slice(&con.end);
            off_mesh_cons.push(OffMeshConnection {
                pos,
                rad: con.radius,
                poly: (ground_count + n) as u16,
                flags: if con.bidirectional { OFFMESH_CON_BIDIR } else { 0 },
                side: *end_class,
                user_id: con.user_id,
            });
        }

        let (detail_meshes, detail_verts, detail_tris) = Self::build_detail(params, &polys[..ground_count]);

        let bv_tree = if params.build_bv_tree {
            Self::build_bv_nodes(params, &polys[..ground_count], &verts, &detail_meshes, &detail_verts)
        } else {
            Vec::new()
        };

        let header = TileHeader {
            x: params.tile_x,
            y: params.tile_y,
            layer: params.tile_layer,
            user_id: params.user_id,
            poly_count: polys.len(),
            vert_count: verts.len() / 3,
            max_link_count,
            off_mesh_base: ground_count,
            walkable_height: params.walkable_height,
            walkable_radius: params.walkable_radius,
            walkable_climb: params.walkable_climb,
            bmin: params.bmin,
            bmax: params.bmax,
            bv_quant_factor: if params.cs > 0.0 { 1.0 / params.cs } else { 0.0 },
        };

        log::trace!(
            "assembled tile ({}, {}, {}): {} polygons, {} off-mesh connections, {} link slots",
            header.x,
            header.y,
            header.layer,
            header.poly_count,
            off_mesh_cons.len(),
            max_link_count
        );

        Ok(TileData {
            header,
            polys,
            verts,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_tree,
            off_mesh_cons,
        })
    }

    fn validate_params(params: &TileCreateParams) -> Result<()> {
        if params.nvp < 3 || params.nvp > MAX_VERTS_PER_POLY {
            return Err(Error::InvalidParams(format!(
                "vertices per polygon must be in 3..={MAX_VERTS_PER_POLY}, got {}",
                params.nvp
            )));
        }
        if params.verts.is_empty() || params.verts.len() % 3 != 0 {
            return Err(Error::InvalidMesh("vertex buffer is empty or not xyz".into()));
        }
        // One index is reserved for the null marker, the rest include off-mesh vertices
        let total_verts = params.vert_count() + params.off_mesh_connections.len() * 2;
        if total_verts >= MESH_NULL_IDX as usize {
            return Err(Error::TooManyVertices {
                count: total_verts,
                limit: MESH_NULL_IDX as usize - 1,
            });
        }
        if params.polys.is_empty() || params.polys.len() % (params.nvp * 2) != 0 {
            return Err(Error::InvalidMesh("polygon buffer is empty or misaligned".into()));
        }

        let poly_count = params.poly_count();
        let total_polys = poly_count + params.off_mesh_connections.len();
        if total_polys >= MESH_NULL_IDX as usize {
            return Err(Error::TooManyPolygons {
                count: total_polys,
                limit: MESH_NULL_IDX as usize - 1,
            });
        }
        if params.poly_flags.len() != poly_count || params.poly_areas.len() != poly_count {
            return Err(Error::InvalidMesh(format!(
                "expected {poly_count} polygon flags and areas, got {} and {}",
                params.poly_flags.len(),
                params.poly_areas.len()
            )));
        }
        if let Some(area) = params.poly_areas.iter().find(|&&a| a as usize >= MAX_AREAS) {
            return Err(Error::InvalidMesh(format!("area id {area} out of range")));
        }
        if params.build_bv_tree && !(params.cs > 0.0) {
            return Err(Error::InvalidParams("cell size must be positive to build a BV tree".into()));
        }
        if !params.bmin.iter().chain(&params.bmax).all(|v| v.is_finite())
            || params.bmin[0] > params.bmax[0]
            || params.bmin[2] > params.bmax[2]
        {
            return Err(Error::InvalidParams("tile bounds are not finite or inverted".into()));
        }

        let nvp = params.nvp;
        let vert_count = params.vert_count();
        for i in 0..poly_count {
            let p = &params.polys[i * nvp * 2..(i + 1) * nvp * 2];
            let nv = p[..nvp].iter().take_while(|&&v| v != MESH_NULL_IDX).count();
            if nv < 3 {
                return Err(Error::InvalidMesh(format!("polygon {i} has fewer than 3 vertices")));
            }
            for &v in &p[..nv] {
                if v as usize >= vert_count {
                    return Err(Error::VertexOutOfRange {
                        poly: i,
                        vert: v as usize,
                    });
                }
            }
            for &nei in &p[nvp..nvp + nv] {
                if nei == MESH_NULL_IDX {
                    continue;
                }
                if (nei & EXT_LINK) != 0 {
                    if (nei & !EXT_LINK) > 7 {
                        return Err(Error::InvalidMesh(format!("polygon {i} has portal side {}", nei & !EXT_LINK)));
                    }
                } else if nei as usize >= poly_count {
                    return Err(Error::InvalidMesh(format!("polygon {i} has neighbor {nei} out of range")));
                }
            }
        }

        if !params.detail_meshes.is_empty() {
            if params.detail_meshes.len() != poly_count || params.detail_verts.len() % 3 != 0 {
                return Err(Error::InvalidMesh("detail mesh count does not match polygons".into()));
            }
            let ndverts = params.detail_verts.len() / 3;
            let ndtris = params.detail_tris.len() / 4;
            for (i, &[vb, nd, tb, nt]) in params.detail_meshes.iter().enumerate() {
                let p = &params.polys[i * nvp * 2..i * nvp * 2 + nvp];
                let nv = p.iter().take_while(|&&v| v != MESH_NULL_IDX).count();
                if (nd as usize) < nv
                    || (vb + nd) as usize > ndverts
                    || (tb + nt) as usize > ndtris
                    || nd > u8::MAX as u32
                    || nt > u8::MAX as u32
                {
                    return Err(Error::InvalidDetailMesh(i));
                }
                let tris = &params.detail_tris[tb as usize * 4..(tb + nt) as usize * 4];
                if tris.chunks_exact(4).any(|t| t[..3].iter().any(|&k| k as u32 >= nd)) {
                    return Err(Error::InvalidDetailMesh(i));
                }
            }
        }

        for (i, con) in params.off_mesh_connections.iter().enumerate() {
            let finite = con.start.iter().chain(&con.end).all(|v| v.is_finite());
            if !finite || !(con.radius >= 0.0) || con.area as usize >= MAX_AREAS {
                return Err(Error::InvalidOffMeshConnection(format!("connection {i}")));
            }
        }

        Ok(())
    }

    /// Detail meshes with the leading polygon vertex copies stripped, or a
    /// triangle fan per polygon when no detail mesh is supplied
    fn build_detail(params: &TileCreateParams, polys: &[Poly]) -> (Vec<PolyDetail>, Vec<f32>, Vec<u8>) {
        let mut detail_meshes = Vec::with_capacity(polys.len());

        if !params.detail_meshes.is_empty() {
            let mut detail_verts = Vec::new();
            let mut vbase = 0u32;
            for (poly, &[vb, nd, tb, nt]) in polys.iter().zip(&params.detail_meshes) {
                let nv = poly.vert_count as u32;
                let extra = nd - nv;
                detail_meshes.push(PolyDetail {
                    vert_base: vbase,
                    tri_base: tb,
                    vert_count: extra as u8,
                    tri_count: nt as u8,
                });
                let from = ((vb + nv) * 3) as usize;
                detail_verts.extend_from_slice(&params.detail_verts[from..from + extra as usize * 3]);
                vbase += extra;
            }
            return (detail_meshes, detail_verts, params.detail_tris.clone());
        }

        let mut detail_tris = Vec::new();
        let mut tbase = 0u32;
        for poly in polys {
            let nv = poly.vert_count as usize;
            let ntris = nv - 2;
            detail_meshes.push(PolyDetail {
                vert_base: 0,
                tri_base: tbase,
                vert_count: 0,
                tri_count: ntris as u8,
            });
            for j in 2..nv {
                let mut flags = DETAIL_EDGE_BOUNDARY << 2;
                if j == 2 {
                    flags |= DETAIL_EDGE_BOUNDARY;
                }
                if j == nv - 1 {
                    flags |= DETAIL_EDGE_BOUNDARY << 4;
                }
                detail_tris.extend_from_slice(&[0, (j - 1) as u8, j as u8, flags]);
            }
            tbase += ntris as u32;
        }
        (detail_meshes, Vec::new(), detail_tris)
    }

    fn build_bv_nodes(
        params: &TileCreateParams,
        polys: &[Poly],
        verts: &[f32],
        detail_meshes: &[PolyDetail],
        detail_verts: &[f32],
    ) -> Vec<crate::BVNode> {
        let quant_factor = 1.0 / params.cs;
        let quantize = |v: f32, k: usize, round: fn(f32) -> f32| -> u16 {
            round((v - params.bmin[k]) * quant_factor).clamp(0.0, u16::MAX as f32) as u16
        };

        let mut items: Vec<BVItem> = polys
            .iter()
            .enumerate()
            .map(|(i, poly)| {
                let mut bmin = [f32::MAX; 3];
                let mut bmax = [f32::MIN; 3];
                let mut grow = |v: &[f32]| {
                    for k in 0..3 {
                        bmin[k] = bmin[k].min(v[k]);
                        bmax[k] = bmax[k].max(v[k]);
                    }
                };
                for &vi in &poly.verts[..poly.vert_count as usize] {
                    grow(&verts[vi as usize * 3..vi as usize * 3 + 3]);
                }
                if let Some(pd) = detail_meshes.get(i) {
                    let from = pd.vert_base as usize * 3;
                    let to = from + pd.vert_count as usize * 3;
                    detail_verts[from..to].chunks_exact(3).for_each(&mut grow);
                }

                BVItem {
                    bmin: [
                        quantize(bmin[0], 0, f32::floor),
                        quantize(bmin[1], 1, f32::floor),
                        quantize(bmin[2], 2, f32::floor),
                    ],
                    bmax: [
                        quantize(bmax[0], 0, f32::ceil),
                        quantize(bmax[1], 1, f32::ceil),
                        quantize(bmax[2], 2, f32::ceil),
                    ],
                    i: i as i32,
                }
            })
            .collect();

        build_bv_tree(&mut items)
    }
}

/// Assembles tile data from a world-space polygon mesh
pub fn create_tile_data(params: &TileCreateParams) -> Result<TileData> {
    NavMeshBuilder::create_tile_data(params)
}
