//! Tiled navigation mesh storage
//!
//! The navigation mesh owns a fixed number of tile slots. Free slots form a
//! singly linked freelist; occupied slots are chained into buckets of a
//! position hash keyed by the tile grid coordinate. Each slot carries a salt
//! that is bumped whenever its tile is removed, which is what makes stale
//! [`PolyRef`]s detectable.

use bitflags::bitflags;
use navtile_common::{
    closest_height_point_triangle, dist_point_segment_sqr_2d_with_t, next_pow2,
    point_in_polygon_2d, vlerp, visfinite,
};

use super::poly_ref::{
    decode_poly, decode_poly_ref, decode_salt, decode_tile, encode_poly_ref, MAX_POLYS_PER_TILE,
    MAX_TILES, SALT_BITS,
};
use super::{
    NavMeshParams, PolyFlags, PolyRef, PolyType, Result, Status, DETAIL_EDGE_BOUNDARY,
    MAX_AREAS, MAX_VERTS_PER_POLY, NULL_LINK,
};

bitflags! {
    /// Flags describing how a tile was added
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TileFlags: u8 {
        /// Drop the tile data on removal instead of handing it back
        const FREE_DATA = 0x01;
    }
}

/// A polygon of a navigation mesh tile
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Poly {
    /// Index of the first link, or [`NULL_LINK`]
    pub first_link: u32,
    /// Vertex indices into the tile vertex buffer
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Per-edge neighbor codes: 0 = wall, `EXT_LINK | side` = portal,
    /// otherwise `1 + neighbor index`
    pub neis: [u16; MAX_VERTS_PER_POLY],
    /// User flags
    pub flags: PolyFlags,
    /// Number of vertices in use
    pub vert_count: u8,
    /// Area id (0-63)
    pub area: u8,
    /// Polygon type
    pub poly_type: PolyType,
}

impl Poly {
    /// Creates an empty polygon
    pub fn new(area: u8, poly_type: PolyType, flags: PolyFlags) -> Self {
        Self {
            first_link: NULL_LINK,
            verts: [0; MAX_VERTS_PER_POLY],
            neis: [0; MAX_VERTS_PER_POLY],
            flags,
            vert_count: 0,
            area: area & (MAX_AREAS as u8 - 1),
            poly_type,
        }
    }

    /// Returns true for off-mesh connection polygons
    #[inline]
    pub fn is_off_mesh_connection(&self) -> bool {
        self.poly_type == PolyType::OffMeshConnection
    }
}

/// Detail triangulation of a polygon
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PolyDetail {
    /// Offset of the first detail vertex in the tile detail vertex buffer
    pub vert_base: u32,
    /// Offset of the first triangle in the tile detail triangle buffer
    pub tri_base: u32,
    /// Number of extra detail vertices
    pub vert_count: u8,
    /// Number of triangles
    pub tri_count: u8,
}

/// A directed adjacency from one polygon to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Target polygon
    pub reference: PolyRef,
    /// Next link of the same polygon (or of the freelist)
    pub next: u32,
    /// Index of the source polygon edge
    pub edge: u8,
    /// Tile side for border links, [`crate::LINK_SIDE_INTERNAL`] otherwise
    pub side: u8,
    /// Start of the linked sub-segment along the edge, 0-255
    pub bmin: u8,
    /// End of the linked sub-segment along the edge, 0-255
    pub bmax: u8,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            reference: PolyRef::NULL,
            next: NULL_LINK,
            edge: 0,
            side: 0,
            bmin: 0,
            bmax: 0,
        }
    }
}

/// Bounding volume tree node, bounds quantized to tile-local integers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct BVNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    /// Polygon index for leaves, negated escape offset for branches
    pub i: i32,
}

/// An off-mesh connection between two points
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct OffMeshConnection {
    /// Start and end positions
    pub pos: [f32; 6],
    /// Endpoint radius
    pub rad: f32,
    /// Polygon index of the connection within its tile
    pub poly: u16,
    /// Connection flags, see [`crate::OFFMESH_CON_BIDIR`]
    pub flags: u8,
    /// Tile side the end point lies on, 0xff when inside the tile
    pub side: u8,
    /// User id
    pub user_id: u32,
}

impl OffMeshConnection {
    pub fn start(&self) -> [f32; 3] {
        [self.pos[0], self.pos[1], self.pos[2]]
    }

    pub fn end(&self) -> [f32; 3] {
        [self.pos[3], self.pos[4], self.pos[5]]
    }
}

/// Tile header
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TileHeader {
    /// Grid location
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub user_id: u32,
    pub poly_count: usize,
    pub vert_count: usize,
    /// Capacity of the link pool
    pub max_link_count: usize,
    /// Index of the first off-mesh connection polygon
    pub off_mesh_base: usize,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    /// World-space bounds
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Quantization factor of the BV tree
    pub bv_quant_factor: f32,
}

/// Assembled data of one tile, as produced by [`crate::create_tile_data`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TileData {
    pub header: TileHeader,
    pub polys: Vec<Poly>,
    /// Flat `xyz` vertex buffer
    pub verts: Vec<f32>,
    pub detail_meshes: Vec<PolyDetail>,
    pub detail_verts: Vec<f32>,
    /// Four bytes per triangle: three vertex indices and edge flags
    pub detail_tris: Vec<u8>,
    pub bv_tree: Vec<BVNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
}

/// A tile slot of the navigation mesh
#[derive(Debug, Clone, Default)]
pub struct MeshTile {
    /// Generation counter of this slot
    pub salt: u32,
    /// Slot index
    pub index: usize,
    pub header: Option<TileHeader>,
    pub polys: Vec<Poly>,
    pub verts: Vec<f32>,
    pub links: Vec<Link>,
    pub detail_meshes: Vec<PolyDetail>,
    pub detail_verts: Vec<f32>,
    pub detail_tris: Vec<u8>,
    pub bv_tree: Vec<BVNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
    pub flags: TileFlags,
    /// Head of the link freelist
    pub(crate) links_free_list: u32,
    /// Next slot in the freelist or in the position hash bucket
    pub(crate) next: Option<usize>,
}

impl MeshTile {
    fn empty(index: usize) -> Self {
        Self {
            salt: 1,
            index,
            links_free_list: NULL_LINK,
            ..Default::default()
        }
    }

    /// Returns true if the slot holds a tile
    #[inline]
    pub fn is_in_use(&self) -> bool {
        self.header.is_some()
    }

    /// Walkable climb of the tile, zero for empty slots
    #[inline]
    pub fn walkable_climb(&self) -> f32 {
        self.header.as_ref().map_or(0.0, |h| h.walkable_climb)
    }

    /// Vertex `i` of the tile vertex buffer
    #[inline]
    pub fn vertex(&self, i: usize) -> [f32; 3] {
        [self.verts[i * 3], self.verts[i * 3 + 1], self.verts[i * 3 + 2]]
    }

    /// Vertex `k` of `poly`
    #[inline]
    pub fn poly_vertex(&self, poly: &Poly, k: usize) -> [f32; 3] {
        self.vertex(poly.verts[k] as usize)
    }

    /// Copies the polygon vertices into `out` and returns the vertex count
    pub fn collect_poly_verts(&self, poly: &Poly, out: &mut [f32; MAX_VERTS_PER_POLY * 3]) -> usize {
        let nv = poly.vert_count as usize;
        for k in 0..nv {
            out[k * 3..k * 3 + 3].copy_from_slice(&self.poly_vertex(poly, k));
        }
        nv
    }

    /// Iterates the links of a polygon
    pub fn poly_links<'a>(&'a self, poly: &Poly) -> PolyLinks<'a> {
        PolyLinks {
            links: &self.links,
            current: poly.first_link,
        }
    }

    /// Vertex of a detail triangle; indices below the polygon vertex count
    /// address polygon vertices, the rest address detail vertices
    fn detail_tri_vertex(&self, poly: &Poly, pd: &PolyDetail, index: u8) -> [f32; 3] {
        if index < poly.vert_count {
            self.poly_vertex(poly, index as usize)
        } else {
            let i = (pd.vert_base + (index - poly.vert_count) as u32) as usize;
            [
                self.detail_verts[i * 3],
                self.detail_verts[i * 3 + 1],
                self.detail_verts[i * 3 + 2],
            ]
        }
    }

    /// Height of the detail surface of polygon `ip` at `pos`, if `pos` lies
    /// over the polygon. Off-mesh connections have no surface.
    pub fn poly_height(&self, ip: usize, pos: &[f32; 3]) -> Option<f32> {
        let poly = &self.polys[ip];
        if poly.is_off_mesh_connection() {
            return None;
        }

        let mut verts = [0.0f32; MAX_VERTS_PER_POLY * 3];
        let nv = self.collect_poly_verts(poly, &mut verts);
        if !point_in_polygon_2d(pos, &verts, nv) {
            return None;
        }

        if let Some(pd) = self.detail_meshes.get(ip) {
            for j in 0..pd.tri_count as usize {
                let t = (pd.tri_base as usize + j) * 4;
                let v0 = self.detail_tri_vertex(poly, pd, self.detail_tris[t]);
                let v1 = self.detail_tri_vertex(poly, pd, self.detail_tris[t + 1]);
                let v2 = self.detail_tri_vertex(poly, pd, self.detail_tris[t + 2]);
                if let Some(h) = closest_height_point_triangle(pos, &v0, &v1, &v2) {
                    return Some(h);
                }
            }
        }

        // Degenerate triangles or a point exactly on an edge; take the closest edge point
        Some(self.closest_point_on_detail_edges(ip, pos, false)[1])
    }

    /// Closest point on the detail triangle edges of polygon `ip`
    fn closest_point_on_detail_edges(&self, ip: usize, pos: &[f32; 3], only_boundary: bool) -> [f32; 3] {
        let poly = &self.polys[ip];
        let Some(pd) = self.detail_meshes.get(ip) else {
            return self.closest_point_on_poly_edges(poly, pos);
        };
        const ANY_BOUNDARY_EDGE: u8 =
            DETAIL_EDGE_BOUNDARY | (DETAIL_EDGE_BOUNDARY << 2) | (DETAIL_EDGE_BOUNDARY << 4);

        let mut dmin = f32::MAX;
        let mut tmin = 0.0;
        let mut best: Option<([f32; 3], [f32; 3])> = None;

        for i in 0..pd.tri_count as usize {
            let t = (pd.tri_base as usize + i) * 4;
            let tri = &self.detail_tris[t..t + 4];
            if only_boundary && (tri[3] & ANY_BOUNDARY_EDGE) == 0 {
                continue;
            }
            let v = [
                self.detail_tri_vertex(poly, pd, tri[0]),
                self.detail_tri_vertex(poly, pd, tri[1]),
                self.detail_tri_vertex(poly, pd, tri[2]),
            ];
            let mut j = 2;
            for k in 0..3 {
                let edge_flags = (tri[3] >> (j * 2)) & 0x3;
                // Interior edges are seen twice; visit each once
                if (edge_flags & DETAIL_EDGE_BOUNDARY) == 0 && (only_boundary || tri[j] < tri[k]) {
                    j = k;
                    continue;
                }
                let (d, t) = dist_point_segment_sqr_2d_with_t(pos, &v[j], &v[k]);
                if d < dmin {
                    dmin = d;
                    tmin = t;
                    best = Some((v[j], v[k]));
                }
                j = k;
            }
        }

        match best {
            Some((pmin, pmax)) => vlerp(&pmin, &pmax, tmin),
            None => self.closest_point_on_poly_edges(poly, pos),
        }
    }

    /// Closest point on the polygon outline
    fn closest_point_on_poly_edges(&self, poly: &Poly, pos: &[f32; 3]) -> [f32; 3] {
        let nv = poly.vert_count as usize;
        let mut dmin = f32::MAX;
        let mut closest = *pos;
        let mut j = nv.wrapping_sub(1);
        for i in 0..nv {
            let vj = self.poly_vertex(poly, j);
            let vi = self.poly_vertex(poly, i);
            let (d, t) = dist_point_segment_sqr_2d_with_t(pos, &vj, &vi);
            if d < dmin {
                dmin = d;
                closest = vlerp(&vj, &vi, t);
            }
            j = i;
        }
        closest
    }

    /// Closest point on polygon `ip` to `pos`.
    ///
    /// Returns the point and whether `pos` lies over the polygon surface.
    pub fn closest_point_on_poly(&self, ip: usize, pos: &[f32; 3]) -> ([f32; 3], bool) {
        if let Some(h) = self.poly_height(ip, pos) {
            return ([pos[0], h, pos[2]], true);
        }

        let poly = &self.polys[ip];
        if poly.is_off_mesh_connection() {
            let v0 = self.poly_vertex(poly, 0);
            let v1 = self.poly_vertex(poly, 1);
            let (_, t) = dist_point_segment_sqr_2d_with_t(pos, &v0, &v1);
            return (vlerp(&v0, &v1, t), false);
        }

        (self.closest_point_on_detail_edges(ip, pos, true), false)
    }
}

/// Iterator over the links of one polygon, yielding `(link index, link)`
pub struct PolyLinks<'a> {
    links: &'a [Link],
    current: u32,
}

impl<'a> Iterator for PolyLinks<'a> {
    type Item = (u32, &'a Link);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == NULL_LINK {
            return None;
        }
        let index = self.current;
        let link = self.links.get(index as usize)?;
        self.current = link.next;
        Some((index, link))
    }
}

/// Position hash of a tile grid coordinate
#[inline]
fn compute_tile_hash(x: i32, y: i32, mask: usize) -> usize {
    const H1: u32 = 0x8da6_b343;
    const H2: u32 = 0xd816_3841;
    let n = H1.wrapping_mul(x as u32).wrapping_add(H2.wrapping_mul(y as u32));
    n as usize & mask
}

/// Grid offset of neighbor side 0-7
#[inline]
pub(crate) fn side_offset(side: u8) -> (i32, i32) {
    match side & 0x7 {
        0 => (1, 0),
        1 => (1, 1),
        2 => (0, 1),
        3 => (-1, 1),
        4 => (-1, 0),
        5 => (-1, -1),
        6 => (0, -1),
        _ => (1, -1),
    }
}

/// Side on the opposite edge of a tile
#[inline]
pub fn opposite_tile_side(side: u8) -> u8 {
    (side + 4) & 0x7
}

/// A tiled navigation mesh
#[derive(Debug, Clone)]
pub struct NavMesh {
    params: NavMeshParams,
    tiles: Vec<MeshTile>,
    pos_lookup: Vec<Option<usize>>,
    tile_lut_mask: usize,
    next_free: Option<usize>,
}

impl NavMesh {
    /// Creates an empty navigation mesh
    pub fn new(params: NavMeshParams) -> Result<Self> {
        if !visfinite(&params.origin)
            || !params.tile_width.is_finite()
            || !params.tile_height.is_finite()
            || params.tile_width <= 0.0
            || params.tile_height <= 0.0
            || params.max_tiles == 0
            || params.max_tiles > MAX_TILES
            || params.max_polys_per_tile == 0
            || params.max_polys_per_tile > MAX_POLYS_PER_TILE
        {
            return Err(Status::invalid_param());
        }

        let lut_size = next_pow2((params.max_tiles / 4) as u32) as usize;

        // Slot 0 ends up at the head of the freelist
        let mut tiles: Vec<MeshTile> = (0..params.max_tiles).map(MeshTile::empty).collect();
        let mut next_free = None;
        for (i, tile) in tiles.iter_mut().enumerate().rev() {
            tile.next = next_free;
            next_free = Some(i);
        }

        Ok(Self {
            params,
            tiles,
            pos_lookup: vec![None; lut_size],
            tile_lut_mask: lut_size - 1,
            next_free,
        })
    }

    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    /// Number of tile slots
    pub fn max_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Number of slots currently holding a tile
    pub fn tile_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_in_use()).count()
    }

    /// Tile slot by index, empty slots included
    pub fn get_tile(&self, index: usize) -> Option<&MeshTile> {
        self.tiles.get(index)
    }

    pub(crate) fn tile_at_index(&self, index: usize) -> &MeshTile {
        &self.tiles[index]
    }

    pub(crate) fn tile_at_index_mut(&mut self, index: usize) -> &mut MeshTile {
        &mut self.tiles[index]
    }

    /// Iterates the tiles that are in use
    pub fn tiles(&self) -> impl Iterator<Item = &MeshTile> {
        self.tiles.iter().filter(|t| t.is_in_use())
    }

    /// Tile grid location containing a world position
    pub fn calc_tile_loc(&self, pos: &[f32; 3]) -> (i32, i32) {
        let tx = ((pos[0] - self.params.origin[0]) / self.params.tile_width).floor() as i32;
        let ty = ((pos[2] - self.params.origin[2]) / self.params.tile_height).floor() as i32;
        (tx, ty)
    }

    fn tile_indices_in_bucket(&self, x: i32, y: i32) -> impl Iterator<Item = usize> + '_ {
        let h = compute_tile_hash(x, y, self.tile_lut_mask);
        std::iter::successors(self.pos_lookup[h], move |&i| self.tiles[i].next)
    }

    pub(crate) fn tile_index_at(&self, x: i32, y: i32, layer: i32) -> Option<usize> {
        self.tile_indices_in_bucket(x, y).find(|&i| {
            self.tiles[i]
                .header
                .as_ref()
                .is_some_and(|h| h.x == x && h.y == y && h.layer == layer)
        })
    }

    /// Slot indices of all layers at a grid location
    pub(crate) fn tile_indices_at(&self, x: i32, y: i32) -> Vec<usize> {
        self.tile_indices_in_bucket(x, y)
            .filter(|&i| {
                self.tiles[i]
                    .header
                    .as_ref()
                    .is_some_and(|h| h.x == x && h.y == y)
            })
            .collect()
    }

    /// Slot indices of all layers of the neighbor cell on `side`
    pub(crate) fn neighbour_tile_indices_at(&self, x: i32, y: i32, side: u8) -> Vec<usize> {
        let (dx, dy) = side_offset(side);
        self.tile_indices_at(x + dx, y + dy)
    }

    /// Tile at a grid location and layer
    pub fn get_tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        self.tile_index_at(x, y, layer).map(|i| &self.tiles[i])
    }

    /// All layers at a grid location
    pub fn get_tiles_at(&self, x: i32, y: i32) -> Vec<&MeshTile> {
        self.tile_indices_at(x, y).into_iter().map(|i| &self.tiles[i]).collect()
    }

    /// All layers of the neighbor cell in direction `side` (0-7)
    pub fn get_neighbour_tiles_at(&self, x: i32, y: i32, side: u8) -> Vec<&MeshTile> {
        self.neighbour_tile_indices_at(x, y, side)
            .into_iter()
            .map(|i| &self.tiles[i])
            .collect()
    }

    /// Reference of a tile, null for empty slots
    pub fn get_tile_ref(&self, tile: &MeshTile) -> PolyRef {
        if !tile.is_in_use() {
            return PolyRef::NULL;
        }
        encode_poly_ref(tile.salt, tile.index as u32, 0)
    }

    /// Reference of the tile at a grid location and layer
    pub fn get_tile_ref_at(&self, x: i32, y: i32, layer: i32) -> PolyRef {
        self.get_tile_at(x, y, layer)
            .map_or(PolyRef::NULL, |t| self.get_tile_ref(t))
    }

    /// Reference of polygon 0 of a tile; OR a polygon index into it
    pub fn get_poly_ref_base(&self, tile: &MeshTile) -> PolyRef {
        encode_poly_ref(tile.salt, tile.index as u32, 0)
    }

    /// Tile addressed by a tile (or polygon) reference
    pub fn get_tile_by_ref(&self, r: PolyRef) -> Option<&MeshTile> {
        if r.is_null() {
            return None;
        }
        let tile = self.tiles.get(decode_tile(r) as usize)?;
        if !tile.is_in_use() || tile.salt != decode_salt(r) {
            return None;
        }
        Some(tile)
    }

    /// Slot index addressed by a reference, if its tile is live
    pub fn tile_index_by_ref(&self, r: PolyRef) -> Option<usize> {
        self.get_tile_by_ref(r).map(|t| t.index)
    }

    /// Returns true if the reference addresses a polygon of a live tile
    pub fn is_valid_poly_ref(&self, r: PolyRef) -> bool {
        if r.is_null() {
            return false;
        }
        let (salt, it, ip) = decode_poly_ref(r);
        match self.tiles.get(it as usize) {
            Some(tile) => tile.is_in_use() && tile.salt == salt && (ip as usize) < tile.polys.len(),
            None => false,
        }
    }

    /// Tile and polygon addressed by a reference
    pub fn get_tile_and_poly_by_ref(&self, r: PolyRef) -> Result<(&MeshTile, &Poly)> {
        if !self.is_valid_poly_ref(r) {
            return Err(Status::invalid_param());
        }
        Ok(self.tile_and_poly(r))
    }

    /// Tile and polygon of a reference that has already been validated
    #[inline]
    pub(crate) fn tile_and_poly(&self, r: PolyRef) -> (&MeshTile, &Poly) {
        let tile = &self.tiles[decode_tile(r) as usize];
        (tile, &tile.polys[decode_poly(r) as usize])
    }

    /// Adds a tile.
    ///
    /// With a null `desired_ref` the first free slot is used. Otherwise the
    /// slot and salt encoded in `desired_ref` are restored, which hands out the
    /// same references a previously removed tile had.
    pub fn add_tile(&mut self, data: TileData, flags: TileFlags, desired_ref: PolyRef) -> Result<PolyRef> {
        let header = &data.header;
        if data.polys.len() > self.params.max_polys_per_tile
            || data.polys.len() != header.poly_count
            || data.verts.len() != header.vert_count * 3
        {
            return Err(Status::invalid_param());
        }
        if self.tile_index_at(header.x, header.y, header.layer).is_some() {
            return Err(Status::already_occupied());
        }

        let index = if desired_ref.is_null() {
            let index = self.next_free.ok_or_else(Status::out_of_memory)?;
            self.next_free = self.tiles[index].next.take();
            index
        } else {
            let salt = decode_salt(desired_ref);
            if salt == 0 {
                return Err(Status::invalid_param());
            }
            let target = decode_tile(desired_ref) as usize;
            if target >= self.tiles.len() {
                return Err(Status::out_of_memory());
            }
            self.take_from_freelist(target).ok_or_else(Status::out_of_memory)?;
            self.tiles[target].salt = salt;
            target
        };

        let h = compute_tile_hash(header.x, header.y, self.tile_lut_mask);
        let (x, y, layer) = (header.x, header.y, header.layer);
        let max_link_count = header.max_link_count;

        let tile = &mut self.tiles[index];
        tile.next = self.pos_lookup[h];
        self.pos_lookup[h] = Some(index);

        let TileData {
            header,
            polys,
            verts,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_tree,
            off_mesh_cons,
        } = data;
        tile.header = Some(header);
        tile.polys = polys;
        tile.verts = verts;
        tile.detail_meshes = detail_meshes;
        tile.detail_verts = detail_verts;
        tile.detail_tris = detail_tris;
        tile.bv_tree = bv_tree;
        tile.off_mesh_cons = off_mesh_cons;
        tile.flags = flags;

        // Link pool with an index freelist
        tile.links = (0..max_link_count)
            .map(|i| Link {
                next: if i + 1 < max_link_count { (i + 1) as u32 } else { NULL_LINK },
                ..Link::default()
            })
            .collect();
        tile.links_free_list = if max_link_count > 0 { 0 } else { NULL_LINK };

        self.connect_tile(index);

        let tile_ref = encode_poly_ref(self.tiles[index].salt, index as u32, 0);
        log::debug!("added tile ({x}, {y}, {layer}) at slot {index} as {tile_ref}");
        Ok(tile_ref)
    }

    /// Splices `target` out of the freelist; `None` if it is not free
    fn take_from_freelist(&mut self, target: usize) -> Option<()> {
        let mut prev: Option<usize> = None;
        let mut cur = self.next_free;
        while let Some(i) = cur {
            if i == target {
                let next = self.tiles[i].next.take();
                match prev {
                    Some(p) => self.tiles[p].next = next,
                    None => self.next_free = next,
                }
                return Some(());
            }
            prev = cur;
            cur = self.tiles[i].next;
        }
        None
    }

    /// Builds every link of a freshly installed tile
    fn connect_tile(&mut self, index: usize) {
        let Some((x, y)) = self.tiles[index].header.as_ref().map(|h| (h.x, h.y)) else {
            return;
        };

        self.connect_int_links(index);
        // Off-mesh start points, then connections that land inside the same tile
        self.base_off_mesh_links(index);
        self.connect_ext_off_mesh_links(index, index, None);

        // Other layers in the same cell
        for nei in self.tile_indices_at(x, y) {
            if nei == index {
                continue;
            }
            self.connect_ext_links(index, nei, None);
            self.connect_ext_links(nei, index, None);
            self.connect_ext_off_mesh_links(index, nei, None);
            self.connect_ext_off_mesh_links(nei, index, None);
        }

        for side in 0..8u8 {
            for nei in self.neighbour_tile_indices_at(x, y, side) {
                let opposite = opposite_tile_side(side);
                self.connect_ext_links(index, nei, Some(side));
                self.connect_ext_links(nei, index, Some(opposite));
                self.connect_ext_off_mesh_links(index, nei, Some(side));
                self.connect_ext_off_mesh_links(nei, index, Some(opposite));
            }
        }
    }

    /// Removes a tile.
    ///
    /// Links from neighboring tiles into the removed tile are dropped and the
    /// slot salt is advanced, so every reference into the tile becomes
    /// invalid. The tile data is handed back unless the tile was added with
    /// [`TileFlags::FREE_DATA`].
    pub fn remove_tile(&mut self, tile_ref: PolyRef) -> Result<Option<TileData>> {
        if tile_ref.is_null() {
            return Err(Status::invalid_param());
        }
        let index = decode_tile(tile_ref) as usize;
        let Some(tile) = self.tiles.get(index) else {
            return Err(Status::invalid_param());
        };
        if tile.salt != decode_salt(tile_ref) {
            return Err(Status::invalid_param());
        }
        let Some((x, y, layer)) = tile.header.as_ref().map(|h| (h.x, h.y, h.layer)) else {
            return Err(Status::invalid_param());
        };

        // Unhook from the position hash
        let h = compute_tile_hash(x, y, self.tile_lut_mask);
        let mut prev: Option<usize> = None;
        let mut cur = self.pos_lookup[h];
        while let Some(i) = cur {
            if i == index {
                let next = self.tiles[i].next;
                match prev {
                    Some(p) => self.tiles[p].next = next,
                    None => self.pos_lookup[h] = next,
                }
                break;
            }
            prev = cur;
            cur = self.tiles[i].next;
        }

        for nei in self.tile_indices_at(x, y) {
            if nei != index {
                self.unconnect_links(nei, index);
            }
        }
        for side in 0..8u8 {
            for nei in self.neighbour_tile_indices_at(x, y, side) {
                self.unconnect_links(nei, index);
            }
        }

        let tile = &mut self.tiles[index];
        let data = tile.header.take().map(|header| TileData {
            header,
            polys: std::mem::take(&mut tile.polys),
            verts: std::mem::take(&mut tile.verts),
            detail_meshes: std::mem::take(&mut tile.detail_meshes),
            detail_verts: std::mem::take(&mut tile.detail_verts),
            detail_tris: std::mem::take(&mut tile.detail_tris),
            bv_tree: std::mem::take(&mut tile.bv_tree),
            off_mesh_cons: std::mem::take(&mut tile.off_mesh_cons),
        });
        let free_data = tile.flags.contains(TileFlags::FREE_DATA);
        tile.links.clear();
        tile.links_free_list = NULL_LINK;
        tile.flags = TileFlags::empty();

        // Salt never wraps to zero
        tile.salt = (tile.salt + 1) & ((1 << SALT_BITS) - 1);
        if tile.salt == 0 {
            tile.salt = 1;
        }

        tile.next = self.next_free;
        self.next_free = Some(index);

        log::debug!(
            "removed tile ({x}, {y}, {layer}) from slot {index}, salt now {}",
            self.tiles[index].salt
        );
        Ok(if free_data { None } else { data })
    }

    /// Sets the user flags of a polygon
    pub fn set_poly_flags(&mut self, r: PolyRef, flags: PolyFlags) -> Result<()> {
        if !self.is_valid_poly_ref(r) {
            return Err(Status::invalid_param());
        }
        let tile = &mut self.tiles[decode_tile(r) as usize];
        tile.polys[decode_poly(r) as usize].flags = flags;
        Ok(())
    }

    /// User flags of a polygon
    pub fn get_poly_flags(&self, r: PolyRef) -> Result<PolyFlags> {
        self.get_tile_and_poly_by_ref(r).map(|(_, p)| p.flags)
    }

    /// Sets the area id of a polygon
    pub fn set_poly_area(&mut self, r: PolyRef, area: u8) -> Result<()> {
        if !self.is_valid_poly_ref(r) || area as usize >= MAX_AREAS {
            return Err(Status::invalid_param());
        }
        let tile = &mut self.tiles[decode_tile(r) as usize];
        tile.polys[decode_poly(r) as usize].area = area;
        Ok(())
    }

    /// Area id of a polygon
    pub fn get_poly_area(&self, r: PolyRef) -> Result<u8> {
        self.get_tile_and_poly_by_ref(r).map(|(_, p)| p.area)
    }

    /// Off-mesh connection record of an off-mesh connection polygon
    pub fn get_off_mesh_connection_by_ref(&self, r: PolyRef) -> Option<&OffMeshConnection> {
        let (tile, poly) = self.get_tile_and_poly_by_ref(r).ok()?;
        if !poly.is_off_mesh_connection() {
            return None;
        }
        let base = tile.header.as_ref()?.off_mesh_base;
        tile.off_mesh_cons.get((decode_poly(r) as usize).checked_sub(base)?)
    }

    /// End points of an off-mesh connection, ordered by travel direction.
    ///
    /// `prev_ref` is the polygon the agent arrives from; the returned start
    /// point is the end of the connection attached to it.
    pub fn get_off_mesh_connection_poly_end_points(
        &self,
        prev_ref: PolyRef,
        poly_ref: PolyRef,
    ) -> Result<([f32; 3], [f32; 3])> {
        let (tile, poly) = self.get_tile_and_poly_by_ref(poly_ref)?;
        if !poly.is_off_mesh_connection() {
            return Err(Status::FAILURE);
        }

        let (mut idx0, mut idx1) = (0, 1);
        if let Some((_, link)) = tile.poly_links(poly).find(|(_, l)| l.edge == 0) {
            if link.reference != prev_ref {
                idx0 = 1;
                idx1 = 0;
            }
        }
        Ok((tile.poly_vertex(poly, idx0), tile.poly_vertex(poly, idx1)))
    }

    /// Allocates a link from a tile's pool
    pub(crate) fn alloc_link(tile: &mut MeshTile) -> Option<u32> {
        if tile.links_free_list == NULL_LINK {
            return None;
        }
        let index = tile.links_free_list;
        tile.links_free_list = tile.links[index as usize].next;
        Some(index)
    }

    /// Returns a link to a tile's pool
    pub(crate) fn free_link(tile: &mut MeshTile, index: u32) {
        tile.links[index as usize].next = tile.links_free_list;
        tile.links_free_list = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::{grid_params, square_tile};
    use crate::StatusDetail;

    #[test]
    fn test_new_validates_params() {
        let mut params = grid_params(4);
        params.tile_width = 0.0;
        assert!(NavMesh::new(params).is_err());

        let mut params = grid_params(4);
        params.max_tiles = 0;
        assert!(NavMesh::new(params).is_err());

        let mut params = grid_params(4);
        params.origin[1] = f32::NAN;
        assert!(NavMesh::new(params).is_err());
    }

    #[test]
    fn test_slots_start_with_salt_one() -> Result<()> {
        let nav_mesh = NavMesh::new(grid_params(3))?;
        for i in 0..3 {
            assert_eq!(nav_mesh.get_tile(i).map(|t| t.salt), Some(1));
        }
        assert_eq!(nav_mesh.tile_count(), 0);
        Ok(())
    }

    #[test]
    fn test_add_tile_uses_first_free_slot() -> Result<()> {
        let mut nav_mesh = NavMesh::new(grid_params(4))?;
        let r0 = nav_mesh.add_tile(square_tile(0, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        let r1 = nav_mesh.add_tile(square_tile(1, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        assert_eq!(decode_poly_ref(r0), (1, 0, 0));
        assert_eq!(decode_poly_ref(r1), (1, 1, 0));
        assert_eq!(nav_mesh.get_tile_ref_at(1, 0, 0), r1);
        Ok(())
    }

    #[test]
    fn test_add_tile_rejects_occupied_location() -> Result<()> {
        let mut nav_mesh = NavMesh::new(grid_params(4))?;
        nav_mesh.add_tile(square_tile(0, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        let err = nav_mesh
            .add_tile(square_tile(0, 0)?, TileFlags::empty(), PolyRef::NULL)
            .unwrap_err();
        assert!(err.has_detail(StatusDetail::ALREADY_OCCUPIED));
        Ok(())
    }

    #[test]
    fn test_add_tile_out_of_slots() -> Result<()> {
        let mut nav_mesh = NavMesh::new(grid_params(1))?;
        nav_mesh.add_tile(square_tile(0, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        let err = nav_mesh
            .add_tile(square_tile(1, 0)?, TileFlags::empty(), PolyRef::NULL)
            .unwrap_err();
        assert!(err.has_detail(StatusDetail::OUT_OF_MEMORY));
        Ok(())
    }

    #[test]
    fn test_remove_tile_rotates_salt_and_invalidates_refs() -> Result<()> {
        let mut nav_mesh = NavMesh::new(grid_params(2))?;
        let tile_ref = nav_mesh.add_tile(square_tile(0, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        let poly_ref = PolyRef::new(tile_ref.id());
        assert!(nav_mesh.is_valid_poly_ref(poly_ref));

        let data = nav_mesh.remove_tile(tile_ref)?;
        assert!(data.is_some());
        assert!(!nav_mesh.is_valid_poly_ref(poly_ref));
        assert!(nav_mesh.remove_tile(tile_ref).is_err());

        let new_ref = nav_mesh.add_tile(square_tile(0, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        assert_eq!(decode_tile(new_ref), decode_tile(tile_ref));
        assert_ne!(decode_salt(new_ref), decode_salt(tile_ref));
        assert!(!nav_mesh.is_valid_poly_ref(poly_ref));
        Ok(())
    }

    #[test]
    fn test_salt_wraps_past_zero() -> Result<()> {
        let mut nav_mesh = NavMesh::new(grid_params(1))?;
        nav_mesh.tile_at_index_mut(0).salt = (1 << SALT_BITS) - 1;
        let tile_ref = nav_mesh.add_tile(square_tile(0, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        nav_mesh.remove_tile(tile_ref)?;
        assert_eq!(nav_mesh.get_tile(0).map(|t| t.salt), Some(1));
        Ok(())
    }

    #[test]
    fn test_restore_with_desired_ref() -> Result<()> {
        let mut nav_mesh = NavMesh::new(grid_params(4))?;
        nav_mesh.add_tile(square_tile(0, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        let tile_ref = nav_mesh.add_tile(square_tile(1, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        let data = nav_mesh.remove_tile(tile_ref)?.expect("data handed back");

        let restored = nav_mesh.add_tile(data, TileFlags::empty(), tile_ref)?;
        assert_eq!(restored, tile_ref);
        assert!(nav_mesh.is_valid_poly_ref(PolyRef::new(tile_ref.id())));

        // Slot 1 is no longer on the freelist
        let data = square_tile(2, 0)?;
        let err = nav_mesh.add_tile(data, TileFlags::empty(), tile_ref).unwrap_err();
        assert!(err.has_detail(StatusDetail::OUT_OF_MEMORY));
        Ok(())
    }

    #[test]
    fn test_free_data_flag_drops_data() -> Result<()> {
        let mut nav_mesh = NavMesh::new(grid_params(1))?;
        let tile_ref = nav_mesh.add_tile(square_tile(0, 0)?, TileFlags::FREE_DATA, PolyRef::NULL)?;
        assert!(nav_mesh.remove_tile(tile_ref)?.is_none());
        Ok(())
    }

    #[test]
    fn test_tile_lookup_by_location() -> Result<()> {
        let mut nav_mesh = NavMesh::new(grid_params(8))?;
        for x in 0..3 {
            nav_mesh.add_tile(square_tile(x, 1)?, TileFlags::empty(), PolyRef::NULL)?;
        }
        assert_eq!(nav_mesh.get_tiles_at(1, 1).len(), 1);
        assert!(nav_mesh.get_tile_at(1, 1, 1).is_none());
        assert_eq!(nav_mesh.get_neighbour_tiles_at(1, 1, 0).len(), 1);
        assert_eq!(nav_mesh.get_neighbour_tiles_at(1, 1, 4).len(), 1);
        assert!(nav_mesh.get_neighbour_tiles_at(1, 1, 2).is_empty());
        assert_eq!(nav_mesh.calc_tile_loc(&[25.0, 0.0, 15.0]), (2, 1));
        assert_eq!(nav_mesh.calc_tile_loc(&[-0.5, 0.0, 0.5]), (-1, 0));
        Ok(())
    }

    #[test]
    fn test_poly_flags_and_area() -> Result<()> {
        let mut nav_mesh = NavMesh::new(grid_params(1))?;
        let tile_ref = nav_mesh.add_tile(square_tile(0, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        let poly_ref = PolyRef::new(tile_ref.id());

        nav_mesh.set_poly_flags(poly_ref, PolyFlags::SWIM | PolyFlags::DOOR)?;
        assert_eq!(nav_mesh.get_poly_flags(poly_ref)?, PolyFlags::SWIM | PolyFlags::DOOR);

        nav_mesh.set_poly_area(poly_ref, 7)?;
        assert_eq!(nav_mesh.get_poly_area(poly_ref)?, 7);
        assert!(nav_mesh.set_poly_area(poly_ref, MAX_AREAS as u8).is_err());
        Ok(())
    }

    #[test]
    fn test_poly_height_and_closest_point() -> Result<()> {
        let mut nav_mesh = NavMesh::new(grid_params(1))?;
        let tile_ref = nav_mesh.add_tile(square_tile(0, 0)?, TileFlags::empty(), PolyRef::NULL)?;
        let tile = nav_mesh.get_tile_by_ref(tile_ref).expect("tile");

        assert_eq!(tile.poly_height(0, &[5.0, 3.0, 5.0]), Some(0.0));
        assert_eq!(tile.poly_height(0, &[15.0, 0.0, 5.0]), None);

        let (p, over) = tile.closest_point_on_poly(0, &[5.0, 3.0, 5.0]);
        assert!(over);
        assert_eq!(p, [5.0, 0.0, 5.0]);

        let (p, over) = tile.closest_point_on_poly(0, &[12.0, 0.0, 5.0]);
        assert!(!over);
        assert!((p[0] - 10.0).abs() < 1e-4 && (p[2] - 5.0).abs() < 1e-4);
        Ok(())
    }
}
