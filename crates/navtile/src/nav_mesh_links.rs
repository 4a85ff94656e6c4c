//! Link graph maintenance
//!
//! Links are stored per tile in a fixed pool sized by the tile header. Each
//! polygon heads a singly linked list of its links; unused entries form the
//! tile's link freelist. Linking is done in two steps: candidate links are
//! gathered while the tiles are borrowed immutably, then written into the
//! owning tile.

use navtile_common::{dist_sqr_2d, vsub};

use super::bvh_tree::query_polygons_in_tile;
use super::nav_mesh::{opposite_tile_side, MeshTile};
use super::poly_ref::{decode_tile, encode_poly_ref};
use super::{
    Link, NavMesh, PolyRef, EXT_LINK, LINK_SIDE_INTERNAL, NULL_LINK, OFFMESH_CON_BIDIR,
};

/// Maximum number of polygons a single border edge links to
const MAX_CONNECTING_POLYS: usize = 4;

/// Polygon candidates examined when anchoring an off-mesh end point
const MAX_ANCHOR_CANDIDATES: usize = 128;

/// Border polygon matched by [`find_connecting_polys`], with the overlapping
/// part of the edge along the slab axis
#[derive(Debug, Clone, Copy)]
struct Connection {
    reference: PolyRef,
    amin: f32,
    amax: f32,
}

/// Pending link write: source polygon plus link contents
struct PendingLink {
    poly: usize,
    link: Link,
}

/// Prepends `link` to the link list of polygon `poly`. Returns false when the
/// tile's link pool is exhausted.
fn push_link(tile: &mut MeshTile, poly: usize, mut link: Link) -> bool {
    let Some(index) = NavMesh::alloc_link(tile) else {
        log::warn!(
            "link pool of tile slot {} exhausted ({} links)",
            tile.index,
            tile.links.len()
        );
        return false;
    };
    link.next = tile.polys[poly].first_link;
    tile.links[index as usize] = link;
    tile.polys[poly].first_link = index;
    true
}

/// Coordinate of an edge along the axis perpendicular to a border side
#[inline]
fn slab_coord(v: &[f32; 3], side: u8) -> f32 {
    match side {
        0 | 4 => v[0],
        2 | 6 => v[2],
        _ => 0.0,
    }
}

/// End points of an edge projected onto a border slab, as `(along, height)`
/// pairs sorted by the along-axis coordinate
fn slab_end_points(va: &[f32; 3], vb: &[f32; 3], side: u8) -> ([f32; 2], [f32; 2]) {
    let axis = match side {
        0 | 4 => 2,
        2 | 6 => 0,
        _ => return ([0.0; 2], [0.0; 2]),
    };
    if va[axis] < vb[axis] {
        ([va[axis], va[1]], [vb[axis], vb[1]])
    } else {
        ([vb[axis], vb[1]], [va[axis], va[1]])
    }
}

/// Overlap test of two border edges given as slab end points.
///
/// The edges must overlap by more than `px` along the slab, and their heights
/// over the common range must cross or stay within `2 * py` of each other.
fn overlap_slabs(amin: &[f32; 2], amax: &[f32; 2], bmin: &[f32; 2], bmax: &[f32; 2], px: f32, py: f32) -> bool {
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }

    let ad = (amax[1] - amin[1]) / (amax[0] - amin[0]);
    let ak = amin[1] - ad * amin[0];
    let bd = (bmax[1] - bmin[1]) / (bmax[0] - bmin[0]);
    let bk = bmin[1] - bd * bmin[0];
    let aminy = ad * minx + ak;
    let amaxy = ad * maxx + ak;
    let bminy = bd * minx + bk;
    let bmaxy = bd * maxx + bk;
    let dmin = bminy - aminy;
    let dmax = bmaxy - amaxy;

    // Crossing segments always overlap
    if dmin * dmax < 0.0 {
        return true;
    }

    let thr = (py * 2.0) * (py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}

/// Finds the polygons of `tile` whose portal edges on `side` line up with the
/// edge `va -> vb`
fn find_connecting_polys(va: &[f32; 3], vb: &[f32; 3], tile: &MeshTile, side: u8) -> Vec<Connection> {
    let mut result = Vec::new();
    let (amin, amax) = slab_end_points(va, vb, side);
    let apos = slab_coord(va, side);
    let m = EXT_LINK | side as u16;
    let climb = tile.walkable_climb();

    for (i, poly) in tile.polys.iter().enumerate() {
        let nv = poly.vert_count as usize;
        for j in 0..nv {
            if poly.neis[j] != m {
                continue;
            }
            let vc = tile.poly_vertex(poly, j);
            let vd = tile.poly_vertex(poly, (j + 1) % nv);
            if (apos - slab_coord(&vc, side)).abs() > 0.01 {
                continue;
            }
            let (bmin, bmax) = slab_end_points(&vc, &vd, side);
            if !overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, climb) {
                continue;
            }
            if result.len() < MAX_CONNECTING_POLYS {
                result.push(Connection {
                    reference: encode_poly_ref(tile.salt, tile.index as u32, i as u32),
                    amin: amin[0].max(bmin[0]),
                    amax: amax[0].min(bmax[0]),
                });
            }
            break;
        }
    }
    result
}

/// Portion of edge `va -> vb` covered by `[amin, amax]` along the slab axis,
/// quantized to 0-255
fn quantize_edge_span(va: &[f32; 3], vb: &[f32; 3], side: u8, amin: f32, amax: f32) -> (u8, u8) {
    let axis = match side {
        0 | 4 => 2,
        2 | 6 => 0,
        _ => return (0, 255),
    };
    let d = vb[axis] - va[axis];
    let mut tmin = (amin - va[axis]) / d;
    let mut tmax = (amax - va[axis]) / d;
    if tmin > tmax {
        std::mem::swap(&mut tmin, &mut tmax);
    }
    let q = |t: f32| (t.clamp(0.0, 1.0) * 255.0).round() as u8;
    (q(tmin), q(tmax))
}

/// Nearest polygon of a single tile to `center` within `half_extents`.
///
/// Polygons the point lies over are ranked by the height difference beyond the
/// tile's walkable climb, others by the 3D distance to their closest point.
/// Returns the polygon index and the closest point.
pub(crate) fn find_nearest_poly_in_tile(
    tile: &MeshTile,
    center: &[f32; 3],
    half_extents: &[f32; 3],
) -> Option<(usize, [f32; 3])> {
    let bmin = vsub(center, half_extents);
    let bmax = [
        center[0] + half_extents[0],
        center[1] + half_extents[1],
        center[2] + half_extents[2],
    ];
    let climb = tile.walkable_climb();

    let mut nearest = None;
    let mut nearest_dist = f32::MAX;
    for ip in query_polygons_in_tile(tile, &bmin, &bmax)
        .into_iter()
        .take(MAX_ANCHOR_CANDIDATES)
    {
        let (closest, over_poly) = tile.closest_point_on_poly(ip, center);
        let diff = vsub(center, &closest);
        let d = if over_poly {
            let d = diff[1].abs() - climb;
            if d > 0.0 {
                d * d
            } else {
                0.0
            }
        } else {
            diff[0] * diff[0] + diff[1] * diff[1] + diff[2] * diff[2]
        };
        if d < nearest_dist {
            nearest_dist = d;
            nearest = Some((ip, closest));
        }
    }
    nearest
}

impl NavMesh {
    /// Builds the links between polygons of the same tile.
    ///
    /// Every polygon's link list is reset first. Edges are visited in reverse
    /// so that, after prepending, each list runs in edge order.
    pub(crate) fn connect_int_links(&mut self, tile_idx: usize) {
        let tile = self.tile_at_index_mut(tile_idx);
        let (salt, index) = (tile.salt, tile.index as u32);

        for i in 0..tile.polys.len() {
            tile.polys[i].first_link = NULL_LINK;
            if tile.polys[i].is_off_mesh_connection() {
                continue;
            }
            let nv = tile.polys[i].vert_count as usize;
            for j in (0..nv).rev() {
                let nei = tile.polys[i].neis[j];
                if nei == 0 || (nei & EXT_LINK) != 0 {
                    continue;
                }
                let link = Link {
                    reference: encode_poly_ref(salt, index, (nei - 1) as u32),
                    edge: j as u8,
                    side: LINK_SIDE_INTERNAL,
                    ..Link::default()
                };
                push_link(tile, i, link);
            }
        }
    }

    /// Links the portal edges of tile `tile_idx` to matching polygons of
    /// `target_idx`. With `side` set, only portals facing that side are linked.
    pub(crate) fn connect_ext_links(&mut self, tile_idx: usize, target_idx: usize, side: Option<u8>) {
        let pending = {
            let tile = self.tile_at_index(tile_idx);
            let target = self.tile_at_index(target_idx);
            if !tile.is_in_use() || !target.is_in_use() {
                return;
            }

            let mut pending = Vec::new();
            for (i, poly) in tile.polys.iter().enumerate() {
                let nv = poly.vert_count as usize;
                for j in 0..nv {
                    if (poly.neis[j] & EXT_LINK) == 0 {
                        continue;
                    }
                    let dir = (poly.neis[j] & 0xff) as u8;
                    if side.is_some_and(|s| s != dir) {
                        continue;
                    }

                    let va = tile.poly_vertex(poly, j);
                    let vb = tile.poly_vertex(poly, (j + 1) % nv);
                    for con in find_connecting_polys(&va, &vb, target, opposite_tile_side(dir)) {
                        let (bmin, bmax) = quantize_edge_span(&va, &vb, dir, con.amin, con.amax);
                        pending.push(PendingLink {
                            poly: i,
                            link: Link {
                                reference: con.reference,
                                edge: j as u8,
                                side: dir,
                                bmin,
                                bmax,
                                next: NULL_LINK,
                            },
                        });
                    }
                }
            }
            pending
        };

        let tile = self.tile_at_index_mut(tile_idx);
        for p in pending {
            push_link(tile, p.poly, p.link);
        }
    }

    /// Anchors the start points of the tile's off-mesh connections to the
    /// nearest ground polygon of the same tile.
    ///
    /// The connection's first vertex is snapped onto the ground. Connections
    /// whose start lies farther than the connection radius from any polygon
    /// are left unlinked.
    pub(crate) fn base_off_mesh_links(&mut self, tile_idx: usize) {
        let anchors: Vec<(usize, usize, [f32; 3])> = {
            let tile = self.tile_at_index(tile_idx);
            let climb = tile.walkable_climb();
            tile.off_mesh_cons
                .iter()
                .filter_map(|con| {
                    let start = con.start();
                    let half_extents = [con.rad, climb, con.rad];
                    let Some((land, nearest)) = find_nearest_poly_in_tile(tile, &start, &half_extents) else {
                        log::trace!("off-mesh connection {} has no start polygon", con.user_id);
                        return None;
                    };
                    if dist_sqr_2d(&nearest, &start) > con.rad * con.rad {
                        log::trace!("off-mesh connection {} start is off the mesh", con.user_id);
                        return None;
                    }
                    Some((con.poly as usize, land, nearest))
                })
                .collect()
        };

        let tile = self.tile_at_index_mut(tile_idx);
        let (salt, index) = (tile.salt, tile.index as u32);
        for (con_poly, land, nearest) in anchors {
            let v = tile.polys[con_poly].verts[0] as usize;
            tile.verts[v * 3..v * 3 + 3].copy_from_slice(&nearest);

            // Connection to ground
            push_link(
                tile,
                con_poly,
                Link {
                    reference: encode_poly_ref(salt, index, land as u32),
                    edge: 0,
                    side: LINK_SIDE_INTERNAL,
                    ..Link::default()
                },
            );
            // Ground to connection start
            push_link(
                tile,
                land,
                Link {
                    reference: encode_poly_ref(salt, index, con_poly as u32),
                    edge: 0xff,
                    side: LINK_SIDE_INTERNAL,
                    ..Link::default()
                },
            );
        }
    }

    /// Anchors the end points of `target_idx`'s off-mesh connections that land
    /// in tile `tile_idx`.
    ///
    /// `side` is the direction from `tile_idx` towards `target_idx`, or `None`
    /// for connections ending inside their own cell.
    pub(crate) fn connect_ext_off_mesh_links(&mut self, tile_idx: usize, target_idx: usize, side: Option<u8>) {
        let opposite = side.map_or(LINK_SIDE_INTERNAL, opposite_tile_side);

        let anchors: Vec<(usize, usize, [f32; 3], bool)> = {
            let tile = self.tile_at_index(tile_idx);
            let target = self.tile_at_index(target_idx);
            if !tile.is_in_use() || !target.is_in_use() {
                return;
            }
            let climb = target.walkable_climb();
            target
                .off_mesh_cons
                .iter()
                .filter(|con| con.side == opposite)
                // Connections whose start could not be anchored stay unlinked
                .filter(|con| target.polys[con.poly as usize].first_link != NULL_LINK)
                .filter_map(|con| {
                    let end = con.end();
                    let half_extents = [con.rad, climb, con.rad];
                    let (land, nearest) = find_nearest_poly_in_tile(tile, &end, &half_extents)?;
                    if dist_sqr_2d(&nearest, &end) > con.rad * con.rad {
                        log::trace!("off-mesh connection {} end is off the mesh", con.user_id);
                        return None;
                    }
                    let bidir = (con.flags & OFFMESH_CON_BIDIR) != 0;
                    Some((con.poly as usize, land, nearest, bidir))
                })
                .collect()
        };

        let (tile_salt, tile_index) = {
            let tile = self.tile_at_index(tile_idx);
            (tile.salt, tile.index as u32)
        };
        let (target_salt, target_index) = {
            let target = self.tile_at_index(target_idx);
            (target.salt, target.index as u32)
        };

        for (con_poly, land, nearest, bidir) in anchors {
            let target = self.tile_at_index_mut(target_idx);
            let v = target.polys[con_poly].verts[1] as usize;
            target.verts[v * 3..v * 3 + 3].copy_from_slice(&nearest);

            // Connection end to ground
            push_link(
                target,
                con_poly,
                Link {
                    reference: encode_poly_ref(tile_salt, tile_index, land as u32),
                    edge: 1,
                    side: opposite,
                    ..Link::default()
                },
            );

            if bidir {
                let tile = self.tile_at_index_mut(tile_idx);
                push_link(
                    tile,
                    land,
                    Link {
                        reference: encode_poly_ref(target_salt, target_index, con_poly as u32),
                        edge: 0xff,
                        side: side.unwrap_or(LINK_SIDE_INTERNAL),
                        ..Link::default()
                    },
                );
            }
        }
    }

    /// Drops every link of tile `tile_idx` that points into tile `target_idx`
    pub(crate) fn unconnect_links(&mut self, tile_idx: usize, target_idx: usize) {
        let target_num = self.tile_at_index(target_idx).index as u32;
        let tile = self.tile_at_index_mut(tile_idx);

        for i in 0..tile.polys.len() {
            let mut prev = NULL_LINK;
            let mut j = tile.polys[i].first_link;
            while j != NULL_LINK {
                let next = tile.links[j as usize].next;
                if decode_tile(tile.links[j as usize].reference) == target_num {
                    if prev == NULL_LINK {
                        tile.polys[i].first_link = next;
                    } else {
                        tile.links[prev as usize].next = next;
                    }
                    NavMesh::free_link(tile, j);
                } else {
                    prev = j;
                }
                j = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slab_end_points_sorted() {
        let (a, b) = slab_end_points(&[0.0, 1.0, 5.0], &[0.0, 2.0, 3.0], 0);
        assert_eq!(a, [3.0, 2.0]);
        assert_eq!(b, [5.0, 1.0]);

        let (a, b) = slab_end_points(&[1.0, 0.0, 0.0], &[4.0, 0.5, 0.0], 6);
        assert_eq!(a, [1.0, 0.0]);
        assert_eq!(b, [4.0, 0.5]);
    }

    #[test]
    fn test_overlap_slabs() {
        // Same height, overlapping range
        assert!(overlap_slabs(&[0.0, 0.0], &[2.0, 0.0], &[1.0, 0.0], &[3.0, 0.0], 0.01, 0.5));
        // Disjoint range
        assert!(!overlap_slabs(&[0.0, 0.0], &[1.0, 0.0], &[2.0, 0.0], &[3.0, 0.0], 0.01, 0.5));
        // Too far apart vertically
        assert!(!overlap_slabs(&[0.0, 0.0], &[2.0, 0.0], &[0.0, 5.0], &[2.0, 5.0], 0.01, 0.5));
        // Crossing
        assert!(overlap_slabs(&[0.0, 0.0], &[2.0, 4.0], &[0.0, 4.0], &[2.0, 0.0], 0.01, 0.1));
    }

    #[test]
    fn test_quantize_edge_span() {
        let va = [10.0, 0.0, 0.0];
        let vb = [10.0, 0.0, 10.0];
        assert_eq!(quantize_edge_span(&va, &vb, 0, 0.0, 10.0), (0, 255));
        assert_eq!(quantize_edge_span(&va, &vb, 0, 5.0, 10.0), (128, 255));
        // Reversed edge direction still yields an ordered span
        assert_eq!(quantize_edge_span(&vb, &va, 4, 0.0, 5.0), (128, 255));
    }
}
