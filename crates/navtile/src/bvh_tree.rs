//! Bounding volume tree over the polygons of a tile
//!
//! The tree is stored flattened in depth-first order. Leaves carry the polygon
//! index; a branch stores the negated number of nodes in its subtree, which is
//! the offset to skip when the query box misses it. Bounds are quantized to
//! `u16` in tile-local space.

use navtile_common::{overlap_bounds, overlap_quant_bounds};

use super::nav_mesh::MeshTile;
use super::BVNode;

/// Build input: quantized bounds of one polygon
#[derive(Debug, Clone, Copy, Default)]
pub struct BVItem {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    pub i: i32,
}

fn calc_extends(items: &[BVItem]) -> ([u16; 3], [u16; 3]) {
    let mut bmin = items[0].bmin;
    let mut bmax = items[0].bmax;
    for it in &items[1..] {
        for k in 0..3 {
            bmin[k] = bmin[k].min(it.bmin[k]);
            bmax[k] = bmax[k].max(it.bmax[k]);
        }
    }
    (bmin, bmax)
}

fn longest_axis(x: u16, y: u16, z: u16) -> usize {
    let mut axis = 0;
    let mut max_val = x;
    if y > max_val {
        axis = 1;
        max_val = y;
    }
    if z > max_val {
        axis = 2;
    }
    axis
}

fn subdivide(items: &mut [BVItem], nodes: &mut Vec<BVNode>) {
    let icur = nodes.len();
    nodes.push(BVNode::default());

    if items.len() == 1 {
        nodes[icur] = BVNode {
            bmin: items[0].bmin,
            bmax: items[0].bmax,
            i: items[0].i,
        };
        return;
    }

    let (bmin, bmax) = calc_extends(items);
    let axis = longest_axis(bmax[0] - bmin[0], bmax[1] - bmin[1], bmax[2] - bmin[2]);
    items.sort_by_key(|it| it.bmin[axis]);

    let split = items.len() / 2;
    let (left, right) = items.split_at_mut(split);
    subdivide(left, nodes);
    subdivide(right, nodes);

    let escape = (nodes.len() - icur) as i32;
    nodes[icur] = BVNode {
        bmin,
        bmax,
        i: -escape,
    };
}

/// Builds a flattened tree over `items`; the slice is reordered
pub fn build_bv_tree(items: &mut [BVItem]) -> Vec<BVNode> {
    let mut nodes = Vec::with_capacity(items.len() * 2);
    if !items.is_empty() {
        subdivide(items, &mut nodes);
    }
    nodes
}

/// Indices of the polygons of `tile` whose bounds overlap the query box.
///
/// Uses the tile's tree when present. Without a tree every ground polygon is
/// tested against its vertex bounds; off-mesh connections are skipped.
pub fn query_polygons_in_tile(tile: &MeshTile, qmin: &[f32; 3], qmax: &[f32; 3]) -> Vec<usize> {
    let Some(header) = tile.header.as_ref() else {
        return Vec::new();
    };
    let mut result = Vec::new();

    if !tile.bv_tree.is_empty() {
        let tbmin = header.bmin;
        let tbmax = header.bmax;
        let qfac = header.bv_quant_factor;

        let mut bmin = [0u16; 3];
        let mut bmax = [0u16; 3];
        for k in 0..3 {
            let minv = qmin[k].clamp(tbmin[k], tbmax[k]) - tbmin[k];
            let maxv = qmax[k].clamp(tbmin[k], tbmax[k]) - tbmin[k];
            bmin[k] = ((qfac * minv) as u16) & 0xfffe;
            bmax[k] = ((qfac * maxv + 1.0) as u16) | 1;
        }

        let end = tile.bv_tree.len();
        let mut node = 0;
        while node < end {
            let n = &tile.bv_tree[node];
            let overlap = overlap_quant_bounds(&bmin, &bmax, &n.bmin, &n.bmax);
            let is_leaf = n.i >= 0;

            if is_leaf && overlap {
                result.push(n.i as usize);
            }

            if overlap || is_leaf {
                node += 1;
            } else {
                node += (-n.i) as usize;
            }
        }
        return result;
    }

    for (i, poly) in tile.polys.iter().enumerate() {
        if poly.is_off_mesh_connection() {
            continue;
        }
        let mut bmin = tile.poly_vertex(poly, 0);
        let mut bmax = bmin;
        for k in 1..poly.vert_count as usize {
            let v = tile.poly_vertex(poly, k);
            for a in 0..3 {
                bmin[a] = bmin[a].min(v[a]);
                bmax[a] = bmax[a].max(v[a]);
            }
        }
        if overlap_bounds(qmin, qmax, &bmin, &bmax) {
            result.push(i);
        }
    }
    result
}
