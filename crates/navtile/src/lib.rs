//! Tiled navigation mesh runtime
//!
//! A navigation mesh describes walkable surfaces as convex polygons. This crate
//! stores such a mesh split into rectangular tiles that can be added and
//! removed at runtime, wires the polygons into a link graph, and answers
//! spatial queries against it.
//!
//! # Features
//!
//! - **Tile store**: fixed-capacity tile pool with generation-checked
//!   [`PolyRef`] handles; removing a tile invalidates every reference into it
//! - **Link graph**: internal links, partial-edge links across tile borders and
//!   off-mesh connections anchored to the nearest polygon
//! - **Spatial index**: quantized bounding-volume tree per tile
//! - **Path search**: A* with pluggable heuristic, optional any-angle
//!   shortcutting, and a resumable sliced variant
//! - **Raycast and string pulling**: line-of-sight walks across portals and
//!   funnel-based straight path extraction
//! - **Area queries**: circle/shape expansion, local neighbourhood, wall
//!   distance, random point sampling
//!
//! # Example
//!
//! ```rust,ignore
//! use navtile::{DefaultQueryFilter, FindPathOptions, NavMesh, NavMeshQuery, PolyRef, TileFlags};
//!
//! let mut nav_mesh = NavMesh::new(params)?;
//! nav_mesh.add_tile(tile_data, TileFlags::empty(), PolyRef::NULL)?;
//!
//! let mut query = NavMeshQuery::new(&nav_mesh, 2048)?;
//! let filter = DefaultQueryFilter::default();
//! let (start, _) = query.find_nearest_poly(&start_pos, &[2.0, 4.0, 2.0], &filter)?;
//! let (end, _) = query.find_nearest_poly(&end_pos, &[2.0, 4.0, 2.0], &filter)?;
//! let (corridor, status) = query.find_path(
//!     start, end, &start_pos, &end_pos, &filter, &FindPathOptions::default(), 256,
//! )?;
//! let straight = query.find_straight_path(&start_pos, &end_pos, &corridor, 32, StraightPathOptions::empty())?;
//! ```
//!
//! # Architecture
//!
//! [`NavMesh`] owns the tiles and the link graph. [`NavMeshQuery`] borrows a
//! mesh immutably and owns the search scratch (node pools and open list), so
//! each thread or agent group that searches concurrently needs its own query
//! object. Tile mutation requires exclusive access to the mesh, which the
//! borrow checker enforces for synchronous queries; sliced searches store only
//! references and re-validate them on every update.

pub mod area_queries;
pub mod bvh_tree;
pub mod nav_mesh;
pub mod nav_mesh_builder;
pub mod nav_mesh_links;
pub mod nav_mesh_query;
pub mod node_pool;
pub mod poly_query;
pub mod poly_ref;
pub mod query_filter;
pub mod random;
pub mod random_queries;
pub mod raycast_hit;
pub mod sliced_pathfinding;
pub mod status;
pub mod straight_path;

pub use area_queries::*;
pub use nav_mesh::*;
pub use nav_mesh_builder::*;
pub use nav_mesh_query::*;
pub use node_pool::*;
pub use poly_query::*;
pub use poly_ref::*;
pub use query_filter::*;
pub use random::*;
pub use random_queries::*;
pub use raycast_hit::*;
pub use sliced_pathfinding::*;
pub use status::*;
pub use straight_path::*;

use bitflags::bitflags;

/// Maximum number of vertices per navigation polygon
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Neighbor code flag marking a polygon edge as a tile-border portal
pub const EXT_LINK: u16 = 0x8000;

/// Sentinel for "no link"
pub const NULL_LINK: u32 = u32::MAX;

/// Null vertex / neighbor index in tile creation data
pub const MESH_NULL_IDX: u16 = 0xffff;

/// Off-mesh connection flag: traversable in both directions
pub const OFFMESH_CON_BIDIR: u8 = 1;

/// Number of distinct area ids
pub const MAX_AREAS: usize = 64;

/// Detail triangle edge flag: the edge lies on the polygon boundary
pub const DETAIL_EDGE_BOUNDARY: u8 = 0x01;

/// Any-angle raycast limit as a multiple of the agent radius
pub const RAYCAST_LIMIT_PROPORTIONS: f32 = 50.0;

/// Link side value of links that stay inside a tile
pub const LINK_SIDE_INTERNAL: u8 = 0xff;

bitflags! {
    /// Polygon flags used by query filters
    ///
    /// Only the conventional bits are named; any 16-bit value is accepted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
    pub struct PolyFlags: u16 {
        /// Ground that can be walked on
        const WALK = 0x01;
        /// Water that can be swum through
        const SWIM = 0x02;
        /// Door that can be passed
        const DOOR = 0x04;
        /// Jump
        const JUMP = 0x08;
        /// Disabled polygon
        const DISABLED = 0x10;
        /// All conventional abilities
        const ALL = 0xffff;
    }
}

/// Polygon type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PolyType {
    /// Regular walkable ground polygon
    #[default]
    Ground,
    /// Two-vertex polygon representing an off-mesh connection
    OffMeshConnection,
}

/// Configuration for a tiled navigation mesh
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct NavMeshParams {
    /// World-space origin of the tile grid
    pub origin: [f32; 3],
    /// Tile size along X
    pub tile_width: f32,
    /// Tile size along Z
    pub tile_height: f32,
    /// Number of tile slots
    pub max_tiles: usize,
    /// Maximum number of polygons per tile
    pub max_polys_per_tile: usize,
}

impl Default for NavMeshParams {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            tile_width: 32.0,
            tile_height: 32.0,
            max_tiles: 128,
            max_polys_per_tile: 1024,
        }
    }
}

#[cfg(test)]
mod test_mesh_helpers;

#[cfg(test)]
mod off_mesh_connection_tests;
#[cfg(test)]
mod parameter_validation_tests;
