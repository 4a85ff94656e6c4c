//! Common utilities and data structures shared by the navtile crates
//!
//! Everything here works on the XZ plane of a Y-up coordinate system unless a
//! function name says otherwise. Vertex positions are passed as `&[f32]` slices
//! holding at least three components so that callers can hand in either
//! `[f32; 3]` values or windows into flat vertex buffers.

mod geometry;
mod vector;

pub use geometry::*;
pub use vector::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for configuration and tile assembly
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid navigation mesh parameters: {0}")]
    InvalidParams(String),

    #[error("invalid input mesh: {0}")]
    InvalidMesh(String),

    #[error("too many vertices in tile: {count} (limit {limit})")]
    TooManyVertices { count: usize, limit: usize },

    #[error("too many polygons in tile: {count} (limit {limit})")]
    TooManyPolygons { count: usize, limit: usize },

    #[error("polygon {poly} references vertex {vert} out of range")]
    VertexOutOfRange { poly: usize, vert: usize },

    #[error("detail mesh for polygon {0} is malformed")]
    InvalidDetailMesh(usize),

    #[error("off-mesh connection data is malformed: {0}")]
    InvalidOffMeshConnection(String),
}

/// Result type for configuration and tile assembly
pub type Result<T> = std::result::Result<T, Error>;
