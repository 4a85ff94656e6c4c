//! Polygon reference encoding
//!
//! A [`PolyRef`] packs `salt(16) | tile index(28) | poly index(20)` into 64 bits.
//! A tile reference uses the same layout with a poly index of zero. The value
//! zero is reserved as the null reference; live tiles never carry a zero salt,
//! so no valid reference encodes to zero.

use std::fmt;

/// Number of bits for the salt (generation counter)
pub const SALT_BITS: u32 = 16;
/// Number of bits for the tile index
pub const TILE_BITS: u32 = 28;
/// Number of bits for the polygon index
pub const POLY_BITS: u32 = 20;

const SALT_MASK: u64 = (1 << SALT_BITS) - 1;
const TILE_MASK: u64 = (1 << TILE_BITS) - 1;
const POLY_MASK: u64 = (1 << POLY_BITS) - 1;

/// Opaque reference to a polygon (or tile) in a navigation mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PolyRef(u64);

impl PolyRef {
    /// The null reference
    pub const NULL: PolyRef = PolyRef(0);

    /// Wraps a raw 64-bit reference
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw 64-bit value
    #[inline]
    pub const fn id(&self) -> u64 {
        self.0
    }

    /// Returns true for the null reference
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true for any non-null reference (validity against a mesh is
    /// checked with [`crate::NavMesh::is_valid_poly_ref`])
    #[inline]
    pub const fn is_some(&self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for PolyRef {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<PolyRef> for u64 {
    fn from(r: PolyRef) -> Self {
        r.0
    }
}

impl fmt::Display for PolyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (salt, tile, poly) = decode_poly_ref(*self);
        write!(f, "{salt}:{tile}:{poly}")
    }
}

/// Packs salt, tile index and polygon index into a reference.
///
/// Out-of-range inputs are masked to their field width.
#[inline]
pub const fn encode_poly_ref(salt: u32, tile: u32, poly: u32) -> PolyRef {
    PolyRef(
        ((salt as u64 & SALT_MASK) << (POLY_BITS + TILE_BITS))
            | ((tile as u64 & TILE_MASK) << POLY_BITS)
            | (poly as u64 & POLY_MASK),
    )
}

/// Splits a reference into `(salt, tile index, poly index)`
#[inline]
pub const fn decode_poly_ref(r: PolyRef) -> (u32, u32, u32) {
    (decode_salt(r), decode_tile(r), decode_poly(r))
}

/// Extracts the salt
#[inline]
pub const fn decode_salt(r: PolyRef) -> u32 {
    ((r.0 >> (POLY_BITS + TILE_BITS)) & SALT_MASK) as u32
}

/// Extracts the tile index
#[inline]
pub const fn decode_tile(r: PolyRef) -> u32 {
    ((r.0 >> POLY_BITS) & TILE_MASK) as u32
}

/// Extracts the polygon index
#[inline]
pub const fn decode_poly(r: PolyRef) -> u32 {
    (r.0 & POLY_MASK) as u32
}

/// Largest tile count addressable by a reference
pub const MAX_TILES: usize = 1 << TILE_BITS;
/// Largest polygon count per tile addressable by a reference
pub const MAX_POLYS_PER_TILE: usize = 1 << POLY_BITS;
