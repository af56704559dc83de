//! Tiles
//!
//! Multi-scale tilings of a layer on the pending and active trees.
//!
//! A [`TilingSet`] owns its [`Tiling`]s in a generational arena; tiles refer
//! back to their tiling through a [`TilingHandle`], which stops resolving as
//! soon as the tiling is removed.

mod arena;
mod coverage;
mod tile;
mod tiling;
mod tiling_data;
mod tiling_set;

pub use arena::{GenArena, GenIndex};
pub use coverage::{CoverageItem, CoverageIterator};
pub use tile::{Occlusion, PriorityBin, Tile, TileDrawInfo, TileId, TilePriority, TileResolution};
pub use tiling::{PriorityRects, Tiling, TwinContext, WhichTree};
pub use tiling_data::{TileIndex, TileIndexRange, TilingData};
pub use tiling_set::TilingSet;

/// Back-reference from a tile to its tiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilingHandle {
    set_id: u64,
    index: GenIndex,
}

impl TilingHandle {
    pub(crate) fn new(set_id: u64, index: GenIndex) -> Self {
        Self { set_id, index }
    }

    /// Id of the owning [`TilingSet`]
    pub fn set_id(&self) -> u64 {
        self.set_id
    }

    pub fn index(&self) -> GenIndex {
        self.index
    }
}
