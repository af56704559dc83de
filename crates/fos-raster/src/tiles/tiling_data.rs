//! Tiling Grid
//!
//! Pure grid math for a tiling: how a content rect of `tiling_size` splits
//! into `tile_size` tiles, and which tiles a rect touches.

use crate::geometry::{Rect, Size};

/// Grid coordinates of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileIndex {
    pub i: i32,
    pub j: i32,
}

impl TileIndex {
    pub fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }
}

/// Inclusive range of tile indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileIndexRange {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl TileIndexRange {
    pub fn contains(&self, index: TileIndex) -> bool {
        index.i >= self.left && index.i <= self.right && index.j >= self.top && index.j <= self.bottom
    }

    /// Indices in row-major order
    pub fn iter(self) -> impl Iterator<Item = TileIndex> {
        (self.top..=self.bottom).flat_map(move |j| (self.left..=self.right).map(move |i| TileIndex::new(i, j)))
    }
}

fn num_tiles(tile_length: i32, total_length: i32) -> i32 {
    if total_length <= 0 || tile_length <= 0 {
        return 0;
    }
    let count = (total_length as i64 + tile_length as i64 - 1) / tile_length as i64;
    count as i32
}

/// Grid of one tiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilingData {
    tile_size: Size,
    tiling_size: Size,
    num_tiles_x: i32,
    num_tiles_y: i32,
}

impl TilingData {
    pub fn new(tile_size: Size, tiling_size: Size) -> Self {
        let tile_size = Size::new(tile_size.width.max(1), tile_size.height.max(1));
        Self {
            tile_size,
            tiling_size,
            num_tiles_x: num_tiles(tile_size.width, tiling_size.width),
            num_tiles_y: num_tiles(tile_size.height, tiling_size.height),
        }
    }

    pub fn set_tiling_size(&mut self, tiling_size: Size) {
        *self = Self::new(self.tile_size, tiling_size);
    }

    pub fn tile_size(&self) -> Size {
        self.tile_size
    }

    pub fn tiling_size(&self) -> Size {
        self.tiling_size
    }

    pub fn tiling_rect(&self) -> Rect {
        Rect::from_size(self.tiling_size)
    }

    pub fn num_tiles_x(&self) -> i32 {
        self.num_tiles_x
    }

    pub fn num_tiles_y(&self) -> i32 {
        self.num_tiles_y
    }

    pub fn has_tiles(&self) -> bool {
        self.num_tiles_x > 0 && self.num_tiles_y > 0
    }

    pub fn is_valid_index(&self, index: TileIndex) -> bool {
        index.i >= 0 && index.j >= 0 && index.i < self.num_tiles_x && index.j < self.num_tiles_y
    }

    /// Column containing content x, clamped to the grid.
    pub fn tile_x_index_from_src_coord(&self, x: i32) -> i32 {
        (x.max(0) / self.tile_size.width).clamp(0, (self.num_tiles_x - 1).max(0))
    }

    /// Row containing content y, clamped to the grid.
    pub fn tile_y_index_from_src_coord(&self, y: i32) -> i32 {
        (y.max(0) / self.tile_size.height).clamp(0, (self.num_tiles_y - 1).max(0))
    }

    /// Content rect of a tile, clipped to the tiling.
    pub fn tile_bounds(&self, index: TileIndex) -> Rect {
        let x = index.i.saturating_mul(self.tile_size.width);
        let y = index.j.saturating_mul(self.tile_size.height);
        Rect::new(x, y, self.tile_size.width, self.tile_size.height).intersect(&self.tiling_rect())
    }

    /// Tiles touched by `rect`, or `None` when it misses the tiling.
    pub fn tile_range(&self, rect: &Rect) -> Option<TileIndexRange> {
        if !self.has_tiles() {
            return None;
        }
        let rect = rect.intersect(&self.tiling_rect());
        if rect.is_empty() {
            return None;
        }
        Some(TileIndexRange {
            left: self.tile_x_index_from_src_coord(rect.x),
            top: self.tile_y_index_from_src_coord(rect.y),
            right: self.tile_x_index_from_src_coord(rect.right() - 1),
            bottom: self.tile_y_index_from_src_coord(rect.bottom() - 1),
        })
    }

    pub fn tiles_in_rect(&self, rect: &Rect) -> impl Iterator<Item = TileIndex> + use<> {
        self.tile_range(rect).into_iter().flat_map(TileIndexRange::iter)
    }

    /// Tiles touched by `consider` but not by `ignore`.
    pub fn difference(&self, consider: &Rect, ignore: &Rect) -> impl Iterator<Item = TileIndex> + use<> {
        let ignore = self.tile_range(ignore);
        self.tiles_in_rect(consider)
            .filter(move |index| !ignore.map(|range| range.contains(*index)).unwrap_or(false))
    }

    /// Smallest union of whole tiles containing `rect`.
    pub fn expand_rect_to_tile_bounds(&self, rect: &Rect) -> Rect {
        match self.tile_range(rect) {
            Some(range) => self
                .tile_bounds(TileIndex::new(range.left, range.top))
                .union(&self.tile_bounds(TileIndex::new(range.right, range.bottom))),
            None => Rect::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> TilingData {
        TilingData::new(Size::new(100, 100), Size::new(250, 120))
    }

    #[test]
    fn test_tile_counts_and_bounds() {
        let data = grid();
        assert_eq!(data.num_tiles_x(), 3);
        assert_eq!(data.num_tiles_y(), 2);
        assert_eq!(data.tile_bounds(TileIndex::new(2, 1)), Rect::new(200, 100, 50, 20));
        assert!(!TilingData::new(Size::new(100, 100), Size::new(0, 50)).has_tiles());
    }

    #[test]
    fn test_index_from_coord_clamps() {
        let data = grid();
        assert_eq!(data.tile_x_index_from_src_coord(-5), 0);
        assert_eq!(data.tile_x_index_from_src_coord(199), 1);
        assert_eq!(data.tile_x_index_from_src_coord(10_000), 2);
    }

    #[test]
    fn test_tiles_in_rect_row_major() {
        let data = grid();
        let tiles: Vec<_> = data.tiles_in_rect(&Rect::new(50, 50, 100, 60)).collect();
        assert_eq!(
            tiles,
            vec![TileIndex::new(0, 0), TileIndex::new(1, 0), TileIndex::new(0, 1), TileIndex::new(1, 1)]
        );
        assert_eq!(data.tiles_in_rect(&Rect::new(300, 0, 10, 10)).count(), 0);
    }

    #[test]
    fn test_difference() {
        let data = grid();
        let tiles: Vec<_> = data.difference(&Rect::new(0, 0, 250, 120), &Rect::new(0, 0, 150, 50)).collect();
        assert_eq!(
            tiles,
            vec![TileIndex::new(2, 0), TileIndex::new(0, 1), TileIndex::new(1, 1), TileIndex::new(2, 1)]
        );
    }

    #[test]
    fn test_expand_to_tile_bounds() {
        let data = grid();
        assert_eq!(data.expand_rect_to_tile_bounds(&Rect::new(120, 10, 10, 10)), Rect::new(100, 0, 100, 100));
        assert_eq!(data.expand_rect_to_tile_bounds(&Rect::new(-50, -50, 1000, 1000)), Rect::new(0, 0, 250, 120));
    }
}
