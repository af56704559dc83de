//! Coverage Iteration
//!
//! Walks the tiles that draw a rect of the layer at some coverage scale,
//! preferring ready tiles from the tiling closest to the ideal scale and
//! falling back to other scales, then to checkerboard.

use super::tile::Tile;
use super::tiling::Tiling;
use super::tiling_data::TileIndex;
use crate::geometry::{Rect, RectF, saturate_i32, scale_to_enclosing_rect};
use crate::region::Region;

/// One piece of the covered rect
#[derive(Debug, Clone, Copy)]
pub struct CoverageItem<'a> {
    /// Covered part, in coverage space
    pub geometry_rect: Rect,
    /// The same part in the tiling's content space
    pub texture_rect: RectF,
    /// Ready tile to draw, or `None` to checkerboard
    pub tile: Option<&'a Tile>,
    pub tiling: Option<&'a Tiling>,
}

/// Single-pass iterator over the pieces of a coverage rect. Pieces are
/// disjoint and their union is exactly the rect.
///
/// Tilings are walked lazily: a tiling is only visited once the previous
/// ones have been consumed, and only over the part they left uncovered.
#[derive(Debug)]
pub struct CoverageIterator<'a> {
    tilings: Vec<&'a Tiling>,
    coverage_scale: f32,
    order: std::vec::IntoIter<usize>,
    tiling: Option<&'a Tiling>,
    /// Uncovered rects left to walk with `tiling`
    pending: std::vec::IntoIter<Rect>,
    /// Pieces of the rect being walked
    pieces: std::vec::IntoIter<CoverageItem<'a>>,
    /// Uncovered by the current pass so far
    missing: Region,
    checkerboard: Option<std::vec::IntoIter<Rect>>,
}

impl<'a> CoverageIterator<'a> {
    /// `tilings` must be in descending scale order.
    pub(crate) fn new(tilings: &[&'a Tiling], coverage_scale: f32, coverage_rect: &Rect, ideal_contents_scale: f32) -> Self {
        Self {
            tilings: tilings.to_vec(),
            coverage_scale,
            order: visit_order(tilings, ideal_contents_scale).into_iter(),
            tiling: None,
            pending: Vec::new().into_iter(),
            pieces: Vec::new().into_iter(),
            missing: Region::from(*coverage_rect),
            checkerboard: None,
        }
    }

    /// Move the uncovered region on to the next tiling, or to checkerboard
    /// once every tiling has been tried.
    fn start_next_pass(&mut self) {
        let missing = std::mem::take(&mut self.missing);
        let rects = missing.rects().to_vec().into_iter();
        if missing.is_empty() {
            self.checkerboard = Some(rects);
            return;
        }
        match self.order.next() {
            Some(position) => {
                self.tiling = Some(self.tilings[position]);
                self.pending = rects;
            }
            None => {
                self.tiling = None;
                self.checkerboard = Some(rects);
            }
        }
    }
}

impl<'a> Iterator for CoverageIterator<'a> {
    type Item = CoverageItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(checkerboard) = self.checkerboard.as_mut() {
                return checkerboard.next().map(|rect| CoverageItem {
                    geometry_rect: rect,
                    texture_rect: RectF::from(rect),
                    tile: None,
                    tiling: None,
                });
            }
            for item in self.pieces.by_ref() {
                if item.tile.map(Tile::is_ready_to_draw).unwrap_or(false) {
                    return Some(item);
                }
                self.missing.union_rect(&item.geometry_rect);
            }
            match (self.tiling, self.pending.next()) {
                (Some(tiling), Some(rect)) => {
                    self.pieces = tiling_coverage(tiling, self.coverage_scale, &rect).into_iter();
                }
                _ => self.start_next_pass(),
            }
        }
    }
}

/// Ideal tiling (smallest scale not below the ideal) first, then the
/// higher-res ones nearest first, then the lower-res ones nearest first.
fn visit_order(tilings: &[&Tiling], ideal_contents_scale: f32) -> Vec<usize> {
    if tilings.is_empty() {
        return Vec::new();
    }
    let ideal = match tilings.iter().position(|tiling| tiling.contents_scale() < ideal_contents_scale) {
        Some(position) => position.saturating_sub(1),
        None => tilings.len() - 1,
    };
    std::iter::once(ideal)
        .chain((0..ideal).rev())
        .chain(ideal + 1..tilings.len())
        .collect()
}

/// Partition `rect` (coverage space) by the tiles of `tiling`. Tile edges
/// map to coverage space by rounding, shared between neighbours, and the
/// outermost tiles stretch to the rect's edges.
pub(crate) fn tiling_coverage<'a>(tiling: &'a Tiling, coverage_scale: f32, rect: &Rect) -> Vec<CoverageItem<'a>> {
    if rect.is_empty() {
        return Vec::new();
    }
    let coverage_to_content = tiling.contents_scale() / coverage_scale;
    let data = tiling.tiling_data();
    let content_rect = scale_to_enclosing_rect(rect, coverage_to_content);
    let Some(range) = data.tile_range(&content_rect) else {
        return vec![CoverageItem { geometry_rect: *rect, texture_rect: RectF::from(*rect), tile: None, tiling: Some(tiling) }];
    };

    let to_coverage = |content: i32| saturate_i32((content as f64 / coverage_to_content as f64).round());
    let mut items = Vec::new();
    for index in range.iter() {
        let bounds = data.tile_bounds(index);
        let left = if index.i == range.left { rect.x } else { to_coverage(bounds.x) };
        let top = if index.j == range.top { rect.y } else { to_coverage(bounds.y) };
        let right = if index.i == range.right { rect.right() } else { to_coverage(bounds.right()) };
        let bottom = if index.j == range.bottom { rect.bottom() } else { to_coverage(bounds.bottom()) };

        let geometry_rect = Rect::from_ltrb(left, top, right, bottom).intersect(rect);
        if geometry_rect.is_empty() {
            continue;
        }
        let TileIndex { i, j } = index;
        items.push(CoverageItem {
            geometry_rect,
            texture_rect: RectF::from(geometry_rect).scale(coverage_to_content, coverage_to_content),
            tile: tiling.tile_at(i, j),
            tiling: Some(tiling),
        });
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use crate::config::TilingSettings;
    use crate::geometry::Size;
    use crate::raster_source::tests::{TestPainter, record};
    use crate::tiles::{Occlusion, TileDrawInfo, TileResolution, TilingSet, WhichTree};

    fn layered_set(layer: Size, tilings: &[(f32, TileResolution)]) -> TilingSet {
        let painter = TestPainter { rects: vec![(Rect::from_size(layer), Color::RED)], images: vec![] };
        let source = record(&painter, layer, false);
        let settings = TilingSettings { default_tile_size: Size::new(100, 100), ..TilingSettings::default() };
        let mut set = TilingSet::new(WhichTree::Active, settings);
        for &(scale, resolution) in tilings {
            set.add_tiling(scale, std::sync::Arc::clone(&source)).unwrap();
            set.find_tiling_with_scale_mut(scale).unwrap().set_resolution(resolution);
        }
        set.update_tile_priorities(&Rect::from_size(layer), 1.0, 1.0, &Occlusion::default(), false, None);
        set
    }

    fn mark_ready(set: &mut TilingSet, scale: f32) {
        for tile in set.find_tiling_with_scale_mut(scale).unwrap().tiles_mut() {
            tile.set_draw_info(TileDrawInfo::SolidColor(Color::RED));
        }
    }

    fn assert_partition(items: &[CoverageItem<'_>], rect: &Rect) {
        let area: u64 = items.iter().map(|item| item.geometry_rect.area()).sum();
        assert_eq!(area, rect.area());
        for (n, item) in items.iter().enumerate() {
            assert!(rect.contains(&item.geometry_rect), "{:?} escapes {:?}", item.geometry_rect, rect);
            for other in &items[n + 1..] {
                assert!(!item.geometry_rect.intersects(&other.geometry_rect));
            }
        }
    }

    #[test]
    fn test_ready_tiling_covers_rect_exactly() {
        let mut set = layered_set(Size::new(250, 250), &[(1.0, TileResolution::High)]);
        mark_ready(&mut set, 1.0);

        let rect = Rect::new(0, 0, 250, 250);
        let items: Vec<_> = set.coverage(1.0, &rect, 1.0).collect();
        assert_eq!(items.len(), 9);
        assert_partition(&items, &rect);
        assert!(items.iter().all(|item| item.tile.is_some()));
    }

    #[test]
    fn test_fractional_coverage_scale_has_no_gaps() {
        let mut set = layered_set(Size::new(250, 250), &[(1.0, TileResolution::High)]);
        mark_ready(&mut set, 1.0);

        let rect = Rect::new(0, 0, 150, 150);
        let items: Vec<_> = set.coverage(0.6, &rect, 0.6).collect();
        assert_partition(&items, &rect);
        assert!(items.iter().all(|item| item.tile.is_some()));
        let first = items.iter().find(|item| item.geometry_rect.x == 0 && item.geometry_rect.y == 0).unwrap();
        assert_eq!(first.geometry_rect, Rect::new(0, 0, 60, 60));
        assert!((first.texture_rect.width - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_falls_back_to_lower_resolution() {
        let mut set = layered_set(Size::new(200, 200), &[(1.0, TileResolution::High), (0.5, TileResolution::Low)]);
        mark_ready(&mut set, 0.5);
        set.find_tiling_with_scale_mut(1.0)
            .unwrap()
            .tile_at_mut(0, 0)
            .unwrap()
            .set_draw_info(TileDrawInfo::SolidColor(Color::RED));

        let rect = Rect::new(0, 0, 200, 200);
        let items: Vec<_> = set.coverage(1.0, &rect, 1.0).collect();
        assert_partition(&items, &rect);
        for item in &items {
            let scale = item.tiling.map(Tiling::contents_scale).unwrap();
            if item.geometry_rect == Rect::new(0, 0, 100, 100) {
                assert_eq!(scale, 1.0);
            } else {
                assert_eq!(scale, 0.5);
            }
        }
    }

    #[test]
    fn test_unready_tiles_checkerboard() {
        let set = layered_set(Size::new(200, 200), &[(1.0, TileResolution::High)]);
        let rect = Rect::new(20, 20, 150, 150);
        let items: Vec<_> = set.coverage(1.0, &rect, 1.0).collect();
        assert_partition(&items, &rect);
        assert!(items.iter().all(|item| item.tile.is_none() && item.tiling.is_none()));
    }

    #[test]
    fn test_lower_tilings_visited_only_when_consumed() {
        let mut set = layered_set(Size::new(200, 200), &[(1.0, TileResolution::High), (0.5, TileResolution::Low)]);
        mark_ready(&mut set, 0.5);
        set.find_tiling_with_scale_mut(1.0)
            .unwrap()
            .tile_at_mut(0, 0)
            .unwrap()
            .set_draw_info(TileDrawInfo::SolidColor(Color::RED));

        let rect = Rect::new(0, 0, 200, 200);
        let mut coverage = set.coverage(1.0, &rect, 1.0);
        let first = coverage.next().unwrap();
        assert_eq!(first.geometry_rect, Rect::new(0, 0, 100, 100));
        // The fallback tiling has not been walked yet.
        assert!(coverage.checkerboard.is_none());
        assert_eq!(coverage.tiling.map(Tiling::contents_scale), Some(1.0));

        let rest: Vec<_> = coverage.collect();
        let mut items = vec![first];
        items.extend(rest);
        assert_partition(&items, &rect);
    }

    #[test]
    fn test_empty_rect_yields_nothing() {
        let set = layered_set(Size::new(100, 100), &[(1.0, TileResolution::High)]);
        assert_eq!(set.coverage(1.0, &Rect::default(), 1.0).count(), 0);
    }

    #[test]
    fn test_visit_order_starts_at_ideal() {
        let set = layered_set(
            Size::new(100, 100),
            &[(2.0, TileResolution::NonIdeal), (1.0, TileResolution::High), (0.5, TileResolution::Low)],
        );
        let tilings: Vec<&Tiling> = set.tilings().collect();
        assert_eq!(visit_order(&tilings, 1.0), vec![1, 0, 2]);
        assert_eq!(visit_order(&tilings, 0.1), vec![2, 1, 0]);
        assert_eq!(visit_order(&tilings, 4.0), vec![0, 1, 2]);
    }
}
