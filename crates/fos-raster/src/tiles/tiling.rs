//! Tiling
//!
//! All tiles of one layer at one contents scale. Tiles exist only inside the
//! live tiles rect, only where the raster source has a recording, and on the
//! pending tree only where the active twin cannot supply them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::TilingHandle;
use super::tile::{Occlusion, PriorityBin, Tile, TileId, TilePriority, TileResolution};
use super::tiling_data::{TileIndex, TilingData};
use crate::geometry::{Rect, Size, scale_to_ceiled_size, scale_to_enclosing_rect};
use crate::raster_source::RasterSource;
use crate::region::Region;

/// Which of the two layer trees a tiling belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhichTree {
    /// Receives commits from the main thread
    Pending,
    /// Drawn to the screen
    Active,
}

/// What a pending tiling needs from the active tree to decide tile sharing
#[derive(Debug, Clone, Copy, Default)]
pub struct TwinContext<'a> {
    /// Active tiling with the same scale
    pub active_twin: Option<&'a Tiling>,
    /// Layer-space damage committed since the last activation
    pub pending_invalidation: Option<&'a Region>,
}

/// Priority rects in content space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityRects {
    pub visible: Rect,
    pub skewport: Rect,
    pub soon_border: Rect,
    pub eventually: Rect,
}

/// Tiles of a layer at a fixed scale
pub struct Tiling {
    contents_scale: f32,
    handle: TilingHandle,
    tree: WhichTree,
    resolution: TileResolution,
    raster_source: Arc<RasterSource>,
    tiling_data: TilingData,
    tiles: HashMap<TileIndex, Tile>,
    live_tiles_rect: Rect,
    priority_rects: PriorityRects,
    content_to_screen_scale: f32,
    screen_speed: f32,
    can_require_tiles_for_activation: bool,
}

impl Tiling {
    pub(crate) fn new(
        handle: TilingHandle,
        tree: WhichTree,
        contents_scale: f32,
        raster_source: Arc<RasterSource>,
        tile_size: Size,
    ) -> Self {
        let tiling_size = scale_to_ceiled_size(raster_source.size(), contents_scale);
        Self {
            contents_scale,
            handle,
            tree,
            resolution: TileResolution::NonIdeal,
            raster_source,
            tiling_data: TilingData::new(tile_size, tiling_size),
            tiles: HashMap::new(),
            live_tiles_rect: Rect::default(),
            priority_rects: PriorityRects::default(),
            content_to_screen_scale: 1.0,
            screen_speed: 0.0,
            can_require_tiles_for_activation: false,
        }
    }

    pub fn contents_scale(&self) -> f32 {
        self.contents_scale
    }

    pub fn handle(&self) -> TilingHandle {
        self.handle
    }

    pub(crate) fn set_handle(&mut self, handle: TilingHandle) {
        self.handle = handle;
        for tile in self.tiles.values_mut() {
            tile.set_tiling(handle);
        }
    }

    pub fn tree(&self) -> WhichTree {
        self.tree
    }

    pub fn resolution(&self) -> TileResolution {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: TileResolution) {
        self.resolution = resolution;
    }

    pub fn raster_source(&self) -> &Arc<RasterSource> {
        &self.raster_source
    }

    pub fn tiling_data(&self) -> &TilingData {
        &self.tiling_data
    }

    pub fn tiling_size(&self) -> Size {
        self.tiling_data.tiling_size()
    }

    pub fn live_tiles_rect(&self) -> Rect {
        self.live_tiles_rect
    }

    pub fn priority_rects(&self) -> &PriorityRects {
        &self.priority_rects
    }

    pub fn can_require_tiles_for_activation(&self) -> bool {
        self.can_require_tiles_for_activation
    }

    pub fn set_can_require_tiles_for_activation(&mut self, can_require: bool) {
        self.can_require_tiles_for_activation = can_require;
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn tile_at(&self, i: i32, j: i32) -> Option<&Tile> {
        self.tiles.get(&TileIndex::new(i, j))
    }

    pub fn tile_at_mut(&mut self, i: i32, j: i32) -> Option<&mut Tile> {
        self.tiles.get_mut(&TileIndex::new(i, j))
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub(crate) fn tiles_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.values_mut()
    }

    pub fn find_tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.values().find(|tile| tile.id() == id)
    }

    pub fn find_tile_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.tiles.values_mut().find(|tile| tile.id() == id)
    }

    /// Layer rect covering a content rect of this tiling.
    pub fn enclosing_layer_rect_from_content_rect(&self, content_rect: &Rect) -> Rect {
        scale_to_enclosing_rect(content_rect, 1.0 / self.contents_scale)
    }

    /// Content rect of this tiling covering a layer rect.
    pub fn enclosing_content_rect_from_layer_rect(&self, layer_rect: &Rect) -> Rect {
        scale_to_enclosing_rect(layer_rect, self.contents_scale)
    }

    fn should_create_tile_at(&self, index: TileIndex, twin: &TwinContext<'_>) -> bool {
        let layer_rect = self.enclosing_layer_rect_from_content_rect(&self.tiling_data.tile_bounds(index));
        // Without a recording the tile would only ever checkerboard.
        if !self.raster_source.covers_rect(&layer_rect) {
            return false;
        }
        if self.tree == WhichTree::Active {
            return true;
        }

        let Some(active_twin) = twin.active_twin else {
            return true;
        };
        if !active_twin.raster_source.covers_rect(&layer_rect) {
            return true;
        }
        if active_twin.raster_source.size() != self.raster_source.size() {
            return true;
        }
        if twin.pending_invalidation.map(|region| region.intersects(&layer_rect)).unwrap_or(false) {
            return true;
        }
        // The active tree draws this tile until activation replaces it.
        active_twin.tile_at(index.i, index.j).is_none()
    }

    fn create_tile(&mut self, index: TileIndex) -> Option<&mut Tile> {
        if !self.tiling_data.is_valid_index(index) {
            return None;
        }
        let content_rect = self.tiling_data.tile_bounds(index);
        let layer_rect = self.enclosing_layer_rect_from_content_rect(&content_rect);
        let tile = Tile::new(
            self.handle,
            index,
            content_rect,
            layer_rect,
            self.contents_scale,
            self.raster_source.generation(),
        );
        self.tiles.insert(index, tile);
        self.tiles.get_mut(&index)
    }

    /// Switch to a new recording, dropping tiles whose bounds no longer
    /// match the resized grid.
    pub fn set_raster_source_and_resize(&mut self, raster_source: Arc<RasterSource>) {
        let tiling_size = scale_to_ceiled_size(raster_source.size(), self.contents_scale);
        self.raster_source = raster_source;
        if tiling_size == self.tiling_data.tiling_size() {
            return;
        }

        let old_data = self.tiling_data.clone();
        self.tiling_data.set_tiling_size(tiling_size);
        let new_data = &self.tiling_data;
        self.tiles.retain(|index, _| {
            new_data.is_valid_index(*index) && new_data.tile_bounds(*index) == old_data.tile_bounds(*index)
        });
        self.live_tiles_rect = self.live_tiles_rect.intersect(&self.tiling_data.tiling_rect());
        tracing::trace!(
            scale = self.contents_scale,
            width = tiling_size.width,
            height = tiling_size.height,
            "resized tiling"
        );
    }

    /// Replace damaged tiles with fresh ones remembering what they replace.
    pub fn invalidate(&mut self, layer_invalidation: &Region, twin: &TwinContext<'_>) {
        self.remove_tiles_in_region_impl(layer_invalidation, true, twin);
    }

    /// Drop tiles touching `layer_region` without recreating them.
    pub fn remove_tiles_in_region(&mut self, layer_region: &Region) {
        self.remove_tiles_in_region_impl(layer_region, false, &TwinContext::default());
    }

    fn remove_tiles_in_region_impl(&mut self, layer_region: &Region, recreate: bool, twin: &TwinContext<'_>) {
        if self.live_tiles_rect.is_empty() || layer_region.is_empty() {
            return;
        }

        // Partial raster bookkeeping for the tiles to recreate.
        let mut replaced: BTreeMap<TileIndex, Option<(Rect, TileId)>> = BTreeMap::new();
        for layer_rect in layer_region.rects() {
            let content_rect = self
                .enclosing_content_rect_from_layer_rect(layer_rect)
                .intersect(&self.live_tiles_rect);
            if content_rect.is_empty() {
                continue;
            }
            for index in self.tiling_data.tiles_in_rect(&content_rect) {
                let damage = content_rect.intersect(&self.tiling_data.tile_bounds(index));
                if let Some(old) = self.tiles.remove(&index) {
                    let previous = if old.is_ready_to_draw() {
                        Some((damage, old.id()))
                    } else {
                        old.invalidated_id()
                            .map(|id| (old.invalidated_content_rect().union(&damage), id))
                    };
                    if recreate {
                        replaced.insert(index, previous);
                    }
                } else if let Some(Some((rect, _))) = replaced.get_mut(&index) {
                    *rect = rect.union(&damage);
                }
            }
        }

        for (index, previous) in replaced {
            if !self.should_create_tile_at(index, twin) {
                continue;
            }
            let tile = self.create_tile(index);
            if let (Some(tile), Some((rect, id))) = (tile, previous) {
                tile.set_invalidated(rect, id);
            }
        }
    }

    pub fn create_missing_tiles_in_live_tiles_rect(&mut self, twin: &TwinContext<'_>) {
        let missing: Vec<TileIndex> = self
            .tiling_data
            .tiles_in_rect(&self.live_tiles_rect)
            .filter(|index| !self.tiles.contains_key(index))
            .collect();
        for index in missing {
            if self.should_create_tile_at(index, twin) {
                self.create_tile(index);
            }
        }
    }

    /// Move the live tiles rect, dropping tiles that leave it and creating
    /// the ones that enter it.
    pub fn set_live_tiles_rect(&mut self, live_tiles_rect: &Rect, twin: &TwinContext<'_>) {
        let new_rect = live_tiles_rect.intersect(&self.tiling_data.tiling_rect());
        if new_rect == self.live_tiles_rect {
            return;
        }

        for index in self.tiling_data.difference(&self.live_tiles_rect, &new_rect) {
            self.tiles.remove(&index);
        }

        // Non-ideal tilings never raster, so they only shrink.
        if self.resolution == TileResolution::NonIdeal {
            self.live_tiles_rect = self.live_tiles_rect.intersect(&new_rect);
            return;
        }

        let entering: Vec<TileIndex> = self.tiling_data.difference(&new_rect, &self.live_tiles_rect).collect();
        for index in entering {
            if !self.tiles.contains_key(&index) && self.should_create_tile_at(index, twin) {
                self.create_tile(index);
            }
        }
        self.live_tiles_rect = new_rect;
    }

    /// Adopt the tiles and properties of the pending twin at activation.
    /// Active tiles damaged by `layer_invalidation` are dropped first.
    pub fn take_tiles_and_properties_from(&mut self, pending: &mut Tiling, layer_invalidation: &Region) {
        self.set_raster_source_and_resize(Arc::clone(&pending.raster_source));
        self.remove_tiles_in_region(layer_invalidation);
        self.resolution = pending.resolution;

        let no_twin = TwinContext::default();
        let create_missing_tiles = self.live_tiles_rect.is_empty();
        if create_missing_tiles {
            self.live_tiles_rect = pending.live_tiles_rect;
        } else {
            self.set_live_tiles_rect(&pending.live_tiles_rect, &no_twin);
        }

        let handle = self.handle;
        for (index, mut tile) in pending.tiles.drain() {
            tile.set_tiling(handle);
            self.tiles.insert(index, tile);
        }
        if create_missing_tiles {
            self.create_missing_tiles_in_live_tiles_rect(&no_twin);
        }

        self.priority_rects = pending.priority_rects;
        self.content_to_screen_scale = pending.content_to_screen_scale;
        self.screen_speed = pending.screen_speed;
        self.update_tile_priorities(None);
    }

    /// Apply layer-space priority rects: moves the live tiles rect to the
    /// eventually rect and recomputes every tile's priority.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_tile_priority_rects(
        &mut self,
        visible_rect_in_layer: &Rect,
        skewport_in_layer: &Rect,
        soon_border_rect_in_layer: &Rect,
        eventually_rect_in_layer: &Rect,
        ideal_contents_scale: f32,
        occlusion: &Occlusion,
        screen_speed: f32,
        twin: &TwinContext<'_>,
    ) {
        let eventually = self
            .tiling_data
            .expand_rect_to_tile_bounds(&self.enclosing_content_rect_from_layer_rect(eventually_rect_in_layer));
        self.priority_rects = PriorityRects {
            visible: self.enclosing_content_rect_from_layer_rect(visible_rect_in_layer),
            skewport: self.enclosing_content_rect_from_layer_rect(skewport_in_layer),
            soon_border: self.enclosing_content_rect_from_layer_rect(soon_border_rect_in_layer),
            eventually,
        };
        self.content_to_screen_scale = ideal_contents_scale / self.contents_scale;
        self.screen_speed = screen_speed;

        self.set_live_tiles_rect(&eventually, twin);
        self.update_tile_priorities(Some(occlusion));
    }

    fn priority_for_rect(&self, content_rect: &Rect) -> TilePriority {
        let rects = &self.priority_rects;
        if rects.visible.intersects(content_rect) {
            return TilePriority::now(self.resolution);
        }
        if rects.visible.is_empty() {
            return TilePriority { resolution: self.resolution, ..TilePriority::default() };
        }

        let distance = rects.visible.manhattan_internal_distance(content_rect) as f32 * self.content_to_screen_scale;
        let priority_bin = if rects.skewport.intersects(content_rect) || rects.soon_border.intersects(content_rect) {
            PriorityBin::Soon
        } else {
            PriorityBin::Eventually
        };
        let time_to_visible = if self.screen_speed > 0.0 {
            distance / self.screen_speed
        } else {
            f32::INFINITY
        };
        TilePriority { priority_bin, resolution: self.resolution, distance_to_visible: distance, time_to_visible }
    }

    /// Recompute priorities and required flags. `None` keeps each tile's
    /// previous occlusion state.
    fn update_tile_priorities(&mut self, occlusion: Option<&Occlusion>) {
        let priorities: Vec<(TileIndex, TilePriority)> = self
            .tiles
            .iter()
            .map(|(index, tile)| (*index, self.priority_for_rect(&tile.content_rect())))
            .collect();

        let high_res = self.resolution == TileResolution::High;
        for (index, mut priority) in priorities {
            let Some(tile) = self.tiles.get_mut(&index) else {
                continue;
            };
            if let Some(occlusion) = occlusion {
                tile.occluded = occlusion.is_occluded(&tile.enclosing_layer_rect());
            }
            if tile.occluded {
                priority.priority_bin = PriorityBin::Eventually;
            }
            let visible = priority.priority_bin == PriorityBin::Now;
            tile.required_for_activation = self.tree == WhichTree::Pending
                && high_res
                && visible
                && self.can_require_tiles_for_activation;
            tile.required_for_draw = self.tree == WhichTree::Active && high_res && visible;
            tile.priority = priority;
        }
    }

    pub fn remove_all_tiles(&mut self) {
        self.tiles.clear();
        self.live_tiles_rect = Rect::default();
    }

    /// Tiles required for activation that are not yet ready
    pub fn all_required_for_activation_ready(&self) -> bool {
        self.tiles.values().all(|tile| !tile.required_for_activation() || tile.is_ready_to_draw())
    }
}

impl std::fmt::Debug for Tiling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tiling")
            .field("contents_scale", &self.contents_scale)
            .field("tree", &self.tree)
            .field("resolution", &self.resolution)
            .field("tiles", &self.tiles.len())
            .field("live_tiles_rect", &self.live_tiles_rect)
            .finish()
    }
}
