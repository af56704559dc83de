//! Tiles
//!
//! One rasterizable unit of a tiling and its scheduling priority.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use super::TilingHandle;
use super::tiling_data::TileIndex;
use crate::Color;
use crate::geometry::Rect;
use crate::raster::ResourceId;
use crate::region::Region;

/// Tile ID type
pub type TileId = u64;

static NEXT_TILE_ID: AtomicU64 = AtomicU64::new(1);

/// Resolution class of a tiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TileResolution {
    High,
    Low,
    NonIdeal,
}

/// Coarse urgency of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityBin {
    /// Visible now
    Now,
    /// Near the viewport or in the scroll direction
    Soon,
    /// Anywhere else in the interest area
    Eventually,
}

/// Tile priority based on viewport distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePriority {
    pub priority_bin: PriorityBin,
    pub resolution: TileResolution,
    /// Screen pixels between the tile and the visible rect
    pub distance_to_visible: f32,
    /// Seconds until the tile scrolls into view at the current velocity
    pub time_to_visible: f32,
}

impl TilePriority {
    pub fn now(resolution: TileResolution) -> Self {
        Self {
            priority_bin: PriorityBin::Now,
            resolution,
            distance_to_visible: 0.0,
            time_to_visible: 0.0,
        }
    }

    /// `Less` means `self` should raster first.
    pub fn compare(&self, other: &TilePriority) -> Ordering {
        self.priority_bin
            .cmp(&other.priority_bin)
            .then_with(|| self.distance_to_visible.total_cmp(&other.distance_to_visible))
            .then_with(|| self.resolution.cmp(&other.resolution))
    }
}

impl Default for TilePriority {
    fn default() -> Self {
        Self {
            priority_bin: PriorityBin::Eventually,
            resolution: TileResolution::NonIdeal,
            distance_to_visible: f32::INFINITY,
            time_to_visible: f32::INFINITY,
        }
    }
}

/// What a tile draws with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileDrawInfo {
    /// Not rastered yet; drawn as checkerboard
    #[default]
    Pending,
    Resource(ResourceId),
    SolidColor(Color),
    /// Raster was refused for lack of memory
    OutOfMemory,
}

impl TileDrawInfo {
    pub fn is_ready_to_draw(&self) -> bool {
        matches!(self, TileDrawInfo::Resource(_) | TileDrawInfo::SolidColor(_))
    }
}

/// Layer-space occlusion used to deprioritize hidden tiles
#[derive(Debug, Clone, Default)]
pub struct Occlusion {
    occluded: Region,
}

impl Occlusion {
    pub fn new(occluded: Region) -> Self {
        Self { occluded }
    }

    pub fn is_occluded(&self, layer_rect: &Rect) -> bool {
        !layer_rect.is_empty() && self.occluded.contains_rect(layer_rect)
    }
}

/// A tile of a tiling
#[derive(Debug, Clone)]
pub struct Tile {
    id: TileId,
    tiling: TilingHandle,
    index: TileIndex,
    content_rect: Rect,
    enclosing_layer_rect: Rect,
    contents_scale: f32,
    raster_source_generation: u64,
    pub(crate) priority: TilePriority,
    pub(crate) required_for_activation: bool,
    pub(crate) required_for_draw: bool,
    pub(crate) occluded: bool,
    pub(crate) draw_info: TileDrawInfo,
    /// Content damaged since `invalidated_id` was rastered
    invalidated_content_rect: Rect,
    /// Tile this one replaced, whose resource a partial raster may reuse
    invalidated_id: Option<TileId>,
}

impl Tile {
    pub(crate) fn new(
        tiling: TilingHandle,
        index: TileIndex,
        content_rect: Rect,
        enclosing_layer_rect: Rect,
        contents_scale: f32,
        raster_source_generation: u64,
    ) -> Self {
        let id = NEXT_TILE_ID.fetch_add(1, AtomicOrdering::Relaxed);
        tracing::trace!(tile = id, i = index.i, j = index.j, scale = contents_scale, "created tile");
        Self {
            id,
            tiling,
            index,
            content_rect,
            enclosing_layer_rect,
            contents_scale,
            raster_source_generation,
            priority: TilePriority::default(),
            required_for_activation: false,
            required_for_draw: false,
            occluded: false,
            draw_info: TileDrawInfo::Pending,
            invalidated_content_rect: Rect::default(),
            invalidated_id: None,
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn tiling(&self) -> TilingHandle {
        self.tiling
    }

    pub(crate) fn set_tiling(&mut self, tiling: TilingHandle) {
        self.tiling = tiling;
    }

    pub fn index(&self) -> TileIndex {
        self.index
    }

    pub fn content_rect(&self) -> Rect {
        self.content_rect
    }

    pub fn enclosing_layer_rect(&self) -> Rect {
        self.enclosing_layer_rect
    }

    pub fn contents_scale(&self) -> f32 {
        self.contents_scale
    }

    pub fn raster_source_generation(&self) -> u64 {
        self.raster_source_generation
    }

    pub fn priority(&self) -> &TilePriority {
        &self.priority
    }

    pub fn required_for_activation(&self) -> bool {
        self.required_for_activation
    }

    pub fn required_for_draw(&self) -> bool {
        self.required_for_draw
    }

    pub fn is_occluded(&self) -> bool {
        self.occluded
    }

    pub fn draw_info(&self) -> &TileDrawInfo {
        &self.draw_info
    }

    pub fn is_ready_to_draw(&self) -> bool {
        self.draw_info.is_ready_to_draw()
    }

    pub fn invalidated_content_rect(&self) -> Rect {
        self.invalidated_content_rect
    }

    pub fn invalidated_id(&self) -> Option<TileId> {
        self.invalidated_id
    }

    /// Record that this tile replaces `previous`, damaged in `content_rect`.
    pub(crate) fn set_invalidated(&mut self, content_rect: Rect, previous: TileId) {
        self.invalidated_content_rect = content_rect;
        self.invalidated_id = Some(previous);
    }

    pub(crate) fn set_draw_info(&mut self, draw_info: TileDrawInfo) {
        self.draw_info = draw_info;
    }

    pub(crate) fn clear_invalidation(&mut self) {
        self.invalidated_content_rect = Rect::default();
        self.invalidated_id = None;
    }
}
