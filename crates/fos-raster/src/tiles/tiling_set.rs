//! Tiling Set
//!
//! The tilings of one layer on one tree, ordered by descending contents
//! scale. Owns the visible-rect history that drives skewport extrapolation
//! and mirrors pending tilings onto the active tree at activation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::TilingHandle;
use super::arena::{GenArena, GenIndex};
use super::coverage::CoverageIterator;
use super::tile::{Occlusion, Tile, TileId, TileResolution};
use super::tiling::{Tiling, TwinContext, WhichTree};
use crate::config::TilingSettings;
use crate::error::TilingError;
use crate::geometry::{Rect, saturate_i32};
use crate::raster_source::RasterSource;
use crate::region::Region;

static NEXT_SET_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy)]
struct FrameVisibleRect {
    frame_time_in_seconds: f64,
    visible_rect_in_layer: Rect,
}

/// Layer-space priority state shared by every tiling of the set
#[derive(Debug, Default)]
struct PriorityState {
    visible: Rect,
    skewport: Rect,
    soon_border: Rect,
    eventually: Rect,
    ideal_contents_scale: f32,
    screen_speed: f32,
    /// Most recent first
    history: [Option<FrameVisibleRect>; 2],
    /// Tilings changed since the last priority update
    invalidated: bool,
}

/// All tilings of a layer on one tree
pub struct TilingSet {
    id: u64,
    tree: WhichTree,
    settings: TilingSettings,
    tilings: GenArena<Tiling>,
    /// Descending contents scale
    order: Vec<GenIndex>,
    raster_source: Option<Arc<RasterSource>>,
    /// Layer damage committed since the last activation (pending tree)
    pending_invalidation: Region,
    priority: PriorityState,
}

/// Twin context for a tiling of a set on `tree`.
fn twin_context<'a>(
    tree: WhichTree,
    contents_scale: f32,
    active_twin: Option<&'a TilingSet>,
    pending_invalidation: &'a Region,
) -> TwinContext<'a> {
    match tree {
        WhichTree::Active => TwinContext::default(),
        WhichTree::Pending => TwinContext {
            active_twin: active_twin.and_then(|set| set.find_tiling_with_scale(contents_scale)),
            pending_invalidation: Some(pending_invalidation),
        },
    }
}

fn larger_ratio(a: f32, b: f32) -> f32 {
    if a > b { a / b } else { b / a }
}

impl TilingSet {
    pub fn new(tree: WhichTree, settings: TilingSettings) -> Self {
        Self {
            id: NEXT_SET_ID.fetch_add(1, Ordering::Relaxed),
            tree,
            settings,
            tilings: GenArena::new(),
            order: Vec::new(),
            raster_source: None,
            pending_invalidation: Region::new(),
            priority: PriorityState::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tree(&self) -> WhichTree {
        self.tree
    }

    pub fn settings(&self) -> &TilingSettings {
        &self.settings
    }

    pub fn raster_source(&self) -> Option<&Arc<RasterSource>> {
        self.raster_source.as_ref()
    }

    pub fn pending_invalidation(&self) -> &Region {
        &self.pending_invalidation
    }

    pub fn num_tilings(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tiling at `position` in descending scale order
    pub fn tiling_at(&self, position: usize) -> Option<&Tiling> {
        self.order.get(position).and_then(|index| self.tilings.get(*index))
    }

    pub fn tiling_at_mut(&mut self, position: usize) -> Option<&mut Tiling> {
        let index = *self.order.get(position)?;
        self.tilings.get_mut(index)
    }

    /// Tilings in descending scale order
    pub fn tilings(&self) -> impl Iterator<Item = &Tiling> {
        self.order.iter().filter_map(|index| self.tilings.get(*index))
    }

    /// Resolve a tile's back-reference. Handles of removed tilings or of
    /// another set resolve to `None`.
    pub fn resolve(&self, handle: TilingHandle) -> Option<&Tiling> {
        if handle.set_id() != self.id {
            return None;
        }
        self.tilings.get(handle.index())
    }

    pub fn resolve_mut(&mut self, handle: TilingHandle) -> Option<&mut Tiling> {
        if handle.set_id() != self.id {
            return None;
        }
        self.tilings.get_mut(handle.index())
    }

    fn position_of_scale(&self, contents_scale: f32) -> Option<usize> {
        self.order
            .iter()
            .position(|index| self.tilings.get(*index).map(|t| t.contents_scale() == contents_scale).unwrap_or(false))
    }

    pub fn find_tiling_with_scale(&self, contents_scale: f32) -> Option<&Tiling> {
        self.position_of_scale(contents_scale).and_then(|position| self.tiling_at(position))
    }

    pub fn find_tiling_with_scale_mut(&mut self, contents_scale: f32) -> Option<&mut Tiling> {
        let position = self.position_of_scale(contents_scale)?;
        self.tiling_at_mut(position)
    }

    pub fn find_tiling_with_resolution(&self, resolution: TileResolution) -> Option<&Tiling> {
        self.tilings().find(|tiling| tiling.resolution() == resolution)
    }

    pub fn num_high_res_tilings(&self) -> usize {
        self.tilings().filter(|tiling| tiling.resolution() == TileResolution::High).count()
    }

    /// Add a tiling at `contents_scale`. New tilings start `NonIdeal`.
    pub fn add_tiling(
        &mut self,
        contents_scale: f32,
        raster_source: Arc<RasterSource>,
    ) -> Result<TilingHandle, TilingError> {
        if !contents_scale.is_finite() || contents_scale <= 0.0 {
            return Err(TilingError::InvalidScale(contents_scale));
        }
        if self.position_of_scale(contents_scale).is_some() {
            return Err(TilingError::DuplicateScale(contents_scale));
        }

        let placeholder = TilingHandle::new(self.id, GenIndex { index: u32::MAX, generation: u32::MAX });
        let tiling = Tiling::new(
            placeholder,
            self.tree,
            contents_scale,
            Arc::clone(&raster_source),
            self.settings.default_tile_size,
        );
        let index = self.tilings.insert(tiling);
        let handle = TilingHandle::new(self.id, index);
        if let Some(tiling) = self.tilings.get_mut(index) {
            tiling.set_handle(handle);
        }

        let position = self
            .order
            .iter()
            .position(|other| self.tilings.get(*other).map(|t| t.contents_scale() < contents_scale).unwrap_or(false))
            .unwrap_or(self.order.len());
        self.order.insert(position, index);
        self.raster_source = Some(raster_source);
        self.priority.invalidated = true;

        tracing::debug!(set = self.id, tree = ?self.tree, scale = contents_scale, "added tiling");
        Ok(handle)
    }

    fn remove_where(&mut self, mut remove: impl FnMut(&Tiling) -> bool) {
        let tilings = &mut self.tilings;
        let mut removed = 0usize;
        self.order.retain(|index| {
            let doomed = tilings.get(*index).map(|tiling| remove(tiling)).unwrap_or(true);
            if doomed {
                tilings.remove(*index);
                removed += 1;
            }
            !doomed
        });
        if removed > 0 {
            self.priority.invalidated = true;
            tracing::debug!(set = self.id, removed, remaining = self.order.len(), "removed tilings");
        }
    }

    pub fn remove_tilings_below_scale(&mut self, minimum_scale: f32) {
        self.remove_where(|tiling| tiling.contents_scale() < minimum_scale);
    }

    pub fn remove_tilings_above_scale(&mut self, maximum_scale: f32) {
        self.remove_where(|tiling| tiling.contents_scale() > maximum_scale);
    }

    pub fn remove_all_tilings(&mut self) {
        self.remove_where(|_| true);
    }

    pub fn remove_non_ideal_tilings(&mut self) {
        self.remove_where(|tiling| tiling.resolution() == TileResolution::NonIdeal);
    }

    pub fn mark_all_tilings_non_ideal(&mut self) {
        for index in &self.order {
            if let Some(tiling) = self.tilings.get_mut(*index) {
                tiling.set_resolution(TileResolution::NonIdeal);
            }
        }
    }

    pub fn remove_all_tiles(&mut self) {
        for index in &self.order {
            if let Some(tiling) = self.tilings.get_mut(*index) {
                tiling.remove_all_tiles();
            }
        }
    }

    /// Existing scale within `snap_to_existing_tiling_ratio` of
    /// `start_scale`, closest first; `start_scale` itself otherwise.
    pub fn snapped_contents_scale(&self, start_scale: f32, snap_to_existing_tiling_ratio: f32) -> f32 {
        let mut snapped_scale = start_scale;
        let mut snapped_ratio = snap_to_existing_tiling_ratio;
        for tiling in self.tilings() {
            let ratio = larger_ratio(tiling.contents_scale(), start_scale);
            if ratio < snapped_ratio {
                snapped_scale = tiling.contents_scale();
                snapped_ratio = ratio;
            }
        }
        snapped_scale
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tilings().find_map(|tiling| tiling.find_tile(id))
    }

    pub fn tile_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        let owner = self
            .order
            .iter()
            .copied()
            .find(|index| self.tilings.get(*index).is_some_and(|tiling| tiling.find_tile(id).is_some()))?;
        self.tilings.get_mut(owner)?.find_tile_mut(id)
    }

    /// Every tile of every tiling, highest scale first
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tilings().flat_map(Tiling::tiles)
    }

    /// Mirror the pending twin's tilings: matching scales adopt the pending
    /// tiles and properties, missing scales are created. An empty pending
    /// twin empties this set.
    pub fn copy_tilings_and_properties_from_pending_twin(
        &mut self,
        pending_twin: &mut TilingSet,
        raster_source: &Arc<RasterSource>,
        layer_invalidation: &Region,
    ) {
        if pending_twin.is_empty() {
            self.remove_all_tilings();
            return;
        }

        for pending_index in pending_twin.order.clone() {
            let Some(pending) = pending_twin.tilings.get_mut(pending_index) else {
                continue;
            };
            let scale = pending.contents_scale();
            if self.position_of_scale(scale).is_none() {
                if let Err(error) = self.add_tiling(scale, Arc::clone(raster_source)) {
                    tracing::warn!(%error, "failed to mirror pending tiling");
                    continue;
                }
            }
            if let Some(active) = self.find_tiling_with_scale_mut(scale) {
                active.take_tiles_and_properties_from(pending, layer_invalidation);
            }
        }
        self.priority.invalidated = true;
    }

    /// Activation: adopt the pending twin's tilings, bring the remaining
    /// active-only tilings up to date, and demote them to non-ideal.
    pub fn update_tilings_to_current_raster_source_for_activation(
        &mut self,
        raster_source: Arc<RasterSource>,
        pending_twin: &mut TilingSet,
        layer_invalidation: &Region,
        minimum_contents_scale: f32,
        maximum_contents_scale: f32,
    ) {
        self.remove_tilings_below_scale(minimum_contents_scale);
        self.remove_tilings_above_scale(maximum_contents_scale);
        self.raster_source = Some(Arc::clone(&raster_source));

        self.copy_tilings_and_properties_from_pending_twin(pending_twin, &raster_source, layer_invalidation);

        let no_twin = TwinContext::default();
        for index in &self.order {
            let Some(tiling) = self.tilings.get_mut(*index) else {
                continue;
            };
            if pending_twin.position_of_scale(tiling.contents_scale()).is_some() {
                continue;
            }
            tiling.set_raster_source_and_resize(Arc::clone(&raster_source));
            tiling.invalidate(layer_invalidation, &no_twin);
            tiling.create_missing_tiles_in_live_tiles_rect(&no_twin);
            if tiling.resolution() != TileResolution::Low {
                tiling.set_resolution(TileResolution::NonIdeal);
            }
        }

        pending_twin.pending_invalidation.clear();
        self.priority.invalidated = true;
        self.verify_tilings(Some(pending_twin));
        tracing::debug!(set = self.id, tilings = self.order.len(), "activated tilings");
    }

    /// Commit: move every tiling to the new recording and replace the
    /// tiles damaged by `layer_invalidation`.
    pub fn update_tilings_to_current_raster_source_for_commit(
        &mut self,
        raster_source: Arc<RasterSource>,
        layer_invalidation: &Region,
        minimum_contents_scale: f32,
        maximum_contents_scale: f32,
        active_twin: Option<&TilingSet>,
    ) {
        self.remove_tilings_below_scale(minimum_contents_scale);
        self.remove_tilings_above_scale(maximum_contents_scale);
        self.raster_source = Some(Arc::clone(&raster_source));
        self.pending_invalidation.union(layer_invalidation);

        for index in &self.order {
            let Some(tiling) = self.tilings.get_mut(*index) else {
                continue;
            };
            let twin = twin_context(self.tree, tiling.contents_scale(), active_twin, &self.pending_invalidation);
            tiling.set_raster_source_and_resize(Arc::clone(&raster_source));
            tiling.invalidate(layer_invalidation, &twin);
            tiling.create_missing_tiles_in_live_tiles_rect(&twin);
        }
        self.priority.invalidated = true;
        tracing::debug!(set = self.id, tilings = self.order.len(), "committed raster source");
    }

    /// Switch to a raster source differing only in its LCD text setting.
    pub fn update_raster_source_due_to_lcd_change(
        &mut self,
        raster_source: Arc<RasterSource>,
        layer_invalidation: &Region,
        active_twin: Option<&TilingSet>,
    ) {
        self.raster_source = Some(Arc::clone(&raster_source));
        for index in &self.order {
            let Some(tiling) = self.tilings.get_mut(*index) else {
                continue;
            };
            let twin = twin_context(self.tree, tiling.contents_scale(), active_twin, &self.pending_invalidation);
            tiling.set_raster_source_and_resize(Arc::clone(&raster_source));
            tiling.invalidate(layer_invalidation, &twin);
        }
        self.priority.invalidated = true;
    }

    /// Non-empty sets hold exactly one high-res tiling after activation.
    fn verify_tilings(&self, pending_twin: Option<&TilingSet>) {
        let high_res = self.num_high_res_tilings();
        let pending_non_empty = pending_twin.map(|twin| !twin.is_empty()).unwrap_or(false);
        if pending_non_empty && high_res != 1 {
            tracing::warn!(set = self.id, high_res, "unexpected high-res tiling count after activation");
        }
    }

    /// Recompute the priority rects and every tile's priority. Returns false
    /// when nothing changed since the previous call.
    pub fn update_tile_priorities(
        &mut self,
        visible_rect_in_layer: &Rect,
        ideal_contents_scale: f32,
        current_frame_time_in_seconds: f64,
        occlusion: &Occlusion,
        can_require_tiles_for_activation: bool,
        twin: Option<&TilingSet>,
    ) -> bool {
        if !self.update_priority_rects(visible_rect_in_layer, current_frame_time_in_seconds, ideal_contents_scale) {
            return false;
        }

        let rects = &self.priority;
        for index in &self.order {
            let Some(tiling) = self.tilings.get_mut(*index) else {
                continue;
            };
            let context = twin_context(self.tree, tiling.contents_scale(), twin, &self.pending_invalidation);
            tiling.set_can_require_tiles_for_activation(can_require_tiles_for_activation);
            tiling.compute_tile_priority_rects(
                &rects.visible,
                &rects.skewport,
                &rects.soon_border,
                &rects.eventually,
                ideal_contents_scale,
                occlusion,
                rects.screen_speed,
                &context,
            );
        }
        true
    }

    fn needs_priority_update(&self, visible_rect_in_layer: &Rect, frame_time: f64, ideal_contents_scale: f32) -> bool {
        let Some(last) = self.priority.history[0] else {
            return true;
        };
        self.priority.invalidated
            || last.frame_time_in_seconds != frame_time
            || last.visible_rect_in_layer != *visible_rect_in_layer
            || self.priority.ideal_contents_scale != ideal_contents_scale
    }

    fn update_priority_rects(&mut self, visible_rect_in_layer: &Rect, frame_time: f64, ideal_contents_scale: f32) -> bool {
        if !self.needs_priority_update(visible_rect_in_layer, frame_time, ideal_contents_scale) {
            return false;
        }
        let ideal = if ideal_contents_scale > 0.0 { ideal_contents_scale } else { 1.0 };
        let visible = *visible_rect_in_layer;

        let padding = saturate_i32(self.settings.tiling_interest_area_padding as f64 / ideal as f64);
        let eventually = visible.outset(padding);
        let skewport = self.compute_skewport(&visible, frame_time, ideal).intersect(&eventually);

        let max_dimension = visible.width.max(visible.height) as f32;
        let soon_distance = (max_dimension * self.settings.soon_border_distance_viewport_percentage)
            .min(self.settings.max_soon_border_distance_in_screen_pixels);
        let soon_border = visible.outset(saturate_i32((soon_distance / ideal) as f64)).intersect(&eventually);

        let screen_speed = match self.priority.history[0] {
            Some(last) if frame_time > last.frame_time_in_seconds => {
                let dt = frame_time - last.frame_time_in_seconds;
                let moved = (visible.x as f64 - last.visible_rect_in_layer.x as f64).abs()
                    + (visible.y as f64 - last.visible_rect_in_layer.y as f64).abs();
                (moved * ideal as f64 / dt) as f32
            }
            _ => 0.0,
        };

        let state = &mut self.priority;
        state.history[1] = state.history[0];
        state.history[0] = Some(FrameVisibleRect { frame_time_in_seconds: frame_time, visible_rect_in_layer: visible });
        state.visible = visible;
        state.skewport = skewport;
        state.soon_border = soon_border;
        state.eventually = eventually;
        state.ideal_contents_scale = ideal_contents_scale;
        state.screen_speed = screen_speed;
        state.invalidated = false;

        tracing::trace!(set = self.id, ?visible, ?skewport, ?eventually, screen_speed, "updated priority rects");
        true
    }

    /// Visible rect extrapolated along the recent scroll, bounded by the
    /// extrapolation limit.
    fn compute_skewport(&self, visible: &Rect, frame_time: f64, ideal_contents_scale: f32) -> Rect {
        let Some(last) = self.priority.history[0] else {
            return *visible;
        };
        let time_delta = frame_time - last.frame_time_in_seconds;
        if time_delta <= 0.0 || visible.is_empty() {
            return *visible;
        }

        let multiplier = self.settings.skewport_target_time_in_seconds as f64 / time_delta;
        let old = last.visible_rect_in_layer;
        let extrapolate = |new: i32, old: i32| saturate_i32(new as f64 + multiplier * (new as f64 - old as f64));
        let skewport = Rect::from_ltrb(
            extrapolate(visible.x, old.x),
            extrapolate(visible.y, old.y),
            extrapolate(visible.right(), old.right()),
            extrapolate(visible.bottom(), old.bottom()),
        );

        let limit = saturate_i32(
            self.settings.skewport_extrapolation_limit_in_screen_pixels as f64 / ideal_contents_scale as f64,
        );
        skewport.union(visible).intersect(&visible.outset(limit))
    }

    pub fn visible_rect(&self) -> Rect {
        self.priority.visible
    }

    pub fn skewport_rect(&self) -> Rect {
        self.priority.skewport
    }

    pub fn soon_border_rect(&self) -> Rect {
        self.priority.soon_border
    }

    pub fn eventually_rect(&self) -> Rect {
        self.priority.eventually
    }

    pub fn screen_speed(&self) -> f32 {
        self.priority.screen_speed
    }

    /// Tiles drawing `coverage_rect` (coverage space) at `coverage_scale`.
    pub fn coverage(&self, coverage_scale: f32, coverage_rect: &Rect, ideal_contents_scale: f32) -> CoverageIterator<'_> {
        let tilings: Vec<&Tiling> = self.tilings().collect();
        CoverageIterator::new(&tilings, coverage_scale, coverage_rect, ideal_contents_scale)
    }
}

impl std::fmt::Debug for TilingSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scales: Vec<f32> = self.tilings().map(Tiling::contents_scale).collect();
        f.debug_struct("TilingSet")
            .field("id", &self.id)
            .field("tree", &self.tree)
            .field("scales", &scales)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use crate::geometry::Size;
    use crate::raster_source::tests::{TestPainter, record};
    use crate::tiles::TileDrawInfo;

    fn settings() -> TilingSettings {
        TilingSettings { default_tile_size: Size::new(100, 100), ..TilingSettings::default() }
    }

    fn source(size: Size) -> Arc<RasterSource> {
        let painter = TestPainter { rects: vec![(Rect::from_size(size), Color::BLUE)], images: vec![] };
        record(&painter, size, false)
    }

    fn full_priorities(set: &mut TilingSet, rect: Rect, frame_time: f64) -> bool {
        set.update_tile_priorities(&rect, 1.0, frame_time, &Occlusion::default(), true, None)
    }

    #[test]
    fn test_add_tiling_orders_and_rejects_duplicates() {
        let mut set = TilingSet::new(WhichTree::Active, settings());
        let src = source(Size::new(300, 300));
        set.add_tiling(1.0, Arc::clone(&src)).unwrap();
        set.add_tiling(2.0, Arc::clone(&src)).unwrap();
        set.add_tiling(0.5, Arc::clone(&src)).unwrap();

        let scales: Vec<f32> = set.tilings().map(Tiling::contents_scale).collect();
        assert_eq!(scales, vec![2.0, 1.0, 0.5]);
        assert!(matches!(set.add_tiling(1.0, Arc::clone(&src)), Err(TilingError::DuplicateScale(_))));
        assert!(matches!(set.add_tiling(0.0, src), Err(TilingError::InvalidScale(_))));
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut set = TilingSet::new(WhichTree::Active, settings());
        let src = source(Size::new(300, 300));
        let handle = set.add_tiling(1.0, Arc::clone(&src)).unwrap();
        assert!(set.resolve(handle).is_some());

        set.remove_all_tilings();
        set.add_tiling(1.0, src).unwrap();
        assert!(set.resolve(handle).is_none());

        let other = TilingSet::new(WhichTree::Active, settings());
        assert!(other.resolve(handle).is_none());
    }

    #[test]
    fn test_remove_by_scale_and_resolution() {
        let mut set = TilingSet::new(WhichTree::Active, settings());
        let src = source(Size::new(300, 300));
        for scale in [0.25, 0.5, 1.0, 2.0, 4.0] {
            set.add_tiling(scale, Arc::clone(&src)).unwrap();
        }
        set.remove_tilings_below_scale(0.5);
        set.remove_tilings_above_scale(2.0);
        assert_eq!(set.num_tilings(), 3);

        set.find_tiling_with_scale_mut(1.0).unwrap().set_resolution(TileResolution::High);
        set.remove_non_ideal_tilings();
        assert_eq!(set.num_tilings(), 1);
        assert_eq!(set.num_high_res_tilings(), 1);

        set.mark_all_tilings_non_ideal();
        assert!(set.find_tiling_with_resolution(TileResolution::High).is_none());
    }

    #[test]
    fn test_snapped_contents_scale() {
        let mut set = TilingSet::new(WhichTree::Active, settings());
        let src = source(Size::new(100, 100));
        set.add_tiling(1.0, Arc::clone(&src)).unwrap();
        set.add_tiling(2.0, src).unwrap();

        assert_eq!(set.snapped_contents_scale(1.1, 1.2), 1.0);
        assert_eq!(set.snapped_contents_scale(1.9, 1.2), 2.0);
        assert_eq!(set.snapped_contents_scale(1.5, 1.2), 1.5);
    }

    #[test]
    fn test_priority_update_is_cached() {
        let mut set = TilingSet::new(WhichTree::Active, settings());
        set.add_tiling(1.0, source(Size::new(1000, 1000))).unwrap();
        let visible = Rect::new(0, 0, 200, 200);

        assert!(full_priorities(&mut set, visible, 1.0));
        assert!(!full_priorities(&mut set, visible, 1.0));
        assert!(full_priorities(&mut set, visible, 2.0));
        assert!(full_priorities(&mut set, Rect::new(10, 0, 200, 200), 2.0));
    }

    #[test]
    fn test_skewport_extrapolates_scroll() {
        let mut set = TilingSet::new(WhichTree::Active, settings());
        set.add_tiling(1.0, source(Size::new(5000, 5000))).unwrap();

        full_priorities(&mut set, Rect::new(0, 0, 200, 200), 1.0);
        full_priorities(&mut set, Rect::new(0, 100, 200, 200), 1.5);

        // Two target-time's worth of 100px frames ahead, plus the viewport.
        assert_eq!(set.skewport_rect(), Rect::new(0, 100, 200, 400));
        assert_eq!(set.screen_speed(), 200.0);
    }

    #[test]
    fn test_skewport_respects_extrapolation_limit() {
        let mut set = TilingSet::new(
            WhichTree::Active,
            TilingSettings { skewport_extrapolation_limit_in_screen_pixels: 50, ..settings() },
        );
        set.add_tiling(1.0, source(Size::new(5000, 5000))).unwrap();

        full_priorities(&mut set, Rect::new(0, 0, 200, 200), 1.0);
        full_priorities(&mut set, Rect::new(0, 500, 200, 200), 1.1);
        assert_eq!(set.skewport_rect(), Rect::new(0, 500, 200, 250));
    }

    #[test]
    fn test_required_for_activation_on_pending_tree() {
        let mut set = TilingSet::new(WhichTree::Pending, settings());
        set.add_tiling(1.0, source(Size::new(400, 400))).unwrap();
        set.find_tiling_with_scale_mut(1.0).unwrap().set_resolution(TileResolution::High);

        set.update_tile_priorities(&Rect::new(0, 0, 150, 150), 1.0, 1.0, &Occlusion::default(), true, None);
        let required: Vec<_> = set.tiles().filter(|tile| tile.required_for_activation()).collect();
        assert_eq!(required.len(), 4);
        assert!(set.tiles().all(|tile| !tile.required_for_draw()));
    }

    #[test]
    fn test_activation_leaves_single_high_res_tiling() {
        let src = source(Size::new(400, 400));
        let mut pending = TilingSet::new(WhichTree::Pending, settings());
        pending.add_tiling(1.0, Arc::clone(&src)).unwrap();
        pending.add_tiling(0.5, Arc::clone(&src)).unwrap();
        pending.find_tiling_with_scale_mut(1.0).unwrap().set_resolution(TileResolution::High);
        pending.find_tiling_with_scale_mut(0.5).unwrap().set_resolution(TileResolution::Low);

        let mut active = TilingSet::new(WhichTree::Active, settings());
        active.add_tiling(2.0, Arc::clone(&src)).unwrap();
        active.find_tiling_with_scale_mut(2.0).unwrap().set_resolution(TileResolution::High);

        active.update_tilings_to_current_raster_source_for_activation(src, &mut pending, &Region::new(), 0.1, 10.0);
        assert_eq!(active.num_tilings(), 3);
        assert_eq!(active.num_high_res_tilings(), 1);
        assert_eq!(active.find_tiling_with_resolution(TileResolution::High).unwrap().contents_scale(), 1.0);
        assert_eq!(active.find_tiling_with_scale(2.0).unwrap().resolution(), TileResolution::NonIdeal);
    }

    #[test]
    fn test_activation_with_empty_pending_clears() {
        let src = source(Size::new(400, 400));
        let mut pending = TilingSet::new(WhichTree::Pending, settings());
        let mut active = TilingSet::new(WhichTree::Active, settings());
        active.add_tiling(1.0, Arc::clone(&src)).unwrap();

        active.update_tilings_to_current_raster_source_for_activation(src, &mut pending, &Region::new(), 0.1, 10.0);
        assert!(active.is_empty());
    }

    #[test]
    fn test_commit_shares_undamaged_active_tiles() {
        let size = Size::new(200, 200);
        let src = source(size);
        let mut active = TilingSet::new(WhichTree::Active, settings());
        active.add_tiling(1.0, Arc::clone(&src)).unwrap();
        active.find_tiling_with_scale_mut(1.0).unwrap().set_resolution(TileResolution::High);
        full_priorities(&mut active, Rect::from_size(size), 1.0);
        assert_eq!(active.tiles().count(), 4);

        let mut pending = TilingSet::new(WhichTree::Pending, settings());
        pending.add_tiling(1.0, Arc::clone(&src)).unwrap();
        pending.find_tiling_with_scale_mut(1.0).unwrap().set_resolution(TileResolution::High);
        let damage = Region::from(Rect::new(0, 0, 10, 10));
        pending.update_tilings_to_current_raster_source_for_commit(src, &damage, 0.1, 10.0, Some(&active));
        pending.update_tile_priorities(&Rect::from_size(size), 1.0, 1.0, &Occlusion::default(), true, Some(&active));

        // Only the damaged tile is unshared.
        assert_eq!(pending.tiles().count(), 1);
        assert!(pending.find_tiling_with_scale(1.0).unwrap().tile_at(0, 0).is_some());
    }

    #[test]
    fn test_tile_lookup_by_id() {
        let mut set = TilingSet::new(WhichTree::Active, settings());
        set.add_tiling(1.0, source(Size::new(200, 200))).unwrap();
        set.find_tiling_with_scale_mut(1.0).unwrap().set_resolution(TileResolution::High);
        full_priorities(&mut set, Rect::new(0, 0, 200, 200), 1.0);

        let id = set.tiles().next().unwrap().id();
        set.tile_mut(id).unwrap().set_draw_info(TileDrawInfo::SolidColor(Color::RED));
        assert!(set.tile(id).unwrap().is_ready_to_draw());
        assert!(set.resolve(set.tile(id).unwrap().tiling()).is_some());
    }

    #[test]
    fn test_tile_mut_reaches_lower_scale_tiling() {
        let src = source(Size::new(200, 200));
        let mut set = TilingSet::new(WhichTree::Active, settings());
        set.add_tiling(1.0, Arc::clone(&src)).unwrap();
        set.add_tiling(0.5, src).unwrap();
        set.find_tiling_with_scale_mut(1.0).unwrap().set_resolution(TileResolution::High);
        set.find_tiling_with_scale_mut(0.5).unwrap().set_resolution(TileResolution::Low);
        full_priorities(&mut set, Rect::new(0, 0, 200, 200), 1.0);

        let id = set.find_tiling_with_scale(0.5).unwrap().tile_at(0, 0).unwrap().id();
        set.tile_mut(id).unwrap().set_draw_info(TileDrawInfo::SolidColor(Color::GREEN));
        let tile = set.find_tiling_with_scale(0.5).unwrap().tile_at(0, 0).unwrap();
        assert_eq!(*tile.draw_info(), TileDrawInfo::SolidColor(Color::GREEN));
        assert!(set.find_tiling_with_scale(1.0).unwrap().tiles().all(|tile| !tile.is_ready_to_draw()));

        let unknown = set.tiles().map(Tile::id).max().unwrap() + 1;
        assert!(set.tile_mut(unknown).is_none());
    }
}
