//! Recording Source
//!
//! Owns the latest display list of a layer. Decides per frame whether the
//! painter has to record again, keeping a recorded viewport around the
//! visible rect with hysteresis so small scrolls reuse the old recording.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Color;
use crate::config::RecordingSettings;
use crate::geometry::{Rect, Size};
use crate::image::DiscardableImageMap;
use crate::paint::{DisplayList, SolidColorAnalyzer};
use crate::raster_source::RasterSource;
use crate::region::Region;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// How the painter should produce its display list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaintingControl {
    #[default]
    Normal,
    DisplayListPaintingDisabled,
    DisplayListCachingDisabled,
    DisplayListConstructionDisabled,
}

/// Recording mode requested for a frame (benchmarking and debugging)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingMode {
    #[default]
    Normal,
    PaintingDisabled,
    CachingDisabled,
    ConstructionDisabled,
}

impl From<RecordingMode> for PaintingControl {
    fn from(mode: RecordingMode) -> Self {
        match mode {
            RecordingMode::Normal => PaintingControl::Normal,
            RecordingMode::PaintingDisabled => PaintingControl::DisplayListPaintingDisabled,
            RecordingMode::CachingDisabled => PaintingControl::DisplayListCachingDisabled,
            RecordingMode::ConstructionDisabled => PaintingControl::DisplayListConstructionDisabled,
        }
    }
}

/// The layer's painter
pub trait ContentLayerClient {
    /// Record the layer's content; `viewport` is the layer rect that must be
    /// covered.
    fn paint_contents_to_display_list(&self, viewport: &Rect, control: PaintingControl) -> DisplayList;

    /// Memory held by the painter on behalf of this layer
    fn approximate_unshared_memory_usage(&self) -> usize {
        0
    }
}

/// Whether moving the recorded viewport from `old` to `candidate` is worth a
/// new recording.
pub fn exposes_enough_new_area(
    old: &Rect,
    candidate: &Rect,
    layer_size: Size,
    min_pixels_exposed: i32,
) -> bool {
    if old.is_empty() {
        return !candidate.is_empty();
    }
    if candidate.is_empty() {
        return false;
    }

    // Growth toward an edge is impossible once the viewport stops short of
    // it, so reaching an edge always re-records.
    if old.x != 0 && candidate.x == 0 {
        return true;
    }
    if old.y != 0 && candidate.y == 0 {
        return true;
    }
    if old.right() != layer_size.width && candidate.right() == layer_size.width {
        return true;
    }
    if old.bottom() != layer_size.height && candidate.bottom() == layer_size.height {
        return true;
    }

    !old.outset(min_pixels_exposed).contains(candidate)
}

/// Per-layer recording state
pub struct RecordingSource {
    settings: RecordingSettings,
    recorded_viewport: Rect,
    size: Size,
    display_list: Option<Arc<DisplayList>>,
    image_map: Arc<DiscardableImageMap>,
    solid_color: Option<Color>,
    background_color: Color,
    requires_clear: bool,
    painter_reported_memory_usage: usize,
}

impl RecordingSource {
    pub fn new(settings: RecordingSettings) -> Self {
        Self {
            settings,
            recorded_viewport: Rect::default(),
            size: Size::default(),
            display_list: None,
            image_map: Arc::new(DiscardableImageMap::new()),
            solid_color: None,
            background_color: Color::TRANSPARENT,
            requires_clear: false,
            painter_reported_memory_usage: 0,
        }
    }

    /// Bring the recording up to date for this frame.
    ///
    /// `invalidation` is the layer-space damage since the last update; areas
    /// entering or leaving the recorded viewport are added to it. Returns
    /// whether the recording (or the recorded state) changed.
    pub fn update_and_expand_invalidation(
        &mut self,
        painter: &dyn ContentLayerClient,
        invalidation: &mut Region,
        layer_size: Size,
        visible_layer_rect: &Rect,
        frame_number: u64,
        mode: RecordingMode,
    ) -> bool {
        if layer_size.is_empty() {
            let had_state = !self.size.is_empty()
                || self.display_list.is_some()
                || !self.recorded_viewport.is_empty();
            self.size = layer_size;
            self.clear_recording();
            if had_state {
                tracing::debug!(frame = frame_number, "layer became empty, dropped recording");
            }
            return had_state;
        }

        let mut updated = false;
        if self.size != layer_size {
            self.size = layer_size;
            updated = true;
        }

        let layer_bounds = Rect::from_size(layer_size);
        let candidate = visible_layer_rect
            .outset(self.settings.pixel_record_distance)
            .intersect(&layer_bounds);

        if updated
            || exposes_enough_new_area(
                &self.recorded_viewport,
                &candidate,
                layer_size,
                self.settings.min_pixels_exposed_before_rerecord,
            )
        {
            let old_viewport = self.recorded_viewport;
            self.recorded_viewport = candidate;
            expand_invalidation_for_new_viewport(&old_viewport, &candidate, invalidation);
            updated = true;
        }

        if !updated && !invalidation.intersects(&self.recorded_viewport) {
            return false;
        }

        tracing::debug!(
            frame = frame_number,
            viewport = ?self.recorded_viewport,
            size_changed = updated,
            "re-recording layer"
        );
        self.record(painter, mode);
        true
    }

    fn record(&mut self, painter: &dyn ContentLayerClient, mode: RecordingMode) {
        let display_list = painter.paint_contents_to_display_list(&self.recorded_viewport, mode.into());
        self.painter_reported_memory_usage = painter.approximate_unshared_memory_usage();

        // Re-analysed from scratch on every recording.
        let mut analyzer = SolidColorAnalyzer::new(Rect::from_size(self.size));
        display_list.raster(&mut analyzer);
        self.solid_color = analyzer.solid_color();

        self.image_map = if self.settings.generate_discardable_images_metadata {
            Arc::new(DiscardableImageMap::generate(&display_list, self.size))
        } else {
            Arc::new(DiscardableImageMap::new())
        };
        tracing::trace!(
            items = display_list.len(),
            ops = display_list.op_count(),
            images = self.image_map.len(),
            solid = self.solid_color.is_some(),
            "recorded display list"
        );
        self.display_list = Some(Arc::new(display_list));
    }

    fn clear_recording(&mut self) {
        self.recorded_viewport = Rect::default();
        self.display_list = None;
        self.image_map = Arc::new(DiscardableImageMap::new());
        self.solid_color = None;
        self.painter_reported_memory_usage = 0;
    }

    /// Forget the recording and report an empty layer.
    pub fn set_empty_bounds(&mut self) {
        self.size = Size::default();
        self.clear_recording();
    }

    pub fn set_background_color(&mut self, color: Color) {
        self.background_color = color;
    }

    pub fn background_color(&self) -> Color {
        self.background_color
    }

    pub fn set_requires_clear(&mut self, requires_clear: bool) {
        self.requires_clear = requires_clear;
    }

    pub fn requires_clear(&self) -> bool {
        self.requires_clear
    }

    /// Takes effect at the next recording.
    pub fn set_generate_discardable_images_metadata(&mut self, generate: bool) {
        self.settings.generate_discardable_images_metadata = generate;
    }

    pub fn recorded_viewport(&self) -> Rect {
        self.recorded_viewport
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn is_solid_color(&self) -> bool {
        self.solid_color.is_some()
    }

    pub fn solid_color(&self) -> Option<Color> {
        self.solid_color
    }

    pub fn painter_reported_memory_usage(&self) -> usize {
        self.painter_reported_memory_usage
    }

    pub fn display_list(&self) -> Option<&Arc<DisplayList>> {
        self.display_list.as_ref()
    }

    /// Snapshot the current recording for playback on any thread.
    pub fn create_raster_source(&self, can_use_lcd_text: bool) -> Arc<RasterSource> {
        Arc::new(RasterSource {
            display_list: self.display_list.clone(),
            image_map: Arc::clone(&self.image_map),
            solid_color: self.solid_color,
            background_color: self.background_color,
            requires_clear: self.requires_clear,
            can_use_lcd_text,
            recorded_viewport: self.recorded_viewport,
            size: self.size,
            painter_reported_memory_usage: self.painter_reported_memory_usage,
            slow_down_raster_scale_factor: self.settings.slow_down_raster_scale_factor,
            clear_canvas_with_debug_color: self.settings.clear_canvas_with_debug_color,
            generation: next_generation(),
        })
    }
}

impl Default for RecordingSource {
    fn default() -> Self {
        Self::new(RecordingSettings::default())
    }
}

impl std::fmt::Debug for RecordingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSource")
            .field("size", &self.size)
            .field("recorded_viewport", &self.recorded_viewport)
            .field("has_recording", &self.display_list.is_some())
            .field("solid_color", &self.solid_color)
            .finish()
    }
}

fn expand_invalidation_for_new_viewport(old: &Rect, new: &Rect, invalidation: &mut Region) {
    let mut newly_exposed = Region::from(*new);
    newly_exposed.subtract_rect(old);
    invalidation.union(&newly_exposed);

    let mut no_longer_exposed = Region::from(*old);
    no_longer_exposed.subtract_rect(new);
    invalidation.union(&no_longer_exposed);
}
