//! Raster Source
//!
//! Immutable snapshot of a recording, shared through `Arc` with the raster
//! workers. Every method takes `&self`; playback never mutates the source.

use std::sync::Arc;

use crate::Color;
use crate::geometry::{Rect, RectF, Size, scale_to_enclosed_rect, scale_to_enclosing_rect};
use crate::image::{DiscardableImageMap, ImageDecodeCache, PositionImage};
use crate::paint::{DisplayList, PaintCanvas, SkiaCanvas, SolidColorAnalyzer};
use crate::recording_source::next_generation;
use crate::region::Region;

/// Painted where the canvas is cleared for debugging
const DEBUG_CLEAR_COLOR: Color = Color { r: 255, g: 0, b: 255, a: 64 };

/// Per-playback options
#[derive(Debug, Clone, Default)]
pub struct PlaybackSettings {
    /// Elide image draws; every other op still plays back
    pub skip_images: bool,
    /// Decoded images to draw from; without one images decode in place
    pub image_provider: Option<Arc<ImageDecodeCache>>,
}

/// Recorded content of one layer, ready for playback on any thread
pub struct RasterSource {
    pub(crate) display_list: Option<Arc<DisplayList>>,
    pub(crate) image_map: Arc<DiscardableImageMap>,
    pub(crate) solid_color: Option<Color>,
    pub(crate) background_color: Color,
    pub(crate) requires_clear: bool,
    pub(crate) can_use_lcd_text: bool,
    pub(crate) recorded_viewport: Rect,
    pub(crate) size: Size,
    pub(crate) painter_reported_memory_usage: usize,
    pub(crate) slow_down_raster_scale_factor: u32,
    pub(crate) clear_canvas_with_debug_color: bool,
    pub(crate) generation: u64,
}

impl RasterSource {
    /// Play back into `canvas`, whose pixel (0, 0) is `canvas_bitmap_rect`'s
    /// origin in content space. Only `canvas_playback_rect` is touched.
    pub fn playback_to_canvas(
        &self,
        canvas: &mut SkiaCanvas<'_>,
        canvas_bitmap_rect: &Rect,
        canvas_playback_rect: &Rect,
        contents_scale: f32,
        settings: &PlaybackSettings,
    ) {
        let playback_rect = canvas_playback_rect.intersect(canvas_bitmap_rect);
        if playback_rect.is_empty() {
            return;
        }
        canvas.set_skip_images(settings.skip_images);
        canvas.set_image_provider(settings.image_provider.clone());

        canvas.save();
        canvas.translate(-(canvas_bitmap_rect.x as f32), -(canvas_bitmap_rect.y as f32));
        canvas.clip_rect(&RectF::from(playback_rect));
        if self.clear_canvas_with_debug_color {
            canvas.clear(DEBUG_CLEAR_COLOR);
        }
        self.clear_for_playback(canvas, &playback_rect, contents_scale);

        canvas.scale(contents_scale, contents_scale);
        let layer_rect = scale_to_enclosing_rect(&playback_rect, 1.0 / contents_scale);
        self.raster_common(canvas, &layer_rect);
        canvas.restore();
    }

    /// Play back `content_rect` into a canvas other content shares; nothing
    /// is cleared first.
    pub fn playback_to_shared_canvas(
        &self,
        canvas: &mut SkiaCanvas<'_>,
        content_rect: &Rect,
        contents_scale: f32,
        settings: &PlaybackSettings,
    ) {
        canvas.set_skip_images(settings.skip_images);
        canvas.set_image_provider(settings.image_provider.clone());

        canvas.save();
        canvas.clip_rect(&RectF::from(*content_rect));
        canvas.scale(contents_scale, contents_scale);
        let layer_rect = scale_to_enclosing_rect(content_rect, 1.0 / contents_scale);
        self.raster_common(canvas, &layer_rect);
        canvas.restore();
    }

    fn clear_for_playback(&self, canvas: &mut SkiaCanvas<'_>, playback_rect: &Rect, contents_scale: f32) {
        if self.requires_clear {
            canvas.clear(Color::TRANSPARENT);
            return;
        }

        // Content is opaque where the recording draws; only pixels beyond the
        // layer's (fully covered) bounds need clearing.
        let content_bounds = scale_to_enclosed_rect(&Rect::from_size(self.size), contents_scale);
        let mut outside = Region::from(*playback_rect);
        outside.subtract_rect(&content_bounds);
        for rect in outside.rects() {
            canvas.save();
            canvas.clip_rect(&RectF::from(*rect));
            canvas.clear(Color::TRANSPARENT);
            canvas.restore();
        }
    }

    fn raster_common(&self, canvas: &mut dyn PaintCanvas, layer_rect: &Rect) {
        let Some(display_list) = &self.display_list else {
            return;
        };
        let repeat_count = 1 + self.slow_down_raster_scale_factor;
        for _ in 0..repeat_count {
            display_list.raster_in_rect(canvas, layer_rect);
        }
    }

    /// Solid color of `content_rect` at `contents_scale`, if it has one.
    pub fn perform_solid_color_analysis(&self, content_rect: &Rect, contents_scale: f32) -> Option<Color> {
        let layer_rect = scale_to_enclosing_rect(content_rect, 1.0 / contents_scale)
            .intersect(&Rect::from_size(self.size));
        if layer_rect.is_empty() {
            return None;
        }
        let mut analyzer = SolidColorAnalyzer::new(layer_rect);
        if let Some(display_list) = &self.display_list {
            display_list.raster_in_rect(&mut analyzer, &layer_rect);
        }
        analyzer.solid_color()
    }

    /// Images drawn within `layer_rect`, in recording order.
    pub fn get_discardable_images_in_rect(&self, layer_rect: &Rect) -> Vec<PositionImage> {
        self.image_map.get_discardable_images_in_rect(layer_rect)
    }

    pub fn has_discardable_images(&self) -> bool {
        !self.image_map.is_empty()
    }

    /// Whether the recording covers the part of `layer_rect` inside the
    /// layer.
    pub fn covers_rect(&self, layer_rect: &Rect) -> bool {
        if self.size.is_empty() {
            return false;
        }
        let bounded = layer_rect.intersect(&Rect::from_size(self.size));
        self.recorded_viewport.contains(&bounded)
    }

    pub fn has_recordings(&self) -> bool {
        self.display_list.is_some()
    }

    /// The same recording with LCD text disabled, as a new generation.
    pub fn create_clone_without_lcd_text(&self) -> Arc<RasterSource> {
        Arc::new(RasterSource {
            display_list: self.display_list.clone(),
            image_map: Arc::clone(&self.image_map),
            solid_color: self.solid_color,
            background_color: self.background_color,
            requires_clear: self.requires_clear,
            can_use_lcd_text: false,
            recorded_viewport: self.recorded_viewport,
            size: self.size,
            painter_reported_memory_usage: self.painter_reported_memory_usage,
            slow_down_raster_scale_factor: self.slow_down_raster_scale_factor,
            clear_canvas_with_debug_color: self.clear_canvas_with_debug_color,
            generation: next_generation(),
        })
    }

    pub fn is_solid_color(&self) -> bool {
        self.solid_color.is_some()
    }

    pub fn solid_color(&self) -> Option<Color> {
        self.solid_color
    }

    pub fn background_color(&self) -> Color {
        self.background_color
    }

    pub fn requires_clear(&self) -> bool {
        self.requires_clear
    }

    pub fn can_use_lcd_text(&self) -> bool {
        self.can_use_lcd_text
    }

    pub fn recorded_viewport(&self) -> Rect {
        self.recorded_viewport
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bytes held by the recording and reported by the painter
    pub fn memory_usage(&self) -> usize {
        let display_list = self.display_list.as_ref().map(|list| list.approximate_bytes_used()).unwrap_or(0);
        display_list.saturating_add(self.painter_reported_memory_usage)
    }
}

impl std::fmt::Debug for RasterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSource")
            .field("generation", &self.generation)
            .field("size", &self.size)
            .field("recorded_viewport", &self.recorded_viewport)
            .field("solid_color", &self.solid_color)
            .field("images", &self.image_map.len())
            .finish()
    }
}
