//! Raster Pipeline Configuration

use crate::geometry::Size;

/// Recording behaviour of a [`RecordingSource`](crate::RecordingSource)
#[derive(Debug, Clone)]
pub struct RecordingSettings {
    /// Distance in layer pixels recorded beyond the visible rect
    pub pixel_record_distance: i32,

    /// Hysteresis margin: the recorded viewport is kept while the new one
    /// stays within it expanded by this many pixels
    pub min_pixels_exposed_before_rerecord: i32,

    /// Build the discardable image index for every recording
    pub generate_discardable_images_metadata: bool,

    /// Repeat every playback this many extra times (debugging aid, 0 = off)
    pub slow_down_raster_scale_factor: u32,

    /// Fill the canvas with a debug color before playback
    pub clear_canvas_with_debug_color: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            pixel_record_distance: 4000,
            min_pixels_exposed_before_rerecord: 512,
            generate_discardable_images_metadata: true,
            slow_down_raster_scale_factor: 0,
            clear_canvas_with_debug_color: false,
        }
    }
}

/// Tiling and tile priority parameters
#[derive(Debug, Clone)]
pub struct TilingSettings {
    /// Size of a tile in content pixels
    pub default_tile_size: Size,

    /// Interest area padding around the visible rect, in screen pixels
    pub tiling_interest_area_padding: i32,

    /// How far ahead (seconds) the skewport extrapolates scrolling
    pub skewport_target_time_in_seconds: f32,

    /// Upper bound on skewport extrapolation, in screen pixels
    pub skewport_extrapolation_limit_in_screen_pixels: i32,

    /// Maximum number of tiles scheduled per `prepare_tiles`
    pub max_tiles_for_interest_area: usize,

    /// Soon border as a fraction of the larger viewport dimension
    pub soon_border_distance_viewport_percentage: f32,

    /// Cap on the soon border, in screen pixels
    pub max_soon_border_distance_in_screen_pixels: f32,
}

impl Default for TilingSettings {
    fn default() -> Self {
        Self {
            default_tile_size: Size::new(256, 256),
            tiling_interest_area_padding: 3000,
            skewport_target_time_in_seconds: 1.0,
            skewport_extrapolation_limit_in_screen_pixels: 2000,
            max_tiles_for_interest_area: 128,
            soon_border_distance_viewport_percentage: 0.15,
            max_soon_border_distance_in_screen_pixels: 312.0,
        }
    }
}

/// Priorities of the task graph nodes built by the
/// [`TileManager`](crate::TileManager). Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingPriorities {
    pub required_for_activation_done: u32,
    pub required_for_draw_done: u32,
    pub all_done: u32,
    /// Raster and decode tasks get `raster_base` plus their rank
    pub raster_base: u32,
}

impl Default for SchedulingPriorities {
    fn default() -> Self {
        Self {
            required_for_activation_done: 1,
            required_for_draw_done: 2,
            all_done: 3,
            raster_base: 10,
        }
    }
}
