//! fOS Raster
//!
//! Tiled rasterization for the fOS compositor:
//! - Recording painter output into display lists ([`RecordingSource`])
//! - Immutable, thread-shared playback snapshots ([`RasterSource`])
//! - Spatial indexing of deferred-decode images ([`DiscardableImageMap`])
//! - Multi-scale tilings across the pending/active trees ([`TilingSet`])
//! - Dependency-aware raster scheduling ([`TileManager`])

pub mod config;
pub mod error;
pub mod geometry;
pub mod image;
pub mod paint;
pub mod raster;
mod raster_source;
mod recording_source;
pub mod region;
pub mod spatial_index;
pub mod tiles;

pub use config::{RecordingSettings, SchedulingPriorities, TilingSettings};
pub use error::{RasterError, TilingError};
pub use geometry::{Rect, RectF, Size};
pub use image::{DiscardableImageMap, ImageDecodeCache, PaintImage, PositionImage};
pub use paint::{DisplayList, DisplayListBuilder, PaintCanvas, PaintOp};
pub use raster::{BitmapRasterBufferProvider, PixelFormat, RasterBufferProvider, TileManager, playback_to_memory};
pub use raster_source::{PlaybackSettings, RasterSource};
pub use recording_source::{ContentLayerClient, PaintingControl, RecordingMode, RecordingSource};
pub use region::Region;
pub use tiles::{CoverageIterator, Tile, TileId, Tiling, TilingHandle, TilingSet};

/// RGBA color, straight (not premultiplied) alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const GREEN: Color = Color { r: 0, g: 255, b: 0, a: 255 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255, a: 255 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }

    pub fn to_tiny_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}
