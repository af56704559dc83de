//! Raster Buffers
//!
//! The backend seam of the tile pipeline. A [`RasterBufferProvider`]
//! advertises what it can do and hands out [`RasterBuffer`]s that a worker
//! plays a tile into; published buffers become resources addressed by
//! [`ResourceId`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::Color;
use crate::geometry::{Rect, Size};
use crate::raster::playback::{PixelFormat, playback_to_memory};
use crate::raster_source::{PlaybackSettings, RasterSource};
use crate::tiles::TileId;

/// Handle to a published raster result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub u64);

/// What a backend supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProviderCapabilities {
    /// Tiles can be rastered by playing back into a buffer. Without it tiles
    /// only become ready through solid-color analysis.
    pub canvas_playback: bool,
    /// Solid-color tiles are detected and drawn without a buffer.
    pub solid_color_analysis: bool,
}

/// Destination of one tile raster, filled on a worker thread.
pub trait RasterBuffer: Send {
    /// Play back `raster_dirty_rect` of the tile covering `raster_full_rect`
    /// (content space). Buffers without the previous content play back the
    /// full rect.
    fn playback(
        &mut self,
        raster_source: &RasterSource,
        raster_full_rect: &Rect,
        raster_dirty_rect: &Rect,
        new_content_id: TileId,
        contents_scale: f32,
        settings: &PlaybackSettings,
    );

    /// Publish the contents as a resource, or discard them.
    fn finish(self: Box<Self>, publish: bool) -> Option<ResourceId>;
}

/// Raster backend
pub trait RasterBufferProvider: Send + Sync {
    fn capabilities(&self) -> ProviderCapabilities;

    /// Buffer for a tile of `size`. When `previous_content_id` names a
    /// published resource of the same size, its pixels seed the buffer so
    /// only the damaged part needs playback.
    fn acquire_buffer_for_raster(
        &self,
        size: Size,
        new_content_id: TileId,
        previous_content_id: Option<TileId>,
    ) -> Box<dyn RasterBuffer>;

    fn release_buffer_for_raster(&self, buffer: Box<dyn RasterBuffer>, publish: bool) -> Option<ResourceId> {
        buffer.finish(publish)
    }

    fn delete_resource(&self, id: ResourceId);
}

/// Free pixel buffers keyed by dimensions
#[derive(Debug)]
struct BufferPool {
    free_buffers: HashMap<Size, Vec<Vec<u8>>>,
    max_per_size: usize,
    total_bytes: usize,
    max_bytes: usize,
    hits: u64,
    misses: u64,
}

impl BufferPool {
    fn new(max_per_size: usize, max_bytes: usize) -> Self {
        Self { free_buffers: HashMap::new(), max_per_size, total_bytes: 0, max_bytes, hits: 0, misses: 0 }
    }

    /// Zeroed RGBA buffer for `size`
    fn checkout(&mut self, size: Size) -> Vec<u8> {
        let len = size.area() as usize * 4;
        if let Some(mut buffer) = self.free_buffers.get_mut(&size).and_then(Vec::pop) {
            self.hits += 1;
            self.total_bytes -= buffer.len();
            buffer.fill(0);
            buffer.resize(len, 0);
            return buffer;
        }
        self.misses += 1;
        vec![0u8; len]
    }

    fn checkin(&mut self, size: Size, buffer: Vec<u8>) {
        let bytes = buffer.len();
        if self.total_bytes + bytes > self.max_bytes {
            return;
        }
        let pool = self.free_buffers.entry(size).or_default();
        if pool.len() >= self.max_per_size {
            return;
        }
        self.total_bytes += bytes;
        pool.push(buffer);
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferPoolStats {
    pub pooled_bytes: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub resources: usize,
}

/// A published bitmap, premultiplied RGBA
#[derive(Debug, Clone)]
pub struct BitmapResource {
    pub size: Size,
    /// Tile whose content this is
    pub content_id: TileId,
    pub pixels: Arc<Vec<u8>>,
}

impl BitmapResource {
    /// Premultiplied color at (`x`, `y`), `None` outside the bitmap.
    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        if x < 0 || y < 0 || x >= self.size.width || y >= self.size.height {
            return None;
        }
        let offset = (y as usize * self.size.width as usize + x as usize) * 4;
        let p = self.pixels.get(offset..offset + 4)?;
        Some(Color::rgba(p[0], p[1], p[2], p[3]))
    }
}

struct ProviderState {
    pool: BufferPool,
    resources: HashMap<ResourceId, BitmapResource>,
    next_resource_id: u64,
}

fn lock(state: &Mutex<ProviderState>) -> MutexGuard<'_, ProviderState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Software backend rastering into pooled memory
pub struct BitmapRasterBufferProvider {
    state: Arc<Mutex<ProviderState>>,
    capabilities: ProviderCapabilities,
}

impl BitmapRasterBufferProvider {
    /// 32 buffers per size, 64MB pooled at most
    pub fn new() -> Self {
        Self::with_pool_limits(32, 64 * 1024 * 1024)
    }

    pub fn with_pool_limits(max_per_size: usize, max_bytes: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState {
                pool: BufferPool::new(max_per_size, max_bytes),
                resources: HashMap::new(),
                next_resource_id: 1,
            })),
            capabilities: ProviderCapabilities { canvas_playback: true, solid_color_analysis: true },
        }
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Published resource `id`
    pub fn resource(&self, id: ResourceId) -> Option<BitmapResource> {
        lock(&self.state).resources.get(&id).cloned()
    }

    pub fn resource_count(&self) -> usize {
        lock(&self.state).resources.len()
    }

    pub fn stats(&self) -> BufferPoolStats {
        let state = lock(&self.state);
        let pool = &state.pool;
        let lookups = pool.hits + pool.misses;
        BufferPoolStats {
            pooled_bytes: pool.total_bytes,
            max_bytes: pool.max_bytes,
            hits: pool.hits,
            misses: pool.misses,
            hit_rate: if lookups > 0 { pool.hits as f64 / lookups as f64 } else { 0.0 },
            resources: state.resources.len(),
        }
    }
}

impl Default for BitmapRasterBufferProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterBufferProvider for BitmapRasterBufferProvider {
    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn acquire_buffer_for_raster(
        &self,
        size: Size,
        new_content_id: TileId,
        previous_content_id: Option<TileId>,
    ) -> Box<dyn RasterBuffer> {
        let mut state = lock(&self.state);
        let mut pixels = state.pool.checkout(size);
        let previous = previous_content_id.and_then(|id| {
            state.resources.values().find(|resource| resource.content_id == id && resource.size == size)
        });
        let has_previous_content = match previous {
            Some(resource) => {
                pixels.copy_from_slice(&resource.pixels);
                true
            }
            None => false,
        };
        tracing::trace!(tile = new_content_id, partial = has_previous_content, "acquired bitmap raster buffer");
        Box::new(BitmapRasterBuffer {
            state: Arc::clone(&self.state),
            pixels: Some(pixels),
            size,
            content_id: new_content_id,
            has_previous_content,
        })
    }

    fn delete_resource(&self, id: ResourceId) {
        let mut state = lock(&self.state);
        let Some(resource) = state.resources.remove(&id) else {
            return;
        };
        if let Ok(pixels) = Arc::try_unwrap(resource.pixels) {
            state.pool.checkin(resource.size, pixels);
        }
    }
}

impl std::fmt::Debug for BitmapRasterBufferProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitmapRasterBufferProvider")
            .field("capabilities", &self.capabilities)
            .field("stats", &self.stats())
            .finish()
    }
}

struct BitmapRasterBuffer {
    state: Arc<Mutex<ProviderState>>,
    /// Taken when published
    pixels: Option<Vec<u8>>,
    size: Size,
    content_id: TileId,
    has_previous_content: bool,
}

impl RasterBuffer for BitmapRasterBuffer {
    fn playback(
        &mut self,
        raster_source: &RasterSource,
        raster_full_rect: &Rect,
        raster_dirty_rect: &Rect,
        new_content_id: TileId,
        contents_scale: f32,
        settings: &PlaybackSettings,
    ) {
        let Some(pixels) = self.pixels.as_mut() else {
            return;
        };
        let playback_rect = if self.has_previous_content {
            raster_dirty_rect.intersect(raster_full_rect)
        } else {
            *raster_full_rect
        };
        let result = playback_to_memory(
            pixels,
            PixelFormat::Rgba8888,
            self.size,
            0,
            raster_source,
            raster_full_rect,
            &playback_rect,
            contents_scale,
            settings,
        );
        if let Err(error) = result {
            tracing::warn!(tile = new_content_id, %error, "tile playback failed");
        }
        self.content_id = new_content_id;
    }

    fn finish(mut self: Box<Self>, publish: bool) -> Option<ResourceId> {
        if !publish {
            return None;
        }
        let pixels = self.pixels.take()?;
        let mut state = lock(&self.state);
        let id = ResourceId(state.next_resource_id);
        state.next_resource_id += 1;
        state.resources.insert(
            id,
            BitmapResource { size: self.size, content_id: self.content_id, pixels: Arc::new(pixels) },
        );
        Some(id)
    }
}

impl Drop for BitmapRasterBuffer {
    fn drop(&mut self) {
        if let Some(pixels) = self.pixels.take() {
            lock(&self.state).pool.checkin(self.size, pixels);
        }
    }
}
