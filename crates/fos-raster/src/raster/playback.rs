//! Playback to Memory
//!
//! Raster a [`RasterSource`] into caller-owned pixel memory. RGBA8888 with a
//! tight stride is drawn in place; other layouts go through a temporary
//! surface and are converted.

use tiny_skia::{Pixmap, PixmapMut};

use crate::error::RasterError;
use crate::geometry::{Rect, Size};
use crate::paint::SkiaCanvas;
use crate::raster_source::{PlaybackSettings, RasterSource};

/// Layout of destination pixels. All formats hold premultiplied alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8888,
    Bgra8888,
    /// 16-bit, `r` in the high nibble, stored little-endian
    Rgba4444,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => 4,
            PixelFormat::Rgba4444 => 2,
        }
    }
}

/// Play back `canvas_playback_rect` of `raster_source` into `memory`.
///
/// `memory` holds `size` pixels laid out in rows of `stride` bytes (0 means
/// tightly packed) and maps to `canvas_bitmap_rect` in content space. Pixels
/// outside the playback rect are left untouched.
#[allow(clippy::too_many_arguments)]
pub fn playback_to_memory(
    memory: &mut [u8],
    format: PixelFormat,
    size: Size,
    stride: usize,
    raster_source: &RasterSource,
    canvas_bitmap_rect: &Rect,
    canvas_playback_rect: &Rect,
    contents_scale: f32,
    settings: &PlaybackSettings,
) -> Result<(), RasterError> {
    if size.is_empty() {
        return Err(RasterError::EmptyTarget);
    }
    let width = size.width as usize;
    let height = size.height as usize;
    let row_bytes = width.checked_mul(format.bytes_per_pixel()).ok_or(RasterError::BufferTooSmall {
        required: usize::MAX,
        actual: memory.len(),
    })?;
    let stride = if stride == 0 { row_bytes } else { stride };
    if stride < row_bytes {
        return Err(RasterError::InvalidStride { stride, row_bytes });
    }
    // Layouts past the address space can never fit.
    let required = stride
        .checked_mul(height - 1)
        .and_then(|rows| rows.checked_add(row_bytes))
        .unwrap_or(usize::MAX);
    if memory.len() < required {
        return Err(RasterError::BufferTooSmall { required, actual: memory.len() });
    }

    let allocation_error = RasterError::PixmapAllocation { width: size.width as u32, height: size.height as u32 };
    if format == PixelFormat::Rgba8888 && stride == row_bytes {
        let pixmap = PixmapMut::from_bytes(&mut memory[..required], size.width as u32, size.height as u32)
            .ok_or(allocation_error)?;
        let mut canvas = SkiaCanvas::new(pixmap);
        raster_source.playback_to_canvas(
            &mut canvas,
            canvas_bitmap_rect,
            canvas_playback_rect,
            contents_scale,
            settings,
        );
        return Ok(());
    }

    let mut pixmap = Pixmap::new(size.width as u32, size.height as u32).ok_or(allocation_error)?;
    {
        let mut canvas = SkiaCanvas::new(pixmap.as_mut());
        raster_source.playback_to_canvas(
            &mut canvas,
            canvas_bitmap_rect,
            canvas_playback_rect,
            contents_scale,
            settings,
        );
    }

    // Only the played back pixels are converted.
    let dirty = canvas_playback_rect
        .intersect(canvas_bitmap_rect)
        .offset(-canvas_bitmap_rect.x, -canvas_bitmap_rect.y)
        .intersect(&Rect::from_size(size));
    if dirty.is_empty() {
        return Ok(());
    }
    let source = pixmap.data();
    let bpp = format.bytes_per_pixel();
    let (left, right) = (dirty.x as usize, dirty.right() as usize);
    for y in dirty.y as usize..dirty.bottom() as usize {
        let src = &source[y * width * 4 + left * 4..y * width * 4 + right * 4];
        let dst = &mut memory[y * stride + left * bpp..y * stride + right * bpp];
        convert_row(src, dst, format);
    }
    Ok(())
}

/// Convert premultiplied RGBA8888 pixels into `format`.
fn convert_row(src: &[u8], dst: &mut [u8], format: PixelFormat) {
    match format {
        PixelFormat::Rgba8888 => dst.copy_from_slice(src),
        PixelFormat::Bgra8888 => {
            for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                d.copy_from_slice(&[s[2], s[1], s[0], s[3]]);
            }
        }
        PixelFormat::Rgba4444 => {
            for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(2)) {
                let packed = (u16::from(s[0] >> 4) << 12)
                    | (u16::from(s[1] >> 4) << 8)
                    | (u16::from(s[2] >> 4) << 4)
                    | u16::from(s[3] >> 4);
                d.copy_from_slice(&packed.to_le_bytes());
            }
        }
    }
}
