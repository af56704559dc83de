//! Images
//!
//! Deferred-decode images referenced by paint ops, their placement records
//! and the per-recording spatial index over them.

pub(crate) mod decode_cache;
mod discardable_image_map;

pub use decode_cache::{DecodeCacheStats, ImageDecodeCache};
pub use discardable_image_map::{DiscardableImageMap, ImageGatheringCanvas, ScopedMetadataGenerator};

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tiny_skia::{IntSize, Pixmap, Transform};

use crate::Color;
use crate::error::RasterError;
use crate::geometry::Rect;

/// Stable identity of a [`PaintImage`] across recordings
pub type PaintImageId = u64;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Produces the pixels of an image on demand.
pub trait ImageGenerator: Send + Sync {
    /// Decode into a premultiplied pixmap.
    fn generate(&self) -> Result<Pixmap, RasterError>;
}

/// Generator over encoded PNG/JPEG bytes
pub struct EncodedImageGenerator {
    data: Arc<[u8]>,
}

impl EncodedImageGenerator {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

impl ImageGenerator for EncodedImageGenerator {
    fn generate(&self) -> Result<Pixmap, RasterError> {
        let decoded = image::load_from_memory(&self.data)
            .map_err(|err| RasterError::ImageDecode(err.to_string()))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        // tiny-skia expects premultiplied RGBA
        let mut data = Vec::with_capacity(rgba.as_raw().len());
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            let alpha = a as f32 / 255.0;
            data.push((r as f32 * alpha).round() as u8);
            data.push((g as f32 * alpha).round() as u8);
            data.push((b as f32 * alpha).round() as u8);
            data.push(a);
        }

        IntSize::from_wh(width, height)
            .and_then(|size| Pixmap::from_vec(data, size))
            .ok_or(RasterError::PixmapAllocation { width, height })
    }
}

/// Generator filling the image with one color
struct SolidColorGenerator {
    width: u32,
    height: u32,
    color: Color,
}

impl ImageGenerator for SolidColorGenerator {
    fn generate(&self) -> Result<Pixmap, RasterError> {
        let mut pixmap = Pixmap::new(self.width, self.height)
            .ok_or(RasterError::PixmapAllocation { width: self.width, height: self.height })?;
        pixmap.fill(self.color.to_tiny_skia());
        Ok(pixmap)
    }
}

/// A deferred-decode image: declared size plus a generator.
#[derive(Clone)]
pub struct PaintImage {
    id: PaintImageId,
    width: u32,
    height: u32,
    generator: Arc<dyn ImageGenerator>,
}

impl PaintImage {
    pub fn new(width: u32, height: u32, generator: Arc<dyn ImageGenerator>) -> Self {
        Self {
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            generator,
        }
    }

    /// Image over encoded bytes. Only the header is read here.
    pub fn from_encoded(data: impl Into<Arc<[u8]>>) -> Result<Self, RasterError> {
        let data: Arc<[u8]> = data.into();
        let (width, height) = image::ImageReader::new(Cursor::new(&data[..]))
            .with_guessed_format()
            .map_err(|err| RasterError::ImageDecode(err.to_string()))?
            .into_dimensions()
            .map_err(|err| RasterError::ImageDecode(err.to_string()))?;
        Ok(Self::new(width, height, Arc::new(EncodedImageGenerator::new(data))))
    }

    /// Image of a single color
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        Self::new(width, height, Arc::new(SolidColorGenerator { width, height, color }))
    }

    pub fn id(&self) -> PaintImageId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes of the decoded, premultiplied RGBA pixels.
    pub fn decoded_size_bytes(&self) -> u64 {
        (self.width as u64).saturating_mul(self.height as u64).saturating_mul(4)
    }

    pub fn decode(&self) -> Result<Pixmap, RasterError> {
        self.generator.generate()
    }
}

impl PartialEq for PaintImage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PaintImage {}

impl std::fmt::Debug for PaintImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaintImage")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Resampling quality of an image draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterQuality {
    None,
    #[default]
    Low,
    Medium,
    High,
}

impl FilterQuality {
    pub fn to_tiny_skia(self) -> tiny_skia::FilterQuality {
        match self {
            FilterQuality::None => tiny_skia::FilterQuality::Nearest,
            FilterQuality::Low => tiny_skia::FilterQuality::Bilinear,
            FilterQuality::Medium | FilterQuality::High => tiny_skia::FilterQuality::Bicubic,
        }
    }
}

/// An image as placed by one draw of a recording
#[derive(Debug, Clone)]
pub struct PositionImage {
    pub image: PaintImage,
    /// Layer-space bounds after transform and clip
    pub rect: Rect,
    /// Transform from image space to layer space
    pub matrix: Transform,
    pub filter_quality: FilterQuality,
}
