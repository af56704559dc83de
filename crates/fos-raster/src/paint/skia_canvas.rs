//! tiny-skia Canvas
//!
//! [`PaintCanvas`] over a borrowed `PixmapMut`. Clips are device-space
//! rectangles, turned into a `Mask` only when they do not cover the whole
//! pixmap.

use std::sync::Arc;

use tiny_skia::{BlendMode, FillRule, Mask, Paint, PathBuilder, Pixmap, PixmapMut, PixmapPaint, Transform};

use super::{PaintCanvas, StateStack};
use crate::Color;
use crate::geometry::RectF;
use crate::image::{FilterQuality, ImageDecodeCache, PaintImage};

/// Raster canvas
pub struct SkiaCanvas<'a> {
    pixmap: PixmapMut<'a>,
    state: StateStack,
    device_bounds: RectF,
    /// Mask for `mask_clip`, rebuilt when the clip changes
    mask: Option<Mask>,
    mask_clip: RectF,
    skip_images: bool,
    image_provider: Option<Arc<ImageDecodeCache>>,
}

impl<'a> SkiaCanvas<'a> {
    pub fn new(pixmap: PixmapMut<'a>) -> Self {
        let device_bounds = RectF::new(0.0, 0.0, pixmap.width() as f32, pixmap.height() as f32);
        Self {
            pixmap,
            state: StateStack::new(device_bounds),
            device_bounds,
            mask: None,
            mask_clip: RectF::default(),
            skip_images: false,
            image_provider: None,
        }
    }

    /// Draw filter eliding image draws; everything else is unchanged.
    pub fn set_skip_images(&mut self, skip_images: bool) {
        self.skip_images = skip_images;
    }

    /// Source of decoded images. Without one, images decode on the spot.
    pub fn set_image_provider(&mut self, provider: Option<Arc<ImageDecodeCache>>) {
        self.image_provider = provider;
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Prepare the mask for the current clip. Returns false when nothing can
    /// be drawn.
    fn prepare_clip(&mut self) -> bool {
        let clip = *self.state.clip();
        if clip.is_empty() {
            return false;
        }
        if clip.contains(&self.device_bounds) {
            self.mask = None;
            self.mask_clip = self.device_bounds;
            return true;
        }
        if self.mask.is_some() && self.mask_clip == clip {
            return true;
        }

        let mask = Mask::new(self.pixmap.width(), self.pixmap.height()).and_then(|mut mask| {
            let path = PathBuilder::from_rect(clip.to_tiny_skia()?);
            mask.fill_path(&path, FillRule::Winding, false, Transform::identity());
            Some(mask)
        });
        match mask {
            Some(mask) => {
                self.mask = Some(mask);
                self.mask_clip = clip;
                true
            }
            None => false,
        }
    }

    fn fill_device_clip(&mut self, color: Color, blend_mode: BlendMode) {
        if !self.prepare_clip() {
            return;
        }
        let Some(rect) = self.state.clip().intersect(&self.device_bounds).to_tiny_skia() else {
            return;
        };
        let paint = solid_paint(color, blend_mode);
        self.pixmap.fill_rect(rect, &paint, Transform::identity(), self.mask.as_ref());
    }

    fn decoded_image(&self, image: &PaintImage) -> Option<Arc<Pixmap>> {
        let decoded = match &self.image_provider {
            Some(provider) => provider.get_decoded(image),
            None => image.decode().map(Arc::new),
        };
        match decoded {
            Ok(pixmap) => Some(pixmap),
            Err(err) => {
                tracing::warn!(image = image.id(), %err, "skipping undecodable image");
                None
            }
        }
    }
}

fn solid_paint(color: Color, blend_mode: BlendMode) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color.to_tiny_skia());
    paint.blend_mode = blend_mode;
    paint.anti_alias = false;
    paint
}

impl PaintCanvas for SkiaCanvas<'_> {
    fn save(&mut self) {
        self.state.save();
    }

    fn restore(&mut self) {
        self.state.restore();
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.state.translate(dx, dy);
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.state.scale(sx, sy);
    }

    fn concat(&mut self, matrix: &Transform) {
        self.state.concat(matrix);
    }

    fn clip_rect(&mut self, rect: &RectF) {
        self.state.clip_rect(rect);
    }

    fn fill_rect(&mut self, rect: &RectF, color: Color) {
        if self.state.device_rect(rect).is_empty() || !self.prepare_clip() {
            return;
        }
        let Some(rect) = rect.to_tiny_skia() else {
            return;
        };
        let paint = solid_paint(color, BlendMode::SourceOver);
        let matrix = *self.state.matrix();
        self.pixmap.fill_rect(rect, &paint, matrix, self.mask.as_ref());
    }

    fn draw_color(&mut self, color: Color) {
        self.fill_device_clip(color, BlendMode::SourceOver);
    }

    fn clear(&mut self, color: Color) {
        self.fill_device_clip(color, BlendMode::Source);
    }

    fn draw_image(&mut self, image: &PaintImage, dst: &RectF, quality: FilterQuality) {
        if self.skip_images || self.state.device_rect(dst).is_empty() || !self.prepare_clip() {
            return;
        }
        let Some(decoded) = self.decoded_image(image) else {
            return;
        };
        let sx = dst.width / decoded.width() as f32;
        let sy = dst.height / decoded.height() as f32;
        let transform = self.state.matrix().pre_translate(dst.x, dst.y).pre_scale(sx, sy);
        let paint = PixmapPaint { quality: quality.to_tiny_skia(), ..PixmapPaint::default() };
        let source: &Pixmap = &decoded;
        self.pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, transform, self.mask.as_ref());
    }
}

impl std::fmt::Debug for SkiaCanvas<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkiaCanvas")
            .field("width", &self.pixmap.width())
            .field("height", &self.pixmap.height())
            .field("clip", self.state.clip())
            .field("skip_images", &self.skip_images)
            .finish()
    }
}
