//! Discardable Image Map
//!
//! Spatial index from layer rects to the images a recording draws, built
//! once per recording by replaying the display list into a canvas that only
//! records image placements.

use tiny_skia::Transform;

use super::{FilterQuality, PaintImage, PositionImage};
use crate::Color;
use crate::geometry::{Rect, RectF, Size, saturate_i32};
use crate::paint::{DisplayList, PaintCanvas, StateStack, map_rect_f64};
use crate::spatial_index::RTree;

/// Images of one recording, queryable by layer rect
#[derive(Debug, Default)]
pub struct DiscardableImageMap {
    images: Vec<PositionImage>,
    rtree: RTree<usize>,
}

impl DiscardableImageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the images drawn by `display_list` within `bounds`.
    pub fn generate(display_list: &DisplayList, bounds: Size) -> Self {
        let mut map = Self::new();
        if display_list.has_discardable_images() {
            let mut generator = ScopedMetadataGenerator::new(&mut map, bounds);
            display_list.raster(generator.canvas());
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Every placement, in recording order
    pub fn all_images(&self) -> &[PositionImage] {
        &self.images
    }

    /// Placements whose rect intersects `rect`, in recording order.
    pub fn get_discardable_images_in_rect(&self, rect: &Rect) -> Vec<PositionImage> {
        self.rtree
            .search(rect)
            .into_iter()
            .map(|&index| self.images[index].clone())
            .collect()
    }

    fn finalize(&mut self, images: Vec<PositionImage>) {
        self.rtree = RTree::build(images.iter().enumerate().map(|(i, image)| (image.rect, i)));
        self.images = images;
        tracing::trace!(images = self.images.len(), "discardable image map finalized");
    }
}

/// Collects image placements for a [`DiscardableImageMap`] and finalizes the
/// map's index when dropped, however recording ends.
pub struct ScopedMetadataGenerator<'a> {
    map: &'a mut DiscardableImageMap,
    canvas: ImageGatheringCanvas,
}

impl<'a> ScopedMetadataGenerator<'a> {
    pub fn new(map: &'a mut DiscardableImageMap, bounds: Size) -> Self {
        Self { map, canvas: ImageGatheringCanvas::new(bounds) }
    }

    pub fn canvas(&mut self) -> &mut ImageGatheringCanvas {
        &mut self.canvas
    }
}

impl Drop for ScopedMetadataGenerator<'_> {
    fn drop(&mut self) {
        let images = std::mem::take(&mut self.canvas.images);
        self.map.finalize(images);
    }
}

/// Canvas recording where images land; every other op only updates state.
#[derive(Debug)]
pub struct ImageGatheringCanvas {
    state: StateStack,
    images: Vec<PositionImage>,
}

impl ImageGatheringCanvas {
    pub fn new(bounds: Size) -> Self {
        Self {
            state: StateStack::new(RectF::from(Rect::from_size(bounds))),
            images: Vec::new(),
        }
    }

    pub fn images(&self) -> &[PositionImage] {
        &self.images
    }
}

impl PaintCanvas for ImageGatheringCanvas {
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

    fn fill_rect(&mut self, _rect: &RectF, _color: Color) {}

    fn draw_color(&mut self, _color: Color) {}

    fn clear(&mut self, _color: Color) {}

    fn draw_image(&mut self, image: &PaintImage, dst: &RectF, quality: FilterQuality) {
        let matrix = *self.state.matrix();
        let clip = *self.state.clip();

        // Wide arithmetic: declared sizes may be far beyond i32 range.
        let (left, top, right, bottom) = map_rect_f64(&matrix, dst);
        let left = left.max(clip.x as f64);
        let top = top.max(clip.y as f64);
        let right = right.min(clip.x as f64 + clip.width as f64);
        let bottom = bottom.min(clip.y as f64 + clip.height as f64);
        if !(right > left && bottom > top) {
            return;
        }
        let rect = Rect::from_ltrb(
            saturate_i32(left.floor()),
            saturate_i32(top.floor()),
            saturate_i32(right.ceil()),
            saturate_i32(bottom.ceil()),
        );
        if rect.is_empty() {
            return;
        }

        let mut image_matrix = matrix.pre_translate(dst.x, dst.y);
        if image.width() > 0 && image.height() > 0 {
            image_matrix = image_matrix.pre_scale(
                dst.width / image.width() as f32,
                dst.height / image.height() as f32,
            );
        }
        self.images.push(PositionImage {
            image: image.clone(),
            rect,
            matrix: image_matrix,
            filter_quality: quality,
        });
    }
}
