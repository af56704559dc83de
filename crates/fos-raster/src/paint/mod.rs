//! Paint
//!
//! Recorded paint operations, display lists and the canvases they replay
//! into: a tiny-skia backed canvas for raster, an analysis canvas for
//! solid-color detection and (in [`crate::image`]) an image gathering canvas.

mod analysis;
mod display_list;
mod op;
mod skia_canvas;

pub use analysis::SolidColorAnalyzer;
pub use display_list::{DisplayItem, DisplayList, DisplayListBuilder};
pub use op::PaintOp;
pub use skia_canvas::SkiaCanvas;

use tiny_skia::Transform;

use crate::Color;
use crate::geometry::RectF;
use crate::image::{FilterQuality, PaintImage};

/// Drawing target for [`PaintOp`] replay
pub trait PaintCanvas {
    fn save(&mut self);
    fn restore(&mut self);
    fn translate(&mut self, dx: f32, dy: f32);
    fn scale(&mut self, sx: f32, sy: f32);
    fn concat(&mut self, matrix: &Transform);
    /// Intersect the clip with `rect` in local coordinates.
    fn clip_rect(&mut self, rect: &RectF);
    fn fill_rect(&mut self, rect: &RectF, color: Color);
    /// Fill the whole clip, blending over existing content.
    fn draw_color(&mut self, color: Color);
    /// Replace the whole clip with `color`.
    fn clear(&mut self, color: Color);
    fn draw_image(&mut self, image: &PaintImage, dst: &RectF, quality: FilterQuality);
}

#[derive(Debug, Clone, Copy)]
struct CanvasState {
    matrix: Transform,
    /// Device-space clip
    clip: RectF,
}

/// Matrix and clip stack shared by the canvases
#[derive(Debug, Clone)]
pub(crate) struct StateStack {
    current: CanvasState,
    saved: Vec<CanvasState>,
}

impl StateStack {
    pub(crate) fn new(device_bounds: RectF) -> Self {
        Self {
            current: CanvasState { matrix: Transform::identity(), clip: device_bounds },
            saved: Vec::new(),
        }
    }

    pub(crate) fn matrix(&self) -> &Transform {
        &self.current.matrix
    }

    pub(crate) fn clip(&self) -> &RectF {
        &self.current.clip
    }

    pub(crate) fn save(&mut self) {
        self.saved.push(self.current);
    }

    /// Unbalanced restores are ignored.
    pub(crate) fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.current = state;
        }
    }

    pub(crate) fn translate(&mut self, dx: f32, dy: f32) {
        self.current.matrix = self.current.matrix.pre_translate(dx, dy);
    }

    pub(crate) fn scale(&mut self, sx: f32, sy: f32) {
        self.current.matrix = self.current.matrix.pre_scale(sx, sy);
    }

    pub(crate) fn concat(&mut self, matrix: &Transform) {
        self.current.matrix = self.current.matrix.pre_concat(*matrix);
    }

    pub(crate) fn clip_rect(&mut self, rect: &RectF) {
        let device = map_rect(&self.current.matrix, rect);
        self.current.clip = self.current.clip.intersect(&device);
    }

    /// Device bounds of `rect` intersected with the clip.
    pub(crate) fn device_rect(&self, rect: &RectF) -> RectF {
        map_rect(&self.current.matrix, rect).intersect(&self.current.clip)
    }
}

pub(crate) fn is_scale_translate(matrix: &Transform) -> bool {
    matrix.kx == 0.0 && matrix.ky == 0.0
}

/// Bounds of `rect` mapped through `matrix`, as f64 `(left, top, right, bottom)`.
pub(crate) fn map_rect_f64(matrix: &Transform, rect: &RectF) -> (f64, f64, f64, f64) {
    let corners = [
        (rect.x as f64, rect.y as f64),
        (rect.x as f64 + rect.width as f64, rect.y as f64),
        (rect.x as f64, rect.y as f64 + rect.height as f64),
        (rect.x as f64 + rect.width as f64, rect.y as f64 + rect.height as f64),
    ];
    let (sx, kx, ky, sy) = (matrix.sx as f64, matrix.kx as f64, matrix.ky as f64, matrix.sy as f64);
    let (tx, ty) = (matrix.tx as f64, matrix.ty as f64);

    let mut bounds = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let mx = sx * x + kx * y + tx;
        let my = ky * x + sy * y + ty;
        bounds.0 = bounds.0.min(mx);
        bounds.1 = bounds.1.min(my);
        bounds.2 = bounds.2.max(mx);
        bounds.3 = bounds.3.max(my);
    }
    bounds
}

pub(crate) fn map_rect(matrix: &Transform, rect: &RectF) -> RectF {
    let (left, top, right, bottom) = map_rect_f64(matrix, rect);
    RectF::new(left as f32, top as f32, (right - left) as f32, (bottom - top) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_stack_save_restore() {
        let mut stack = StateStack::new(RectF::new(0.0, 0.0, 100.0, 100.0));
        stack.save();
        stack.translate(10.0, 10.0);
        stack.clip_rect(&RectF::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(*stack.clip(), RectF::new(10.0, 10.0, 20.0, 20.0));
        stack.restore();
        assert_eq!(*stack.clip(), RectF::new(0.0, 0.0, 100.0, 100.0));
        assert!(stack.matrix().is_identity());

        // Extra restores are harmless
        stack.restore();
    }

    #[test]
    fn test_map_rect_scale_translate() {
        let matrix = Transform::from_translate(5.0, 0.0).pre_scale(2.0, 3.0);
        let mapped = map_rect(&matrix, &RectF::new(1.0, 1.0, 2.0, 2.0));
        assert_eq!(mapped, RectF::new(7.0, 3.0, 4.0, 6.0));
    }
}
