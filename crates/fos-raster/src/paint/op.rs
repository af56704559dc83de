//! Paint operations

use tiny_skia::Transform;

use super::PaintCanvas;
use crate::Color;
use crate::geometry::RectF;
use crate::image::{FilterQuality, PaintImage};

/// A recorded drawing command
#[derive(Debug, Clone)]
pub enum PaintOp {
    Save,
    Restore,
    Translate { dx: f32, dy: f32 },
    Scale { sx: f32, sy: f32 },
    Concat(Transform),
    ClipRect(RectF),
    FillRect { rect: RectF, color: Color },
    DrawColor(Color),
    DrawImage { image: PaintImage, dst: RectF, quality: FilterQuality },
}

impl PaintOp {
    pub fn replay(&self, canvas: &mut dyn PaintCanvas) {
        match self {
            PaintOp::Save => canvas.save(),
            PaintOp::Restore => canvas.restore(),
            PaintOp::Translate { dx, dy } => canvas.translate(*dx, *dy),
            PaintOp::Scale { sx, sy } => canvas.scale(*sx, *sy),
            PaintOp::Concat(matrix) => canvas.concat(matrix),
            PaintOp::ClipRect(rect) => canvas.clip_rect(rect),
            PaintOp::FillRect { rect, color } => canvas.fill_rect(rect, *color),
            PaintOp::DrawColor(color) => canvas.draw_color(*color),
            PaintOp::DrawImage { image, dst, quality } => canvas.draw_image(image, dst, *quality),
        }
    }

    pub fn is_image_draw(&self) -> bool {
        matches!(self, PaintOp::DrawImage { .. })
    }

    /// Inline size of the op. Ops own no heap data; image pixels live
    /// behind a shared generator and are not counted here.
    pub fn approximate_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_pixels_not_counted() {
        let small = PaintOp::DrawImage {
            image: PaintImage::solid(1, 1, Color::RED),
            dst: RectF::new(0.0, 0.0, 1.0, 1.0),
            quality: FilterQuality::Low,
        };
        let large = PaintOp::DrawImage {
            image: PaintImage::solid(512, 512, Color::RED),
            dst: RectF::new(0.0, 0.0, 512.0, 512.0),
            quality: FilterQuality::Low,
        };
        assert_eq!(small.approximate_bytes(), large.approximate_bytes());
        assert_eq!(PaintOp::Save.approximate_bytes(), std::mem::size_of::<PaintOp>());
    }
}
