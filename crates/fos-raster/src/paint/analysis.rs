//! Solid Color Analysis
//!
//! Canvas that draws nothing and instead tracks whether everything painted
//! into a target rect so far amounts to a single color.

use tiny_skia::Transform;

use super::{PaintCanvas, StateStack, is_scale_translate};
use crate::Color;
use crate::geometry::{Rect, RectF};
use crate::image::{FilterQuality, PaintImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Analysis {
    Solid(Color),
    NotSolid,
}

/// Analysis canvas over a device-space target rect
#[derive(Debug, Clone)]
pub struct SolidColorAnalyzer {
    target: RectF,
    state: StateStack,
    analysis: Analysis,
    ops_seen: usize,
}

impl SolidColorAnalyzer {
    /// A fresh analyzer; the target starts out transparent.
    pub fn new(target: Rect) -> Self {
        let target = RectF::from(target);
        Self {
            target,
            state: StateStack::new(target),
            analysis: Analysis::Solid(Color::TRANSPARENT),
            ops_seen: 0,
        }
    }

    /// The single color covering the target, if there is one.
    pub fn solid_color(&self) -> Option<Color> {
        match self.analysis {
            Analysis::Solid(color) => Some(color),
            Analysis::NotSolid => None,
        }
    }

    pub fn is_solid_color(&self) -> bool {
        self.solid_color().is_some()
    }

    /// Drawing ops analysed so far
    pub fn ops_seen(&self) -> usize {
        self.ops_seen
    }

    /// Whether a draw of `local` covers the whole target. `None` when it
    /// misses the target entirely.
    fn coverage(&self, local: Option<&RectF>) -> Option<bool> {
        let clip = self.state.clip().intersect(&self.target);
        if clip.is_empty() {
            return None;
        }
        let drawn = match local {
            Some(rect) => self.state.device_rect(rect).intersect(&self.target),
            None => clip,
        };
        if drawn.is_empty() {
            return None;
        }
        let exact = local.is_none() || is_scale_translate(self.state.matrix());
        Some(exact && drawn.contains(&self.target))
    }

    fn paint(&mut self, local: Option<&RectF>, color: Color, replace: bool) {
        self.ops_seen += 1;
        let Some(covers) = self.coverage(local) else {
            return;
        };
        if covers {
            if replace || color.is_opaque() || self.analysis == Analysis::Solid(Color::TRANSPARENT) {
                self.analysis = Analysis::Solid(color);
            } else if color.a != 0 {
                self.analysis = Analysis::NotSolid;
            }
        } else if replace || color.a != 0 {
            self.analysis = Analysis::NotSolid;
        }
    }
}

impl PaintCanvas for SolidColorAnalyzer {
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
        self.paint(Some(rect), color, false);
    }

    fn draw_color(&mut self, color: Color) {
        self.paint(None, color, false);
    }

    fn clear(&mut self, color: Color) {
        self.paint(None, color, true);
    }

    fn draw_image(&mut self, _image: &PaintImage, dst: &RectF, _quality: FilterQuality) {
        self.ops_seen += 1;
        if self.coverage(Some(dst)).is_some() {
            self.analysis = Analysis::NotSolid;
        }
    }
}
