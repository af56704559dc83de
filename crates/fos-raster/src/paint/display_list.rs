//! Display List
//!
//! Immutable, ordered drawing items. Each item carries the layer-space rect
//! it can touch, indexed by an R-tree so playback of a sub-rect only replays
//! the items that intersect it.

use super::{PaintCanvas, PaintOp};
use crate::Color;
use crate::geometry::{Rect, RectF};
use crate::image::{FilterQuality, PaintImage};
use crate::spatial_index::RTree;

/// A group of ops with the bounds they may draw into
#[derive(Debug, Clone)]
pub struct DisplayItem {
    pub visual_rect: Rect,
    pub ops: Vec<PaintOp>,
}

/// Recorded drawing for one recording generation
#[derive(Debug, Default)]
pub struct DisplayList {
    items: Vec<DisplayItem>,
    rtree: RTree<usize>,
    op_count: usize,
    has_images: bool,
}

impl DisplayList {
    pub fn builder() -> DisplayListBuilder {
        DisplayListBuilder::default()
    }

    pub fn items(&self) -> &[DisplayItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn op_count(&self) -> usize {
        self.op_count
    }

    pub fn has_discardable_images(&self) -> bool {
        self.has_images
    }

    /// Union of all item visual rects
    pub fn bounds(&self) -> Rect {
        self.rtree.bounds()
    }

    pub fn approximate_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.items.len() * std::mem::size_of::<DisplayItem>()
            + self.items.iter().flat_map(|item| &item.ops).map(PaintOp::approximate_bytes).sum::<usize>()
    }

    /// Replay every item, in order.
    pub fn raster(&self, canvas: &mut dyn PaintCanvas) {
        for item in &self.items {
            replay_item(item, canvas);
        }
    }

    /// Replay the items whose visual rect intersects `layer_rect`, in order.
    pub fn raster_in_rect(&self, canvas: &mut dyn PaintCanvas, layer_rect: &Rect) {
        for &index in self.rtree.search(layer_rect) {
            replay_item(&self.items[index], canvas);
        }
    }
}

fn replay_item(item: &DisplayItem, canvas: &mut dyn PaintCanvas) {
    // Items are isolated so an unbalanced save in one cannot leak.
    canvas.save();
    for op in &item.ops {
        op.replay(canvas);
    }
    canvas.restore();
}

/// Accumulates items for a [`DisplayList`]
#[derive(Debug, Default)]
pub struct DisplayListBuilder {
    items: Vec<DisplayItem>,
}

impl DisplayListBuilder {
    pub fn push_item(&mut self, visual_rect: Rect, ops: Vec<PaintOp>) -> &mut Self {
        self.items.push(DisplayItem { visual_rect, ops });
        self
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) -> &mut Self {
        self.push_item(rect, vec![PaintOp::FillRect { rect: RectF::from(rect), color }])
    }

    pub fn draw_image(&mut self, image: PaintImage, rect: Rect, quality: FilterQuality) -> &mut Self {
        self.push_item(rect, vec![PaintOp::DrawImage { image, dst: RectF::from(rect), quality }])
    }

    pub fn finish(self) -> DisplayList {
        let rtree = RTree::build(self.items.iter().enumerate().map(|(i, item)| (item.visual_rect, i)));
        let op_count = self.items.iter().map(|item| item.ops.len()).sum();
        let has_images = self.items.iter().flat_map(|item| &item.ops).any(PaintOp::is_image_draw);
        DisplayList { items: self.items, rtree, op_count, has_images }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::SolidColorAnalyzer;

    #[test]
    fn test_builder_counts() {
        let mut builder = DisplayList::builder();
        builder
            .fill_rect(Rect::new(0, 0, 10, 10), Color::RED)
            .fill_rect(Rect::new(100, 100, 10, 10), Color::BLUE);
        let list = builder.finish();

        assert_eq!(list.len(), 2);
        assert_eq!(list.op_count(), 2);
        assert_eq!(list.bounds(), Rect::new(0, 0, 110, 110));
        assert!(!list.has_discardable_images());
        assert!(list.approximate_bytes_used() > 0);
    }

    #[test]
    fn test_raster_in_rect_culls() {
        let mut builder = DisplayList::builder();
        builder
            .fill_rect(Rect::new(0, 0, 10, 10), Color::RED)
            .fill_rect(Rect::new(100, 100, 10, 10), Color::BLUE);
        let list = builder.finish();

        // Only the blue item touches the analysed rect.
        let mut analyzer = SolidColorAnalyzer::new(Rect::new(100, 100, 10, 10));
        list.raster_in_rect(&mut analyzer, &Rect::new(100, 100, 10, 10));
        assert_eq!(analyzer.solid_color(), Some(Color::BLUE));
    }
}
