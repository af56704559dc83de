//! Region
//!
//! A set of pixels stored as pairwise disjoint rectangles. Used for
//! invalidation tracking and coverage bookkeeping.

use crate::geometry::Rect;

/// Union of disjoint rects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rect>,
}

/// Pieces of `rect` not covered by `hole` (at most four).
fn subtract_rect_from(rect: &Rect, hole: &Rect, out: &mut Vec<Rect>) {
    if !rect.intersects(hole) {
        out.push(*rect);
        return;
    }
    let overlap = rect.intersect(hole);

    // Full-width bands above and below, then the sides of the middle band.
    if overlap.y > rect.y {
        out.push(Rect::from_ltrb(rect.x, rect.y, rect.right(), overlap.y));
    }
    if overlap.bottom() < rect.bottom() {
        out.push(Rect::from_ltrb(rect.x, overlap.bottom(), rect.right(), rect.bottom()));
    }
    if overlap.x > rect.x {
        out.push(Rect::from_ltrb(rect.x, overlap.y, overlap.x, overlap.bottom()));
    }
    if overlap.right() < rect.right() {
        out.push(Rect::from_ltrb(overlap.right(), overlap.y, rect.right(), overlap.bottom()));
    }
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn bounds(&self) -> Rect {
        self.rects.iter().fold(Rect::default(), |acc, rect| acc.union(rect))
    }

    /// Number of pixels covered, saturating.
    pub fn area(&self) -> u64 {
        self.rects.iter().fold(0u64, |acc, rect| acc.saturating_add(rect.area()))
    }

    pub fn union_rect(&mut self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        let mut pieces = vec![*rect];
        for existing in &self.rects {
            let mut remaining = Vec::with_capacity(pieces.len());
            for piece in &pieces {
                subtract_rect_from(piece, existing, &mut remaining);
            }
            pieces = remaining;
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }

    pub fn union(&mut self, other: &Region) {
        for rect in &other.rects {
            self.union_rect(rect);
        }
    }

    pub fn subtract_rect(&mut self, rect: &Rect) {
        if rect.is_empty() || self.is_empty() {
            return;
        }
        let mut remaining = Vec::with_capacity(self.rects.len());
        for existing in &self.rects {
            subtract_rect_from(existing, rect, &mut remaining);
        }
        self.rects = remaining;
    }

    pub fn subtract(&mut self, other: &Region) {
        for rect in &other.rects {
            self.subtract_rect(rect);
        }
    }

    pub fn intersect_rect(&mut self, rect: &Rect) {
        self.rects = self
            .rects
            .iter()
            .map(|existing| existing.intersect(rect))
            .filter(|piece| !piece.is_empty())
            .collect();
    }

    pub fn intersects(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|existing| existing.intersects(rect))
    }

    pub fn contains_rect(&self, rect: &Rect) -> bool {
        if rect.is_empty() {
            return false;
        }
        let mut remaining = vec![*rect];
        for existing in &self.rects {
            let mut next = Vec::with_capacity(remaining.len());
            for piece in &remaining {
                subtract_rect_from(piece, existing, &mut next);
            }
            remaining = next;
            if remaining.is_empty() {
                return true;
            }
        }
        false
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        let mut region = Region::new();
        region.union_rect(&rect);
        region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_disjoint(region: &Region) {
        let rects = region.rects();
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                assert!(!a.intersects(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn test_union_overlapping() {
        let mut region = Region::from(Rect::new(0, 0, 10, 10));
        region.union_rect(&Rect::new(5, 5, 10, 10));
        assert_disjoint(&region);
        assert_eq!(region.area(), 100 + 100 - 25);
        assert_eq!(region.bounds(), Rect::new(0, 0, 15, 15));
    }

    #[test]
    fn test_union_contained_is_noop() {
        let mut region = Region::from(Rect::new(0, 0, 10, 10));
        region.union_rect(&Rect::new(2, 2, 3, 3));
        assert_eq!(region.rects().len(), 1);
    }

    #[test]
    fn test_subtract_hole() {
        let mut region = Region::from(Rect::new(0, 0, 10, 10));
        region.subtract_rect(&Rect::new(3, 3, 4, 4));
        assert_disjoint(&region);
        assert_eq!(region.area(), 100 - 16);
        assert_eq!(region.rects().len(), 4);
        assert!(!region.intersects(&Rect::new(4, 4, 1, 1)));
        assert!(region.contains_rect(&Rect::new(0, 0, 10, 3)));
    }

    #[test]
    fn test_intersect_rect() {
        let mut region = Region::from(Rect::new(0, 0, 10, 10));
        region.union_rect(&Rect::new(20, 0, 10, 10));
        region.intersect_rect(&Rect::new(5, 0, 20, 5));
        assert_eq!(region.area(), 25 + 25);
    }

    #[test]
    fn test_contains_across_pieces() {
        let mut region = Region::from(Rect::new(0, 0, 5, 10));
        region.union_rect(&Rect::new(5, 0, 5, 10));
        assert!(region.contains_rect(&Rect::new(2, 2, 6, 6)));
        assert!(!region.contains_rect(&Rect::new(2, 2, 9, 6)));
    }
}
