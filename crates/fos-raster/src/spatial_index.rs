//! Spatial Index
//!
//! Packed R-tree over rectangles. Items are grouped in insertion order, so a
//! query visits them in the order they were added and results come back in
//! recording order without sorting.

use crate::geometry::Rect;

/// Children per node
const BRANCHING: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Branch {
    bounds: Rect,
    /// Child range in the level below (or in `items` for level 0)
    start: usize,
    end: usize,
}

/// Immutable R-tree mapping rects to payloads
#[derive(Debug, Clone)]
pub struct RTree<T> {
    items: Vec<(Rect, T)>,
    levels: Vec<Vec<Branch>>,
}

impl<T> Default for RTree<T> {
    fn default() -> Self {
        Self { items: Vec::new(), levels: Vec::new() }
    }
}

fn group(bounds: impl ExactSizeIterator<Item = Rect>) -> Vec<Branch> {
    let bounds: Vec<Rect> = bounds.collect();
    bounds
        .chunks(BRANCHING)
        .enumerate()
        .map(|(i, chunk)| Branch {
            bounds: chunk.iter().fold(Rect::default(), |acc, rect| acc.union(rect)),
            start: i * BRANCHING,
            end: i * BRANCHING + chunk.len(),
        })
        .collect()
}

impl<T> RTree<T> {
    /// Build the tree. Items with empty rects are dropped.
    pub fn build(items: impl IntoIterator<Item = (Rect, T)>) -> Self {
        let items: Vec<(Rect, T)> = items.into_iter().filter(|(rect, _)| !rect.is_empty()).collect();
        if items.is_empty() {
            return Self::default();
        }

        let mut levels = vec![group(items.iter().map(|(rect, _)| *rect))];
        while levels.last().map_or(false, |level| level.len() > 1) {
            let below = &levels[levels.len() - 1];
            let next = group(below.iter().map(|branch| branch.bounds));
            levels.push(next);
        }
        Self { items, levels }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Union of every indexed rect.
    pub fn bounds(&self) -> Rect {
        self.levels
            .last()
            .and_then(|top| top.first())
            .map(|root| root.bounds)
            .unwrap_or_default()
    }

    /// Payloads whose rect intersects `query`, in insertion order.
    pub fn search(&self, query: &Rect) -> Vec<&T> {
        let mut results = Vec::new();
        self.search_with_rects(query, |_, payload| results.push(payload));
        results
    }

    /// Visit `(rect, payload)` for every intersecting item, in insertion order.
    pub fn search_with_rects<'a>(&'a self, query: &Rect, mut visit: impl FnMut(&'a Rect, &'a T)) {
        if query.is_empty() || self.levels.is_empty() {
            return;
        }
        let top = self.levels.len() - 1;
        self.search_level(top, 0, self.levels[top].len(), query, &mut visit);
    }

    fn search_level<'a>(
        &'a self,
        level: usize,
        start: usize,
        end: usize,
        query: &Rect,
        visit: &mut impl FnMut(&'a Rect, &'a T),
    ) {
        for branch in &self.levels[level][start..end] {
            if !branch.bounds.intersects(query) {
                continue;
            }
            if level == 0 {
                for (rect, payload) in &self.items[branch.start..branch.end] {
                    if rect.intersects(query) {
                        visit(rect, payload);
                    }
                }
            } else {
                self.search_level(level - 1, branch.start, branch.end, query, visit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree() {
        let tree: RTree<usize> = RTree::build(Vec::new());
        assert!(tree.is_empty());
        assert!(tree.search(&Rect::new(0, 0, 100, 100)).is_empty());
        assert!(tree.bounds().is_empty());
    }

    #[test]
    fn test_empty_rects_skipped() {
        let tree = RTree::build(vec![(Rect::new(0, 0, 0, 10), 0), (Rect::new(0, 0, 10, 10), 1)]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.search(&Rect::new(0, 0, 5, 5)), vec![&1]);
    }

    #[test]
    fn test_matches_linear_scan_in_order() {
        // Enough items for three levels
        let items: Vec<(Rect, usize)> = (0..100)
            .map(|i| {
                let x = ((i * 37) % 50) as i32 * 20;
                let y = ((i * 11) % 30) as i32 * 20;
                (Rect::new(x, y, 25, 25), i)
            })
            .collect();
        let tree = RTree::build(items.clone());

        for query in [
            Rect::new(0, 0, 100, 100),
            Rect::new(333, 210, 7, 300),
            Rect::new(-50, -50, 2000, 2000),
            Rect::new(990, 590, 100, 100),
        ] {
            let expected: Vec<usize> = items
                .iter()
                .filter(|(rect, _)| rect.intersects(&query))
                .map(|(_, i)| *i)
                .collect();
            let found: Vec<usize> = tree.search(&query).into_iter().copied().collect();
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn test_bounds() {
        let tree = RTree::build(vec![(Rect::new(0, 0, 10, 10), ()), (Rect::new(90, 90, 10, 10), ())]);
        assert_eq!(tree.bounds(), Rect::new(0, 0, 100, 100));
    }
}
