//! Geometry
//!
//! Integer and float rectangles in layer or content space. Integer edges are
//! computed with saturating arithmetic so huge declared sizes clamp instead of
//! wrapping.

/// Clamp a float into `i32`. NaN becomes 0.
pub fn saturate_i32(value: f64) -> i32 {
    if value.is_nan() {
        0
    } else {
        value.clamp(i32::MIN as f64, i32::MAX as f64) as i32
    }
}

/// Integer size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Area in pixels; zero for empty sizes.
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        self.width as u64 * self.height as u64
    }
}

/// Integer axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Negative extents are clamped to zero.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width: if width < 0 { 0 } else { width },
            height: if height < 0 { 0 } else { height },
        }
    }

    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        let width = (right as i64 - left as i64).clamp(0, i32::MAX as i64) as i32;
        let height = (bottom as i64 - top as i64).clamp(0, i32::MAX as i64) as i32;
        Self::new(left, top, width, height)
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> u64 {
        self.size().area()
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Whether `other` lies entirely inside. Empty rects are contained by
    /// every non-empty rect.
    pub fn contains(&self, other: &Rect) -> bool {
        if self.is_empty() {
            return false;
        }
        if other.is_empty() {
            return true;
        }
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Overlap of the two rects, empty when they do not intersect.
    pub fn intersect(&self, other: &Rect) -> Rect {
        if !self.intersects(other) {
            return Rect::default();
        }
        Rect::from_ltrb(
            self.x.max(other.x),
            self.y.max(other.y),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        )
    }

    /// Smallest rect containing both. Empty inputs are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_ltrb(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x.saturating_add(dx), self.y.saturating_add(dy), self.width, self.height)
    }

    /// Grow every edge by `amount` (shrinks for negative amounts).
    pub fn outset(&self, amount: i32) -> Rect {
        Rect::from_ltrb(
            self.x.saturating_sub(amount),
            self.y.saturating_sub(amount),
            self.right().saturating_add(amount),
            self.bottom().saturating_add(amount),
        )
    }

    pub fn inset(&self, amount: i32) -> Rect {
        self.outset(amount.saturating_neg())
    }

    /// Sum of the horizontal and vertical gaps between the rects. Zero when
    /// they overlap; adjacent rects are one apart.
    pub fn manhattan_internal_distance(&self, other: &Rect) -> i64 {
        let left = self.x.min(other.x) as i64;
        let top = self.y.min(other.y) as i64;
        let right = self.right().max(other.right()) as i64;
        let bottom = self.bottom().max(other.bottom()) as i64;

        let x = (right - left - self.width as i64 - other.width as i64 + 1).max(0);
        let y = (bottom - top - self.height as i64 - other.height as i64 + 1).max(0);
        x + y
    }
}

/// Float axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn scale(&self, sx: f32, sy: f32) -> RectF {
        RectF::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }

    pub fn intersect(&self, other: &RectF) -> RectF {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return RectF::default();
        }
        RectF::new(left, top, right - left, bottom - top)
    }

    pub fn contains(&self, other: &RectF) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Smallest integer rect covering this one.
    pub fn to_enclosing_rect(&self) -> Rect {
        let left = saturate_i32((self.x as f64).floor());
        let top = saturate_i32((self.y as f64).floor());
        let right = saturate_i32((self.x as f64 + self.width as f64).ceil());
        let bottom = saturate_i32((self.y as f64 + self.height as f64).ceil());
        Rect::from_ltrb(left, top, right, bottom)
    }

    /// Largest integer rect inside this one.
    pub fn to_enclosed_rect(&self) -> Rect {
        let left = saturate_i32((self.x as f64).ceil());
        let top = saturate_i32((self.y as f64).ceil());
        let right = saturate_i32((self.x as f64 + self.width as f64).floor());
        let bottom = saturate_i32((self.y as f64 + self.height as f64).floor());
        Rect::from_ltrb(left, top, right, bottom)
    }

    pub fn to_tiny_skia(&self) -> Option<tiny_skia::Rect> {
        tiny_skia::Rect::from_xywh(self.x, self.y, self.width, self.height)
    }
}

impl From<Rect> for RectF {
    fn from(rect: Rect) -> Self {
        RectF::new(rect.x as f32, rect.y as f32, rect.width as f32, rect.height as f32)
    }
}

pub fn scale_to_enclosing_rect(rect: &Rect, scale: f32) -> Rect {
    if scale == 1.0 {
        return *rect;
    }
    let left = saturate_i32((rect.x as f64 * scale as f64).floor());
    let top = saturate_i32((rect.y as f64 * scale as f64).floor());
    let right = saturate_i32((rect.right() as f64 * scale as f64).ceil());
    let bottom = saturate_i32((rect.bottom() as f64 * scale as f64).ceil());
    Rect::from_ltrb(left, top, right, bottom)
}

pub fn scale_to_enclosed_rect(rect: &Rect, scale: f32) -> Rect {
    if scale == 1.0 {
        return *rect;
    }
    let left = saturate_i32((rect.x as f64 * scale as f64).ceil());
    let top = saturate_i32((rect.y as f64 * scale as f64).ceil());
    let right = saturate_i32((rect.right() as f64 * scale as f64).floor());
    let bottom = saturate_i32((rect.bottom() as f64 * scale as f64).floor());
    Rect::from_ltrb(left, top, right, bottom)
}

pub fn scale_to_ceiled_size(size: Size, scale: f32) -> Size {
    if scale == 1.0 {
        return size;
    }
    Size::new(
        saturate_i32((size.width as f64 * scale as f64).ceil()),
        saturate_i32((size.height as f64 * scale as f64).ceil()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect_and_union() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Rect::new(5, 5, 5, 5));
        assert_eq!(a.union(&b), Rect::new(0, 0, 15, 15));
        assert!(a.intersect(&Rect::new(10, 0, 5, 5)).is_empty());
        assert_eq!(Rect::default().union(&b), b);
    }

    #[test]
    fn test_saturating_edges() {
        let huge = Rect::new(i32::MAX - 10, 0, 100, 100);
        assert_eq!(huge.right(), i32::MAX);
        assert_eq!(Rect::new(0, 0, i32::MAX, i32::MAX).area(), i32::MAX as u64 * i32::MAX as u64);
        assert_eq!(Rect::new(0, 0, 10, 10).outset(i32::MAX).x, i32::MIN + 1);
    }

    #[test]
    fn test_contains() {
        let outer = Rect::new(0, 0, 100, 100);
        assert!(outer.contains(&Rect::new(10, 10, 90, 90)));
        assert!(!outer.contains(&Rect::new(10, 10, 91, 90)));
        assert!(!Rect::default().contains(&Rect::default()));
    }

    #[test]
    fn test_manhattan_internal_distance() {
        let a = Rect::new(0, 0, 10, 10);
        assert_eq!(a.manhattan_internal_distance(&Rect::new(5, 5, 10, 10)), 0);
        assert_eq!(a.manhattan_internal_distance(&Rect::new(10, 0, 10, 10)), 1);
        assert_eq!(a.manhattan_internal_distance(&Rect::new(20, 20, 10, 10)), 22);
    }

    #[test]
    fn test_scaling() {
        let rect = Rect::new(1, 1, 3, 3);
        assert_eq!(scale_to_enclosing_rect(&rect, 0.5), Rect::from_ltrb(0, 0, 2, 2));
        assert_eq!(scale_to_enclosed_rect(&rect, 0.5), Rect::from_ltrb(1, 1, 2, 2));
        assert_eq!(scale_to_ceiled_size(Size::new(3, 5), 0.5), Size::new(2, 3));
        assert_eq!(scale_to_enclosing_rect(&rect, 1e12), Rect::from_ltrb(i32::MAX, i32::MAX, i32::MAX, i32::MAX));
    }

    #[test]
    fn test_enclosing_float_rect() {
        let rect = RectF::new(0.5, 1.25, 2.0, 2.0);
        assert_eq!(rect.to_enclosing_rect(), Rect::from_ltrb(0, 1, 3, 4));
        assert_eq!(rect.to_enclosed_rect(), Rect::from_ltrb(1, 2, 2, 3));
        assert_eq!(saturate_i32(f64::NAN), 0);
    }
}
