//! Discardable image tests for fos-raster
//!
//! Image placements recorded by painters, queried through the spatial index
//! and through raster source snapshots.

use fos_raster::image::FilterQuality;
use fos_raster::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const CELL: i32 = 512;
const GRID: i32 = 4;

/// 2048x2048 checkerboard: a 500x500 image in every cell where `x + y` is
/// odd, inset by 6 pixels.
struct CheckerboardPainter {
    images: Vec<Vec<Option<PaintImage>>>,
}

impl CheckerboardPainter {
    fn new() -> Self {
        let images = (0..GRID)
            .map(|y| {
                (0..GRID)
                    .map(|x| ((x + y) % 2 == 1).then(|| PaintImage::solid(500, 500, Color::rgb(x as u8 * 40, y as u8 * 40, 0))))
                    .collect()
            })
            .collect();
        Self { images }
    }

    fn image_at(&self, x: i32, y: i32) -> Option<&PaintImage> {
        self.images[y as usize][x as usize].as_ref()
    }
}

impl ContentLayerClient for CheckerboardPainter {
    fn paint_contents_to_display_list(&self, viewport: &Rect, _control: PaintingControl) -> DisplayList {
        let mut builder = DisplayList::builder();
        builder.fill_rect(*viewport, Color::WHITE);
        for y in 0..GRID {
            for x in 0..GRID {
                if let Some(image) = self.image_at(x, y) {
                    let rect = Rect::new(x * CELL + 6, y * CELL + 6, 500, 500);
                    builder.draw_image(image.clone(), rect, FilterQuality::Low);
                }
            }
        }
        builder.finish()
    }
}

fn layer_size() -> Size {
    Size::new(GRID * CELL, GRID * CELL)
}

// ============================================================================
// SPATIAL QUERIES
// ============================================================================

#[test]
fn test_checkerboard_cells_hold_one_image_or_none() {
    init_tracing();
    let painter = CheckerboardPainter::new();
    let size = layer_size();
    let display_list = painter.paint_contents_to_display_list(&Rect::from_size(size), PaintingControl::Normal);
    let map = DiscardableImageMap::generate(&display_list, size);
    assert_eq!(map.len(), 8);

    for y in 0..GRID {
        for x in 0..GRID {
            let cell = Rect::new(x * CELL, y * CELL, CELL, CELL);
            let images = map.get_discardable_images_in_rect(&cell);
            match painter.image_at(x, y) {
                Some(expected) => {
                    assert_eq!(images.len(), 1, "cell ({x}, {y})");
                    assert_eq!(images[0].image.id(), expected.id());
                    assert_eq!(images[0].rect, Rect::new(x * CELL + 6, y * CELL + 6, 500, 500));
                }
                None => assert!(images.is_empty(), "cell ({x}, {y})"),
            }
        }
    }
}

#[test]
fn test_query_spanning_cells_returns_recording_order() {
    let painter = CheckerboardPainter::new();
    let size = layer_size();
    let display_list = painter.paint_contents_to_display_list(&Rect::from_size(size), PaintingControl::Normal);
    let map = DiscardableImageMap::generate(&display_list, size);

    // Top row: cells (1, 0) and (3, 0) hold images.
    let images = map.get_discardable_images_in_rect(&Rect::new(0, 0, size.width, CELL));
    let ids: Vec<_> = images.iter().map(|positioned| positioned.image.id()).collect();
    let expected: Vec<_> = [1, 3].iter().map(|&x| painter.image_at(x, 0).unwrap().id()).collect();
    assert_eq!(ids, expected);

    // The 6 pixel inset keeps the gutter between cells empty.
    assert!(map.get_discardable_images_in_rect(&Rect::new(CELL, 0, 6, 6)).is_empty());
}

// ============================================================================
// RASTER SOURCE
// ============================================================================

#[test]
fn test_raster_source_exposes_recorded_images() {
    init_tracing();
    let painter = CheckerboardPainter::new();
    let size = layer_size();
    let mut recording = RecordingSource::new(RecordingSettings::default());
    let mut invalidation = Region::new();
    recording.update_and_expand_invalidation(
        &painter,
        &mut invalidation,
        size,
        &Rect::from_size(size),
        1,
        RecordingMode::Normal,
    );

    let source = recording.create_raster_source(true);
    assert!(source.has_discardable_images());
    let images = source.get_discardable_images_in_rect(&Rect::new(CELL, 0, CELL, CELL));
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].image.id(), painter.image_at(1, 0).unwrap().id());
}

#[test]
fn test_metadata_generation_can_be_disabled() {
    let painter = CheckerboardPainter::new();
    let size = layer_size();
    let mut recording = RecordingSource::new(RecordingSettings {
        generate_discardable_images_metadata: false,
        ..RecordingSettings::default()
    });
    let mut invalidation = Region::new();
    recording.update_and_expand_invalidation(
        &painter,
        &mut invalidation,
        size,
        &Rect::from_size(size),
        1,
        RecordingMode::Normal,
    );

    let source = recording.create_raster_source(true);
    assert!(!source.has_discardable_images());
    assert!(source.get_discardable_images_in_rect(&Rect::from_size(size)).is_empty());
}
