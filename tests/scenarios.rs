// End-to-end scenarios over the public API
use image::{Rgba, RgbaImage};
use std::collections::HashSet;
use stitchkit::{
    extract_palette_from_image, ChartDocument, ExtractionConfig, FillConfig, FillRequest,
    FillState, GridPoint, Palette, Placement, QuantizeConfig,
};

const RED: u16 = 1;
const BLUE: u16 = 2;

fn split_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    })
}

fn gradient_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        let b = ((x + y) * 7 % 256) as u8;
        Rgba([r, g, b, 255])
    })
}

fn assert_split(doc: &ChartDocument) {
    let grid = doc.grid();
    for y in 0..10 {
        for x in 0..10 {
            let expected = if x < 5 { RED } else { BLUE };
            assert_eq!(grid.get(x, y), Some(expected), "cell ({}, {})", x, y);
        }
    }
}

#[test]
fn split_image_quantizes_exactly() {
    let palette = Palette::from_json(
        r##"[{"id":1,"hex":"#FF0000","name":"Red"},{"id":2,"hex":"#0000FF","name":"Blue"}]"##,
    )
    .unwrap();
    let config = QuantizeConfig {
        max_colors: 2,
        ..Default::default()
    };
    let mut doc = ChartDocument::new(10, 10).unwrap();
    assert!(doc.quantize_image(&split_image(10, 10), &palette, &Placement::identity(), &config));
    assert_split(&doc);
}

#[test]
fn split_image_picks_matching_threads_from_larger_palette() {
    let palette = Palette::from_json(
        r##"[
            {"id":1,"hex":"#FF0000"},
            {"id":2,"hex":"#0000FF"},
            {"id":3,"hex":"#00FF00"},
            {"id":4,"hex":"#FFFF00"},
            {"id":5,"hex":"#202020"}
        ]"##,
    )
    .unwrap();
    let config = QuantizeConfig {
        max_colors: 2,
        ..Default::default()
    };
    let mut doc = ChartDocument::new(10, 10).unwrap();
    assert!(doc.quantize_image(&split_image(10, 10), &palette, &Placement::identity(), &config));
    assert_split(&doc);
}

#[test]
fn quantization_is_stable() {
    let palette = Palette::from_json(
        r##"[
            {"id":1,"hex":"#FF0000"},
            {"id":2,"hex":"#00FF00"},
            {"id":3,"hex":"#0000FF"},
            {"id":4,"hex":"#FFFFFF"},
            {"id":5,"hex":"#000000"},
            {"id":6,"hex":"#808080"}
        ]"##,
    )
    .unwrap();
    let image = gradient_image(64, 48);
    let placement = Placement::fit(32, 24, 64, 48, 2.0);
    let config = QuantizeConfig {
        max_colors: 4,
        smoothing_strength: 0.8,
        ..Default::default()
    };

    let mut doc = ChartDocument::new(32, 24).unwrap();
    assert!(doc.quantize_image(&image, &palette, &placement, &config));
    let first = doc.grid().clone();
    assert!(first.cells().iter().all(|&c| c != 0));

    doc.quantize_image(&image, &palette, &placement, &config);
    assert_eq!(doc.grid().cells(), first.cells());
    assert!(doc.used_colors(None).len() <= 4);
}

#[test]
fn fill_covers_empty_grid_in_one_call() {
    let mut doc = ChartDocument::new(50, 50).unwrap();
    let pending = doc.begin_fill(&FillRequest::new(GridPoint::new(31, 7), 5));
    assert!(pending.is_none());
    assert_eq!(doc.grid().len(), 2_500);
    assert!(doc.grid().cells().iter().all(|&c| c == 5));
}

#[test]
fn stale_chunked_fill_never_lands() {
    let mut doc = ChartDocument::new(40, 40).unwrap().with_fill_config(FillConfig {
        sync_cell_limit: 100,
        pops_per_chunk: 4,
    });
    let first = doc
        .begin_fill(&FillRequest::new(GridPoint::new(0, 0), 7))
        .expect("large grid should fill in chunks");

    let mut ticks = 0;
    let state = doc.drive_fill(first, |doc| {
        ticks += 1;
        if ticks == 2 {
            assert!(doc.paint_cell(GridPoint::new(39, 39), 3, None));
        }
    });

    assert_eq!(state, FillState::Aborted);
    assert_eq!(ticks, 2);
    let grid = doc.grid();
    assert_eq!(grid.get(39, 39), Some(3));
    assert_eq!(grid.cells().iter().filter(|&&c| c == 7).count(), 0);
}

#[test]
fn extraction_is_deterministic() {
    let image = gradient_image(120, 90);
    let config = ExtractionConfig::default();
    let first = extract_palette_from_image(&image, 8, &config);
    let second = extract_palette_from_image(&image, 8, &config);
    assert_eq!(first, second);
    assert!(!first.is_empty() && first.len() <= 8);
    let unique: HashSet<&String> = first.iter().collect();
    assert_eq!(unique.len(), first.len());
    assert!(first
        .iter()
        .all(|hex| hex.len() == 7 && hex.starts_with('#')));
}

#[test]
fn degenerate_extraction_is_empty() {
    let config = ExtractionConfig::default();
    assert!(extract_palette_from_image(&RgbaImage::new(0, 0), 8, &config).is_empty());
    let clear = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 0]));
    assert!(extract_palette_from_image(&clear, 8, &config).is_empty());
    assert!(extract_palette_from_image(&gradient_image(10, 10), 0, &config).is_empty());
}
