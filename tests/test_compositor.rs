//! Masking, cropping and writing crop artifacts.

mod common;

use image::Rgb;
use pouchscan::detection::{composite, CropCompositor};
use std::path::Path;

use common::*;

#[test]
fn test_composite_blacks_out_background() -> anyhow::Result<()> {
    let image = make_test_image(20, 20);
    // Only the left half of the box is foreground
    let mask = Mask::from_fn(20, 20, |x, _| x < 10);
    let crop = composite(&image, &mask, &PixelBox::new(5, 5, 15, 15))?
        .expect("crop should not be empty");

    assert_eq!(crop.dimensions(), (10, 10));
    assert_eq!(crop.get_pixel(0, 0), image.get_pixel(5, 5));
    assert_eq!(crop.get_pixel(4, 9), image.get_pixel(9, 14));
    assert_eq!(*crop.get_pixel(5, 0), Rgb([0, 0, 0]));
    assert_eq!(*crop.get_pixel(9, 9), Rgb([0, 0, 0]));
    Ok(())
}

#[test]
fn test_composite_clamps_out_of_bounds_box() -> anyhow::Result<()> {
    let image = make_test_image(100, 80);
    let mask = Mask::from_fn(100, 80, |_, _| true);
    let crop = composite(&image, &mask, &PixelBox::new(90, -5, 130, 10))?
        .expect("crop should not be empty");

    assert_eq!(crop.dimensions(), (10, 10));
    assert_eq!(crop.get_pixel(9, 9), image.get_pixel(99, 9));
    Ok(())
}

#[test]
fn test_composite_zero_area_is_none() -> anyhow::Result<()> {
    let image = make_test_image(50, 50);
    let mask = Mask::from_fn(50, 50, |_, _| true);
    assert!(composite(&image, &mask, &PixelBox::new(10, 10, 10, 30))?.is_none());
    assert!(composite(&image, &mask, &PixelBox::new(60, 60, 80, 80))?.is_none());
    Ok(())
}

#[test]
fn test_composite_rejects_mismatched_mask() {
    let image = make_test_image(50, 50);
    let mask = Mask::from_fn(40, 50, |_, _| true);
    let result = composite(&image, &mask, &PixelBox::new(0, 0, 10, 10));
    assert!(result.is_err());
}

#[test]
fn test_artifact_path_uses_basename_and_index() {
    let compositor = CropCompositor::new("crops");
    assert_eq!(
        compositor.artifact_path(Path::new("/data/photos/bin_03.jpg"), 7),
        Path::new("crops").join("bin_03_7.png")
    );
}

#[test]
fn test_write_is_byte_identical_across_runs() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let compositor = CropCompositor::new(dir.path().join("crops"));
    let image = make_test_image(64, 64);
    let mask = Mask::from_fn(64, 64, |x, y| (x + y) % 3 != 0);
    let bbox = PixelBox::new(8, 4, 40, 60);
    let source = Path::new("waste.png");

    let first = compositor
        .write(&image, &mask, &bbox, source, 0)?
        .expect("artifact should be written");
    let first_bytes = std::fs::read(&first.path)?;

    let second = compositor
        .write(&image, &mask, &bbox, source, 0)?
        .expect("artifact should be written");
    let second_bytes = std::fs::read(&second.path)?;

    assert_eq!(first.path, second.path);
    assert_eq!(first_bytes, second_bytes);
    assert_eq!((first.width, first.height), (32, 56));
    Ok(())
}

#[test]
fn test_write_skips_empty_crop_without_creating_files() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let crops = dir.path().join("crops");
    let compositor = CropCompositor::new(&crops);
    let image = make_test_image(32, 32);
    let mask = Mask::from_fn(32, 32, |_, _| true);

    let artifact = compositor.write(&image, &mask, &PixelBox::new(40, 40, 50, 50), Path::new("a.png"), 0)?;
    assert!(artifact.is_none());
    assert!(!crops.exists());
    Ok(())
}

#[test]
fn test_written_crop_decodes_to_masked_pixels() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let compositor = CropCompositor::new(dir.path());
    let image = make_test_image(30, 30);
    let mask = Mask::from_fn(30, 30, |x, _| x >= 15);

    let artifact = compositor
        .write(&image, &mask, &PixelBox::new(10, 10, 20, 20), Path::new("x.png"), 2)?
        .expect("artifact should be written");
    let decoded = image::open(&artifact.path)?.to_rgb8();

    assert_eq!(decoded.dimensions(), (10, 10));
    assert_eq!(*decoded.get_pixel(0, 0), Rgb([0, 0, 0]));
    assert_eq!(decoded.get_pixel(5, 0), image.get_pixel(15, 10));
    Ok(())
}
