use crate::models::{Detection, NormalizedBox, PixelBox};

/// Scale a normalized center-size box to the image and convert it to corners.
/// Each corner is truncated toward zero.
pub fn to_pixel_box(bbox: &NormalizedBox, width: u32, height: u32) -> PixelBox {
    // Same f32 arithmetic the detector's tensors use, so 0.1 * 1000 is exactly 100
    let w = width as f32;
    let h = height as f32;

    let cx = bbox.cx * w;
    let cy = bbox.cy * h;
    let bw = bbox.w * w;
    let bh = bbox.h * h;

    PixelBox {
        x1: (cx - bw / 2.0) as i32,
        y1: (cy - bh / 2.0) as i32,
        x2: (cx + bw / 2.0) as i32,
        y2: (cy + bh / 2.0) as i32,
    }
}

/// Convert every detection's box, keeping detector order
pub fn normalize_boxes(detections: &[Detection], width: u32, height: u32) -> Vec<PixelBox> {
    detections
        .iter()
        .map(|d| to_pixel_box(&d.bbox, width, height))
        .collect()
}
