use crate::models::PixelBox;

pub const DEFAULT_MAX_AREA_FRACTION: f64 = 0.25;

/// Drops boxes that cover too much of the image.
/// Detectors tend to return the whole frame as a match for vague prompts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionFilter {
    pub max_area_fraction: f64,
}

impl RegionFilter {
    pub fn new(max_area_fraction: f64) -> Self {
        Self { max_area_fraction }
    }

    /// Fraction of the image area the box covers (unclamped)
    pub fn area_fraction(&self, bbox: &PixelBox, image_area: u64) -> f64 {
        if image_area == 0 {
            return 0.0;
        }
        bbox.area() as f64 / image_area as f64
    }

    /// A box exactly at the limit is kept
    pub fn accepts(&self, bbox: &PixelBox, image_area: u64) -> bool {
        (bbox.area() as f64) <= self.max_area_fraction * image_area as f64
    }
}

impl Default for RegionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AREA_FRACTION)
    }
}
