pub mod boxes;
pub mod compositor;
pub mod filter;
pub mod verdict;

pub use boxes::{normalize_boxes, to_pixel_box};
pub use compositor::{composite, CropCompositor};
pub use filter::{RegionFilter, DEFAULT_MAX_AREA_FRACTION};
pub use verdict::{classify_response, parse_verdict};
