use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

/// Box in center-size format, normalized to [0, 1] relative to the image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl NormalizedBox {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }
}

/// One candidate region returned by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: NormalizedBox,
    pub score: f32,
    pub phrase: String,
}

/// Box in absolute pixel corners. May extend past the image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i64 {
        (self.x2 as i64 - self.x1 as i64).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.y2 as i64 - self.y1 as i64).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// Clamp to `[0, width] x [0, height]`.
    /// Returns `(x, y, w, h)` or `None` when nothing of the box is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.clamp(0, width as i32) as u32;
        let x2 = self.x2.clamp(0, width as i32) as u32;
        let y1 = self.y1.clamp(0, height as i32) as u32;
        let y2 = self.y2.clamp(0, height as i32) as u32;

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// Masked crop written to disk for one retained detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropArtifact {
    pub path: PathBuf,
    pub index: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Yes,
    No,
    Unknown,
}

/// Classifier answer for one crop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub verdict: Verdict,
    /// Raw response text, kept verbatim
    pub response: String,
}

/// Pipeline stage a detection failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Segmentation,
    Compositing,
    Classification,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Segmentation => "segmentation",
            Stage::Compositing => "compositing",
            Stage::Classification => "classification",
        };
        f.write_str(name)
    }
}

/// What happened to a detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Box covered too much of the image
    Rejected { area_fraction: f64 },
    /// Box had no pixels left after clamping
    EmptyCrop,
    Classified {
        artifact: CropArtifact,
        mask_score: f32,
        classification: Classification,
    },
    Failed { stage: Stage, error: String },
}

/// Structured result for one detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Position in detector output
    pub index: usize,
    pub phrase: String,
    pub score: f32,
    pub normalized: NormalizedBox,
    pub pixel: PixelBox,
    pub outcome: Outcome,
}

impl DetectionRecord {
    pub fn classification(&self) -> Option<&Classification> {
        match &self.outcome {
            Outcome::Classified { classification, .. } => Some(classification),
            _ => None,
        }
    }

    pub fn artifact(&self) -> Option<&CropArtifact> {
        match &self.outcome {
            Outcome::Classified { artifact, .. } => Some(artifact),
            _ => None,
        }
    }
}

/// Everything one run over one image produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub prompt: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub records: Vec<DetectionRecord>,
}

impl RunReport {
    pub fn classified(&self) -> impl Iterator<Item = &DetectionRecord> {
        self.records.iter().filter(|r| r.classification().is_some())
    }

    /// Records the classifier answered "yes" for
    pub fn positives(&self) -> impl Iterator<Item = &DetectionRecord> {
        self.records.iter().filter(|r| {
            r.classification()
                .is_some_and(|c| c.verdict == Verdict::Yes)
        })
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &CropArtifact> {
        self.records.iter().filter_map(|r| r.artifact())
    }

    pub fn rejected_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Rejected { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
            .count()
    }
}

/// Binary foreground map for one detection. Nonzero pixels are foreground.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(GrayImage);

impl Mask {
    pub fn new(image: GrayImage) -> Self {
        Self(image)
    }

    /// Build a mask from a predicate over pixel coordinates
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            Luma([if f(x, y) { 255 } else { 0 }])
        }))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y)[0] != 0
    }

    pub fn foreground_count(&self) -> usize {
        self.0.pixels().filter(|p| p[0] != 0).count()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }
}

/// Mask plus the segmenter's confidence in it
#[derive(Debug, Clone)]
pub struct ScoredMask {
    pub mask: Mask,
    pub score: f32,
}
