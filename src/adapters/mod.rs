//! Boundaries to the external models.
//!
//! The pipeline only talks to these traits. Loading weights or starting an
//! inference server happens before a [`crate::Pipeline`] is built; the
//! concrete HTTP clients live in [`http`] and [`ollama`].

pub mod http;
pub mod ollama;

use crate::models::{Detection, PixelBox, ScoredMask};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub use http::{HttpDetector, HttpSegmenter};
pub use ollama::OllamaClassifier;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Backend unavailable at {url}: {reason}")]
    Unavailable { url: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Prompt and thresholds for one detector call
#[derive(Debug, Clone, PartialEq)]
pub struct DetectRequest {
    pub prompt: String,
    pub box_threshold: f32,
    pub text_threshold: f32,
}

/// Open-vocabulary detector
pub trait Detector {
    fn detect(
        &self,
        image: &RgbImage,
        request: &DetectRequest,
    ) -> Result<Vec<Detection>, AdapterError>;
}

/// Segmentation model. Bind once per image, then query boxes on the session.
pub trait Segmenter {
    fn bind<'a>(
        &'a mut self,
        image: &RgbImage,
    ) -> Result<Box<dyn SegmenterSession + 'a>, AdapterError>;
}

/// Segmenter state for one image. Released when dropped.
pub trait SegmenterSession {
    /// One mask when `multimask` is false, several candidates otherwise
    fn predict(
        &mut self,
        bbox: &PixelBox,
        multimask: bool,
    ) -> Result<Vec<ScoredMask>, AdapterError>;
}

/// Vision-language chat model asked a question about one crop file
pub trait Classifier {
    /// Raw response text
    fn classify(&self, artifact: &Path, question: &str) -> Result<String, AdapterError>;
}
