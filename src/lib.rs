pub mod adapters;
pub mod config;
pub mod detection;
pub mod models;
pub mod pipeline;

pub use adapters::{AdapterError, Classifier, DetectRequest, Detector, Segmenter, SegmenterSession};
pub use config::PipelineConfig;
pub use models::{
    Classification, CropArtifact, Detection, DetectionRecord, Mask, NormalizedBox, Outcome,
    PixelBox, RunReport, ScoredMask, Stage, Verdict,
};
pub use pipeline::{DebugConfig, FailurePolicy, Pipeline};
