mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from pouchscan for tests
pub use pouchscan::{
    AdapterError, Classifier, DetectRequest, Detection, Detector, FailurePolicy, Mask,
    NormalizedBox, Outcome, Pipeline, PipelineConfig, PixelBox, RunReport, ScoredMask, Segmenter,
    SegmenterSession, Stage, Verdict,
};
