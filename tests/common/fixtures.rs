#![allow(dead_code)]

use pouchscan::{
    AdapterError, Classifier, DetectRequest, Detection, Detector, Mask, NormalizedBox, Pipeline,
    PipelineConfig, PixelBox, ScoredMask, Segmenter, SegmenterSession,
};
use image::{Rgb, RgbImage};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Gradient image so crops differ by position
pub fn make_test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn detection(cx: f32, cy: f32, w: f32, h: f32) -> Detection {
    Detection {
        bbox: NormalizedBox::new(cx, cy, w, h),
        score: 0.8,
        phrase: "milk pouch".to_string(),
    }
}

/// Detector returning a fixed list
pub struct FakeDetector {
    pub detections: Vec<Detection>,
    pub requests: Rc<RefCell<Vec<DetectRequest>>>,
}

impl FakeDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            requests: Rc::default(),
        }
    }
}

impl Detector for FakeDetector {
    fn detect(
        &self,
        _image: &RgbImage,
        request: &DetectRequest,
    ) -> Result<Vec<Detection>, AdapterError> {
        self.requests.borrow_mut().push(request.clone());
        Ok(self.detections.clone())
    }
}

#[derive(Debug, Default)]
pub struct SegmenterLog {
    pub binds: usize,
    pub releases: usize,
    pub predictions: Vec<PixelBox>,
    pub multimask_flags: Vec<bool>,
}

/// Segmenter whose mask is exactly the (clamped) box.
///
/// With `multimask` it returns three candidates, best score in the middle:
/// the whole box (0.40), the left half (0.97), the right half (0.70).
#[derive(Default)]
pub struct FakeSegmenter {
    pub log: Rc<RefCell<SegmenterLog>>,
    /// Return no masks at all
    pub empty: bool,
}

impl Segmenter for FakeSegmenter {
    fn bind<'a>(
        &'a mut self,
        image: &RgbImage,
    ) -> Result<Box<dyn SegmenterSession + 'a>, AdapterError> {
        self.log.borrow_mut().binds += 1;
        Ok(Box::new(FakeSession {
            log: self.log.clone(),
            width: image.width(),
            height: image.height(),
            empty: self.empty,
        }))
    }
}

struct FakeSession {
    log: Rc<RefCell<SegmenterLog>>,
    width: u32,
    height: u32,
    empty: bool,
}

impl SegmenterSession for FakeSession {
    fn predict(
        &mut self,
        bbox: &PixelBox,
        multimask: bool,
    ) -> Result<Vec<ScoredMask>, AdapterError> {
        {
            let mut log = self.log.borrow_mut();
            log.predictions.push(*bbox);
            log.multimask_flags.push(multimask);
        }
        if self.empty {
            return Ok(vec![]);
        }

        let b = *bbox;
        let mid = b.x1 + (b.x2 - b.x1) / 2;
        let columns = |from: i32, to: i32| {
            Mask::from_fn(self.width, self.height, |x, y| {
                let (x, y) = (x as i32, y as i32);
                x >= from && x < to && y >= b.y1 && y < b.y2
            })
        };

        if !multimask {
            return Ok(vec![ScoredMask { mask: columns(b.x1, b.x2), score: 0.95 }]);
        }
        Ok(vec![
            ScoredMask { mask: columns(b.x1, b.x2), score: 0.40 },
            ScoredMask { mask: columns(b.x1, mid), score: 0.97 },
            ScoredMask { mask: columns(mid, b.x2), score: 0.70 },
        ])
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.log.borrow_mut().releases += 1;
    }
}

/// Classifier answering with a fixed text, or failing when `response` is `None`
pub struct FakeClassifier {
    pub response: Option<String>,
    pub calls: Rc<RefCell<Vec<PathBuf>>>,
}

impl FakeClassifier {
    pub fn answering(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            calls: Rc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            calls: Rc::default(),
        }
    }
}

impl Classifier for FakeClassifier {
    fn classify(&self, artifact: &Path, _question: &str) -> Result<String, AdapterError> {
        self.calls.borrow_mut().push(artifact.to_path_buf());
        assert!(artifact.exists(), "classifier got a missing file");
        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Err(AdapterError::Unavailable {
                url: "http://localhost:11434/api/chat".to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

/// Handles for inspecting the fakes after a run
pub struct Harness {
    pub pipeline: Pipeline,
    pub segmenter_log: Rc<RefCell<SegmenterLog>>,
    pub classifier_calls: Rc<RefCell<Vec<PathBuf>>>,
    pub crops_dir: tempfile::TempDir,
}

/// Pipeline over fakes writing crops to a fresh temp directory
pub fn make_harness(detections: Vec<Detection>, classifier: FakeClassifier) -> Harness {
    let crops_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let segmenter = FakeSegmenter::default();
    let segmenter_log = segmenter.log.clone();
    let classifier_calls = classifier.calls.clone();

    let mut config = PipelineConfig::default();
    config.output.crops_dir = crops_dir.path().to_path_buf();

    let pipeline = Pipeline::new(
        Box::new(FakeDetector::new(detections)),
        Box::new(segmenter),
        Box::new(classifier),
    )
    .with_config(config);

    Harness {
        pipeline,
        segmenter_log,
        classifier_calls,
        crops_dir,
    }
}

/// Files currently in `dir`, sorted
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read directory")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
