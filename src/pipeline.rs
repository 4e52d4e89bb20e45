use crate::adapters::{Classifier, DetectRequest, Detector, Segmenter, SegmenterSession};
use crate::config::PipelineConfig;
use crate::detection::{classify_response, normalize_boxes, CropCompositor, RegionFilter};
use crate::models::{Detection, DetectionRecord, Mask, Outcome, PixelBox, RunReport, Stage};
use anyhow::{Context, Result};
use image::{ImageFormat, ImageReader, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What to do when one detection fails in segmentation, compositing or
/// classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the run and return the error
    #[default]
    Abort,
    /// Record the failure for that detection and carry on
    Continue,
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Detector → box normalizer → region filter → segmenter → compositor →
/// classifier, one detection at a time.
pub struct Pipeline {
    detector: Box<dyn Detector>,
    segmenter: Box<dyn Segmenter>,
    classifier: Box<dyn Classifier>,
    config: PipelineConfig,
    policy: FailurePolicy,
    debug: Option<DebugConfig>,
}

struct StageError {
    stage: Stage,
    error: anyhow::Error,
}

impl StageError {
    fn at(stage: Stage) -> impl FnOnce(anyhow::Error) -> Self {
        move |error| Self { stage, error }
    }
}

impl Pipeline {
    /// Adapters are already initialized; the pipeline only drives them
    pub fn new(
        detector: Box<dyn Detector>,
        segmenter: Box<dyn Segmenter>,
        classifier: Box<dyn Classifier>,
    ) -> Self {
        Self {
            detector,
            segmenter,
            classifier,
            config: PipelineConfig::default(),
            policy: FailurePolicy::default(),
            debug: None,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });

        Ok(self)
    }

    /// Load the image at `path` and run on it
    pub fn run_path(&mut self, path: &Path) -> Result<RunReport> {
        let img = ImageReader::open(path)
            .with_context(|| format!("Failed to open image {}", path.display()))?
            .decode()
            .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;

        self.run(&img.to_rgb8(), path)
    }

    /// Run over one image. `source` names the crops, it is not read.
    pub fn run(&mut self, image: &RgbImage, source: &Path) -> Result<RunReport> {
        let started_at = OffsetDateTime::now_utc();
        let (width, height) = image.dimensions();
        let image_area = width as u64 * height as u64;

        let Self {
            detector,
            segmenter,
            classifier,
            config,
            policy,
            debug,
        } = self;
        let (config, policy) = (&*config, *policy);

        let request = DetectRequest {
            prompt: config.detector.prompt.clone(),
            box_threshold: config.detector.box_threshold,
            text_threshold: config.detector.text_threshold,
        };
        let detections = detector
            .detect(image, &request)
            .context("Detector failed")?;
        info!(
            "{} detections for {:?} in {} ({}x{})",
            detections.len(),
            request.prompt,
            source.display(),
            width,
            height
        );

        let boxes = normalize_boxes(&detections, width, height);
        let filter = RegionFilter::new(config.filter.max_area_fraction);
        let compositor = CropCompositor::new(&config.output.crops_dir);
        let debug = debug.as_ref();

        // Bound once per image, and only when some box survives the filter
        let retained: Vec<bool> = boxes
            .iter()
            .map(|b| filter.accepts(b, image_area))
            .collect();
        let mut session = if retained.contains(&true) {
            Some(
                segmenter
                    .bind(image)
                    .context("Failed to bind segmenter session")?,
            )
        } else {
            None
        };
        let mut records = Vec::with_capacity(detections.len());

        for (index, (detection, pixel)) in detections.iter().zip(boxes).enumerate() {
            if !retained[index] {
                let area_fraction = filter.area_fraction(&pixel, image_area);
                debug!(
                    "Detection {} rejected: covers {:.1}% of the image",
                    index,
                    area_fraction * 100.0
                );
                records.push(record(index, detection, pixel, Outcome::Rejected { area_fraction }));
                continue;
            }

            let active = session
                .as_deref_mut()
                .context("Segmenter session missing")?;

            let step = Step {
                image,
                source,
                index,
                pixel,
                config,
                compositor: &compositor,
                debug,
            };

            let outcome = match step.process(active, &**classifier) {
                Ok(outcome) => outcome,
                Err(StageError { stage, error }) => match policy {
                    FailurePolicy::Abort => {
                        return Err(error.context(format!(
                            "Detection {} failed during {}",
                            index, stage
                        )));
                    }
                    FailurePolicy::Continue => {
                        warn!("Detection {} failed during {}: {:#}", index, stage, error);
                        Outcome::Failed {
                            stage,
                            error: format!("{:#}", error),
                        }
                    }
                },
            };

            records.push(record(index, detection, pixel, outcome));
        }

        // Release the server-side session before anything else happens
        drop(session);

        if let Some(debug) = debug {
            if let Err(e) = save_overview(image, &records, source, debug) {
                warn!("Failed to save debug overview: {:#}", e);
            }
        }

        Ok(RunReport {
            run_id: Uuid::new_v4(),
            source: source.to_path_buf(),
            width,
            height,
            prompt: request.prompt,
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            records,
        })
    }
}

fn record(index: usize, detection: &Detection, pixel: PixelBox, outcome: Outcome) -> DetectionRecord {
    DetectionRecord {
        index,
        phrase: detection.phrase.clone(),
        score: detection.score,
        normalized: detection.bbox,
        pixel,
        outcome,
    }
}

/// Inputs for processing one retained detection
struct Step<'a> {
    image: &'a RgbImage,
    source: &'a Path,
    index: usize,
    pixel: PixelBox,
    config: &'a PipelineConfig,
    compositor: &'a CropCompositor,
    debug: Option<&'a DebugConfig>,
}

impl Step<'_> {
    fn process(
        &self,
        session: &mut dyn SegmenterSession,
        classifier: &dyn Classifier,
    ) -> Result<Outcome, StageError> {
        let (mask, mask_score) = self
            .segment(session)
            .map_err(StageError::at(Stage::Segmentation))?;

        // Debug output is best effort and never fails the detection
        if let Some(debug) = self.debug {
            if let Err(e) = self.save_mask(&mask, debug) {
                warn!("Detection {}: failed to save debug mask: {:#}", self.index, e);
            }
        }

        let artifact = self
            .compositor
            .write(self.image, &mask, &self.pixel, self.source, self.index)
            .map_err(StageError::at(Stage::Compositing))?;
        let Some(artifact) = artifact else {
            debug!("Detection {} has no pixels inside the image, skipping", self.index);
            return Ok(Outcome::EmptyCrop);
        };

        let response = classifier
            .classify(&artifact.path, &self.config.classifier.question)
            .map_err(anyhow::Error::from)
            .map_err(StageError::at(Stage::Classification))?;
        let classification = classify_response(response);

        info!(
            "Detection {} ({}): {:?} {:?}",
            self.index,
            artifact.path.display(),
            classification.verdict,
            classification.response.trim()
        );

        Ok(Outcome::Classified {
            artifact,
            mask_score,
            classification,
        })
    }

    /// Best-scoring mask for the box
    fn segment(&self, session: &mut dyn SegmenterSession) -> Result<(Mask, f32)> {
        let masks = session.predict(&self.pixel, self.config.segmenter.multimask)?;
        let best = masks
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .context("Segmenter returned no masks")?;
        Ok((best.mask, best.score))
    }

    fn save_mask(&self, mask: &Mask, debug: &DebugConfig) -> Result<()> {
        let stem = source_stem(self.source);
        let path = debug
            .output_dir
            .join(format!("{}_{}_mask.png", stem, self.index));
        mask.as_image()
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| anyhow::anyhow!("Failed to save debug mask: {}", e))?;
        debug!("Debug: saved {}", path.display());
        Ok(())
    }
}

fn source_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

/// Draw every box on a copy of the image: green when kept, red when
/// rejected by the area filter, grey otherwise.
fn save_overview(
    image: &RgbImage,
    records: &[DetectionRecord],
    source: &Path,
    debug: &DebugConfig,
) -> Result<()> {
    let mut canvas = image.clone();

    for rec in records {
        let color = match rec.outcome {
            Outcome::Classified { .. } => Rgb([0u8, 255, 0]),
            Outcome::Rejected { .. } => Rgb([255u8, 0, 0]),
            Outcome::EmptyCrop | Outcome::Failed { .. } => Rgb([128u8, 128, 128]),
        };
        if let Some((x, y, w, h)) = rec.pixel.clamp_to(canvas.width(), canvas.height()) {
            let rect = Rect::at(x as i32, y as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }

    let path = debug
        .output_dir
        .join(format!("{}_overview.png", source_stem(source)));
    canvas
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| anyhow::anyhow!("Failed to save debug overview: {}", e))?;
    debug!("Debug: saved {}", path.display());
    Ok(())
}
