use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pouchscan::adapters::{HttpDetector, HttpSegmenter, OllamaClassifier};
use pouchscan::{FailurePolicy, Outcome, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "pouchscan")]
#[command(about = "Find milk pouches in photographs of waste")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// TOML config file; flags below override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Text prompt for the detector
    #[arg(long)]
    prompt: Option<String>,

    /// Question asked about every crop
    #[arg(long)]
    question: Option<String>,

    /// Skip boxes covering more than this share of the image
    #[arg(long)]
    max_area_fraction: Option<f64>,

    #[arg(long)]
    box_threshold: Option<f32>,

    #[arg(long)]
    text_threshold: Option<f32>,

    /// Directory crops are written to
    #[arg(long, value_name = "DIR")]
    crops_dir: Option<PathBuf>,

    #[arg(long, value_name = "URL")]
    detector_url: Option<String>,

    #[arg(long, value_name = "URL")]
    segmenter_url: Option<String>,

    #[arg(long, value_name = "URL")]
    classifier_url: Option<String>,

    /// Vision-language model name
    #[arg(long)]
    model: Option<String>,

    /// Record per-detection failures instead of stopping
    #[arg(long)]
    keep_going: bool,

    /// Write the run report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Save masks and an annotated overview to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(prompt) = &self.prompt {
            config.detector.prompt = prompt.clone();
        }
        if let Some(question) = &self.question {
            config.classifier.question = question.clone();
        }
        if let Some(fraction) = self.max_area_fraction {
            config.filter.max_area_fraction = fraction;
        }
        if let Some(threshold) = self.box_threshold {
            config.detector.box_threshold = threshold;
        }
        if let Some(threshold) = self.text_threshold {
            config.detector.text_threshold = threshold;
        }
        if let Some(dir) = &self.crops_dir {
            config.output.crops_dir = dir.clone();
        }
        if let Some(url) = &self.detector_url {
            config.detector.url = url.clone();
        }
        if let Some(url) = &self.segmenter_url {
            config.segmenter.url = url.clone();
        }
        if let Some(url) = &self.classifier_url {
            config.classifier.url = url.clone();
        }
        if let Some(model) = &self.model {
            config.classifier.model = model.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "pouchscan=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    let config = args.pipeline_config()?;
    let timeout = config.request_timeout();

    let detector = HttpDetector::new(&config.detector.url, timeout)?;
    let segmenter = HttpSegmenter::new(&config.segmenter.url, timeout)?;
    let classifier = OllamaClassifier::new(&config.classifier.url, &config.classifier.model, timeout)?;

    let policy = if args.keep_going {
        FailurePolicy::Continue
    } else {
        FailurePolicy::Abort
    };

    let mut pipeline = Pipeline::new(Box::new(detector), Box::new(segmenter), Box::new(classifier))
        .with_config(config)
        .with_failure_policy(policy);

    if let Some(debug_dir) = args.debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    let report = pipeline.run_path(&args.image_path)?;

    println!("\n=== Pouch Detection Results ===");
    println!("Total detections: {}", report.records.len());
    println!("Rejected as too large: {}", report.rejected_count());
    if report.failed_count() > 0 {
        println!("Failed: {}", report.failed_count());
    }

    for rec in &report.records {
        match &rec.outcome {
            Outcome::Classified {
                artifact,
                classification,
                ..
            } => {
                println!(
                    "  {} '{}' (score: {:.2}) -> {:?}: {}",
                    artifact.path.display(),
                    rec.phrase,
                    rec.score,
                    classification.verdict,
                    classification.response.trim()
                );
            }
            Outcome::Failed { stage, error } if args.verbose => {
                println!("  Detection {} failed during {}: {}", rec.index, stage, error);
            }
            _ => {}
        }
    }

    println!("Milk pouches found: {}", report.positives().count());

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
