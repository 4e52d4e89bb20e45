use crate::adapters::ollama::DEFAULT_OLLAMA_URL;
use crate::detection::DEFAULT_MAX_AREA_FRACTION;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pipeline settings. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub segmenter: SegmenterConfig,
    pub classifier: ClassifierConfig,
    pub filter: FilterConfig,
    pub output: OutputConfig,
    /// Per-request timeout for all backends, unset waits forever
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub url: String,
    pub prompt: String,
    pub box_threshold: f32,
    pub text_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub url: String,
    /// Ask for several candidate masks and keep the best scoring one
    pub multimask: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub url: String,
    pub model: String,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Boxes covering more than this share of the image are skipped
    pub max_area_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub crops_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            segmenter: SegmenterConfig::default(),
            classifier: ClassifierConfig::default(),
            filter: FilterConfig::default(),
            output: OutputConfig::default(),
            request_timeout_secs: None,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            prompt: "milk pouch".to_string(),
            box_threshold: 0.35,
            text_threshold: 0.25,
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8001".to_string(),
            multimask: false,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OLLAMA_URL.to_string(),
            model: "llava".to_string(),
            question: "Is this a milk pouch? Answer yes or no.".to_string(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_area_fraction: DEFAULT_MAX_AREA_FRACTION,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            crops_dir: PathBuf::from("crops"),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fraction = self.filter.max_area_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            anyhow::bail!("max_area_fraction must be in (0, 1], got {}", fraction);
        }
        for (name, value) in [
            ("box_threshold", self.detector.box_threshold),
            ("text_threshold", self.detector.text_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be in [0, 1], got {}", name, value);
            }
        }
        if self.detector.prompt.trim().is_empty() {
            anyhow::bail!("Detector prompt is empty");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
