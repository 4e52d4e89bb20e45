use crate::models::{CropArtifact, Mask, PixelBox};
use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Masks out the background, crops to the detection box and writes the
/// result as `{basename}_{index}.png` under `output_dir`.
#[derive(Debug, Clone)]
pub struct CropCompositor {
    output_dir: PathBuf,
}

impl CropCompositor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Where the crop for detection `index` of `source` goes
    pub fn artifact_path(&self, source: &Path, index: usize) -> PathBuf {
        let basename = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.output_dir.join(format!("{}_{}.png", basename, index))
    }

    /// Write the crop for one detection.
    /// Returns `None` without touching the filesystem when the clamped box is empty.
    pub fn write(
        &self,
        image: &RgbImage,
        mask: &Mask,
        bbox: &PixelBox,
        source: &Path,
        index: usize,
    ) -> Result<Option<CropArtifact>> {
        let Some(crop) = composite(image, mask, bbox)? else {
            return Ok(None);
        };

        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create crop directory {}", self.output_dir.display())
        })?;

        let path = self.artifact_path(source, index);
        crop.save_with_format(&path, ImageFormat::Png)
            .map_err(|e| anyhow::anyhow!("Failed to save crop {}: {}", path.display(), e))?;

        Ok(Some(CropArtifact {
            path,
            index,
            width: crop.width(),
            height: crop.height(),
        }))
    }
}

/// Keep source pixels where the mask is set, black elsewhere, cropped to
/// `bbox` clamped into the image. `None` if the clamped box has no area.
pub fn composite(image: &RgbImage, mask: &Mask, bbox: &PixelBox) -> Result<Option<RgbImage>> {
    if mask.dimensions() != image.dimensions() {
        let (mw, mh) = mask.dimensions();
        anyhow::bail!(
            "Mask is {}x{} but image is {}x{}",
            mw,
            mh,
            image.width(),
            image.height()
        );
    }

    let Some((x, y, width, height)) = bbox.clamp_to(image.width(), image.height()) else {
        return Ok(None);
    };

    let crop = RgbImage::from_fn(width, height, |cx, cy| {
        let (sx, sy) = (x + cx, y + cy);
        if mask.is_foreground(sx, sy) {
            *image.get_pixel(sx, sy)
        } else {
            Rgb([0, 0, 0])
        }
    });

    Ok(Some(crop))
}
