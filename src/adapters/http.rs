use super::{AdapterError, DetectRequest, Detector, Segmenter, SegmenterSession};
use crate::models::{Detection, Mask, NormalizedBox, PixelBox, ScoredMask};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbImage};
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;

/// Build a blocking client. `None` means wait for the backend indefinitely.
pub(crate) fn build_client(timeout: Option<Duration>) -> Result<Client, AdapterError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

pub(crate) fn encode_png_base64(image: &RgbImage) -> Result<String, AdapterError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(STANDARD.encode(buf.into_inner()))
}

/// Send a request and decode a JSON body, mapping connection failures to
/// `Unavailable` and non-2xx statuses to `Status`.
pub(crate) fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
) -> Result<T, AdapterError> {
    let response = request.send().map_err(|e| unavailable_or_http(e, url))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(AdapterError::Status {
            status: status.as_u16(),
            body: truncate(&body, 500),
        });
    }

    let text = response.text()?;
    serde_json::from_str(&text).map_err(|e| AdapterError::MalformedResponse(e.to_string()))
}

fn unavailable_or_http(e: reqwest::Error, url: &str) -> AdapterError {
    if e.is_connect() || e.is_timeout() {
        AdapterError::Unavailable {
            url: url.to_string(),
            reason: e.to_string(),
        }
    } else {
        AdapterError::Http(e)
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[derive(Debug, Serialize)]
struct DetectBody<'a> {
    image: String,
    prompt: &'a str,
    box_threshold: f32,
    text_threshold: f32,
}

/// Detector server reply: parallel arrays, one entry per candidate
#[derive(Debug, Clone, Deserialize)]
pub struct DetectResponse {
    pub boxes: Vec<Vec<f32>>,
    pub scores: Vec<f32>,
    pub phrases: Vec<String>,
}

impl DetectResponse {
    pub fn into_detections(self) -> Result<Vec<Detection>, AdapterError> {
        let n = self.boxes.len();
        if self.scores.len() != n || self.phrases.len() != n {
            return Err(AdapterError::MalformedResponse(format!(
                "{} boxes, {} scores, {} phrases",
                n,
                self.scores.len(),
                self.phrases.len()
            )));
        }

        self.boxes
            .into_iter()
            .zip(self.scores)
            .zip(self.phrases)
            .map(|((b, score), phrase)| match b.as_slice() {
                [cx, cy, w, h] => Ok(Detection {
                    bbox: NormalizedBox::new(*cx, *cy, *w, *h),
                    score,
                    phrase,
                }),
                _ => Err(AdapterError::MalformedResponse(format!(
                    "box has {} values, expected 4",
                    b.len()
                ))),
            })
            .collect()
    }
}

/// Client for a detector served over HTTP (`POST /detect`)
pub struct HttpDetector {
    client: Client,
    base_url: String,
}

impl HttpDetector {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

impl Detector for HttpDetector {
    fn detect(
        &self,
        image: &RgbImage,
        request: &DetectRequest,
    ) -> Result<Vec<Detection>, AdapterError> {
        let url = join_url(&self.base_url, "detect");
        let body = DetectBody {
            image: encode_png_base64(image)?,
            prompt: &request.prompt,
            box_threshold: request.box_threshold,
            text_threshold: request.text_threshold,
        };

        tracing::debug!("POST {} (prompt: {:?})", url, request.prompt);
        let response: DetectResponse = send_json(self.client.post(&url).json(&body), &url)?;
        response.into_detections()
    }
}

#[derive(Debug, Serialize)]
struct BindBody {
    image: String,
}

#[derive(Debug, Deserialize)]
struct BindResponse {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct PredictBody {
    #[serde(rename = "box")]
    bbox: [i32; 4],
    multimask_output: bool,
}

/// Segmenter server reply: base64 PNG masks with one score each
#[derive(Debug, Clone, Deserialize)]
pub struct PredictResponse {
    pub masks: Vec<String>,
    pub scores: Vec<f32>,
}

impl PredictResponse {
    /// Decode masks, checking each matches the bound image's size
    pub fn into_masks(self, width: u32, height: u32) -> Result<Vec<ScoredMask>, AdapterError> {
        if self.masks.len() != self.scores.len() {
            return Err(AdapterError::MalformedResponse(format!(
                "{} masks, {} scores",
                self.masks.len(),
                self.scores.len()
            )));
        }

        self.masks
            .into_iter()
            .zip(self.scores)
            .map(|(encoded, score)| {
                let bytes = STANDARD.decode(encoded.as_bytes())?;
                let gray = image::load_from_memory(&bytes)?.to_luma8();
                if gray.dimensions() != (width, height) {
                    return Err(AdapterError::MalformedResponse(format!(
                        "mask is {}x{}, image is {}x{}",
                        gray.width(),
                        gray.height(),
                        width,
                        height
                    )));
                }
                Ok(ScoredMask {
                    mask: Mask::new(gray),
                    score,
                })
            })
            .collect()
    }
}

/// Client for a segmentation server with per-image sessions
/// (`POST /sessions`, `POST /sessions/{id}/predict`, `DELETE /sessions/{id}`)
pub struct HttpSegmenter {
    client: Client,
    base_url: String,
}

impl HttpSegmenter {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

impl Segmenter for HttpSegmenter {
    fn bind<'a>(
        &'a mut self,
        image: &RgbImage,
    ) -> Result<Box<dyn SegmenterSession + 'a>, AdapterError> {
        let url = join_url(&self.base_url, "sessions");
        let body = BindBody {
            image: encode_png_base64(image)?,
        };

        let response: BindResponse = send_json(self.client.post(&url).json(&body), &url)?;
        tracing::debug!("Bound segmenter session {}", response.session_id);

        Ok(Box::new(HttpSegmenterSession {
            client: &self.client,
            session_url: join_url(&url, &response.session_id),
            width: image.width(),
            height: image.height(),
        }))
    }
}

struct HttpSegmenterSession<'a> {
    client: &'a Client,
    session_url: String,
    width: u32,
    height: u32,
}

impl SegmenterSession for HttpSegmenterSession<'_> {
    fn predict(
        &mut self,
        bbox: &PixelBox,
        multimask: bool,
    ) -> Result<Vec<ScoredMask>, AdapterError> {
        let url = join_url(&self.session_url, "predict");
        let body = PredictBody {
            bbox: [bbox.x1, bbox.y1, bbox.x2, bbox.y2],
            multimask_output: multimask,
        };

        let response: PredictResponse = send_json(self.client.post(&url).json(&body), &url)?;
        response.into_masks(self.width, self.height)
    }
}

impl Drop for HttpSegmenterSession<'_> {
    fn drop(&mut self) {
        match self.client.delete(&self.session_url).send() {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Released segmenter session {}", self.session_url);
            }
            Ok(response) => {
                tracing::warn!(
                    "Releasing segmenter session {} returned HTTP {}",
                    self.session_url,
                    response.status()
                );
            }
            Err(e) => {
                tracing::warn!("Failed to release segmenter session {}: {}", self.session_url, e);
            }
        }
    }
}
