use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GenerationError, ItemFailure, Result};

/// Status value the backend reports while a job is still running.
const PROCESSING_STATUS: &str = "generating";

/// Output aspect ratio for a generated video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
}

/// Output resolution for a generated video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "1080p")]
    FullHd,
}

/// Optional generation parameters shared by every task shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub duration_secs: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
            duration_secs: 5,
        }
    }
}

/// Where the frames of a video come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VideoSource {
    /// Animate a single hosted image.
    #[serde(rename_all = "camelCase")]
    Image { image_url: String },
    /// Interpolate between a start and an end frame.
    #[serde(rename_all = "camelCase")]
    Frames {
        start_image_url: String,
        end_image_url: String,
    },
}

impl VideoSource {
    /// The first (or only) frame.
    pub fn primary_url(&self) -> &str {
        match self {
            VideoSource::Image { image_url } => image_url,
            VideoSource::Frames {
                start_image_url, ..
            } => start_image_url,
        }
    }

    /// The end frame, for two-frame tasks.
    pub fn secondary_url(&self) -> Option<&str> {
        match self {
            VideoSource::Image { .. } => None,
            VideoSource::Frames { end_image_url, .. } => Some(end_image_url),
        }
    }
}

/// One "generate a video" unit of work.
///
/// `key` correlates events back to the caller's item (usually a filename)
/// and must be unique within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTask {
    pub key: String,
    pub prompt: String,
    pub source: VideoSource,
    pub params: GenerationParams,
}

impl VideoTask {
    /// Task animating a single image with default parameters.
    pub fn from_image(
        key: impl Into<String>,
        image_url: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            prompt: prompt.into(),
            source: VideoSource::Image {
                image_url: image_url.into(),
            },
            params: GenerationParams::default(),
        }
    }

    /// Task interpolating between two frames with default parameters.
    pub fn from_frames(
        key: impl Into<String>,
        start_image_url: impl Into<String>,
        end_image_url: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            prompt: prompt.into(),
            source: VideoSource::Frames {
                start_image_url: start_image_url.into(),
                end_image_url: end_image_url.into(),
            },
            params: GenerationParams::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.params.aspect_ratio = ratio;
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.params.resolution = resolution;
        self
    }

    pub fn duration_secs(mut self, secs: u32) -> Self {
        self.params.duration_secs = secs;
        self
    }

    /// Check the fields a submission needs. Runs before any network call.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(GenerationError::Validation(
                "Prompt is required for video generation".to_string(),
            ));
        }
        if self.source.primary_url().trim().is_empty() {
            return Err(GenerationError::Validation(
                "Source image URL is required for video generation".to_string(),
            ));
        }
        if let Some(end) = self.source.secondary_url() {
            if end.trim().is_empty() {
                return Err(GenerationError::Validation(
                    "End frame image URL is required for frame interpolation".to_string(),
                ));
            }
        }
        if self.params.duration_secs == 0 {
            return Err(GenerationError::Validation(
                "Video duration must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Body sent to the job submission endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest<'a> {
    pub prompt: &'a str,
    pub image_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_image_url: Option<&'a str>,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub duration: u32,
}

impl<'a> From<&'a VideoTask> for SubmitRequest<'a> {
    fn from(task: &'a VideoTask) -> Self {
        Self {
            prompt: &task.prompt,
            image_url: task.source.primary_url(),
            end_image_url: task.source.secondary_url(),
            aspect_ratio: task.params.aspect_ratio,
            resolution: task.params.resolution,
            duration: task.params.duration_secs,
        }
    }
}

/// Opaque request id returned by a submission; only used for polling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a submission reply into a handle.
    ///
    /// An error field is a definitive rejection; a non-2xx status without
    /// one surfaces as [`GenerationError::Http`].
    pub fn from_submit_reply(http_status: u16, body: &str) -> Result<Self> {
        let json: Value = match serde_json::from_str(body) {
            Ok(j) => j,
            Err(_) if !is_success(http_status) => {
                return Err(GenerationError::Http {
                    status: http_status,
                    body: body.to_string(),
                })
            }
            Err(e) => {
                return Err(GenerationError::InvalidResponse(format!(
                    "Malformed submission reply: {}",
                    e
                )))
            }
        };

        if let Some(reason) = error_field(&json) {
            return Err(GenerationError::Rejected(reason));
        }
        if !is_success(http_status) {
            return Err(GenerationError::Http {
                status: http_status,
                body: body.to_string(),
            });
        }

        match json.get("request_id") {
            Some(Value::String(id)) if !id.is_empty() => Ok(Self::new(id.as_str())),
            Some(Value::Number(n)) => Ok(Self::new(n.to_string())),
            _ => Err(GenerationError::InvalidResponse(
                "Submission reply missing request_id".into(),
            )),
        }
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A successfully parsed status reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Finished with at least one output URL.
    Completed(Vec<String>),
    /// Still running; poll again.
    Processing,
    /// The backend reported an explicit error.
    Failed(String),
    /// Finished with some other status (empty output, cancelled, ...).
    Ended(String),
}

impl JobStatus {
    /// Classify a raw status reply.
    ///
    /// `Err` is always transient: a malformed body, or a non-OK status with
    /// no error payload.
    pub fn from_reply(http_status: u16, body: &str) -> Result<Self> {
        let json: Value = match serde_json::from_str(body) {
            Ok(j) => j,
            Err(_) if !is_success(http_status) => {
                return Err(GenerationError::Unavailable {
                    status: http_status,
                })
            }
            Err(e) => {
                return Err(GenerationError::InvalidResponse(format!(
                    "Malformed status reply: {}",
                    e
                )))
            }
        };
        Self::from_json(http_status, &json)
    }

    pub fn from_json(http_status: u16, json: &Value) -> Result<Self> {
        if let Some(reason) = error_field(json) {
            return Ok(JobStatus::Failed(reason));
        }
        if !is_success(http_status) {
            return Err(GenerationError::Unavailable {
                status: http_status,
            });
        }

        let urls: Vec<String> = json
            .get("videos")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(output_url).collect())
            .unwrap_or_default();
        if !urls.is_empty() {
            return Ok(JobStatus::Completed(urls));
        }

        match json.get("status").and_then(|v| v.as_str()) {
            Some(PROCESSING_STATUS) => Ok(JobStatus::Processing),
            Some(other) => Ok(JobStatus::Ended(other.to_string())),
            None => Err(GenerationError::InvalidResponse(
                "Status reply has neither videos nor status".into(),
            )),
        }
    }
}

/// Lifecycle notification emitted by a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BatchEvent {
    /// The task was admitted and its submission started.
    #[serde(rename_all = "camelCase")]
    Submitted { key: String },
    /// The job was accepted and is being polled.
    #[serde(rename_all = "camelCase")]
    Polling { key: String, handle: JobHandle },
    #[serde(rename_all = "camelCase")]
    Succeeded { key: String, result_url: String },
    Failed(ItemFailure),
    /// Emitted once after every terminal event.
    #[serde(rename_all = "camelCase")]
    Progress { completed: usize, total: usize },
}

impl BatchEvent {
    /// The item key this event refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            BatchEvent::Submitted { key }
            | BatchEvent::Polling { key, .. }
            | BatchEvent::Succeeded { key, .. } => Some(key),
            BatchEvent::Failed(failure) => Some(&failure.key),
            BatchEvent::Progress { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchEvent::Succeeded { .. } | BatchEvent::Failed(_))
    }
}

/// Totals for a finished batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub duration_ms: u64,
}

/// Keys correlate events to items, so they must be present and unique.
pub(crate) fn validate_keys<'a, I>(keys: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for (index, key) in keys.into_iter().enumerate() {
        if key.trim().is_empty() {
            return Err(GenerationError::InvalidBatch(format!(
                "task at index {} has an empty key",
                index
            )));
        }
        if !seen.insert(key) {
            return Err(GenerationError::InvalidBatch(format!(
                "duplicate key '{}'",
                key
            )));
        }
    }
    Ok(())
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Read an `error` / `Error` field as text.
///
/// Null, `false`, `0` and empty strings mean "no error". `true` and other
/// numbers are treated as opaque error flags and codes.
fn error_field(json: &Value) -> Option<String> {
    let value = json.get("error").or_else(|| json.get("Error"))?;
    let text = match value {
        Value::Null | Value::Bool(false) => return None,
        Value::Bool(true) => "Job reported an unspecified error".to_string(),
        Value::Number(n) if n.as_f64() == Some(0.0) => return None,
        Value::Number(n) => format!("Job reported error code {}", n),
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn output_url(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj.get("url").and_then(|u| u.as_str()).map(String::from),
        _ => None,
    }
}
