//! Data models for detection requests and results.
//!
//! This module defines the detection kinds understood by the remote service,
//! the two payload shapes a submission can carry, and the typed interpretation
//! of the service's loosely-shaped JSON responses.
//!
//! The service answers each endpoint with a different body shape:
//!
//! ```json
//! { "message": "Likely AI-Generated Audio", "confidence": 87.5 }
//! { "prediction": "FAKE", "confidence": 93.1 }
//! { "label": "REAL", "prob_real": 71.2, "prob_fake": 28.8 }
//! ```
//!
//! [`DetectionResult::interpret`] folds those into one discriminated type.
//! Interpretation never fails; missing fields become `None` and render as
//! [`PLACEHOLDER`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::validation;

/// Display value substituted for any field the service left out.
pub const PLACEHOLDER: &str = "N/A";

/// The four kinds of content the service can classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    Audio,
    Video,
    Image,
    Code,
}

impl DetectionKind {
    pub const ALL: [DetectionKind; 4] = [
        DetectionKind::Audio,
        DetectionKind::Video,
        DetectionKind::Image,
        DetectionKind::Code,
    ];

    /// Lowercase name, as used in endpoint paths and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionKind::Audio => "audio",
            DetectionKind::Video => "video",
            DetectionKind::Image => "image",
            DetectionKind::Code => "code",
        }
    }

    /// Endpoint path relative to the API base address.
    pub fn endpoint(self) -> String {
        format!("/detect/{}", self.as_str())
    }

    /// Multipart field name carrying the upload, `None` for code which is sent as JSON.
    pub fn field_name(self) -> Option<&'static str> {
        match self {
            DetectionKind::Code => None,
            media => Some(media.as_str()),
        }
    }

    /// Advisory MIME prefix a media upload of this kind is expected to match.
    pub fn mime_prefix(self) -> Option<&'static str> {
        match self {
            DetectionKind::Audio => Some("audio/"),
            DetectionKind::Video => Some("video/"),
            DetectionKind::Image => Some("image/"),
            DetectionKind::Code => None,
        }
    }

    pub fn is_media(self) -> bool {
        self.field_name().is_some()
    }
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DetectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown detection kind: {s}"))
    }
}

/// One binary file selected for upload.
///
/// The MIME type is sniffed from the file's magic bytes when the upload is
/// built; it is advisory only and the service performs its own checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    /// File name sent in the multipart part's `filename` parameter
    pub file_name: String,
    /// MIME type sent as the part's content type
    pub mime_type: String,
    /// Raw file contents
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    /// Builds an upload with an explicit MIME type.
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Builds an upload whose MIME type is sniffed from its contents.
    ///
    /// Falls back to `application/octet-stream` when the content is not
    /// recognised.
    pub fn sniffed(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mime_type = validation::sniff_mime(&bytes)
            .unwrap_or(validation::FALLBACK_MIME)
            .to_string();
        Self::new(file_name, mime_type, bytes)
    }

    /// Reads a file from disk and sniffs its MIME type.
    ///
    /// # Errors
    /// Returns the underlying I/O error if the file cannot be read.
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("upload"));
        Ok(Self::sniffed(file_name, bytes))
    }
}

/// Source code submitted for classification, serialised as `{"code": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CodePayload {
    #[validate(
        custom(function = "validation::not_blank"),
        length(min = 5, message = "Code must be at least 5 characters")
    )]
    pub code: String,
}

impl CodePayload {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Exactly one input for a submission: a file or a text blob, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Media(MediaUpload),
    Code(CodePayload),
}

impl From<MediaUpload> for Payload {
    fn from(value: MediaUpload) -> Self {
        Payload::Media(value)
    }
}

impl From<CodePayload> for Payload {
    fn from(value: CodePayload) -> Self {
        Payload::Code(value)
    }
}

/// Label and confidence as returned by the audio and code endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Verdict {
    pub message: Option<String>,
    /// Percentage in `0..=100`
    pub confidence: Option<f64>,
    pub details: Option<Value>,
}

/// Prediction returned by the video endpoint (`REAL` or `FAKE`).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VideoVerdict {
    pub prediction: Option<String>,
    pub confidence: Option<f64>,
    pub details: Option<Value>,
}

/// Class probabilities returned by the image endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ImageVerdict {
    /// `REAL` or `FAKE`
    pub label: Option<String>,
    pub prob_real: Option<f64>,
    pub prob_fake: Option<f64>,
    pub details: Option<Value>,
}

/// Typed view over a detection response, one variant per detection kind.
///
/// Built from the raw JSON body with [`DetectionResult::interpret`]. The raw
/// body is always kept alongside by callers that need the exact bytes the
/// service produced; this type is for display and decisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DetectionResult {
    Audio(Verdict),
    Video(VideoVerdict),
    Image(ImageVerdict),
    Code(Verdict),
    /// The service answered successfully but reported an inference error
    /// in an `error` field instead of a verdict.
    #[serde(rename = "server_error")]
    ServerError {
        #[serde(rename = "detection")]
        kind: DetectionKind,
        error: String,
    },
}

impl DetectionResult {
    /// Interprets a raw response body for the given kind.
    ///
    /// Non-object bodies and wrongly-typed fields are tolerated; every
    /// field that cannot be read is left as `None`.
    pub fn interpret(kind: DetectionKind, body: &Value) -> Self {
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return DetectionResult::ServerError {
                kind,
                error: error.to_string(),
            };
        }

        let details = body.get("details").filter(|d| !d.is_null()).cloned();
        match kind {
            DetectionKind::Audio | DetectionKind::Code => {
                let verdict = Verdict {
                    message: text_field(body, "message"),
                    confidence: number_field(body, "confidence"),
                    details,
                };
                if kind == DetectionKind::Audio {
                    DetectionResult::Audio(verdict)
                } else {
                    DetectionResult::Code(verdict)
                }
            }
            DetectionKind::Video => DetectionResult::Video(VideoVerdict {
                prediction: text_field(body, "prediction"),
                confidence: number_field(body, "confidence"),
                details,
            }),
            DetectionKind::Image => DetectionResult::Image(ImageVerdict {
                label: text_field(body, "label"),
                prob_real: number_field(body, "prob_real"),
                prob_fake: number_field(body, "prob_fake"),
                details,
            }),
        }
    }

    pub fn kind(&self) -> DetectionKind {
        match self {
            DetectionResult::Audio(_) => DetectionKind::Audio,
            DetectionResult::Video(_) => DetectionKind::Video,
            DetectionResult::Image(_) => DetectionKind::Image,
            DetectionResult::Code(_) => DetectionKind::Code,
            DetectionResult::ServerError { kind, .. } => *kind,
        }
    }

    /// Whether the verdict says the content is machine-generated.
    ///
    /// Returns `None` when the deciding field is missing or the service
    /// reported an error.
    pub fn is_ai_generated(&self) -> Option<bool> {
        match self {
            DetectionResult::Audio(v) | DetectionResult::Code(v) => {
                v.message.as_deref().map(mentions_ai)
            }
            DetectionResult::Video(v) => v
                .prediction
                .as_ref()
                .map(|p| p.eq_ignore_ascii_case("fake")),
            DetectionResult::Image(v) => {
                v.label.as_ref().map(|l| !l.eq_ignore_ascii_case("real"))
            }
            DetectionResult::ServerError { .. } => None,
        }
    }

    /// Endpoint-specific extra fields, if the service sent any.
    pub fn details(&self) -> Option<&Value> {
        match self {
            DetectionResult::Audio(v) | DetectionResult::Code(v) => v.details.as_ref(),
            DetectionResult::Video(v) => v.details.as_ref(),
            DetectionResult::Image(v) => v.details.as_ref(),
            DetectionResult::ServerError { .. } => None,
        }
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionResult::Audio(v) | DetectionResult::Code(v) => {
                writeln!(f, "Result: {}", text_or_placeholder(&v.message))?;
                write!(f, "Confidence: {}", percent_or_placeholder(v.confidence))
            }
            DetectionResult::Video(v) => {
                writeln!(f, "Result: {}", text_or_placeholder(&v.prediction))?;
                write!(f, "Confidence: {}", percent_or_placeholder(v.confidence))
            }
            DetectionResult::Image(v) => {
                writeln!(f, "Result: {}", text_or_placeholder(&v.label))?;
                writeln!(f, "Real: {}", percent_or_placeholder(v.prob_real))?;
                write!(f, "Fake: {}", percent_or_placeholder(v.prob_fake))
            }
            DetectionResult::ServerError { kind, error } => {
                write!(f, "The {kind} detector reported an error: {error}")
            }
        }
    }
}

fn text_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

// Numbers may arrive as JSON numbers or numeric strings.
fn number_field(body: &Value, key: &str) -> Option<f64> {
    match body.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

// "AI" as a standalone word, so "Failed to ..." does not count.
fn mentions_ai(message: &str) -> bool {
    message
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("ai"))
}

fn text_or_placeholder(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(PLACEHOLDER)
}

fn percent_or_placeholder(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v}%"))
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}
