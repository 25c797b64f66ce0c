//! Detection service client.
//!
//! Provides one async operation per detection kind. Each call performs exactly
//! one HTTP round trip and hands back the decoded JSON body untouched; there is
//! no retry, caching or deduplication.

use std::time::Instant;

use reqwest::{
    Client, RequestBuilder, StatusCode,
    header::CONTENT_TYPE,
    multipart::{Form, Part},
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::{ClientConfig, ConfigError},
    models::{CodePayload, DetectionKind, MediaUpload, Payload},
    validation::ValidationError,
};

/// Errors that can occur when communicating with the detection service.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Transport failure: connection refused, reset, timed out.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("Detection service returned {status}")]
    Status { status: StatusCode, body: String },
    /// The service answered successfully but the body is not JSON.
    #[error("Invalid response from detection service: {0}")]
    InvalidResponse(#[source] serde_json::Error),
    /// The payload does not fit the requested detection kind.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// The client could not be configured.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The request was aborted before it completed.
    #[error("Request was cancelled")]
    Cancelled,
}

impl DetectError {
    /// Message shown to users when a detection fails.
    ///
    /// Service and transport failures are deliberately indistinguishable here;
    /// the full error is available for diagnostics.
    pub fn user_message(&self, kind: DetectionKind) -> String {
        match self {
            DetectError::Invalid(e) => e.to_string(),
            DetectError::Cancelled => String::from("Detection was cancelled."),
            _ => format!("Failed to analyze the {kind}. Please try again."),
        }
    }

    /// HTTP status of the failed response, if the service answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DetectError::Status { status, .. } => Some(*status),
            DetectError::Http(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DetectError::Cancelled)
    }
}

/// Client for the four detection endpoints.
///
/// Cloning is cheap and clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct DetectionClient {
    http: Client,
    config: ClientConfig,
}

impl DetectionClient {
    /// Builds a client for the given configuration.
    ///
    /// # Errors
    /// Returns [`DetectError::Http`] if the HTTP stack cannot be initialised.
    pub fn new(config: ClientConfig) -> Result<Self, DetectError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            config,
        })
    }

    /// Builds a client from `DETECTA_*` environment variables.
    ///
    /// # Errors
    /// Returns [`DetectError::Config`] for unusable settings.
    pub fn from_env() -> Result<Self, DetectError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends an audio file as the multipart field `audio` to `/detect/audio`.
    ///
    /// # Errors
    /// Returns [`DetectError`] if the request fails, the service answers with
    /// a non-success status, or the body is not JSON.
    pub async fn detect_audio(&self, upload: MediaUpload) -> Result<Value, DetectError> {
        self.post_media(DetectionKind::Audio, upload).await
    }

    /// Sends a video file as the multipart field `video` to `/detect/video`.
    ///
    /// # Errors
    /// See [`DetectionClient::detect_audio`].
    pub async fn detect_video(&self, upload: MediaUpload) -> Result<Value, DetectError> {
        self.post_media(DetectionKind::Video, upload).await
    }

    /// Sends an image file as the multipart field `image` to `/detect/image`.
    ///
    /// # Errors
    /// See [`DetectionClient::detect_audio`].
    pub async fn detect_image(&self, upload: MediaUpload) -> Result<Value, DetectError> {
        self.post_media(DetectionKind::Image, upload).await
    }

    /// Sends `{"code": ...}` as JSON to `/detect/code`.
    ///
    /// # Errors
    /// See [`DetectionClient::detect_audio`].
    #[instrument(skip_all, fields(kind = "code", chars = payload.code.chars().count()))]
    pub async fn detect_code(&self, payload: CodePayload) -> Result<Value, DetectError> {
        let url = self.config.endpoint_url(&DetectionKind::Code.endpoint());
        let request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload);
        self.send(DetectionKind::Code, request).await
    }

    /// Dispatches a payload to the operation for `kind`.
    ///
    /// # Errors
    /// Returns [`DetectError::Invalid`] without sending anything when a file
    /// is given for code detection or text for media detection.
    pub async fn detect(&self, kind: DetectionKind, payload: Payload) -> Result<Value, DetectError> {
        match (kind, payload) {
            (DetectionKind::Audio, Payload::Media(upload)) => self.detect_audio(upload).await,
            (DetectionKind::Video, Payload::Media(upload)) => self.detect_video(upload).await,
            (DetectionKind::Image, Payload::Media(upload)) => self.detect_image(upload).await,
            (DetectionKind::Code, Payload::Code(code)) => self.detect_code(code).await,
            (kind, _) => Err(ValidationError::PayloadMismatch { kind }.into()),
        }
    }

    #[instrument(
        skip_all,
        fields(kind = %kind, file = %upload.file_name, mime = %upload.mime_type, bytes = upload.bytes.len())
    )]
    async fn post_media(&self, kind: DetectionKind, upload: MediaUpload) -> Result<Value, DetectError> {
        let Some(field) = kind.field_name() else {
            return Err(ValidationError::PayloadMismatch { kind }.into());
        };

        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)?;
        let form = Form::new().part(field, part);

        let url = self.config.endpoint_url(&kind.endpoint());
        let request = self.http.post(url).multipart(form);
        self.send(kind, request).await
    }

    async fn send(&self, kind: DetectionKind, request: RequestBuilder) -> Result<Value, DetectError> {
        let started = Instant::now();
        debug!(endpoint = %kind.endpoint(), "sending detection request");

        let res = request.send().await.map_err(|e| {
            warn!(error = %e, "detection request failed");
            DetectError::Http(e)
        })?;

        let status = res.status();
        let body = res.text().await?;
        let elapsed = humantime::format_duration(started.elapsed());

        if !status.is_success() {
            warn!(%status, %elapsed, "detection service rejected request");
            return Err(DetectError::Status { status, body });
        }

        let value = serde_json::from_str::<Value>(&body).map_err(|e| {
            warn!(error = %e, "detection response is not valid JSON");
            DetectError::InvalidResponse(e)
        })?;
        info!(%status, %elapsed, "detection completed");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_failure_cause() {
        let status = DetectError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: String::from("upstream down"),
        };
        assert_eq!(
            status.user_message(DetectionKind::Video),
            "Failed to analyze the video. Please try again."
        );
        assert_eq!(status.status(), Some(StatusCode::BAD_GATEWAY));

        let parse = DetectError::InvalidResponse(
            serde_json::from_str::<Value>("<html>").unwrap_err(),
        );
        assert_eq!(
            parse.user_message(DetectionKind::Code),
            "Failed to analyze the code. Please try again."
        );
        assert_eq!(parse.status(), None);
    }

    #[tokio::test]
    async fn mismatched_payload_is_refused_locally() {
        // Port 9 (discard) is never contacted; the mismatch is caught first.
        let config = ClientConfig::with_api_url("http://127.0.0.1:9/api").unwrap();
        let client = DetectionClient::new(config).unwrap();
        let err = client
            .detect(DetectionKind::Audio, Payload::Code(CodePayload::new("print(1)")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DetectError::Invalid(ValidationError::PayloadMismatch {
                kind: DetectionKind::Audio
            })
        ));
        assert!(!err.is_cancelled());
    }
}
