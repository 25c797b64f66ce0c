//! Advisory client-side checks run before a request is issued.
//!
//! These checks only improve feedback for the user. The detection service
//! re-validates every upload and remains the authority on what it accepts.

use thiserror::Error;
use validator::Validate;

use crate::models::{CodePayload, DetectionKind, MediaUpload, Payload};

/// Content type used when a file's magic bytes are not recognised.
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Reasons an input is refused before anything is sent.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// The file content does not look like the expected media type.
    #[error("Please select a valid {kind} file (detected {detected})")]
    WrongMediaType {
        kind: DetectionKind,
        detected: String,
    },
    /// The selected file has no content.
    #[error("The selected file is empty")]
    EmptyFile,
    /// The code text is blank or too short.
    #[error("Please enter some code to analyze: {0}")]
    InvalidCode(String),
    /// A file was given where code was expected, or the reverse.
    #[error("A {kind} detection cannot be submitted with this input")]
    PayloadMismatch { kind: DetectionKind },
}

/// Sniffs the MIME type from a file's leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|kind| kind.mime_type())
}

/// Checks that a media upload plausibly matches the detection kind.
///
/// Content that cannot be sniffed is let through; only a positive
/// identification as some other type is refused.
///
/// # Errors
/// Returns [`ValidationError::EmptyFile`] for empty uploads and
/// [`ValidationError::WrongMediaType`] when the sniffed type has the wrong
/// prefix.
pub fn check_media(kind: DetectionKind, upload: &MediaUpload) -> Result<(), ValidationError> {
    let Some(prefix) = kind.mime_prefix() else {
        return Err(ValidationError::PayloadMismatch { kind });
    };

    if upload.bytes.is_empty() {
        return Err(ValidationError::EmptyFile);
    }

    if let Some(detected) = sniff_mime(&upload.bytes) {
        if !detected.starts_with(prefix) {
            return Err(ValidationError::WrongMediaType {
                kind,
                detected: detected.to_string(),
            });
        }
    } else if upload.mime_type != FALLBACK_MIME && !upload.mime_type.starts_with(prefix) {
        return Err(ValidationError::WrongMediaType {
            kind,
            detected: upload.mime_type.clone(),
        });
    }

    Ok(())
}

/// Checks that a code snippet is worth sending.
///
/// # Errors
/// Returns [`ValidationError::InvalidCode`] for blank or short snippets.
pub fn check_code(payload: &CodePayload) -> Result<(), ValidationError> {
    payload.validate().map_err(|errors| {
        let reason = errors
            .field_errors()
            .into_values()
            .flatten()
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| String::from("invalid code"));
        ValidationError::InvalidCode(reason)
    })
}

/// Runs the check appropriate for the payload shape and detection kind.
///
/// # Errors
/// Returns [`ValidationError::PayloadMismatch`] when a file is given for
/// code detection or text for media detection.
pub fn check_payload(kind: DetectionKind, payload: &Payload) -> Result<(), ValidationError> {
    match (kind, payload) {
        (DetectionKind::Code, Payload::Code(code)) => check_code(code),
        (kind, Payload::Media(upload)) if kind.is_media() => check_media(kind, upload),
        (kind, _) => Err(ValidationError::PayloadMismatch { kind }),
    }
}

/// Custom `validator` rule: rejects text that is empty once trimmed.
pub fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        let mut error = validator::ValidationError::new("blank");
        error.message = Some("Code cannot be empty".into());
        return Err(error);
    }
    Ok(())
}
