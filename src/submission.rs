//! Submission lifecycle shared by every detection kind.
//!
//! A [`Submission`] owns one input and at most one outstanding request:
//!
//! ```text
//! Idle --select--> InputSelected --begin--> Submitting --complete--> Succeeded
//!                        ^                      |                 \-> Failed
//!                        \-------cancel---------/
//! ```
//!
//! Requests are abortable. Cancelling, resetting or dropping the submission
//! aborts the request in flight, and a completion arriving for a request that
//! is no longer current is discarded instead of overwriting newer state.

use chrono::{DateTime, Utc};
use futures::{
    FutureExt,
    future::{AbortHandle, Abortable, Aborted, BoxFuture},
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    detection::{DetectError, DetectionClient},
    models::{DetectionKind, DetectionResult, Payload},
    validation::{self, ValidationError},
};

/// Reasons a submission action is refused.
#[derive(Debug, Error, PartialEq)]
pub enum SubmissionError {
    /// A request is already in flight; wait for it or cancel it first.
    #[error("A detection is already in progress")]
    Busy,
    /// Nothing has been selected to submit.
    #[error("Select an input before submitting")]
    NoInput,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// A completed detection.
#[derive(Debug, Clone)]
pub struct Detection {
    pub submission_id: Uuid,
    /// Body exactly as returned by the service
    pub response: Value,
    /// Typed interpretation of `response`
    pub result: DetectionResult,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum SubmissionState {
    Idle,
    InputSelected,
    Submitting {
        submission_id: Uuid,
        started_at: DateTime<Utc>,
    },
    Succeeded(Detection),
    Failed {
        submission_id: Uuid,
        /// Generic text suitable for showing to users
        message: String,
        error: DetectError,
    },
}

impl SubmissionState {
    pub fn name(&self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::InputSelected => "input_selected",
            SubmissionState::Submitting { .. } => "submitting",
            SubmissionState::Succeeded(_) => "succeeded",
            SubmissionState::Failed { .. } => "failed",
        }
    }
}

/// Identifies one request started by [`Submission::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(Uuid);

impl Ticket {
    pub fn submission_id(&self) -> Uuid {
        self.0
    }
}

/// A request in flight. Await [`InFlight::outcome`] and feed the result back
/// through [`Submission::complete`].
pub struct InFlight {
    ticket: Ticket,
    future: Abortable<BoxFuture<'static, Result<Value, DetectError>>>,
}

impl InFlight {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Drives the request to completion.
    ///
    /// Resolves with [`DetectError::Cancelled`] if the owning submission
    /// aborted the request.
    pub async fn outcome(self) -> (Ticket, Result<Value, DetectError>) {
        let outcome = match self.future.await {
            Ok(result) => result,
            Err(Aborted) => Err(DetectError::Cancelled),
        };
        (self.ticket, outcome)
    }
}

/// Input, state and in-flight request for one detection view.
#[derive(Debug)]
pub struct Submission {
    kind: DetectionKind,
    input: Option<Payload>,
    state: SubmissionState,
    in_flight: Option<(Ticket, AbortHandle)>,
}

impl Submission {
    pub fn new(kind: DetectionKind) -> Self {
        Self {
            kind,
            input: None,
            state: SubmissionState::Idle,
            in_flight: None,
        }
    }

    pub fn kind(&self) -> DetectionKind {
        self.kind
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    pub fn input(&self) -> Option<&Payload> {
        self.input.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The latest successful detection, if the last submission succeeded.
    pub fn detection(&self) -> Option<&Detection> {
        match &self.state {
            SubmissionState::Succeeded(detection) => Some(detection),
            _ => None,
        }
    }

    /// Selects the input to submit, replacing any previous one and clearing
    /// the previous result.
    ///
    /// # Errors
    /// - [`SubmissionError::Busy`] while a request is in flight
    /// - [`SubmissionError::Invalid`] when the advisory checks reject the
    ///   input; the current state is left untouched
    pub fn select(&mut self, payload: impl Into<Payload>) -> Result<(), SubmissionError> {
        if self.is_submitting() {
            return Err(SubmissionError::Busy);
        }
        let payload = payload.into();
        validation::check_payload(self.kind, &payload)?;

        self.input = Some(payload);
        self.state = SubmissionState::InputSelected;
        Ok(())
    }

    /// Starts a request for the selected input.
    ///
    /// The returned [`InFlight`] does nothing until awaited. The request can
    /// be aborted through this submission at any point.
    ///
    /// # Errors
    /// - [`SubmissionError::Busy`] if a request is already in flight
    /// - [`SubmissionError::NoInput`] if nothing is selected
    pub fn begin(&mut self, client: &DetectionClient) -> Result<InFlight, SubmissionError> {
        if self.is_submitting() {
            return Err(SubmissionError::Busy);
        }
        let payload = self.input.clone().ok_or(SubmissionError::NoInput)?;

        let ticket = Ticket(Uuid::new_v4());
        let kind = self.kind;
        let client = client.clone();
        let request = async move { client.detect(kind, payload).await }.boxed();

        let (handle, registration) = AbortHandle::new_pair();
        self.in_flight = Some((ticket, handle));
        self.state = SubmissionState::Submitting {
            submission_id: ticket.0,
            started_at: Utc::now(),
        };
        info!(submission_id = %ticket.0, kind = %kind, "detection submitted");

        Ok(InFlight {
            ticket,
            future: Abortable::new(request, registration),
        })
    }

    /// Records the outcome of a request started by [`Submission::begin`].
    ///
    /// Returns `false` and leaves the state untouched when `ticket` is not
    /// the request currently in flight (it was cancelled or superseded).
    pub fn complete(&mut self, ticket: Ticket, outcome: Result<Value, DetectError>) -> bool {
        match self.in_flight {
            Some((current, _)) if current == ticket => {}
            _ => {
                debug!(submission_id = %ticket.0, "discarding stale detection outcome");
                return false;
            }
        }
        self.in_flight = None;

        self.state = match outcome {
            Ok(response) => {
                let result = DetectionResult::interpret(self.kind, &response);
                SubmissionState::Succeeded(Detection {
                    submission_id: ticket.0,
                    response,
                    result,
                    completed_at: Utc::now(),
                })
            }
            Err(error) => {
                warn!(submission_id = %ticket.0, error = %error, "detection failed");
                SubmissionState::Failed {
                    submission_id: ticket.0,
                    message: error.user_message(self.kind),
                    error,
                }
            }
        };
        true
    }

    /// Aborts the request in flight and returns to the selected input.
    ///
    /// Returns `false` if nothing was in flight.
    pub fn cancel(&mut self) -> bool {
        let Some((ticket, handle)) = self.in_flight.take() else {
            return false;
        };
        handle.abort();
        info!(submission_id = %ticket.0, "detection cancelled");
        self.state = if self.input.is_some() {
            SubmissionState::InputSelected
        } else {
            SubmissionState::Idle
        };
        true
    }

    /// Aborts anything in flight and forgets the input.
    pub fn reset(&mut self) {
        self.cancel();
        self.input = None;
        self.state = SubmissionState::Idle;
    }

    /// Begins a request, waits for it and records the outcome.
    ///
    /// # Errors
    /// See [`Submission::begin`]. Request failures are not errors here; they
    /// end in [`SubmissionState::Failed`].
    #[instrument(skip_all, fields(kind = %self.kind))]
    pub async fn run(&mut self, client: &DetectionClient) -> Result<&SubmissionState, SubmissionError> {
        let in_flight = self.begin(client)?;
        let (ticket, outcome) = in_flight.outcome().await;
        self.complete(ticket, outcome);
        Ok(&self.state)
    }
}

impl Drop for Submission {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.in_flight.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ClientConfig, models::CodePayload};
    use serde_json::json;

    fn client() -> DetectionClient {
        // Never contacted: these tests complete requests by hand.
        DetectionClient::new(ClientConfig::with_api_url("http://127.0.0.1:9/api").unwrap())
            .unwrap()
    }

    fn code() -> CodePayload {
        CodePayload::new("def foo(): pass")
    }

    #[test]
    fn starts_idle_and_requires_input() {
        let mut submission = Submission::new(DetectionKind::Code);
        assert_eq!(submission.state().name(), "idle");
        assert_eq!(submission.begin(&client()).err(), Some(SubmissionError::NoInput));
    }

    #[test]
    fn invalid_input_keeps_previous_state() {
        let mut submission = Submission::new(DetectionKind::Code);
        let err = submission.select(CodePayload::new("  ")).unwrap_err();
        assert!(matches!(err, SubmissionError::Invalid(_)));
        assert_eq!(submission.state().name(), "idle");
        assert!(submission.input().is_none());
    }

    #[tokio::test]
    async fn success_populates_detection() {
        let mut submission = Submission::new(DetectionKind::Code);
        submission.select(code()).unwrap();
        assert_eq!(submission.state().name(), "input_selected");

        let in_flight = submission.begin(&client()).unwrap();
        assert!(submission.is_submitting());
        assert_eq!(submission.begin(&client()).err(), Some(SubmissionError::Busy));
        assert_eq!(submission.select(code()).err(), Some(SubmissionError::Busy));

        let body = json!({"message": "Likely AI-Generated Code", "confidence": 97.3});
        assert!(submission.complete(in_flight.ticket(), Ok(body.clone())));

        let detection = submission.detection().expect("detection");
        assert_eq!(detection.response, body);
        assert_eq!(detection.result.is_ai_generated(), Some(true));
        assert!(!submission.is_submitting());
    }

    #[tokio::test]
    async fn failure_leaves_no_result() {
        let mut submission = Submission::new(DetectionKind::Code);
        submission.select(code()).unwrap();
        let in_flight = submission.begin(&client()).unwrap();

        let error = DetectError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body: String::new(),
        };
        assert!(submission.complete(in_flight.ticket(), Err(error)));
        assert!(submission.detection().is_none());
        match submission.state() {
            SubmissionState::Failed { message, .. } => {
                assert_eq!(message, "Failed to analyze the code. Please try again.")
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_request_resolves_as_cancelled_and_is_discarded() {
        let mut submission = Submission::new(DetectionKind::Code);
        submission.select(code()).unwrap();
        let in_flight = submission.begin(&client()).unwrap();

        assert!(submission.cancel());
        assert!(!submission.cancel());
        assert_eq!(submission.state().name(), "input_selected");

        let (ticket, outcome) = in_flight.outcome().await;
        assert!(matches!(outcome, Err(DetectError::Cancelled)));
        assert!(!submission.complete(ticket, outcome));
        assert_eq!(submission.state().name(), "input_selected");
    }

    #[tokio::test]
    async fn superseded_outcome_does_not_overwrite_newer_request() {
        let mut submission = Submission::new(DetectionKind::Code);
        submission.select(code()).unwrap();
        let first = submission.begin(&client()).unwrap();
        submission.cancel();
        let second = submission.begin(&client()).unwrap();
        assert_ne!(first.ticket(), second.ticket());

        assert!(!submission.complete(first.ticket(), Ok(json!({"message": "old"}))));
        assert_eq!(submission.state().name(), "submitting");

        assert!(submission.complete(second.ticket(), Ok(json!({"message": "new"}))));
        assert_eq!(
            submission.detection().map(|d| d.response.clone()),
            Some(json!({"message": "new"}))
        );
    }

    #[tokio::test]
    async fn reset_and_drop_abort_in_flight_requests() {
        let mut submission = Submission::new(DetectionKind::Code);
        submission.select(code()).unwrap();
        let in_flight = submission.begin(&client()).unwrap();
        submission.reset();
        assert_eq!(submission.state().name(), "idle");
        assert!(submission.input().is_none());
        assert!(in_flight.outcome().await.1.unwrap_err().is_cancelled());

        let mut submission = Submission::new(DetectionKind::Code);
        submission.select(code()).unwrap();
        let in_flight = submission.begin(&client()).unwrap();
        drop(submission);
        assert!(in_flight.outcome().await.1.unwrap_err().is_cancelled());
    }
}
