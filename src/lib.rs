//! Library entry point for the ai_detecta detection client.
//!
//! Exports the detection client, the submission state machine and the
//! supporting models for use by the command-line binary and integration tests.

pub mod config;
pub mod logging;
pub mod models;
pub mod submission;
pub mod validation;
pub mod detection {
    pub mod client;
    pub use client::*;
}

pub use config::*;
pub use detection::*;
pub use logging::*;
pub use models::*;
pub use submission::*;
pub use validation::ValidationError;
