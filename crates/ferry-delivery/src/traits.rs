//! Push transport abstraction for Ferry.
//!
//! A transport posts one encoded payload to a subscriber and reports the
//! status code the subscriber answered with. Everything above it (what to
//! post, where, and what the answer means) lives in the pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use ferry_model::CodecError;
use thiserror::Error;

/// Status code of a successful push.
pub const STATUS_OK: u16 = 200;

/// Status code a subscriber answers with to cancel its subscription.
pub const STATUS_RESET_CONTENT: u16 = 205;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The subscriber did not answer in time.
    #[error("Request timed out")]
    Timeout,

    /// The push address could not be used.
    #[error("Invalid push address: {0}")]
    InvalidAddress(String),

    /// The request failed before a status was received.
    #[error("Request failed: {0}")]
    Request(String),

    /// The payload could not be encoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// How a push ended, from the subscription's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Accepted by the subscriber.
    Delivered,
    /// The subscriber asked to stop receiving pushes.
    Reset,
    /// Any other status, or no status at all.
    Failed(Option<u16>),
}

impl PushOutcome {
    /// Classify the result of a post.
    #[must_use]
    pub fn from_result(result: &Result<u16, TransportError>) -> Self {
        match result {
            Ok(STATUS_OK) => PushOutcome::Delivered,
            Ok(STATUS_RESET_CONTENT) => PushOutcome::Reset,
            Ok(status) => PushOutcome::Failed(Some(*status)),
            Err(_) => PushOutcome::Failed(None),
        }
    }

    /// Label used in metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PushOutcome::Delivered => "delivered",
            PushOutcome::Reset => "reset",
            PushOutcome::Failed(_) => "failed",
        }
    }
}

/// An outbound HTTP-style push channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a payload and return the response status code.
    async fn post(&self, url: &str, content_type: &str, body: Bytes) -> Result<u16, TransportError>;

    /// Get the transport name (e.g., "http").
    fn name(&self) -> &'static str;
}
