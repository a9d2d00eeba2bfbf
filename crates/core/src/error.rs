//! Error types shared by the conversation core.

use crate::agent::AgentId;
use reqwest::StatusCode;
use thiserror::Error;

/// Classification of a failed call to a chat or speech provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 401/403, or no usable credentials.
    Unauthorized,
    RateLimited,
    /// 400, the provider rejected the request shape or the model.
    BadRequest,
    /// 5xx, network failures, or a malformed success body.
    Unavailable,
    Unknown,
}

/// A failed provider call with its classification.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unauthorized, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message)
    }

    /// Maps a non-success HTTP status from `provider` to an error.
    pub fn from_status(provider: &str, status: StatusCode, body: &str) -> Self {
        let body: String = body.chars().take(500).collect();
        match status.as_u16() {
            401 | 403 => Self::new(
                ProviderErrorKind::Unauthorized,
                format!("Invalid {provider} API key. Please check your API key in settings."),
            ),
            429 => Self::new(
                ProviderErrorKind::RateLimited,
                format!("{provider} rate limit exceeded. Please try again later."),
            ),
            400 => Self::new(
                ProviderErrorKind::BadRequest,
                format!("Invalid request parameters for {provider}: {body}"),
            ),
            code if code >= 500 => Self::new(
                ProviderErrorKind::Unavailable,
                format!("{provider} service temporarily unavailable ({code})."),
            ),
            code => Self::new(
                ProviderErrorKind::Unknown,
                format!("{provider} API error: {code} - {body}"),
            ),
        }
    }

    /// Maps a transport-level failure (connect, timeout, body read).
    pub fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(provider, status, &err.to_string()),
            None => Self::unavailable(format!("Network error connecting to {provider}: {err}")),
        }
    }
}

/// Reasons a conversation refuses to start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("No model selected for {0}. Please select models for both AI agents in the settings.")]
    MissingModel(AgentId),
    #[error("The opening message must not be empty.")]
    EmptySeed,
    #[error("A conversation is already running.")]
    AlreadyActive,
}

/// Failures that end a turn, and with it the run.
#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Empty response from {0}")]
    EmptyResponse(AgentId),
}

/// Failure to hand audio to a listener or to finish playing it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("audio playback failed: {0}")]
    Failed(String),
    #[error("no listener is attached to play audio")]
    Disconnected,
}

/// Transcript persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid conversation ID format")]
    InvalidId,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
