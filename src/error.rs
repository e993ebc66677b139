use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Substrings that mark a failure reason as a content-safety rejection.
const SAFETY_MARKERS: &[&str] = &[
    "safety",
    "nsfw",
    "content policy",
    "moderation",
    "sensitive content",
];

/// Errors returned by generation operations.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The task was rejected locally before any network call.
    #[error("{0}")]
    Validation(String),

    /// An endpoint returned a non-success HTTP status.
    #[error("Server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// A reply was missing expected fields or could not be parsed.
    #[error("{0}")]
    InvalidResponse(String),

    /// The status endpoint answered with a non-OK status and no error payload.
    #[error("Status endpoint returned HTTP {status}")]
    Unavailable { status: u16 },

    /// The backend reported that the job will never succeed.
    #[error("{0}")]
    Rejected(String),

    /// The attempt ceiling was exhausted without a definitive outcome.
    #[error("Video generation timed out after {budget:?}")]
    Timeout { budget: Duration },

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The batch itself is malformed (empty or duplicate keys).
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for GenerationError {
    fn from(err: anyhow::Error) -> Self {
        GenerationError::Other(format!("{:#}", err))
    }
}

impl GenerationError {
    /// Whether a status query that failed this way is worth another attempt.
    ///
    /// Transport errors, unparseable replies and bare non-OK statuses say
    /// nothing about the job itself, so the poller keeps going.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Network { .. }
                | GenerationError::InvalidResponse(_)
                | GenerationError::Unavailable { .. }
                | GenerationError::Json(_)
                | GenerationError::Other(_)
        )
    }

    /// Classify this error for presentation.
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::Rejected(reason) | GenerationError::Http { body: reason, .. } => {
                FailureKind::classify(reason)
            }
            GenerationError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Generic,
        }
    }
}

/// Coarse failure category used to pick a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// The provider refused the inputs on safety grounds.
    ContentSafety,
    /// The run was cancelled before the item settled.
    Cancelled,
    Generic,
}

impl FailureKind {
    /// Match a failure reason against the known safety markers.
    pub fn classify(reason: &str) -> Self {
        let lower = reason.to_lowercase();
        if SAFETY_MARKERS.iter().any(|m| lower.contains(m)) {
            FailureKind::ContentSafety
        } else {
            FailureKind::Generic
        }
    }
}

/// A failed batch item, correlated to its caller-assigned key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub key: String,
    pub reason: String,
    pub kind: FailureKind,
}

impl ItemFailure {
    pub fn new(key: impl Into<String>, err: &GenerationError) -> Self {
        Self {
            key: key.into(),
            reason: err.to_string(),
            kind: err.kind(),
        }
    }

    /// Text suitable for showing next to the failed item.
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::ContentSafety => format!(
                "{} was blocked by the content safety filter. Try another image or prompt.",
                self.key
            ),
            FailureKind::Cancelled => format!("Generation for {} was cancelled.", self.key),
            FailureKind::Generic => format!("Generation failed for {}: {}", self.key, self.reason),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed on {}: {}", self.key, self.reason)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GenerationError>;
