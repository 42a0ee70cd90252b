use std::time::Duration;

use thiserror::Error;

/// Every failure talking to the nutrition service, transport or application level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Host unreachable, DNS failure, connection reset, client-side timeout.
    #[error("Could not reach the nutrition service: {0}")]
    Transport(String),

    /// Non-2xx response. `message` is the body's `detail` when the service sent one.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// A success response whose body did not match the expected shape.
    #[error("Unexpected response from the nutrition service: {0}")]
    Decode(String),

    #[error("Invalid service URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl RemoteError {
    /// HTTP status of an application-level failure.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the service could not be reached at all.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Api {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Input rejected before any network interaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Describe what you ate")]
    EmptyText,
    #[error("Description is too long (max {max} characters)")]
    TextTooLong { max: usize },
    #[error("No photo selected")]
    MissingPhoto,
    #[error("Unsupported image type: {0}. Allowed: image/jpeg, image/png, image/webp, image/gif")]
    UnsupportedImageType(String),
    #[error("Image too large (max {max} bytes)")]
    PhotoTooLarge { max: usize },
    #[error("Food name is required")]
    MissingName,
    #[error("Calories are required")]
    MissingCalories,
    #[error("User id must be a positive integer (got {0})")]
    InvalidUserId(i64),
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
    },
    #[error("Nothing to update")]
    EmptyPatch,
    #[error("This run has already been submitted")]
    RunNotIdle,
    #[error("Submission does not match the run's input slot")]
    SlotMismatch,
}

/// Failure of one analysis run. Drives the run to its `Error` state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Analysis timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("Analysis was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GoalUpdateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("The host environment did not supply a user")]
    NoHostUser,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
