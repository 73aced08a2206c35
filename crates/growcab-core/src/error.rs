use thiserror::Error;

/// Failures of a single sensor fetch. These are recorded in [`crate::PollState`]
/// as strings and never escape the poller.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Sensor endpoint returned {status} {reason}")]
    Network { status: u16, reason: String },

    #[error("Invalid sensor payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Sensor request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures of a chat turn. Content streamed before the failure stays with the caller.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Rate limits exceeded, please try again later.")]
    RateLimited,

    #[error("Payment required, please add credits to your workspace.")]
    PaymentRequired,

    #[error("Assistant request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Assistant response has no readable body")]
    StreamUnavailable,

    #[error("Assistant stream failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ChatError {
    /// True when the service could not be reached or answered with a server fault,
    /// as opposed to an account-level condition the user has to fix.
    pub fn is_service_unavailable(&self) -> bool {
        match self {
            ChatError::RequestFailed { status, .. } => *status >= 500,
            ChatError::StreamUnavailable | ChatError::Transport(_) => true,
            ChatError::RateLimited | ChatError::PaymentRequired => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}
