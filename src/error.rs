//! Error taxonomy for the watcher and its network capability.
use std::time::Duration;

/// Failure of a single [`ChainClient`](crate::client::ChainClient) call.
///
/// The client never retries on its own; callers decide the policy.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport or node failure that may succeed on a later attempt.
    #[error("retryable rpc failure: {0}")]
    Retryable(String),

    /// The call did not complete within the configured deadline.
    #[error("rpc call timed out after {0:?}")]
    Timeout(Duration),

    /// The capability does not exist for this client (e.g. no push endpoint).
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl ClientError {
    /// Build a retryable error from anything displayable.
    pub fn retryable(err: impl std::fmt::Display) -> Self {
        Self::Retryable(err.to_string())
    }

    /// Whether a later attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

/// Errors raised while configuring or starting a watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// No profile is registered under this network id.
    #[error("unknown network `{0}`")]
    UnknownNetwork(String),

    /// A profile failed validation.
    #[error("invalid profile `{network}`: {reason}")]
    InvalidProfile {
        /// Network id of the offending profile.
        network: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The watch request is unusable as given.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An amount could not be converted to base units.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Profile table could not be decoded.
    #[error("config decode: {0}")]
    Config(#[from] serde_json::Error),

    /// Profile table could not be read.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for client calls.
pub type ClientResult<T> = Result<T, ClientError>;
