//! Detection strategies: discover candidate transactions for a session.
//!
//! A network with a subscription endpoint is watched by [`subscriber`],
//! otherwise by [`poller`]. The choice is fixed per profile.
pub(crate) mod poller;
pub(crate) mod subscriber;

/// Why a detection strategy returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DetectionEnd {
    /// Stop was requested (caller, match, or confirmation).
    Stopped,
    /// The strategy could not continue (subscription lost for good).
    Failed,
}
