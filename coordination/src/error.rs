//! Dispatch error types
//!
//! Only precondition failures surface to whoever started a dispatch.
//! Per-candidate delivery failures are [`ChannelError`]s and are absorbed by
//! the escalation scheduler.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::job::RecipientId;

/// Result type alias for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced synchronously to the initiator of a dispatch
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Job creation attempted with no selected candidates
    #[error("Invalid selection: at least one candidate must be selected")]
    InvalidSelection,

    /// The job source had nothing to dispatch
    #[error("No job available to dispatch")]
    NoJobAvailable,

    /// Roster contains the same recipient twice
    #[error("Duplicate candidate in roster: {id}")]
    DuplicateCandidate { id: RecipientId },

    /// Selection refers to a recipient that is not on the roster
    #[error("Unknown candidate: {id}")]
    UnknownCandidate { id: RecipientId },

    /// Another job is still escalating and concurrent jobs are disabled
    #[error("Job {job_id} is still in flight")]
    JobInFlight { job_id: String },

    /// Job source failed for a reason other than having no job
    #[error("Job source error: {message}")]
    Source { message: String },

    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The escalation task ended without producing a report
    #[error("Escalation for job {job_id} was aborted")]
    Aborted { job_id: String },
}

/// Errors reported by a notification channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Delivery to this recipient is structurally impossible (blocked, unknown chat, ...)
    #[error("Recipient {recipient} unreachable: {reason}")]
    RecipientUnreachable { recipient: RecipientId, reason: String },

    /// Transient transport failure
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The call did not complete within the configured call timeout
    #[error("Channel call timed out after {0:?}")]
    Timeout(Duration),
}

impl ChannelError {
    /// Hard failure that no retry can fix
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::RecipientUnreachable { .. })
    }

    /// Short machine-readable kind, used in events and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecipientUnreachable { .. } => "recipient_unreachable",
            Self::Delivery(_) => "delivery_error",
            Self::Timeout(_) => "timeout",
        }
    }
}
