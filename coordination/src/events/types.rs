//! Event types for dispatch observability
//!
//! One event per escalation transition, so observers can follow a job
//! without touching scheduler state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::ProposalHandle;
use crate::escalation::active_job::JobId;
use crate::job::RecipientId;

/// All dispatch events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// A job was created and its escalation started
    JobDispatched {
        job_id: JobId,
        candidates: Vec<RecipientId>,
        timestamp: DateTime<Utc>,
    },

    /// The job was offered to a candidate
    CandidateProposed {
        job_id: JobId,
        candidate: RecipientId,
        handle: ProposalHandle,
        timestamp: DateTime<Utc>,
    },

    /// A candidate could not be reached and was skipped
    CandidateSkipped {
        job_id: JobId,
        candidate: RecipientId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A candidate declined
    CandidateDeclined {
        job_id: JobId,
        candidate: RecipientId,
        timestamp: DateTime<Utc>,
    },

    /// A candidate's response window elapsed
    ProposalTimedOut {
        job_id: JobId,
        candidate: RecipientId,
        timestamp: DateTime<Utc>,
    },

    /// A reply or timer fire for a proposal that is no longer current was ignored
    StaleEventDropped {
        job_id: JobId,
        handle: ProposalHandle,
        kind: String,
        timestamp: DateTime<Utc>,
    },

    /// A candidate accepted; terminal
    JobAccepted {
        job_id: JobId,
        candidate: RecipientId,
        timestamp: DateTime<Utc>,
    },

    /// Every candidate was tried; terminal
    JobExhausted {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
}

impl DispatchEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DispatchEvent::JobDispatched { timestamp, .. } => *timestamp,
            DispatchEvent::CandidateProposed { timestamp, .. } => *timestamp,
            DispatchEvent::CandidateSkipped { timestamp, .. } => *timestamp,
            DispatchEvent::CandidateDeclined { timestamp, .. } => *timestamp,
            DispatchEvent::ProposalTimedOut { timestamp, .. } => *timestamp,
            DispatchEvent::StaleEventDropped { timestamp, .. } => *timestamp,
            DispatchEvent::JobAccepted { timestamp, .. } => *timestamp,
            DispatchEvent::JobExhausted { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            DispatchEvent::JobDispatched { .. } => "job_dispatched",
            DispatchEvent::CandidateProposed { .. } => "candidate_proposed",
            DispatchEvent::CandidateSkipped { .. } => "candidate_skipped",
            DispatchEvent::CandidateDeclined { .. } => "candidate_declined",
            DispatchEvent::ProposalTimedOut { .. } => "proposal_timed_out",
            DispatchEvent::StaleEventDropped { .. } => "stale_event_dropped",
            DispatchEvent::JobAccepted { .. } => "job_accepted",
            DispatchEvent::JobExhausted { .. } => "job_exhausted",
        }
    }

    /// Every dispatch event is job-scoped
    pub fn job_id(&self) -> &str {
        match self {
            DispatchEvent::JobDispatched { job_id, .. }
            | DispatchEvent::CandidateProposed { job_id, .. }
            | DispatchEvent::CandidateSkipped { job_id, .. }
            | DispatchEvent::CandidateDeclined { job_id, .. }
            | DispatchEvent::ProposalTimedOut { job_id, .. }
            | DispatchEvent::StaleEventDropped { job_id, .. }
            | DispatchEvent::JobAccepted { job_id, .. }
            | DispatchEvent::JobExhausted { job_id, .. } => job_id,
        }
    }

    /// Get the candidate if this event concerns one
    pub fn candidate(&self) -> Option<&RecipientId> {
        match self {
            DispatchEvent::CandidateProposed { candidate, .. } => Some(candidate),
            DispatchEvent::CandidateSkipped { candidate, .. } => Some(candidate),
            DispatchEvent::CandidateDeclined { candidate, .. } => Some(candidate),
            DispatchEvent::ProposalTimedOut { candidate, .. } => Some(candidate),
            DispatchEvent::JobAccepted { candidate, .. } => Some(candidate),
            _ => None,
        }
    }

    /// Whether this event ends the job's escalation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchEvent::JobAccepted { .. } | DispatchEvent::JobExhausted { .. }
        )
    }
}
