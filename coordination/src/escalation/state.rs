//! Escalation State: phases, per-candidate history and final outcome

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::active_job::JobId;
use crate::job::{Candidate, Job};

/// Phases of the escalation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPhase {
    /// Picking the next candidate and delivering the offer
    Proposing,
    /// One offer outstanding, waiting for a reply or the timer
    AwaitingReply,
    /// Previous candidate is out; about to propose to the next
    Escalating,
    /// A candidate took the job (terminal)
    Accepted,
    /// Nobody took the job (terminal)
    Exhausted,
}

impl EscalationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Exhausted)
    }
}

impl std::fmt::Display for EscalationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposing => write!(f, "proposing"),
            Self::AwaitingReply => write!(f, "awaiting_reply"),
            Self::Escalating => write!(f, "escalating"),
            Self::Accepted => write!(f, "accepted"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// How a candidate's turn ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Accepted,
    Declined,
    /// Response window elapsed without a reply
    TimedOut,
    /// Channel reported the recipient as unreachable
    Unreachable { reason: String },
    /// Transient delivery errors outlasted the retry budget
    DeliveryFailed { attempts: u32, error: String },
}

impl Disposition {
    /// Whether the candidate actually received the offer
    pub fn was_delivered(&self) -> bool {
        matches!(self, Self::Accepted | Self::Declined | Self::TimedOut)
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Declined => write!(f, "declined"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Unreachable { reason } => write!(f, "unreachable: {}", reason),
            Self::DeliveryFailed { attempts, error } => {
                write!(f, "delivery failed after {} attempt(s): {}", attempts, error)
            }
        }
    }
}

/// Record of one candidate's turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    /// Candidate whose turn this was
    pub candidate: Candidate,
    /// How the turn ended
    pub disposition: Disposition,
    /// When the turn ended
    pub timestamp: DateTime<Utc>,
}

/// Terminal result of an escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EscalationOutcome {
    Accepted { candidate: Candidate },
    Exhausted,
}

impl EscalationOutcome {
    pub fn accepted_by(&self) -> Option<&Candidate> {
        match self {
            Self::Accepted { candidate } => Some(candidate),
            Self::Exhausted => None,
        }
    }
}

/// Everything known about a finished escalation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationReport {
    pub job_id: JobId,
    pub job: Job,
    pub outcome: EscalationOutcome,
    /// One record per candidate taken off the queue, in the order tried
    pub history: Vec<EscalationRecord>,
    pub started_at: DateTime<Utc>,
    /// When the escalation reached its terminal state
    pub finished_at: DateTime<Utc>,
}

impl EscalationReport {
    /// Number of candidates the offer was actually delivered to
    pub fn proposals_delivered(&self) -> usize {
        self.history
            .iter()
            .filter(|r| r.disposition.was_delivered())
            .count()
    }

    /// One-line summary for logging
    pub fn summary(&self) -> String {
        let outcome = match &self.outcome {
            EscalationOutcome::Accepted { candidate } => format!("accepted by {}", candidate.name),
            EscalationOutcome::Exhausted => "exhausted".to_string(),
        };
        format!(
            "job={} outcome={} candidates={} delivered={}",
            self.job_id,
            outcome,
            self.history.len(),
            self.proposals_delivered(),
        )
    }
}
