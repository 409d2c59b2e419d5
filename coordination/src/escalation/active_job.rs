//! Active Job: the job being escalated and its in-flight proposal

use crate::channel::ProposalHandle;
use crate::error::{DispatchError, DispatchResult};
use crate::escalation::queue::CandidateQueue;
use crate::escalation::timer::TimerHandle;
use crate::job::{Candidate, Job};

/// Unique identifier for a dispatched job
pub type JobId = String;

/// An outstanding offer of the job to one candidate
#[derive(Debug, Clone)]
pub struct Proposal {
    pub candidate: Candidate,
    /// Handle the channel returned; replies must carry it to count
    pub handle: ProposalHandle,
    /// Text as delivered, kept so a timeout can annotate it
    pub text: String,
    /// Response window timer, cancelled on any reply
    pub timer: TimerHandle,
}

/// A job plus everything needed to escalate it.
///
/// Owned by exactly one escalation scheduler; the job payload never changes
/// after creation.
#[derive(Debug)]
pub struct ActiveJob {
    id: JobId,
    job: Job,
    queue: CandidateQueue,
    current: Option<Proposal>,
}

impl ActiveJob {
    /// Fails with `InvalidSelection` when no candidate was selected
    pub fn create(job: Job, selected: Vec<Candidate>) -> DispatchResult<Self> {
        if selected.is_empty() {
            return Err(DispatchError::InvalidSelection);
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            job,
            queue: CandidateQueue::new(selected),
            current: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn format_summary(&self) -> String {
        self.job.format_summary()
    }

    pub fn pop_next_candidate(&mut self) -> Option<Candidate> {
        self.queue.pop_next()
    }

    pub fn remaining_candidates(&self) -> usize {
        self.queue.len()
    }

    /// Candidates still waiting for their turn, in order
    pub fn queued(&self) -> impl Iterator<Item = &Candidate> {
        self.queue.remaining()
    }

    /// Record the in-flight proposal, replacing any previous one.
    ///
    /// The caller cancels the previous proposal's timer first.
    pub fn set_current_proposal(&mut self, proposal: Proposal) {
        self.current = Some(proposal);
    }

    pub fn current_proposal(&self) -> Option<&Proposal> {
        self.current.as_ref()
    }

    pub fn current_candidate(&self) -> Option<&Candidate> {
        self.current.as_ref().map(|p| &p.candidate)
    }

    /// Whether `handle` names the proposal currently awaiting a reply
    pub fn is_current(&self, handle: &ProposalHandle) -> bool {
        self.current.as_ref().is_some_and(|p| &p.handle == handle)
    }

    pub fn take_current_proposal(&mut self) -> Option<Proposal> {
        self.current.take()
    }
}
