//! Escalation Scheduler: drives one Active Job to a terminal state
//!
//! The scheduler owns its [`ActiveJob`] and consumes [`SchedulerEvent`]s from
//! a single mailbox. Replies and timer fires are both just messages, so every
//! transition for a job runs on one task and two of them can never interleave.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{NotificationChannel, ProposalHandle, Reply};
use crate::config::{ConfigError, DispatchConfig};
use crate::error::ChannelError;
use crate::escalation::active_job::{ActiveJob, Proposal};
use crate::escalation::messages;
use crate::escalation::reporter::OutcomeReporter;
use crate::escalation::state::{
    Disposition, EscalationOutcome, EscalationPhase, EscalationRecord, EscalationReport,
};
use crate::escalation::timer::TimerService;
use crate::events::{DispatchEvent, SharedEventBus};
use crate::job::Candidate;

/// Input to the scheduler's mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A candidate answered
    Reply(Reply),
    /// The response window of the proposal with this handle elapsed
    TimerFired(ProposalHandle),
}

impl SchedulerEvent {
    pub fn handle(&self) -> &ProposalHandle {
        match self {
            Self::Reply(reply) => reply.handle(),
            Self::TimerFired(handle) => handle,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Reply(Reply::Accept(_)) => "accept",
            Self::Reply(Reply::Decline(_)) => "decline",
            Self::TimerFired(_) => "timer_fired",
        }
    }
}

/// Runtime settings derived from [`DispatchConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// How long a candidate may take to answer before the job moves on
    pub response_window: Duration,
    /// Upper bound on each notification channel call
    pub call_timeout: Duration,
    /// Extra `propose` attempts after a transient delivery error
    pub delivery_retries: u32,
    /// Pause between delivery attempts
    pub retry_backoff: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &DispatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            response_window: config.response_window()?,
            call_timeout: config.call_timeout(),
            delivery_retries: config.delivery_retries,
            retry_backoff: config.retry_backoff(),
        })
    }
}

/// The escalation state machine for one job
pub struct EscalationScheduler {
    job: ActiveJob,
    phase: EscalationPhase,
    settings: SchedulerSettings,
    channel: Arc<dyn NotificationChannel>,
    timers: Arc<dyn TimerService>,
    reporter: OutcomeReporter,
    events: Option<SharedEventBus>,
    /// Handed to timer callbacks so fires land in the same mailbox as replies
    mailbox: mpsc::UnboundedSender<SchedulerEvent>,
    history: Vec<EscalationRecord>,
    accepted_by: Option<Candidate>,
    started_at: DateTime<Utc>,
}

impl EscalationScheduler {
    pub fn new(
        job: ActiveJob,
        settings: SchedulerSettings,
        channel: Arc<dyn NotificationChannel>,
        timers: Arc<dyn TimerService>,
        reporter: OutcomeReporter,
        mailbox: mpsc::UnboundedSender<SchedulerEvent>,
    ) -> Self {
        Self {
            job,
            phase: EscalationPhase::Escalating,
            settings,
            channel,
            timers,
            reporter,
            events: None,
            mailbox,
            history: Vec::new(),
            accepted_by: None,
            started_at: Utc::now(),
        }
    }

    /// Publish transitions on `bus`
    pub fn with_events(mut self, bus: SharedEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn phase(&self) -> EscalationPhase {
        self.phase
    }

    pub fn active_job(&self) -> &ActiveJob {
        &self.job
    }

    pub fn history(&self) -> &[EscalationRecord] {
        &self.history
    }

    /// Drive the job from its first proposal to a terminal state.
    ///
    /// Returns once a candidate accepts or the queue is exhausted.
    pub async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<SchedulerEvent>) -> EscalationReport {
        self.start().await;
        while !self.phase.is_terminal() {
            match mailbox.recv().await {
                Some(event) => self.handle_event(event).await,
                // Unreachable while `self.mailbox` is alive
                None => {
                    warn!(job_id = %self.job.id(), "Mailbox closed before a terminal state");
                    break;
                }
            }
        }
        self.report()
    }

    /// Announce the job and propose to the first reachable candidate
    pub async fn start(&mut self) {
        let candidates = self.job.queued().map(|c| c.id.clone()).collect::<Vec<_>>();
        info!(
            job_id = %self.job.id(),
            candidates = candidates.len(),
            window = ?self.settings.response_window,
            "Escalation started"
        );
        self.publish(DispatchEvent::JobDispatched {
            job_id: self.job.id().to_string(),
            candidates,
            timestamp: Utc::now(),
        });
        self.escalate().await;
    }

    /// Apply one mailbox event. Events for a handle other than the current
    /// proposal's (late replies, timers that raced their cancel, anything
    /// after a terminal state) are dropped without touching state.
    pub async fn handle_event(&mut self, event: SchedulerEvent) {
        if self.phase != EscalationPhase::AwaitingReply || !self.job.is_current(event.handle()) {
            debug!(
                job_id = %self.job.id(),
                handle = %event.handle(),
                kind = event.kind(),
                phase = %self.phase,
                "Dropping stale event"
            );
            self.publish(DispatchEvent::StaleEventDropped {
                job_id: self.job.id().to_string(),
                handle: event.handle().clone(),
                kind: event.kind().to_string(),
                timestamp: Utc::now(),
            });
            return;
        }

        // is_current() guarantees a proposal is present
        let Some(proposal) = self.job.take_current_proposal() else {
            return;
        };

        match event {
            SchedulerEvent::Reply(Reply::Accept(_)) => {
                proposal.timer.cancel();
                self.accept(proposal.candidate).await;
            }
            SchedulerEvent::Reply(Reply::Decline(_)) => {
                proposal.timer.cancel();
                info!(
                    job_id = %self.job.id(),
                    candidate = %proposal.candidate.name,
                    "Candidate declined"
                );
                self.publish(DispatchEvent::CandidateDeclined {
                    job_id: self.job.id().to_string(),
                    candidate: proposal.candidate.id.clone(),
                    timestamp: Utc::now(),
                });
                self.record(proposal.candidate, Disposition::Declined);
                self.escalate().await;
            }
            SchedulerEvent::TimerFired(_) => {
                info!(
                    job_id = %self.job.id(),
                    candidate = %proposal.candidate.name,
                    "Response window elapsed"
                );
                self.annotate_timeout(&proposal).await;
                self.publish(DispatchEvent::ProposalTimedOut {
                    job_id: self.job.id().to_string(),
                    candidate: proposal.candidate.id.clone(),
                    timestamp: Utc::now(),
                });
                self.record(proposal.candidate, Disposition::TimedOut);
                self.escalate().await;
            }
        }
    }

    /// Pop candidates until one receives the offer or the queue runs dry
    async fn escalate(&mut self) {
        self.phase = EscalationPhase::Escalating;
        let text = messages::proposal_text(self.job.job(), self.settings.response_window);

        loop {
            self.phase = EscalationPhase::Proposing;
            let Some(candidate) = self.job.pop_next_candidate() else {
                self.exhaust().await;
                return;
            };

            match self.deliver(&candidate, &text).await {
                Ok(handle) => {
                    self.await_reply(candidate, handle, text);
                    return;
                }
                Err(disposition) => {
                    warn!(
                        job_id = %self.job.id(),
                        candidate = %candidate.name,
                        reason = %disposition,
                        "Skipping candidate"
                    );
                    self.publish(DispatchEvent::CandidateSkipped {
                        job_id: self.job.id().to_string(),
                        candidate: candidate.id.clone(),
                        reason: disposition.to_string(),
                        timestamp: Utc::now(),
                    });
                    self.record(candidate, disposition);
                }
            }
        }
    }

    /// Deliver with bounded retries for transient errors.
    ///
    /// Neither an unreachable recipient nor a timed-out call is retried. The
    /// abandoned call may still have delivered, and a second offer would
    /// leave the candidate holding a handle nobody honors.
    async fn deliver(&self, candidate: &Candidate, text: &str) -> Result<ProposalHandle, Disposition> {
        let attempts = self.settings.delivery_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let result = match tokio::time::timeout(
                self.settings.call_timeout,
                self.channel
                    .propose(candidate, text, self.settings.response_window),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ChannelError::Timeout(self.settings.call_timeout)),
            };

            match result {
                Ok(handle) => return Ok(handle),
                Err(ChannelError::RecipientUnreachable { reason, .. }) => {
                    return Err(Disposition::Unreachable { reason });
                }
                Err(e @ ChannelError::Timeout(_)) => {
                    warn!(
                        job_id = %self.job.id(),
                        candidate = %candidate.name,
                        attempt,
                        error = %e,
                        "Proposal delivery timed out"
                    );
                    return Err(Disposition::DeliveryFailed {
                        attempts: attempt,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        job_id = %self.job.id(),
                        candidate = %candidate.name,
                        attempt,
                        attempts,
                        error = %e,
                        "Proposal delivery failed"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_backoff).await;
                    }
                }
            }
        }

        Err(Disposition::DeliveryFailed {
            attempts,
            error: last_error,
        })
    }

    fn await_reply(&mut self, candidate: Candidate, handle: ProposalHandle, text: String) {
        let mailbox = self.mailbox.clone();
        let fired = handle.clone();
        let timer = self.timers.schedule(
            self.settings.response_window,
            Box::new(move || {
                // Receiver gone means the job already finished
                let _ = mailbox.send(SchedulerEvent::TimerFired(fired));
            }),
        );

        info!(
            job_id = %self.job.id(),
            candidate = %candidate.name,
            handle = %handle,
            remaining = self.job.remaining_candidates(),
            "Job proposed"
        );
        self.publish(DispatchEvent::CandidateProposed {
            job_id: self.job.id().to_string(),
            candidate: candidate.id.clone(),
            handle: handle.clone(),
            timestamp: Utc::now(),
        });

        self.job.set_current_proposal(Proposal {
            candidate,
            handle,
            text,
            timer,
        });
        self.phase = EscalationPhase::AwaitingReply;
    }

    /// Best-effort edit of a timed-out proposal
    async fn annotate_timeout(&self, proposal: &Proposal) {
        let text = messages::timeout_text(&proposal.text);
        match tokio::time::timeout(
            self.settings.call_timeout,
            self.channel.edit_message(&proposal.handle, &text),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(handle = %proposal.handle, error = %e, "Failed to mark proposal as timed out");
            }
            Err(_) => {
                warn!(handle = %proposal.handle, "Timed out marking proposal as timed out");
            }
        }
    }

    async fn accept(&mut self, candidate: Candidate) {
        self.phase = EscalationPhase::Accepted;
        info!(job_id = %self.job.id(), candidate = %candidate.name, "Job accepted");
        self.publish(DispatchEvent::JobAccepted {
            job_id: self.job.id().to_string(),
            candidate: candidate.id.clone(),
            timestamp: Utc::now(),
        });
        self.record(candidate.clone(), Disposition::Accepted);
        self.reporter
            .report_accepted(self.job.job(), &candidate)
            .await;
        self.accepted_by = Some(candidate);
    }

    async fn exhaust(&mut self) {
        self.phase = EscalationPhase::Exhausted;
        info!(
            job_id = %self.job.id(),
            tried = self.history.len(),
            "No candidate accepted the job"
        );
        self.publish(DispatchEvent::JobExhausted {
            job_id: self.job.id().to_string(),
            timestamp: Utc::now(),
        });
        self.reporter.report_exhausted(self.job.job()).await;
    }

    fn record(&mut self, candidate: Candidate, disposition: Disposition) {
        self.history.push(EscalationRecord {
            candidate,
            disposition,
            timestamp: Utc::now(),
        });
    }

    fn publish(&self, event: DispatchEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    fn report(&mut self) -> EscalationReport {
        let outcome = match self.accepted_by.clone() {
            Some(candidate) => EscalationOutcome::Accepted { candidate },
            None => EscalationOutcome::Exhausted,
        };
        EscalationReport {
            job_id: self.job.id().to_string(),
            job: self.job.job().clone(),
            outcome,
            history: std::mem::take(&mut self.history),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

impl Drop for EscalationScheduler {
    fn drop(&mut self) {
        if let Some(proposal) = self.job.current_proposal() {
            proposal.timer.cancel();
        }
    }
}
