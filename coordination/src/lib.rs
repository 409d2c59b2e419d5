//! Job Dispatch Coordination Library
//!
//! This library offers a pending job to a list of human operators, one at a
//! time, and guarantees that at most one of them ends up with it:
//! - Jobs, candidates and roster selection
//! - Escalation scheduler: propose, wait, escalate on decline/timeout/unreachable
//! - Outcome reports to the supervising party
//! - Event bus for following every transition
//!
//! Transports plug in through [`JobSource`] and [`NotificationChannel`].
//!
//! # Usage
//!
//! ```ignore
//! let dispatcher = Dispatcher::new(DispatchConfig::load(None)?, channel)?;
//! let escalation = dispatcher.dispatch(job, roster.select_ids(&picked)?)?;
//!
//! // replies arriving from the transport
//! dispatcher.route_reply(Reply::Accept(handle));
//!
//! let report = escalation.wait().await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod channel;
pub mod config;
pub mod error;
pub mod escalation;
pub mod events;
pub mod job;

pub use channel::{JobSource, NotificationChannel, ProposalHandle, Reply};
pub use config::{ConfigError, DispatchConfig};
pub use error::{ChannelError, DispatchError, DispatchResult};
pub use job::{Candidate, Job, JobField, RecipientId, Roster, Selection};

// Re-export escalation types
pub use escalation::{
    ActiveJob, CandidateQueue, Dispatcher, Disposition, EscalationHandle, EscalationOutcome,
    EscalationPhase, EscalationRecord, EscalationReport, EscalationScheduler, JobId,
    OutcomeReporter, ReplySender, SchedulerEvent, SchedulerSettings, SharedDispatcher,
    TimerHandle, TimerService, TokioTimerService,
};

// Re-export event types
pub use events::{DispatchEvent, EventBus, EventBusExt, EventFilter, SharedEventBus};
