//! Escalation: offer a job to one candidate at a time until someone takes it
//!
//! # State Machine
//!
//! ```text
//! (selection finalized)
//!     │
//!     ▼
//! PROPOSING ──── queue empty ─────────────────────────▶ EXHAUSTED
//!     │   ▲                                              (report: nobody)
//!     │   └── unreachable / delivery failed: skip, no timer
//!     │
//!     ▼ delivered, timer started
//! AWAITING_REPLY
//!     │
//!     ├─ accept ───────────────────────────────────────▶ ACCEPTED
//!     │                                                  (report: candidate)
//!     ├─ decline (cancel timer) ──▶ ESCALATING ──▶ PROPOSING
//!     ├─ timer fired (edit offer) ─▶ ESCALATING ──▶ PROPOSING
//!     └─ reply/fire for any other handle: dropped
//! ```
//!
//! Candidates are tried strictly in selection order and never twice. Only
//! one proposal per job is ever outstanding.

pub mod active_job;
pub mod dispatcher;
pub mod engine;
pub mod messages;
pub mod queue;
pub mod reporter;
pub mod state;
pub mod timer;

pub use active_job::{ActiveJob, JobId, Proposal};
pub use dispatcher::{Dispatcher, EscalationHandle, ReplySender, SharedDispatcher};
pub use engine::{EscalationScheduler, SchedulerEvent, SchedulerSettings};
pub use queue::CandidateQueue;
pub use reporter::OutcomeReporter;
pub use state::{
    Disposition, EscalationOutcome, EscalationPhase, EscalationRecord, EscalationReport,
};
pub use timer::{TimerCallback, TimerHandle, TimerService, TokioTimerService};
