//! Event-driven observability for job escalation
//!
//! Every scheduler transition is published here so dashboards, audit logs
//! and tests can follow a job without reaching into scheduler state.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Scheduler   │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dispatch_coordination::events::{EventBus, EventBusExt, EventFilter};
//!
//! let bus = EventBus::new().shared();
//! let mut accepted = bus.subscribe_filtered(EventFilter::new().types(vec!["job_accepted"]));
//!
//! let event = accepted.recv().await?;
//! ```

pub mod bus;
pub mod types;

// Re-export core types
pub use bus::{
    EventBus, EventBusError, EventBusExt, EventBusResult, EventFilter, FilteredReceiver,
    SharedEventBus,
};
pub use types::DispatchEvent;
