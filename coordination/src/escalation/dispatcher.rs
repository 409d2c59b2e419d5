//! Dispatcher: starts escalations and routes replies to them
//!
//! Each dispatched job gets its own scheduler task. The dispatcher only keeps
//! the mailbox of every running job so replies can be routed; job state is
//! never shared.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{JobSource, NotificationChannel, ProposalHandle, Reply};
use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::escalation::active_job::{ActiveJob, JobId};
use crate::escalation::engine::{EscalationScheduler, SchedulerEvent, SchedulerSettings};
use crate::escalation::reporter::OutcomeReporter;
use crate::escalation::state::EscalationReport;
use crate::escalation::timer::{TimerService, TokioTimerService};
use crate::events::{EventBus, SharedEventBus};
use crate::job::{Candidate, Job, RecipientId};

type Mailboxes = Arc<Mutex<HashMap<JobId, mpsc::UnboundedSender<SchedulerEvent>>>>;

/// Shared reference to a Dispatcher
pub type SharedDispatcher = Arc<Dispatcher>;

pub struct Dispatcher {
    config: DispatchConfig,
    settings: SchedulerSettings,
    channel: Arc<dyn NotificationChannel>,
    timers: Arc<dyn TimerService>,
    events: SharedEventBus,
    running: Mailboxes,
}

impl Dispatcher {
    /// Fails with `Config` if the configuration does not validate
    pub fn new(config: DispatchConfig, channel: Arc<dyn NotificationChannel>) -> DispatchResult<Self> {
        let settings = SchedulerSettings::from_config(&config)?;
        Ok(Self {
            config,
            settings,
            channel,
            timers: Arc::new(TokioTimerService::new()),
            events: EventBus::new().shared(),
            running: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn with_timer_service(mut self, timers: Arc<dyn TimerService>) -> Self {
        self.timers = timers;
        self
    }

    pub fn with_event_bus(mut self, events: SharedEventBus) -> Self {
        self.events = events;
        self
    }

    pub fn shared(self) -> SharedDispatcher {
        Arc::new(self)
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Start escalating `job` to `selected`, in order.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, job: Job, selected: Vec<Candidate>) -> DispatchResult<EscalationHandle> {
        let mut running = self.lock_running();
        running.retain(|_, mailbox| !mailbox.is_closed());
        if !self.config.allow_concurrent_jobs {
            if let Some(job_id) = running.keys().next() {
                return Err(DispatchError::JobInFlight {
                    job_id: job_id.clone(),
                });
            }
        }

        let active = ActiveJob::create(job, selected)?;
        let job_id = active.id().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let reporter = OutcomeReporter::new(
            self.channel.clone(),
            self.config.supervisors.clone(),
            self.settings.call_timeout,
        );
        let scheduler = EscalationScheduler::new(
            active,
            self.settings,
            self.channel.clone(),
            self.timers.clone(),
            reporter,
            tx.clone(),
        )
        .with_events(self.events.clone());

        running.insert(job_id.clone(), tx.clone());
        drop(running);

        let registry = self.running.clone();
        let task_job_id = job_id.clone();
        let task = tokio::spawn(async move {
            let report = scheduler.run(rx).await;
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&task_job_id);
            info!(summary = %report.summary(), "Escalation finished");
            report
        });

        Ok(EscalationHandle {
            job_id: job_id.clone(),
            replies: ReplySender { job_id, tx },
            task,
        })
    }

    /// Read the latest job and roster from `source` and dispatch to the
    /// candidates named by `selected`, in that order.
    pub async fn dispatch_latest(
        &self,
        source: &dyn JobSource,
        selected: &[RecipientId],
    ) -> DispatchResult<EscalationHandle> {
        let job = source.latest_job().await?;
        let roster = source.roster().await?;
        let candidates = roster.select_ids(selected)?;
        self.dispatch(job, candidates)
    }

    /// Forward a reply to every running escalation; each one ignores handles
    /// that are not its current proposal. Returns how many received it.
    pub fn route_reply(&self, reply: Reply) -> usize {
        let running = self.lock_running();
        let mut delivered = 0;
        for mailbox in running.values() {
            if mailbox.send(SchedulerEvent::Reply(reply.clone())).is_ok() {
                delivered += 1;
            }
        }
        debug!(handle = %reply.handle(), delivered, "Reply routed");
        delivered
    }

    /// Ids of jobs still escalating
    pub fn active_jobs(&self) -> Vec<JobId> {
        self.lock_running()
            .iter()
            .filter(|(_, mailbox)| !mailbox.is_closed())
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn lock_running(&self) -> MutexGuard<'_, HashMap<JobId, mpsc::UnboundedSender<SchedulerEvent>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sends replies to one running escalation
#[derive(Debug, Clone)]
pub struct ReplySender {
    job_id: JobId,
    tx: mpsc::UnboundedSender<SchedulerEvent>,
}

impl ReplySender {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Returns false once the escalation has finished
    pub fn send(&self, reply: Reply) -> bool {
        self.tx.send(SchedulerEvent::Reply(reply)).is_ok()
    }

    pub fn accept(&self, handle: ProposalHandle) -> bool {
        self.send(Reply::Accept(handle))
    }

    pub fn decline(&self, handle: ProposalHandle) -> bool {
        self.send(Reply::Decline(handle))
    }
}

/// Handle to a running escalation
#[derive(Debug)]
pub struct EscalationHandle {
    job_id: JobId,
    replies: ReplySender,
    task: JoinHandle<EscalationReport>,
}

impl EscalationHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn replies(&self) -> ReplySender {
        self.replies.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the escalation without reporting an outcome
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the terminal state
    pub async fn wait(self) -> DispatchResult<EscalationReport> {
        self.task.await.map_err(|_| DispatchError::Aborted {
            job_id: self.job_id,
        })
    }
}
