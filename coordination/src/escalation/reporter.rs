//! Outcome Reporter: tells the supervising party how a job ended
//!
//! Fire-and-forget: a failed report is logged and never retried. The job is
//! already terminal by the time anything is reported.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::channel::NotificationChannel;
use crate::escalation::messages;
use crate::job::{Candidate, Job, RecipientId};

pub struct OutcomeReporter {
    channel: Arc<dyn NotificationChannel>,
    supervisors: Vec<RecipientId>,
    call_timeout: Duration,
}

impl OutcomeReporter {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        supervisors: Vec<RecipientId>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            supervisors,
            call_timeout,
        }
    }

    pub async fn report_accepted(&self, job: &Job, candidate: &Candidate) {
        self.broadcast(&messages::accepted_text(job, candidate)).await;
    }

    pub async fn report_exhausted(&self, job: &Job) {
        self.broadcast(&messages::exhausted_text(job)).await;
    }

    /// Send `text` to every supervisor; returns how many deliveries succeeded
    async fn broadcast(&self, text: &str) -> usize {
        if self.supervisors.is_empty() {
            warn!("No supervisors configured; outcome not reported");
            return 0;
        }

        let mut delivered = 0;
        for supervisor in &self.supervisors {
            match tokio::time::timeout(self.call_timeout, self.channel.notify(supervisor, text))
                .await
            {
                Ok(Ok(())) => {
                    delivered += 1;
                    info!(supervisor = %supervisor, "Outcome reported");
                }
                Ok(Err(e)) => {
                    warn!(supervisor = %supervisor, error = %e, "Failed to report outcome");
                }
                Err(_) => {
                    warn!(
                        supervisor = %supervisor,
                        timeout = ?self.call_timeout,
                        "Outcome report timed out"
                    );
                }
            }
        }
        delivered
    }
}
