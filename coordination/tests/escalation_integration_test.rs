//! Integration tests for job escalation
//!
//! Drives full escalations through the Dispatcher with a recording channel
//! and tokio's paused clock, so response windows elapse instantly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dispatch_coordination::escalation::{TimerCallback, TimerHandle, TimerService};
use dispatch_coordination::events::FilteredReceiver;
use dispatch_coordination::{
    Candidate, ChannelError, DispatchConfig, DispatchError, DispatchEvent, DispatchResult,
    Dispatcher, Disposition, EscalationOutcome, EventBusExt, EventFilter, Job, JobSource,
    NotificationChannel, ProposalHandle, RecipientId, Reply, Roster,
};

/// Channel double that records every call.
#[derive(Default)]
struct RecordingChannel {
    unreachable: Vec<RecipientId>,
    /// Transient failures still to hand out, per recipient
    transient_failures: Mutex<HashMap<RecipientId, u32>>,
    fail_edits: bool,
    next_message: Mutex<u64>,
    proposals: Mutex<Vec<(RecipientId, String)>>,
    edits: Mutex<Vec<(ProposalHandle, String)>>,
    notifications: Mutex<Vec<(RecipientId, String)>>,
}

impl RecordingChannel {
    fn proposed_to(&self) -> Vec<RecipientId> {
        self.proposals
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn notifications(&self) -> Vec<String> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn propose(
        &self,
        candidate: &Candidate,
        text: &str,
        _response_window: Duration,
    ) -> Result<ProposalHandle, ChannelError> {
        if self.unreachable.contains(&candidate.id) {
            return Err(ChannelError::RecipientUnreachable {
                recipient: candidate.id.clone(),
                reason: "bot was blocked by the user".to_string(),
            });
        }
        if let Some(left) = self
            .transient_failures
            .lock()
            .unwrap()
            .get_mut(&candidate.id)
        {
            if *left > 0 {
                *left -= 1;
                return Err(ChannelError::Delivery("connection reset".to_string()));
            }
        }

        let mut next = self.next_message.lock().unwrap();
        *next += 1;
        self.proposals
            .lock()
            .unwrap()
            .push((candidate.id.clone(), text.to_string()));
        Ok(ProposalHandle::new(candidate.id.clone(), next.to_string()))
    }

    async fn edit_message(&self, handle: &ProposalHandle, text: &str) -> Result<(), ChannelError> {
        if self.fail_edits {
            return Err(ChannelError::Delivery("message to edit not found".to_string()));
        }
        self.edits
            .lock()
            .unwrap()
            .push((handle.clone(), text.to_string()));
        Ok(())
    }

    async fn notify(&self, recipient: &RecipientId, text: &str) -> Result<(), ChannelError> {
        self.notifications
            .lock()
            .unwrap()
            .push((recipient.clone(), text.to_string()));
        Ok(())
    }
}

/// Timer service whose timers only fire when the test says so.
#[derive(Default)]
struct ManualTimers {
    pending: Mutex<Vec<Option<TimerCallback>>>,
}

impl ManualTimers {
    /// Run the n-th scheduled callback, even if it was cancelled
    fn fire_unconditionally(&self, n: usize) {
        let callback = self.pending.lock().unwrap()[n].take();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn scheduled(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl TimerService for ManualTimers {
    fn schedule(&self, _after: Duration, callback: TimerCallback) -> TimerHandle {
        self.pending.lock().unwrap().push(Some(callback));
        TimerHandle::new(Arc::new(AtomicBool::new(false)), None)
    }
}

/// Channel whose calls never complete for the recipients in `hung`.
#[derive(Default)]
struct HangingChannel {
    hung: Vec<RecipientId>,
    hang_edits: bool,
    propose_calls: AtomicUsize,
    notified: Mutex<Vec<RecipientId>>,
}

#[async_trait]
impl NotificationChannel for HangingChannel {
    async fn propose(
        &self,
        candidate: &Candidate,
        _text: &str,
        _response_window: Duration,
    ) -> Result<ProposalHandle, ChannelError> {
        let seq = self.propose_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hung.contains(&candidate.id) {
            return std::future::pending().await;
        }
        Ok(ProposalHandle::new(candidate.id.clone(), seq.to_string()))
    }

    async fn edit_message(&self, _handle: &ProposalHandle, _text: &str) -> Result<(), ChannelError> {
        if self.hang_edits {
            return std::future::pending().await;
        }
        Ok(())
    }

    async fn notify(&self, recipient: &RecipientId, _text: &str) -> Result<(), ChannelError> {
        if self.hung.contains(recipient) {
            return std::future::pending().await;
        }
        self.notified.lock().unwrap().push(recipient.clone());
        Ok(())
    }
}

struct StaticJobSource {
    job: Option<Job>,
    roster: Vec<Candidate>,
}

#[async_trait]
impl JobSource for StaticJobSource {
    async fn latest_job(&self) -> DispatchResult<Job> {
        self.job.clone().ok_or(DispatchError::NoJobAvailable)
    }

    async fn roster(&self) -> DispatchResult<Roster> {
        Roster::new(self.roster.clone())
    }
}

fn alice() -> Candidate {
    Candidate::new(1, "Alice")
}

fn bob() -> Candidate {
    Candidate::new(2, "Bob")
}

fn job() -> Job {
    Job::new([
        ("Address", "14 Harbour Rd"),
        ("Task", "Pump out flooded basement"),
        ("Price", "250"),
        ("Phone", "+1 555 0101"),
    ])
}

fn config() -> DispatchConfig {
    DispatchConfig {
        response_window_minutes: 1.0,
        supervisors: vec![RecipientId::from("supervisor")],
        ..Default::default()
    }
}

fn proposals(dispatcher: &Dispatcher) -> FilteredReceiver {
    dispatcher
        .events()
        .subscribe_filtered(EventFilter::new().types(vec!["candidate_proposed"]))
}

async fn next_proposal(rx: &mut FilteredReceiver) -> ProposalHandle {
    match rx.recv().await.unwrap() {
        DispatchEvent::CandidateProposed { handle, .. } => handle,
        other => panic!("unexpected event {other:?}"),
    }
}

/// Scenario A: Alice declines, Bob accepts
#[tokio::test(start_paused = true)]
async fn test_decline_then_accept() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = Dispatcher::new(config(), channel.clone()).unwrap();
    let mut proposed = proposals(&dispatcher);

    let escalation = dispatcher.dispatch(job(), vec![alice(), bob()]).unwrap();
    let replies = escalation.replies();

    let first = next_proposal(&mut proposed).await;
    assert_eq!(first.recipient, alice().id);
    assert!(replies.decline(first));

    let second = next_proposal(&mut proposed).await;
    assert_eq!(second.recipient, bob().id);
    assert!(replies.accept(second));

    let report = escalation.wait().await.unwrap();
    assert_eq!(report.outcome, EscalationOutcome::Accepted { candidate: bob() });
    assert_eq!(report.history.len(), 2);
    assert_eq!(report.history[0].disposition, Disposition::Declined);
    assert_eq!(report.history[1].disposition, Disposition::Accepted);

    let notes = channel.notifications();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].contains("Bob"));
    assert!(notes[0].contains("Address: *14 Harbour Rd*"));
}

/// Scenario B: single candidate never answers
#[tokio::test(start_paused = true)]
async fn test_timeout_exhausts_single_candidate() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = Dispatcher::new(config(), channel.clone()).unwrap();

    let escalation = dispatcher.dispatch(job(), vec![alice()]).unwrap();
    let report = escalation.wait().await.unwrap();

    assert_eq!(report.outcome, EscalationOutcome::Exhausted);
    assert_eq!(report.history[0].disposition, Disposition::TimedOut);

    let edits = channel.edits.lock().unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].0.recipient, alice().id);
    assert!(edits[0].1.contains("No reply in time"));

    let notes = channel.notifications();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].contains("No candidate accepted"));
}

/// Scenario C: unreachable candidate is skipped without a timer
#[tokio::test(start_paused = true)]
async fn test_unreachable_candidate_skipped() {
    let channel = Arc::new(RecordingChannel {
        unreachable: vec![alice().id],
        ..Default::default()
    });
    let timers = Arc::new(ManualTimers::default());
    let dispatcher = Dispatcher::new(config(), channel.clone())
        .unwrap()
        .with_timer_service(timers.clone());
    let mut timeouts = dispatcher
        .events()
        .subscribe_filtered(EventFilter::new().types(vec!["proposal_timed_out"]));
    let mut proposed = proposals(&dispatcher);

    let escalation = dispatcher.dispatch(job(), vec![alice(), bob()]).unwrap();

    let first = next_proposal(&mut proposed).await;
    assert_eq!(first.recipient, bob().id);
    assert_eq!(timers.scheduled(), 1, "no timer for the unreachable candidate");

    escalation.replies().accept(first);
    let report = escalation.wait().await.unwrap();

    assert_eq!(channel.proposed_to(), vec![bob().id]);
    assert!(matches!(
        report.history[0].disposition,
        Disposition::Unreachable { .. }
    ));
    assert_eq!(report.outcome.accepted_by(), Some(&bob()));

    // closes the bus once the finished scheduler released its sender
    drop(dispatcher);
    assert!(timeouts.recv().await.is_err(), "no timeout may be reported");
}

/// Scenario D: a stale decline after acceptance changes nothing
#[tokio::test(start_paused = true)]
async fn test_stale_decline_after_accept() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = Dispatcher::new(config(), channel.clone()).unwrap();
    let mut proposed = proposals(&dispatcher);

    let escalation = dispatcher.dispatch(job(), vec![alice()]).unwrap();
    let replies = escalation.replies();

    let handle = next_proposal(&mut proposed).await;
    replies.accept(handle.clone());
    replies.decline(handle);

    let report = escalation.wait().await.unwrap();
    assert_eq!(report.outcome, EscalationOutcome::Accepted { candidate: alice() });
    assert_eq!(report.history.len(), 1);
    assert_eq!(channel.notifications().len(), 1);
}

/// A late accept for a timed-out proposal is dropped
#[tokio::test(start_paused = true)]
async fn test_late_reply_after_timeout_ignored() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = Dispatcher::new(config(), channel.clone()).unwrap();
    let mut proposed = proposals(&dispatcher);
    let mut stale = dispatcher
        .events()
        .subscribe_filtered(EventFilter::new().types(vec!["stale_event_dropped"]));

    let escalation = dispatcher.dispatch(job(), vec![alice(), bob()]).unwrap();
    let replies = escalation.replies();

    let alice_handle = next_proposal(&mut proposed).await;
    // Alice's window elapses while we wait for the next proposal
    let bob_handle = next_proposal(&mut proposed).await;
    assert_eq!(bob_handle.recipient, bob().id);

    replies.accept(alice_handle.clone());
    match stale.recv().await.unwrap() {
        DispatchEvent::StaleEventDropped { handle, kind, .. } => {
            assert_eq!(handle, alice_handle);
            assert_eq!(kind, "accept");
        }
        other => panic!("unexpected event {other:?}"),
    }

    replies.decline(bob_handle);
    let report = escalation.wait().await.unwrap();
    assert_eq!(report.outcome, EscalationOutcome::Exhausted);
    assert_eq!(report.history[0].disposition, Disposition::TimedOut);
    assert_eq!(report.history[1].disposition, Disposition::Declined);
}

/// A timer that fires after its proposal was declined does not escalate again
#[tokio::test(start_paused = true)]
async fn test_timer_racing_cancel_does_not_double_escalate() {
    let channel = Arc::new(RecordingChannel::default());
    let timers = Arc::new(ManualTimers::default());
    let dispatcher = Dispatcher::new(config(), channel.clone())
        .unwrap()
        .with_timer_service(timers.clone());
    let mut proposed = proposals(&dispatcher);

    let carol = Candidate::new(3, "Carol");
    let escalation = dispatcher
        .dispatch(job(), vec![alice(), bob(), carol.clone()])
        .unwrap();
    let replies = escalation.replies();

    let first = next_proposal(&mut proposed).await;
    replies.decline(first);
    let second = next_proposal(&mut proposed).await;
    assert_eq!(second.recipient, bob().id);

    // Alice's timer was cancelled by the decline but fires anyway
    timers.fire_unconditionally(0);
    replies.accept(second);

    let report = escalation.wait().await.unwrap();
    assert_eq!(report.outcome, EscalationOutcome::Accepted { candidate: bob() });
    assert_eq!(channel.proposed_to(), vec![alice().id, bob().id]);
    assert_eq!(report.history.len(), 2);
}

/// Every selection terminates after at most one attempt per candidate
#[tokio::test(start_paused = true)]
async fn test_terminates_within_selection_length() {
    let channel = Arc::new(RecordingChannel {
        unreachable: vec![RecipientId::from(3)],
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(config(), channel.clone()).unwrap();
    let selection: Vec<_> = (1..=5i64)
        .map(|i| Candidate::new(i, format!("Operator {i}")))
        .collect();

    let report = dispatcher
        .dispatch(job(), selection.clone())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.outcome, EscalationOutcome::Exhausted);
    assert_eq!(report.history.len(), selection.len());
    assert_eq!(report.proposals_delivered(), 4);
    let tried: Vec<_> = report.history.iter().map(|r| r.candidate.clone()).collect();
    assert_eq!(tried, selection, "candidates tried in selection order");
}

#[tokio::test(start_paused = true)]
async fn test_delivery_retry_recovers() {
    let channel = Arc::new(RecordingChannel {
        transient_failures: Mutex::new(HashMap::from([(alice().id, 1)])),
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(
        DispatchConfig {
            delivery_retries: 1,
            ..config()
        },
        channel.clone(),
    )
    .unwrap();
    let mut proposed = proposals(&dispatcher);

    let escalation = dispatcher.dispatch(job(), vec![alice(), bob()]).unwrap();
    let handle = next_proposal(&mut proposed).await;
    assert_eq!(handle.recipient, alice().id);

    escalation.replies().accept(handle);
    let report = escalation.wait().await.unwrap();
    assert_eq!(report.outcome.accepted_by(), Some(&alice()));
}

#[tokio::test(start_paused = true)]
async fn test_delivery_error_without_retry_skips() {
    let channel = Arc::new(RecordingChannel {
        transient_failures: Mutex::new(HashMap::from([(alice().id, 1)])),
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(config(), channel.clone()).unwrap();
    let mut proposed = proposals(&dispatcher);

    let escalation = dispatcher.dispatch(job(), vec![alice(), bob()]).unwrap();
    let handle = next_proposal(&mut proposed).await;
    assert_eq!(handle.recipient, bob().id);

    escalation.replies().accept(handle);
    let report = escalation.wait().await.unwrap();
    assert!(matches!(
        report.history[0].disposition,
        Disposition::DeliveryFailed { attempts: 1, .. }
    ));
}

/// Calls that outlive the call timeout skip the candidate or are only logged
#[tokio::test(start_paused = true)]
async fn test_hung_channel_calls_are_bounded() {
    let channel = Arc::new(HangingChannel {
        hung: vec![alice().id, RecipientId::from("hung-supervisor")],
        hang_edits: true,
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(
        DispatchConfig {
            supervisors: vec![RecipientId::from("hung-supervisor"), RecipientId::from("supervisor")],
            ..config()
        },
        channel.clone(),
    )
    .unwrap();

    let report = dispatcher
        .dispatch(job(), vec![alice(), bob()])
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.outcome, EscalationOutcome::Exhausted);
    match &report.history[0].disposition {
        Disposition::DeliveryFailed { attempts, error } => {
            assert_eq!(*attempts, 1);
            assert!(error.contains("timed out"), "{error}");
        }
        other => panic!("unexpected disposition {other:?}"),
    }
    // Bob's timeout edit hangs too, which must not stall the escalation
    assert_eq!(report.history[1].disposition, Disposition::TimedOut);
    assert_eq!(
        *channel.notified.lock().unwrap(),
        vec![RecipientId::from("supervisor")]
    );
}

/// A timed-out proposal may have been delivered, so it is never sent twice
#[tokio::test(start_paused = true)]
async fn test_timed_out_proposal_not_retried() {
    let channel = Arc::new(HangingChannel {
        hung: vec![alice().id],
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(
        DispatchConfig {
            delivery_retries: 2,
            ..config()
        },
        channel.clone(),
    )
    .unwrap();

    let report = dispatcher
        .dispatch(job(), vec![alice()])
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(matches!(
        report.history[0].disposition,
        Disposition::DeliveryFailed { attempts: 1, .. }
    ));
    assert_eq!(channel.propose_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_timeout_edit_is_not_fatal() {
    let channel = Arc::new(RecordingChannel {
        fail_edits: true,
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(config(), channel.clone()).unwrap();

    let report = dispatcher
        .dispatch(job(), vec![alice(), bob()])
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.outcome, EscalationOutcome::Exhausted);
    assert_eq!(channel.proposed_to(), vec![alice().id, bob().id]);
    assert_eq!(channel.notifications().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_job_rejected_while_in_flight() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = Dispatcher::new(config(), channel.clone()).unwrap();
    let mut proposed = proposals(&dispatcher);

    let escalation = dispatcher.dispatch(job(), vec![alice()]).unwrap();
    let err = dispatcher.dispatch(job(), vec![bob()]).unwrap_err();
    assert!(matches!(err, DispatchError::JobInFlight { .. }));
    assert_eq!(dispatcher.active_jobs(), vec![escalation.job_id().to_string()]);

    let handle = next_proposal(&mut proposed).await;
    escalation.replies().accept(handle);
    escalation.wait().await.unwrap();

    assert!(dispatcher.active_jobs().is_empty());
    let next = dispatcher.dispatch(job(), vec![bob()]).unwrap();
    next.abort();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_jobs_route_replies_by_handle() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = Dispatcher::new(
        DispatchConfig {
            allow_concurrent_jobs: true,
            ..config()
        },
        channel.clone(),
    )
    .unwrap();
    let mut proposed = proposals(&dispatcher);

    let first_job = dispatcher.dispatch(job(), vec![alice()]).unwrap();
    let alice_handle = next_proposal(&mut proposed).await;
    let second_job = dispatcher
        .dispatch(Job::new([("Task", "Clear drain")]), vec![bob()])
        .unwrap();
    let bob_handle = next_proposal(&mut proposed).await;

    assert_eq!(dispatcher.route_reply(Reply::Accept(bob_handle)), 2);
    assert_eq!(dispatcher.route_reply(Reply::Decline(alice_handle)), 2);

    let first = first_job.wait().await.unwrap();
    let second = second_job.wait().await.unwrap();
    assert_eq!(first.outcome, EscalationOutcome::Exhausted);
    assert_eq!(second.outcome.accepted_by(), Some(&bob()));
}

#[tokio::test]
async fn test_dispatch_latest_preconditions() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = Dispatcher::new(config(), channel).unwrap();

    let empty = StaticJobSource {
        job: None,
        roster: vec![alice(), bob()],
    };
    let err = dispatcher
        .dispatch_latest(&empty, &[alice().id])
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoJobAvailable));

    let source = StaticJobSource {
        job: Some(job()),
        roster: vec![alice(), bob()],
    };
    let err = dispatcher.dispatch_latest(&source, &[]).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidSelection));

    let err = dispatcher
        .dispatch_latest(&source, &[RecipientId::from(99)])
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownCandidate { .. }));
    assert!(dispatcher.active_jobs().is_empty());

    let escalation = dispatcher
        .dispatch_latest(&source, &[bob().id, alice().id])
        .await
        .unwrap();
    escalation.abort();
    assert!(matches!(
        escalation.wait().await,
        Err(DispatchError::Aborted { .. })
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let channel = Arc::new(RecordingChannel::default());
    let result = Dispatcher::new(
        DispatchConfig {
            response_window_minutes: f64::NAN,
            ..config()
        },
        channel,
    );
    assert!(matches!(result, Err(DispatchError::Config(_))));
}
