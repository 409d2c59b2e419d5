//! Console notification channel and stdin reply source
//!
//! Proposals and reports are printed to stdout. Whoever runs the binary plays
//! every candidate and answers with `accept <handle>` or `decline <handle>`.

use std::collections::HashSet;
use std::io::BufRead;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dispatch_coordination::{
    Candidate, ChannelError, NotificationChannel, ProposalHandle, RecipientId, Reply,
    SharedDispatcher,
};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct ConsoleChannel {
    /// Recipients that behave as if they had blocked the bot
    blocked: HashSet<RecipientId>,
    next_message: AtomicU64,
}

impl ConsoleChannel {
    pub fn new(blocked: impl IntoIterator<Item = RecipientId>) -> Self {
        Self {
            blocked: blocked.into_iter().collect(),
            next_message: AtomicU64::new(0),
        }
    }

    fn check_reachable(&self, recipient: &RecipientId) -> Result<(), ChannelError> {
        if self.blocked.contains(recipient) {
            return Err(ChannelError::RecipientUnreachable {
                recipient: recipient.clone(),
                reason: "recipient blocked the dispatcher".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    async fn propose(
        &self,
        candidate: &Candidate,
        text: &str,
        _response_window: Duration,
    ) -> Result<ProposalHandle, ChannelError> {
        self.check_reachable(&candidate.id)?;
        let message_id = self.next_message.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = ProposalHandle::new(candidate.id.clone(), message_id.to_string());

        println!("\n--- to {} [{}] ---\n{}", candidate.name, handle, text);
        println!("(reply: `accept {handle}` or `decline {handle}`)");
        Ok(handle)
    }

    async fn edit_message(&self, handle: &ProposalHandle, text: &str) -> Result<(), ChannelError> {
        self.check_reachable(&handle.recipient)?;
        println!("\n--- edited [{}] ---\n{}", handle, text);
        Ok(())
    }

    async fn notify(&self, recipient: &RecipientId, text: &str) -> Result<(), ChannelError> {
        self.check_reachable(recipient)?;
        println!("\n--- to supervisor {} ---\n{}", recipient, text);
        Ok(())
    }
}

/// Route one line of operator input. Blank lines are ignored.
pub fn handle_reply_line(dispatcher: &SharedDispatcher, line: &str) -> Option<usize> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.parse::<Reply>() {
        Ok(reply) => Some(dispatcher.route_reply(reply)),
        Err(e) => {
            warn!(input = %line, "Ignoring reply: {e}");
            None
        }
    }
}

/// Read replies from stdin until it closes.
///
/// Runs on a plain thread; a pending stdin read must not hold up runtime shutdown.
pub fn spawn_stdin_replies(dispatcher: SharedDispatcher) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if let Some(delivered) = handle_reply_line(&dispatcher, &line) {
                        debug!(delivered, "Reply forwarded");
                    }
                }
                Err(e) => {
                    warn!("Stopped reading replies: {e}");
                    break;
                }
            }
        }
    })
}
