//! Collaborator contracts: where jobs come from and how people are reached
//!
//! The escalation core is transport-agnostic. A chat bot, an SMS gateway or
//! a test double only has to implement these traits.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, DispatchResult};
use crate::job::{Candidate, Job, RecipientId, Roster};

/// Supplies the job to dispatch and the roster to pick candidates from
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Most recent job record. Fails with `NoJobAvailable` when there is none.
    async fn latest_job(&self) -> DispatchResult<Job>;

    /// Every candidate that may be selected
    async fn roster(&self) -> DispatchResult<Roster>;
}

/// Delivers messages to recipients
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Offer a job to a candidate. The returned handle identifies replies to this offer.
    async fn propose(
        &self,
        candidate: &Candidate,
        text: &str,
        response_window: Duration,
    ) -> Result<ProposalHandle, ChannelError>;

    /// Replace the text of a previously delivered proposal
    async fn edit_message(&self, handle: &ProposalHandle, text: &str) -> Result<(), ChannelError>;

    /// Plain message to a recipient (used for supervisor reports)
    async fn notify(&self, recipient: &RecipientId, text: &str) -> Result<(), ChannelError>;
}

/// Identifies one delivered proposal.
///
/// Scoped by recipient so transports with per-chat message ids never produce
/// two equal handles for different people.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalHandle {
    /// Recipient the proposal was delivered to
    pub recipient: RecipientId,
    /// Transport message id, unique only within the recipient's chat
    pub message_id: String,
}

impl ProposalHandle {
    pub fn new(recipient: RecipientId, message_id: impl Into<String>) -> Self {
        Self {
            recipient,
            message_id: message_id.into(),
        }
    }
}

impl std::fmt::Display for ProposalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.recipient, self.message_id)
    }
}

impl FromStr for ProposalHandle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().rsplit_once(':') {
            Some((recipient, message_id)) if !recipient.is_empty() && !message_id.is_empty() => {
                Ok(Self::new(RecipientId::from(recipient), message_id))
            }
            _ => Err(format!("expected <recipient>:<message_id>, got {s:?}")),
        }
    }
}

/// A candidate's answer to a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "handle", rename_all = "snake_case")]
pub enum Reply {
    Accept(ProposalHandle),
    Decline(ProposalHandle),
}

impl Reply {
    pub fn handle(&self) -> &ProposalHandle {
        match self {
            Self::Accept(h) | Self::Decline(h) => h,
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept(_))
    }
}

impl FromStr for Reply {
    type Err = String;

    /// Parses `accept <handle>` / `decline <handle>` (also `a` / `d`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (verb, rest) = s
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| format!("expected `accept <handle>` or `decline <handle>`, got {s:?}"))?;
        let handle: ProposalHandle = rest.parse()?;
        match verb.to_ascii_lowercase().as_str() {
            "accept" | "a" | "yes" => Ok(Self::Accept(handle)),
            "decline" | "d" | "no" => Ok(Self::Decline(handle)),
            other => Err(format!("unknown reply {other:?}")),
        }
    }
}
