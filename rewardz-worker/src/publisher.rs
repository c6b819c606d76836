//! Reward publication.
//!
//! The engine hands each [`ActionResult`] to a [`RewardPublisher`] keyed by
//! player; delivery beyond that point belongs to the transport.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use rewardz_core::{ActionResult, PlayerId};

use crate::error::WorkerError;

/// Sink for processed results.
pub trait RewardPublisher: Send + Sync {
    /// Publish one result.
    ///
    /// # Errors
    /// Returns [`WorkerError::Publish`] if the result could not be handed
    /// off.
    fn publish(&self, result: &ActionResult) -> Result<(), WorkerError>;
}

/// A serialised result addressed to one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Routing key.
    pub player_id: PlayerId,
    /// JSON `{"player_id": .., "rewards": [..]}`.
    pub body: Vec<u8>,
}

impl OutboundMessage {
    /// Serialise `result`.
    ///
    /// # Errors
    /// Returns [`WorkerError::Publish`] if serialisation fails.
    pub fn from_result(result: &ActionResult) -> Result<Self, WorkerError> {
        Ok(Self {
            player_id: result.player_id.clone(),
            body: serde_json::to_vec(result).map_err(|e| WorkerError::Publish(e.to_string()))?,
        })
    }
}

/// Publishes into an in-process channel, e.g. towards a socket fan-out task.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RewardPublisher for ChannelPublisher {
    fn publish(&self, result: &ActionResult) -> Result<(), WorkerError> {
        let message = OutboundMessage::from_result(result)?;
        self.tx
            .send(message)
            .map_err(|_| WorkerError::Publish("receiver dropped".into()))
    }
}

/// Logs results instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl RewardPublisher for LogPublisher {
    fn publish(&self, result: &ActionResult) -> Result<(), WorkerError> {
        let message = OutboundMessage::from_result(result)?;
        info!(
            player = %message.player_id,
            rewards = result.rewards.len(),
            payload = %String::from_utf8_lossy(&message.body),
            "Rewards published"
        );
        Ok(())
    }
}
