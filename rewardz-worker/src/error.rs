//! Error types for the worker crate.

use thiserror::Error;

/// Errors raised at the transport boundary.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// An inbound payload could not be decoded.
    #[error("Malformed envelope: {0}")]
    Decode(String),

    /// An outbound payload could not be serialised.
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// A result could not be handed to the publisher.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Engine error while bootstrapping.
    #[error(transparent)]
    Core(#[from] rewardz_core::RewardzError),
}
