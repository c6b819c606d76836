//! # rewardz-worker: Event Intake for rewardz
//!
//! This crate sits between a message transport and the game-agnostic
//! `rewardz-core` engine.
//!
//! ## Architecture
//!
//! ```text
//!   transport ──► Delivery{body, reply}
//!                      │
//!                      ▼
//!   ┌──────────────────────────────────────┐
//!   │ ActionWorker                          │
//!   │   Envelope::decode ─► per-player lock │
//!   │        │                              │
//!   │        ▼                              │
//!   │   ActionProcessor (rewardz-core)      │
//!   │        │                              │
//!   │        ▼                              │
//!   │   RewardPublisher ─► Disposition      │
//!   └──────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `envelope`: wire format of an inbound action
//! - `publisher`: where earned rewards go
//! - `worker`: ack/requeue/reject decisions and the async intake loop
//! - `telemetry`: tracing subscriber bootstrap

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod envelope;
pub mod error;
pub mod publisher;
pub mod telemetry;
pub mod worker;

pub use envelope::Envelope;
pub use error::WorkerError;
pub use publisher::{ChannelPublisher, LogPublisher, OutboundMessage, RewardPublisher};
pub use worker::{ActionWorker, Delivery, Disposition, StatsSnapshot, WorkerStats};
