//! Slack notifications

pub mod blocks;
mod client;
mod error;

pub use blocks::{SprintMetrics, SprintProgress, StandupContent};
pub use client::{PostedMessage, SlackClient, normalize_channel};
pub use error::SlackError;
