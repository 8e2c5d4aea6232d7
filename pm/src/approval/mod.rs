//! Human-in-the-loop approval
//!
//! Types for proposed actions and decisions, the gate that collects decisions,
//! and the session history of everything decided.

mod gate;
pub mod history;
mod types;

pub use gate::{ApprovalGate, GateInfo, github_action_risk};
pub use history::{InteractionHistory, InteractionRecord, InteractionSummary};
pub use types::{ApprovalOutcome, ApprovalPolicy, ApprovalRequest, ApprovalStatus, RiskLevel};
