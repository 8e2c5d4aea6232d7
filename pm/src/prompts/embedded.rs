//! Embedded prompts
//!
//! Compiled into the binary from the `.pmt` files at build time.

use tracing::debug;

/// Agent system prompt (role, goal, background, tools)
pub const SYSTEM: &str = include_str!("../../prompts/system.pmt");

pub const PLAN: &str = include_str!("../../prompts/plan.pmt");

pub const STANDUP: &str = include_str!("../../prompts/standup.pmt");

pub const SPRINT_REPORT: &str = include_str!("../../prompts/sprint-report.pmt");

pub const HEALTH_CHECK: &str = include_str!("../../prompts/health-check.pmt");

pub const RISK_SCAN: &str = include_str!("../../prompts/risk-scan.pmt");

pub const WEBHOOK: &str = include_str!("../../prompts/webhook.pmt");

/// Names of all embedded templates
pub const NAMES: &[&str] = &[
    "system",
    "plan",
    "standup",
    "sprint-report",
    "health-check",
    "risk-scan",
    "webhook",
];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "system" => Some(SYSTEM),
        "plan" => Some(PLAN),
        "standup" => Some(STANDUP),
        "sprint-report" => Some(SPRINT_REPORT),
        "health-check" => Some(HEALTH_CHECK),
        "risk-scan" => Some(RISK_SCAN),
        "webhook" => Some(WEBHOOK),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
