//! Block Kit payloads for the messages pmagent posts

use serde_json::{Value, json};

use crate::approval::{ApprovalRequest, RiskLevel};
use crate::github::RiskFlag;

const MAX_COMPLETED_LISTED: usize = 10;
const MAX_FLAGS_PER_SEVERITY: usize = 5;

/// Progress line under a standup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SprintProgress {
    pub completed: usize,
    pub total: usize,
    pub velocity: Option<u32>,
}

/// Metrics shown at the top of a sprint report; absent values are omitted
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SprintMetrics {
    pub completed_stories: Option<usize>,
    pub story_points: Option<u32>,
    pub velocity: Option<u32>,
    pub completion_rate: Option<f64>,
}

fn header(text: &str) -> Value {
    json!({ "type": "header", "text": { "type": "plain_text", "text": text } })
}

fn section(text: &str) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } })
}

fn bullets<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|i| format!("• {}", i.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lists and progress for a daily standup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StandupContent<'a> {
    pub summary: Option<&'a str>,
    pub completed: &'a [String],
    pub planned: &'a [String],
    pub blockers: &'a [String],
    pub progress: Option<SprintProgress>,
}

/// Daily standup; empty lists produce no section
pub fn standup(date: &str, content: &StandupContent<'_>) -> Vec<Value> {
    let StandupContent {
        summary,
        completed,
        planned,
        blockers,
        progress,
    } = *content;
    let mut blocks = vec![header(&format!("📊 Daily Standup - {}", date))];
    if let Some(summary) = summary.filter(|s| !s.trim().is_empty()) {
        blocks.push(section(summary));
    }
    if !completed.is_empty() {
        blocks.push(section(&format!("*✅ Completed Yesterday:*\n{}", bullets(completed))));
    }
    if !planned.is_empty() {
        blocks.push(section(&format!("*🎯 Planned Today:*\n{}", bullets(planned))));
    }
    if !blockers.is_empty() {
        blocks.push(section(&format!("*🚫 Blockers:*\n{}", bullets(blockers))));
    }
    if let Some(p) = progress {
        let mut text = format!("*Sprint Progress:* {}/{} stories", p.completed, p.total);
        if let Some(v) = p.velocity {
            text.push_str(&format!(" | *Velocity:* {} pts", v));
        }
        blocks.push(section(&text));
    }
    blocks.push(json!({ "type": "divider" }));
    blocks
}

/// Sprint summary with completed work capped at ten entries
pub fn sprint_report(
    name: &str,
    metrics: &SprintMetrics,
    completed: &[String],
    incomplete: &[String],
    retrospective: &[String],
) -> Vec<Value> {
    let mut blocks = vec![header(&format!("🏃‍♂️ Sprint Report: {}", name))];

    let mut lines = Vec::new();
    if let Some(n) = metrics.completed_stories {
        lines.push(format!("*Completed Stories:* {}", n));
    }
    if let Some(n) = metrics.story_points {
        lines.push(format!("*Story Points:* {}", n));
    }
    if let Some(n) = metrics.velocity {
        lines.push(format!("*Team Velocity:* {}", n));
    }
    if let Some(rate) = metrics.completion_rate {
        lines.push(format!("*Completion Rate:* {:.1}%", rate));
    }
    if !lines.is_empty() {
        blocks.push(section(&lines.join("\n")));
    }

    if !completed.is_empty() {
        let shown = &completed[..completed.len().min(MAX_COMPLETED_LISTED)];
        let mut text = bullets(shown);
        if completed.len() > MAX_COMPLETED_LISTED {
            text.push_str(&format!("\n... and {} more", completed.len() - MAX_COMPLETED_LISTED));
        }
        blocks.push(section(&format!("*✅ Completed Work:*\n{}", text)));
    }
    if !incomplete.is_empty() {
        blocks.push(section(&format!("*⏳ Incomplete Work:*\n{}", bullets(incomplete))));
    }
    if !retrospective.is_empty() {
        blocks.push(section(&format!("*🔍 Retrospective Notes:*\n{}", bullets(retrospective))));
    }
    blocks
}

fn flag_lines(flags: &[&RiskFlag]) -> String {
    let mut text = String::new();
    for flag in flags.iter().take(MAX_FLAGS_PER_SEVERITY) {
        text.push_str(&format!("• *{}*: {}\n", flag.kind, flag.description));
        if !flag.source_url.is_empty() {
            text.push_str(&format!("  <{}|View Source>\n", flag.source_url));
        }
    }
    text.trim_end().to_string()
}

/// Flags grouped into high and medium severity, five of each at most
///
/// Critical flags are listed with the high group.
pub fn risk_flags(flags: &[RiskFlag]) -> Vec<Value> {
    let high: Vec<&RiskFlag> = flags.iter().filter(|f| f.severity >= RiskLevel::High).collect();
    let medium: Vec<&RiskFlag> = flags.iter().filter(|f| f.severity == RiskLevel::Medium).collect();

    let mut blocks = vec![header(&format!("⚠️ Risk Flags Detected ({} total)", flags.len()))];
    if !high.is_empty() {
        blocks.push(section(&format!(
            "*🔴 High Severity ({}):*\n{}",
            high.len(),
            flag_lines(&high)
        )));
    }
    if !medium.is_empty() {
        blocks.push(section(&format!(
            "*🟡 Medium Severity ({}):*\n{}",
            medium.len(),
            flag_lines(&medium)
        )));
    }
    blocks
}

/// Approval request with approve and reject buttons
///
/// Button values carry the request id so a response can be matched to it.
pub fn approval_request(request: &ApprovalRequest, requester: &str) -> Vec<Value> {
    let details = serde_json::to_string_pretty(&request.proposed_action).unwrap_or_default();
    let id = request.id.to_string();
    vec![
        header(&format!("🚨 Approval Required: {}", request.action_type)),
        json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!(
                    "*Requested by:* {} | *Risk:* {} | *Time:* {}",
                    requester,
                    request.risk_level,
                    request.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                ),
            }],
        }),
        section(&request.description),
        section(&format!("*Action Details:*\n```{}```", details)),
        json!({
            "type": "actions",
            "elements": [
                {
                    "type": "button",
                    "text": { "type": "plain_text", "text": "✅ Approve" },
                    "style": "primary",
                    "action_id": "approve_action",
                    "value": id,
                },
                {
                    "type": "button",
                    "text": { "type": "plain_text", "text": "❌ Reject" },
                    "style": "danger",
                    "action_id": "reject_action",
                    "value": id,
                },
            ],
        }),
    ]
}
