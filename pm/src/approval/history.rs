//! Interaction history - every gate decision, kept in memory and appended to JSONL
//!
//! The audit log lives at `<data_local_dir>/pmagent/approvals.jsonl` unless
//! configured otherwise. Write failures are logged and never block a decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{ApprovalStatus, RiskLevel};

/// Number of records shown in the summary
const RECENT_LIMIT: usize = 5;

/// One recorded decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub timestamp: DateTime<Utc>,
    pub action_type: String,
    pub risk_level: RiskLevel,
    pub status: ApprovalStatus,
    pub description: String,
    /// Decided by policy rather than by a person
    #[serde(default)]
    pub auto: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Aggregate view used by the `history` command
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InteractionSummary {
    pub total: usize,
    pub status_breakdown: BTreeMap<ApprovalStatus, usize>,
    pub risk_breakdown: BTreeMap<RiskLevel, usize>,
    pub recent: Vec<InteractionRecord>,
}

/// Session history with optional JSONL persistence
#[derive(Debug, Default)]
pub struct InteractionHistory {
    records: Vec<InteractionRecord>,
    log_path: Option<PathBuf>,
}

impl InteractionHistory {
    /// In-memory history only
    pub fn new() -> Self {
        Self::default()
    }

    /// History that also appends each record to `path`
    pub fn with_log(path: impl AsRef<Path>) -> Self {
        let log_path = path.as_ref().to_path_buf();
        debug!(?log_path, "InteractionHistory::with_log: called");
        Self {
            records: Vec::new(),
            log_path: Some(log_path),
        }
    }

    pub fn record(&mut self, record: InteractionRecord) {
        debug!(action_type = %record.action_type, status = %record.status, "InteractionHistory::record: called");
        if let Some(path) = &self.log_path
            && let Err(e) = append_record(path, &record)
        {
            warn!(path = %path.display(), error = %e, "InteractionHistory: failed to append record");
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[InteractionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> InteractionSummary {
        InteractionSummary::from_records(&self.records)
    }
}

impl InteractionSummary {
    /// Totals over `records`, keeping the last few as `recent`
    pub fn from_records(records: &[InteractionRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            *summary.status_breakdown.entry(record.status).or_default() += 1;
            *summary.risk_breakdown.entry(record.risk_level).or_default() += 1;
        }

        let start = records.len().saturating_sub(RECENT_LIMIT);
        summary.recent = records[start..].to_vec();
        summary
    }
}

fn append_record(path: &Path, record: &InteractionRecord) -> eyre::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(record)?;
    writeln!(file, "{}", json)?;
    Ok(())
}

/// Read records from an audit log, skipping malformed lines
pub fn read_history(path: impl AsRef<Path>) -> eyre::Result<Vec<InteractionRecord>> {
    let path = path.as_ref();
    debug!(?path, "read_history: called");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InteractionRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line, error = %e, "read_history: failed to parse line"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(action: &str, risk: RiskLevel, status: ApprovalStatus) -> InteractionRecord {
        InteractionRecord {
            timestamp: Utc::now(),
            action_type: action.to_string(),
            risk_level: risk,
            status,
            description: format!("{} description", action),
            auto: false,
            feedback: None,
        }
    }

    #[test]
    fn test_empty_summary() {
        let history = InteractionHistory::new();
        let summary = history.summary();

        assert_eq!(summary.total, 0);
        assert!(summary.status_breakdown.is_empty());
        assert!(summary.recent.is_empty());
    }

    #[test]
    fn test_summary_breakdowns_and_recent_window() {
        let mut history = InteractionHistory::new();
        for i in 0..7 {
            let status = if i % 2 == 0 {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::Rejected
            };
            history.record(record(&format!("action_{}", i), RiskLevel::Low, status));
        }
        history.record(record("deploy", RiskLevel::High, ApprovalStatus::Timeout));

        let summary = history.summary();
        assert_eq!(summary.total, 8);
        assert_eq!(summary.status_breakdown[&ApprovalStatus::Approved], 4);
        assert_eq!(summary.status_breakdown[&ApprovalStatus::Rejected], 3);
        assert_eq!(summary.status_breakdown[&ApprovalStatus::Timeout], 1);
        assert_eq!(summary.risk_breakdown[&RiskLevel::Low], 7);
        assert_eq!(summary.risk_breakdown[&RiskLevel::High], 1);

        assert_eq!(summary.recent.len(), 5);
        assert_eq!(summary.recent[0].action_type, "action_3");
        assert_eq!(summary.recent[4].action_type, "deploy");
    }

    #[test]
    fn test_log_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("approvals.jsonl");

        let mut history = InteractionHistory::with_log(&path);
        history.record(record("daily_standup", RiskLevel::Low, ApprovalStatus::Approved));
        history.record(record("notify_risk_flags", RiskLevel::Medium, ApprovalStatus::Rejected));

        let read = read_history(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[1].action_type, "notify_risk_flags");
        assert_eq!(read[1].status, ApprovalStatus::Rejected);
    }

    #[test]
    fn test_read_history_skips_bad_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("approvals.jsonl");
        let good = serde_json::to_string(&record("a", RiskLevel::Low, ApprovalStatus::Approved)).unwrap();
        fs::write(&path, format!("{}\nnot json\n\n{}\n", good, good)).unwrap();

        assert_eq!(read_history(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_read_missing_history() {
        let temp = TempDir::new().unwrap();
        assert!(read_history(temp.path().join("none.jsonl")).unwrap().is_empty());
    }
}
