//! Approval request and outcome types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// Coarse risk classification of a proposed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

/// Decision recorded for an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Modified,
    Timeout,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Modified => write!(f, "modified"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Gate policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalPolicy {
    /// When false, actions below high risk pass without a prompt
    pub approval_required: bool,

    /// Actions at or below this level pass without a prompt
    pub auto_approve_threshold: Option<RiskLevel>,

    /// Time the operator has to decide; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            approval_required: true,
            auto_approve_threshold: None,
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// An agent-proposed action awaiting a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub action_type: String,
    pub description: String,
    pub proposed_action: Map<String, Value>,
    pub risk_level: RiskLevel,
    pub context: Map<String, Value>,
    /// Overrides the policy timeout for this request
    #[serde(skip)]
    pub timeout: Option<Duration>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn new(
        action_type: impl Into<String>,
        description: impl Into<String>,
        proposed_action: Map<String, Value>,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            action_type: action_type.into(),
            description: description.into(),
            proposed_action,
            risk_level,
            context: Map::new(),
            timeout: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The decision handed back to the caller
///
/// `action` is present exactly when the status is approved or modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub status: ApprovalStatus,
    pub action: Option<Map<String, Value>>,
    pub message: String,
    pub feedback: Option<String>,
}

impl ApprovalOutcome {
    pub fn approved(action: Map<String, Value>, message: impl Into<String>) -> Self {
        Self {
            status: ApprovalStatus::Approved,
            action: Some(action),
            message: message.into(),
            feedback: None,
        }
    }

    pub fn modified(action: Map<String, Value>) -> Self {
        Self {
            status: ApprovalStatus::Modified,
            action: Some(action),
            message: "Modified by user".to_string(),
            feedback: None,
        }
    }

    pub fn rejected(message: impl Into<String>, feedback: Option<String>) -> Self {
        Self {
            status: ApprovalStatus::Rejected,
            action: None,
            message: message.into(),
            feedback,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            status: ApprovalStatus::Timeout,
            action: None,
            message: "Request timed out".to_string(),
            feedback: None,
        }
    }

    /// Approved or modified; either way the action should be applied
    pub fn is_approved(&self) -> bool {
        matches!(self.status, ApprovalStatus::Approved | ApprovalStatus::Modified)
    }

    /// String parameter from the action to apply
    pub fn action_str(&self, key: &str) -> Option<&str> {
        self.action.as_ref()?.get(key)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_risk_parse_and_display() {
        assert_eq!("LOW".parse::<RiskLevel>().unwrap(), RiskLevel::Low);
        assert_eq!(" critical ".parse::<RiskLevel>().unwrap(), RiskLevel::Critical);
        assert!("severe".parse::<RiskLevel>().is_err());
        assert_eq!(RiskLevel::Medium.to_string(), "medium");
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&ApprovalStatus::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
    }

    #[test]
    fn test_outcome_action_presence() {
        let mut action = Map::new();
        action.insert("title".into(), json!("Fix login"));

        let approved = ApprovalOutcome::approved(action.clone(), "ok");
        assert!(approved.is_approved());
        assert_eq!(approved.action_str("title"), Some("Fix login"));

        let modified = ApprovalOutcome::modified(action);
        assert!(modified.is_approved());
        assert!(modified.action.is_some());

        let rejected = ApprovalOutcome::rejected("Rejected by user", Some("not now".into()));
        assert!(!rejected.is_approved());
        assert!(rejected.action.is_none());

        let timeout = ApprovalOutcome::timed_out();
        assert!(!timeout.is_approved());
        assert!(timeout.action.is_none());
        assert_eq!(timeout.status, ApprovalStatus::Timeout);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = ApprovalRequest::new("x", "d", Map::new(), RiskLevel::Low);
        let b = ApprovalRequest::new("x", "d", Map::new(), RiskLevel::Low);
        assert_ne!(a.id, b.id);
    }
}
