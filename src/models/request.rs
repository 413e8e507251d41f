use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Priority;

/// An approval-gated command request from an agent session. Status only moves
/// forward: Pending -> Approved -> Processing -> Completed/Failed, or
/// Pending -> Rejected.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AgentRequest {
    pub id: Uuid,
    pub agent_id: String,
    pub session_id: String,
    pub command: String,
    pub description: String,
    pub priority: Priority,
    pub risk_tier: RiskTier,
    pub status: RequestStatus,
    pub auto_approved: bool,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub supervisor_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Processing,
    Completed,
    Failed,
    Rejected,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
            RequestStatus::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Submission input. Validated by the request manager before persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub agent_id: String,
    pub session_id: String,
    pub command: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
}
