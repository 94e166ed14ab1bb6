use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::application::{ApplicationId, ApplicationStatus};
use crate::domain::user::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Rejected,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Verb used in transition error messages ("cannot approve in state ...").
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Approved => "approve",
            Self::Rejected => "reject",
        }
    }
}

/// The person recording a decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub email: String,
    pub name: String,
    /// `None` lets the store attribute the decision to the tier that owns the current stage.
    pub role: Option<Role>,
}

impl Actor {
    pub fn demo() -> Self {
        Self { email: "approver@local".to_string(), name: "Approver".to_string(), role: None }
    }
}

/// An approve/reject request against one application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: ApprovalAction,
    pub actor: Actor,
    pub comment: Option<String>,
    pub actor_ip: Option<String>,
}

impl Decision {
    pub fn approve(actor: Actor, comment: Option<String>) -> Self {
        Self { action: ApprovalAction::Approved, actor, comment, actor_ip: None }
    }

    pub fn reject(actor: Actor, comment: Option<String>) -> Self {
        Self { action: ApprovalAction::Rejected, actor, comment, actor_ip: None }
    }

    pub fn with_actor_ip(mut self, actor_ip: impl Into<String>) -> Self {
        self.actor_ip = Some(actor_ip.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApprovalRecord {
    pub application_id: ApplicationId,
    pub actor_email: String,
    pub actor_name: String,
    pub actor_role: Role,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub actor_ip: Option<String>,
    pub acted_at: DateTime<Utc>,
}

/// One immutable audit entry. `sequence` is 1-based and gap-free per application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: i64,
    pub application_id: ApplicationId,
    pub sequence: u32,
    pub actor_email: String,
    pub actor_name: String,
    pub actor_role: Role,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub actor_ip: Option<String>,
    pub acted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub application_id: ApplicationId,
    pub from: ApplicationStatus,
    pub status: ApplicationStatus,
    pub record: ApprovalRecord,
}
