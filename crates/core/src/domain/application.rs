use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub i64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    PendingSection,
    PendingDepartment,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 4] =
        [Self::PendingSection, Self::PendingDepartment, Self::Approved, Self::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingSection => "pending_section",
            Self::PendingDepartment => "pending_department",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_section" => Some(Self::PendingSection),
            "pending_department" => Some(Self::PendingDepartment),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingSection | Self::PendingDepartment)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    #[default]
    Regular,
    Urgent,
}

impl LeaveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "regular" => Some(Self::Regular),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Who submitted a leave request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub email: String,
    pub name: String,
    pub department: String,
}

impl Applicant {
    /// Fixed identity used when a request arrives without a bearer token.
    pub fn demo() -> Self {
        Self {
            email: "demo@local".to_string(),
            name: "Demo User".to_string(),
            department: "DemoDept".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub applicant: Applicant,
    pub dates: Vec<String>,
    pub kind: LeaveKind,
    pub reason: Option<String>,
}

impl NewApplication {
    /// Trims dates and reason, dropping a blank reason.
    pub fn validate(mut self) -> Result<Self, DomainError> {
        if self.dates.is_empty() {
            return Err(DomainError::Validation("dates must not be empty".to_string()));
        }
        for date in &mut self.dates {
            let trimmed = date.trim();
            if trimmed.is_empty() {
                return Err(DomainError::Validation("dates must not contain blanks".to_string()));
            }
            *date = trimmed.to_string();
        }
        self.reason = self.reason.map(|reason| reason.trim().to_string()).filter(|r| !r.is_empty());
        Ok(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub applicant: Applicant,
    pub dates: Vec<String>,
    pub kind: LeaveKind,
    pub reason: Option<String>,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
