use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use wfh_core::domain::application::{Application, ApplicationId, NewApplication};
use wfh_core::domain::approval::{ApprovalRecord, Decision, DecisionOutcome, NewApprovalRecord};
use wfh_core::domain::user::UserAccount;
use wfh_core::errors::{ApplicationError, DomainError};
use wfh_core::workflow::WorkflowError;

pub mod application;
pub mod memory;
pub mod user;

pub use application::SqlApplicationRepository;
pub use memory::{InMemoryApplicationRepository, InMemoryUserRepository};
pub use user::SqlUserRepository;

/// Upper bound for a single `list` page.
pub const MAX_LIST_LIMIT: u32 = 200;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<WorkflowError> for RepositoryError {
    fn from(error: WorkflowError) -> Self {
        Self::Domain(DomainError::Workflow(error))
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Domain(domain) => Self::Domain(domain),
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn create(&self, application: NewApplication) -> Result<ApplicationId, RepositoryError>;
    async fn get(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError>;
    /// Newest first; `limit` is clamped to `1..=MAX_LIST_LIMIT`.
    async fn list(&self, limit: u32) -> Result<Vec<Application>, RepositoryError>;
    async fn append_approval(
        &self,
        record: NewApprovalRecord,
    ) -> Result<ApprovalRecord, RepositoryError>;
    /// Ascending by sequence. Unknown ids yield an empty list.
    async fn list_approvals(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError>;
    /// Validates and applies one approve/reject as a single unit of work.
    async fn decide(
        &self,
        application_id: ApplicationId,
        decision: Decision,
    ) -> Result<DecisionOutcome, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str)
        -> Result<Option<UserAccount>, RepositoryError>;
    /// Inserts or replaces the account keyed by username.
    async fn save(&self, user: UserAccount) -> Result<(), RepositoryError>;
}

pub(crate) fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_LIST_LIMIT)
}

/// Fixed-width UTC timestamps so lexical order matches chronological order.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} timestamp '{}': {}", field, value, err))
    })
}
