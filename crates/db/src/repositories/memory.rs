use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::RwLock;

use wfh_core::domain::application::{Application, ApplicationId, NewApplication};
use wfh_core::domain::approval::{ApprovalRecord, Decision, DecisionOutcome, NewApprovalRecord};
use wfh_core::domain::user::UserAccount;
use wfh_core::errors::DomainError;
use wfh_core::workflow::ApprovalWorkflow;

use super::{clamp_limit, ApplicationRepository, RepositoryError, UserRepository};

#[derive(Default)]
struct Ledger {
    next_application_id: i64,
    next_record_id: i64,
    applications: BTreeMap<ApplicationId, Application>,
    approvals: HashMap<ApplicationId, Vec<ApprovalRecord>>,
}

impl Ledger {
    fn append(&mut self, record: NewApprovalRecord) -> ApprovalRecord {
        self.next_record_id += 1;
        let trail = self.approvals.entry(record.application_id).or_default();
        let sequence = trail.last().map_or(1, |last| last.sequence + 1);
        let stored = ApprovalRecord {
            id: self.next_record_id,
            application_id: record.application_id,
            sequence,
            actor_email: record.actor_email,
            actor_name: record.actor_name,
            actor_role: record.actor_role,
            action: record.action,
            comment: record.comment,
            actor_ip: record.actor_ip,
            acted_at: record.acted_at,
        };
        trail.push(stored.clone());
        stored
    }
}

/// Holds every mutation under one write lock, mirroring the sqlite transaction.
#[derive(Default)]
pub struct InMemoryApplicationRepository {
    ledger: RwLock<Ledger>,
    workflow: ApprovalWorkflow,
}

impl InMemoryApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ApplicationRepository for InMemoryApplicationRepository {
    async fn create(&self, application: NewApplication) -> Result<ApplicationId, RepositoryError> {
        let mut ledger = self.ledger.write().await;
        ledger.next_application_id += 1;
        let id = ApplicationId(ledger.next_application_id);
        let now = Utc::now();

        ledger.applications.insert(
            id,
            Application {
                id,
                applicant: application.applicant,
                dates: application.dates,
                kind: application.kind,
                reason: application.reason,
                status: self.workflow.initial_state(),
                submitted_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let ledger = self.ledger.read().await;
        Ok(ledger.applications.get(&id).cloned())
    }

    async fn list(&self, limit: u32) -> Result<Vec<Application>, RepositoryError> {
        let ledger = self.ledger.read().await;
        let mut applications: Vec<Application> = ledger.applications.values().cloned().collect();
        applications.sort_by(|left, right| {
            right.submitted_at.cmp(&left.submitted_at).then_with(|| right.id.cmp(&left.id))
        });
        applications.truncate(clamp_limit(limit) as usize);
        Ok(applications)
    }

    async fn append_approval(
        &self,
        record: NewApprovalRecord,
    ) -> Result<ApprovalRecord, RepositoryError> {
        let mut ledger = self.ledger.write().await;
        if !ledger.applications.contains_key(&record.application_id) {
            return Err(DomainError::ApplicationNotFound(record.application_id).into());
        }
        Ok(ledger.append(record))
    }

    async fn list_approvals(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let ledger = self.ledger.read().await;
        Ok(ledger.approvals.get(&application_id).cloned().unwrap_or_default())
    }

    async fn decide(
        &self,
        application_id: ApplicationId,
        decision: Decision,
    ) -> Result<DecisionOutcome, RepositoryError> {
        let mut ledger = self.ledger.write().await;
        let current = ledger
            .applications
            .get(&application_id)
            .map(|application| application.status)
            .ok_or(DomainError::ApplicationNotFound(application_id))?;

        let acted_at = Utc::now();
        let (outcome, record) =
            self.workflow.decide(application_id, current, &decision, acted_at)?;

        if let Some(application) = ledger.applications.get_mut(&application_id) {
            application.status = outcome.to;
            application.updated_at = acted_at;
        }
        let stored = ledger.append(record);

        Ok(DecisionOutcome {
            application_id,
            from: outcome.from,
            status: outcome.to,
            record: stored,
        })
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, UserAccount>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(username).cloned())
    }

    async fn save(&self, user: UserAccount) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.username.clone(), user);
        Ok(())
    }
}
