use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use wfh_core::domain::application::{
    Applicant, Application, ApplicationId, ApplicationStatus, LeaveKind, NewApplication,
};
use wfh_core::domain::approval::{
    ApprovalAction, ApprovalRecord, Decision, DecisionOutcome, NewApprovalRecord,
};
use wfh_core::domain::user::Role;
use wfh_core::errors::DomainError;
use wfh_core::workflow::ApprovalWorkflow;

use super::{clamp_limit, format_timestamp, parse_rfc3339, ApplicationRepository, RepositoryError};
use crate::DbPool;

const APPLICATION_COLUMNS: &str = "id, applicant_email, applicant_name, department, dates_json,
     kind, reason, status, submitted_at, updated_at";

const APPROVAL_COLUMNS: &str = "id, application_id, sequence, actor_email, actor_name,
     actor_role, action, comment, actor_ip, acted_at";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationRecord {
    pub id: i64,
    pub applicant_email: String,
    pub applicant_name: String,
    pub department: String,
    pub dates_json: String,
    pub kind: String,
    pub reason: Option<String>,
    pub status: String,
    pub submitted_at: String,
    pub updated_at: String,
}

impl TryFrom<ApplicationRecord> for Application {
    type Error = RepositoryError;

    fn try_from(value: ApplicationRecord) -> Result<Self, Self::Error> {
        let status = ApplicationStatus::parse(&value.status).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid application status: {}", value.status))
        })?;
        let kind = LeaveKind::parse(&value.kind).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid application kind: {}", value.kind))
        })?;
        let dates: Vec<String> = serde_json::from_str(&value.dates_json).map_err(|err| {
            RepositoryError::Decode(format!("invalid dates_json for {}: {}", value.id, err))
        })?;

        Ok(Self {
            id: ApplicationId(value.id),
            applicant: Applicant {
                email: value.applicant_email,
                name: value.applicant_name,
                department: value.department,
            },
            dates,
            kind,
            reason: value.reason,
            status,
            submitted_at: parse_rfc3339("application submitted_at", &value.submitted_at)?,
            updated_at: parse_rfc3339("application updated_at", &value.updated_at)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalRecordRow {
    pub id: i64,
    pub application_id: i64,
    pub sequence: i64,
    pub actor_email: String,
    pub actor_name: String,
    pub actor_role: String,
    pub action: String,
    pub comment: Option<String>,
    pub actor_ip: Option<String>,
    pub acted_at: String,
}

impl TryFrom<ApprovalRecordRow> for ApprovalRecord {
    type Error = RepositoryError;

    fn try_from(value: ApprovalRecordRow) -> Result<Self, Self::Error> {
        let actor_role = Role::parse(&value.actor_role).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid approval actor_role: {}", value.actor_role))
        })?;
        let action = ApprovalAction::parse(&value.action).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid approval action: {}", value.action))
        })?;
        let sequence = u32::try_from(value.sequence).map_err(|_| {
            RepositoryError::Decode(format!("invalid approval sequence: {}", value.sequence))
        })?;

        Ok(Self {
            id: value.id,
            application_id: ApplicationId(value.application_id),
            sequence,
            actor_email: value.actor_email,
            actor_name: value.actor_name,
            actor_role,
            action,
            comment: value.comment,
            actor_ip: value.actor_ip,
            acted_at: parse_rfc3339("approval acted_at", &value.acted_at)?,
        })
    }
}

pub struct SqlApplicationRepository {
    pool: DbPool,
    workflow: ApprovalWorkflow,
}

impl SqlApplicationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self::with_workflow(pool, ApprovalWorkflow::default())
    }

    pub fn with_workflow(pool: DbPool, workflow: ApprovalWorkflow) -> Self {
        Self { pool, workflow }
    }

    async fn current_status(
        &self,
        id: ApplicationId,
    ) -> Result<Option<ApplicationStatus>, RepositoryError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM application WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        status.map(|raw| decode_status(&raw)).transpose()
    }
}

#[async_trait]
impl ApplicationRepository for SqlApplicationRepository {
    async fn create(&self, application: NewApplication) -> Result<ApplicationId, RepositoryError> {
        let now = format_timestamp(Utc::now());
        let dates_json = serde_json::to_string(&application.dates)
            .map_err(|err| RepositoryError::Decode(format!("cannot encode dates: {err}")))?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO application (applicant_email, applicant_name, department, dates_json,
                                      kind, reason, status, submitted_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&application.applicant.email)
        .bind(&application.applicant.name)
        .bind(&application.applicant.department)
        .bind(&dates_json)
        .bind(application.kind.as_str())
        .bind(&application.reason)
        .bind(self.workflow.initial_state().as_str())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(ApplicationId(id))
    }

    async fn get(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {APPLICATION_COLUMNS} FROM application WHERE id = ?"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(application_from_row).transpose()
    }

    async fn list(&self, limit: u32) -> Result<Vec<Application>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM application
             ORDER BY submitted_at DESC, id DESC
             LIMIT ?"
        ))
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(application_from_row).collect()
    }

    async fn append_approval(
        &self,
        record: NewApprovalRecord,
    ) -> Result<ApprovalRecord, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM application WHERE id = ?")
            .bind(record.application_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DomainError::ApplicationNotFound(record.application_id).into());
        }

        let stored = insert_approval(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn list_approvals(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approval_record
             WHERE application_id = ?
             ORDER BY sequence ASC"
        ))
        .bind(application_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(approval_from_row).collect()
    }

    async fn decide(
        &self,
        application_id: ApplicationId,
        decision: Decision,
    ) -> Result<DecisionOutcome, RepositoryError> {
        let current = self
            .current_status(application_id)
            .await?
            .ok_or(DomainError::ApplicationNotFound(application_id))?;

        let acted_at = Utc::now();
        let (outcome, record) =
            self.workflow.decide(application_id, current, &decision, acted_at)?;

        // The conditional update is the first statement so the write lock is taken up front.
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE application SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(outcome.to.as_str())
        .bind(format_timestamp(acted_at))
        .bind(application_id.0)
        .bind(current.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let latest: Option<String> =
                sqlx::query_scalar("SELECT status FROM application WHERE id = ?")
                    .bind(application_id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            let Some(latest) = latest else {
                return Err(DomainError::ApplicationNotFound(application_id).into());
            };
            let latest = decode_status(&latest)?;
            return Err(match self.workflow.apply(latest, decision.action) {
                Err(invalid) => invalid.into(),
                Ok(_) => DomainError::ConcurrentModification(application_id).into(),
            });
        }

        let stored = insert_approval(&mut tx, &record).await?;
        tx.commit().await?;

        Ok(DecisionOutcome {
            application_id,
            from: outcome.from,
            status: outcome.to,
            record: stored,
        })
    }
}

async fn insert_approval(
    tx: &mut Transaction<'_, Sqlite>,
    record: &NewApprovalRecord,
) -> Result<ApprovalRecord, RepositoryError> {
    let row = sqlx::query(&format!(
        "INSERT INTO approval_record (application_id, sequence, actor_email, actor_name,
                                      actor_role, action, comment, actor_ip, acted_at)
         VALUES (?, (SELECT COALESCE(MAX(sequence), 0) + 1 FROM approval_record
                     WHERE application_id = ?), ?, ?, ?, ?, ?, ?, ?)
         RETURNING {APPROVAL_COLUMNS}"
    ))
    .bind(record.application_id.0)
    .bind(record.application_id.0)
    .bind(&record.actor_email)
    .bind(&record.actor_name)
    .bind(record.actor_role.as_str())
    .bind(record.action.as_str())
    .bind(&record.comment)
    .bind(&record.actor_ip)
    .bind(format_timestamp(record.acted_at))
    .fetch_one(&mut **tx)
    .await?;

    approval_from_row(&row)
}

fn decode_status(raw: &str) -> Result<ApplicationStatus, RepositoryError> {
    ApplicationStatus::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid application status: {raw}")))
}

fn application_record_from_row(row: &SqliteRow) -> Result<ApplicationRecord, RepositoryError> {
    Ok(ApplicationRecord {
        id: row.try_get("id")?,
        applicant_email: row.try_get("applicant_email")?,
        applicant_name: row.try_get("applicant_name")?,
        department: row.try_get("department")?,
        dates_json: row.try_get("dates_json")?,
        kind: row.try_get("kind")?,
        reason: row.try_get("reason")?,
        status: row.try_get("status")?,
        submitted_at: row.try_get("submitted_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn approval_record_row_from_row(row: &SqliteRow) -> Result<ApprovalRecordRow, RepositoryError> {
    Ok(ApprovalRecordRow {
        id: row.try_get("id")?,
        application_id: row.try_get("application_id")?,
        sequence: row.try_get("sequence")?,
        actor_email: row.try_get("actor_email")?,
        actor_name: row.try_get("actor_name")?,
        actor_role: row.try_get("actor_role")?,
        action: row.try_get("action")?,
        comment: row.try_get("comment")?,
        actor_ip: row.try_get("actor_ip")?,
        acted_at: row.try_get("acted_at")?,
    })
}

fn application_from_row(row: &SqliteRow) -> Result<Application, RepositoryError> {
    Application::try_from(application_record_from_row(row)?)
}

fn approval_from_row(row: &SqliteRow) -> Result<ApprovalRecord, RepositoryError> {
    ApprovalRecord::try_from(approval_record_row_from_row(row)?)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use wfh_core::domain::application::{
        Applicant, ApplicationId, ApplicationStatus, LeaveKind, NewApplication,
    };
    use wfh_core::domain::approval::{Actor, ApprovalAction, Decision, NewApprovalRecord};
    use wfh_core::domain::user::Role;
    use wfh_core::errors::DomainError;
    use wfh_core::workflow::WorkflowError;

    use super::SqlApplicationRepository;
    use crate::repositories::{ApplicationRepository, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn regular_leave(dates: &[&str]) -> NewApplication {
        NewApplication {
            applicant: Applicant::demo(),
            dates: dates.iter().map(|date| date.to_string()).collect(),
            kind: LeaveKind::Regular,
            reason: None,
        }
    }

    fn approver() -> Actor {
        Actor::demo()
    }

    #[tokio::test]
    async fn create_starts_in_pending_section() {
        let repo = SqlApplicationRepository::new(setup_pool().await);
        let id = repo
            .create(NewApplication {
                kind: LeaveKind::Urgent,
                reason: Some("flooded office".to_string()),
                ..regular_leave(&["2025-08-15", "2025-08-16"])
            })
            .await
            .expect("create");

        let stored = repo.get(id).await.expect("get").expect("exists");
        assert_eq!(stored.status, ApplicationStatus::PendingSection);
        assert_eq!(stored.dates, vec!["2025-08-15".to_string(), "2025-08-16".to_string()]);
        assert_eq!(stored.kind, LeaveKind::Urgent);
        assert_eq!(stored.reason.as_deref(), Some("flooded office"));
        assert_eq!(stored.applicant, Applicant::demo());
        assert_eq!(stored.submitted_at, stored.updated_at);
    }

    #[tokio::test]
    async fn get_unknown_application_returns_none() {
        let repo = SqlApplicationRepository::new(setup_pool().await);
        assert!(repo.get(ApplicationId(404)).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn approve_twice_then_reject_is_refused() {
        let repo = SqlApplicationRepository::new(setup_pool().await);
        let id = repo.create(regular_leave(&["2025-08-15"])).await.expect("create");

        let first = repo
            .decide(id, Decision::approve(approver(), Some("ok".to_string())))
            .await
            .expect("section approval");
        assert_eq!(first.from, ApplicationStatus::PendingSection);
        assert_eq!(first.status, ApplicationStatus::PendingDepartment);
        assert_eq!(first.record.sequence, 1);
        assert_eq!(first.record.actor_role, Role::SectionHead);
        assert_eq!(first.record.comment.as_deref(), Some("ok"));

        let second =
            repo.decide(id, Decision::approve(approver(), None)).await.expect("dept approval");
        assert_eq!(second.status, ApplicationStatus::Approved);
        assert_eq!(second.record.sequence, 2);
        assert_eq!(second.record.actor_role, Role::DepartmentHead);

        let error = repo
            .decide(id, Decision::reject(approver(), None))
            .await
            .expect_err("approved is terminal");
        assert!(matches!(
            error,
            RepositoryError::Domain(DomainError::Workflow(WorkflowError::InvalidTransition {
                state: ApplicationStatus::Approved,
                action: ApprovalAction::Rejected,
            }))
        ));
        assert_eq!(error.to_string(), "cannot reject in state approved");

        let approvals = repo.list_approvals(id).await.expect("approvals");
        let sequences: Vec<u32> = approvals.iter().map(|record| record.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert!(approvals.iter().all(|record| record.action == ApprovalAction::Approved));

        let stored = repo.get(id).await.expect("get").expect("exists");
        assert_eq!(stored.status, ApplicationStatus::Approved);
        assert!(stored.updated_at >= stored.submitted_at);
    }

    #[tokio::test]
    async fn reject_then_approve_is_refused_without_audit() {
        let repo = SqlApplicationRepository::new(setup_pool().await);
        let id = repo.create(regular_leave(&["2025-09-01"])).await.expect("create");

        let rejected = repo
            .decide(id, Decision::reject(approver(), Some("coverage".to_string())))
            .await
            .expect("reject");
        assert_eq!(rejected.status, ApplicationStatus::Rejected);
        assert_eq!(rejected.record.sequence, 1);
        assert_eq!(rejected.record.action, ApprovalAction::Rejected);

        let error = repo
            .decide(id, Decision::approve(approver(), None))
            .await
            .expect_err("rejected is terminal");
        assert_eq!(error.to_string(), "cannot approve in state rejected");
        assert_eq!(repo.list_approvals(id).await.expect("approvals").len(), 1);
    }

    #[tokio::test]
    async fn decide_on_missing_application_is_not_found() {
        let repo = SqlApplicationRepository::new(setup_pool().await);
        let error = repo
            .decide(ApplicationId(77), Decision::approve(approver(), None))
            .await
            .expect_err("missing");
        assert!(matches!(
            error,
            RepositoryError::Domain(DomainError::ApplicationNotFound(ApplicationId(77)))
        ));
    }

    #[tokio::test]
    async fn decide_records_actor_ip() {
        let repo = SqlApplicationRepository::new(setup_pool().await);
        let id = repo.create(regular_leave(&["2025-08-15"])).await.expect("create");

        let outcome = repo
            .decide(id, Decision::approve(approver(), None).with_actor_ip("192.0.2.10"))
            .await
            .expect("approve");
        assert_eq!(outcome.record.actor_ip.as_deref(), Some("192.0.2.10"));

        let stored = repo.list_approvals(id).await.expect("approvals");
        assert_eq!(stored[0].actor_ip.as_deref(), Some("192.0.2.10"));
        assert_eq!(stored[0].actor_email, "approver@local");
    }

    #[tokio::test]
    async fn append_approval_numbers_records_per_application() {
        let repo = SqlApplicationRepository::new(setup_pool().await);
        let first = repo.create(regular_leave(&["2025-08-15"])).await.expect("first");
        let second = repo.create(regular_leave(&["2025-08-16"])).await.expect("second");

        let entry = |application_id| NewApprovalRecord {
            application_id,
            actor_email: "head@local".to_string(),
            actor_name: "Head".to_string(),
            actor_role: Role::SectionHead,
            action: ApprovalAction::Approved,
            comment: None,
            actor_ip: None,
            acted_at: Utc::now(),
        };

        assert_eq!(repo.append_approval(entry(first)).await.expect("a1").sequence, 1);
        assert_eq!(repo.append_approval(entry(first)).await.expect("a2").sequence, 2);
        assert_eq!(repo.append_approval(entry(second)).await.expect("b1").sequence, 1);

        let error =
            repo.append_approval(entry(ApplicationId(999))).await.expect_err("unknown id");
        assert!(matches!(
            error,
            RepositoryError::Domain(DomainError::ApplicationNotFound(ApplicationId(999)))
        ));
    }

    #[tokio::test]
    async fn approvals_for_unknown_application_are_empty() {
        let repo = SqlApplicationRepository::new(setup_pool().await);
        assert!(repo.list_approvals(ApplicationId(12345)).await.expect("approvals").is_empty());
    }

    #[tokio::test]
    async fn list_returns_newest_first_and_honours_limit() {
        let repo = SqlApplicationRepository::new(setup_pool().await);
        let mut ids = Vec::new();
        for day in 1..=5 {
            let date = format!("2025-08-{day:02}");
            ids.push(repo.create(regular_leave(&[date.as_str()])).await.expect("create"));
        }

        let listed = repo.list(3).await.expect("list");
        let listed_ids: Vec<ApplicationId> = listed.iter().map(|app| app.id).collect();
        assert_eq!(listed_ids, vec![ids[4], ids[3], ids[2]]);

        let smallest = repo.list(0).await.expect("list with zero limit");
        assert_eq!(smallest.len(), 1);
        assert_eq!(smallest[0].id, ids[4]);
    }

    #[tokio::test]
    async fn list_is_capped_at_max_limit() {
        let repo = SqlApplicationRepository::new(setup_pool().await);
        for _ in 0..205 {
            repo.create(regular_leave(&["2025-12-24"])).await.expect("create");
        }

        let listed = repo.list(u32::MAX).await.expect("list");
        assert_eq!(listed.len(), crate::MAX_LIST_LIMIT as usize);
    }

    #[tokio::test]
    async fn corrupt_status_is_a_decode_error() {
        let pool = setup_pool().await;
        let repo = SqlApplicationRepository::new(pool.clone());
        let id = repo.create(regular_leave(&["2025-08-15"])).await.expect("create");

        sqlx::query("PRAGMA ignore_check_constraints = ON").execute(&pool).await.expect("pragma");
        sqlx::query("UPDATE application SET status = 'archived' WHERE id = ?")
            .bind(id.0)
            .execute(&pool)
            .await
            .expect("corrupt status");

        assert!(matches!(repo.get(id).await, Err(RepositoryError::Decode(_))));
    }
}
