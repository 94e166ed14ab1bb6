//! Both store implementations must behave identically behind the trait.

use std::sync::Arc;

use wfh_core::domain::application::{Applicant, ApplicationStatus, LeaveKind, NewApplication};
use wfh_core::domain::approval::{Actor, ApprovalAction, Decision, DecisionOutcome};
use wfh_core::errors::DomainError;
use wfh_db::{
    connect_with_settings, migrations, ApplicationRepository, InMemoryApplicationRepository,
    RepositoryError, SqlApplicationRepository,
};

const RACERS: usize = 8;

async fn stores() -> Vec<(&'static str, Arc<dyn ApplicationRepository>)> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let sqlite: Arc<dyn ApplicationRepository> = Arc::new(SqlApplicationRepository::new(pool));
    let memory: Arc<dyn ApplicationRepository> = Arc::new(InMemoryApplicationRepository::new());
    vec![("sqlite", sqlite), ("memory", memory)]
}

fn august_leave() -> NewApplication {
    NewApplication {
        applicant: Applicant::demo(),
        dates: vec!["2025-08-15".to_string()],
        kind: LeaveKind::Regular,
        reason: None,
    }
}

#[tokio::test]
async fn approve_approve_then_reject_scenario() {
    for (name, store) in stores().await {
        let id = store.create(august_leave()).await.expect("create");
        let created = store.get(id).await.expect("get").expect("exists");
        assert_eq!(created.status, ApplicationStatus::PendingSection, "{name}");

        let first = store.decide(id, Decision::approve(Actor::demo(), None)).await.expect("1st");
        assert_eq!(first.status, ApplicationStatus::PendingDepartment, "{name}");
        let trail = store.list_approvals(id).await.expect("trail");
        assert_eq!(trail.len(), 1, "{name}");
        assert_eq!((trail[0].sequence, trail[0].action), (1, ApprovalAction::Approved), "{name}");

        let second = store.decide(id, Decision::approve(Actor::demo(), None)).await.expect("2nd");
        assert_eq!(second.status, ApplicationStatus::Approved, "{name}");
        assert_eq!(store.list_approvals(id).await.expect("trail").len(), 2, "{name}");

        let refused = store
            .decide(id, Decision::reject(Actor::demo(), None))
            .await
            .expect_err("terminal state");
        assert_eq!(refused.to_string(), "cannot reject in state approved", "{name}");
        assert_eq!(store.list_approvals(id).await.expect("trail").len(), 2, "{name}");
    }
}

#[tokio::test]
async fn reject_then_approve_scenario() {
    for (name, store) in stores().await {
        let id = store.create(august_leave()).await.expect("create");

        let rejected =
            store.decide(id, Decision::reject(Actor::demo(), None)).await.expect("reject");
        assert_eq!(rejected.status, ApplicationStatus::Rejected, "{name}");
        assert_eq!(rejected.record.sequence, 1, "{name}");
        assert_eq!(rejected.record.action, ApprovalAction::Rejected, "{name}");

        let refused = store
            .decide(id, Decision::approve(Actor::demo(), None))
            .await
            .expect_err("terminal state");
        assert_eq!(refused.to_string(), "cannot approve in state rejected", "{name}");
    }
}

#[tokio::test]
async fn sequences_are_gapless_and_ordered() {
    for (name, store) in stores().await {
        let first = store.create(august_leave()).await.expect("first");
        let second = store.create(august_leave()).await.expect("second");

        store.decide(first, Decision::approve(Actor::demo(), None)).await.expect("a1");
        store.decide(second, Decision::approve(Actor::demo(), None)).await.expect("b1");
        store.decide(first, Decision::approve(Actor::demo(), None)).await.expect("a2");

        for id in [first, second] {
            let trail = store.list_approvals(id).await.expect("trail");
            let sequences: Vec<u32> = trail.iter().map(|record| record.sequence).collect();
            let expected: Vec<u32> = (1..=trail.len() as u32).collect();
            assert_eq!(sequences, expected, "{name}");
            assert!(trail.iter().all(|record| record.application_id == id), "{name}");
        }
    }
}

/// A file-backed pool so racing decisions run on separate sqlite connections.
async fn shared_sqlite_store(dir: &tempfile::TempDir) -> Arc<SqlApplicationRepository> {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
    let pool = connect_with_settings(&url, RACERS as u32, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    Arc::new(SqlApplicationRepository::new(pool))
}

async fn race(
    store: &Arc<SqlApplicationRepository>,
    id: wfh_core::domain::application::ApplicationId,
    decision: fn() -> Decision,
) -> Vec<Result<DecisionOutcome, RepositoryError>> {
    let mut handles = Vec::with_capacity(RACERS);
    for _ in 0..RACERS {
        let store = Arc::clone(store);
        handles.push(tokio::spawn(async move { store.decide(id, decision()).await }));
    }

    let mut results = Vec::with_capacity(RACERS);
    for handle in handles {
        results.push(handle.await.expect("decision task"));
    }
    results
}

fn assert_lost_race(result: &Result<DecisionOutcome, RepositoryError>) {
    assert!(
        matches!(
            result,
            Err(RepositoryError::Domain(
                DomainError::ConcurrentModification(_) | DomainError::Workflow(_)
            ))
        ),
        "unexpected outcome for a losing decision: {result:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rejections_on_sqlite_record_exactly_one_decision() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = shared_sqlite_store(&dir).await;

    for _ in 0..5 {
        let id = store.create(august_leave()).await.expect("create");
        let results = race(&store, id, || Decision::reject(Actor::demo(), None)).await;

        let successes = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(successes, 1, "exactly one rejection may win: {results:?}");
        results.iter().filter(|result| result.is_err()).for_each(assert_lost_race);

        let trail = store.list_approvals(id).await.expect("trail");
        assert_eq!(trail.len(), 1);
        assert_eq!((trail[0].sequence, trail[0].action), (1, ApprovalAction::Rejected));
        let stored = store.get(id).await.expect("get").expect("exists");
        assert_eq!(stored.status, ApplicationStatus::Rejected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_on_sqlite_never_double_advance_a_stage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = shared_sqlite_store(&dir).await;

    for _ in 0..5 {
        let id = store.create(august_leave()).await.expect("create");
        let results = race(&store, id, || Decision::approve(Actor::demo(), None)).await;

        let mut winners: Vec<&DecisionOutcome> =
            results.iter().filter_map(|result| result.as_ref().ok()).collect();
        results.iter().filter(|result| result.is_err()).for_each(assert_lost_race);

        // A racer that reads after the first commit may legitimately take the second stage,
        // but each stage is won at most once.
        winners.sort_by_key(|outcome| outcome.record.sequence);
        let from: Vec<ApplicationStatus> = winners.iter().map(|outcome| outcome.from).collect();
        let expected_from =
            [ApplicationStatus::PendingSection, ApplicationStatus::PendingDepartment];
        assert!(!winners.is_empty(), "one approval must win the first stage");
        assert_eq!(from, expected_from[..winners.len()].to_vec());

        let trail = store.list_approvals(id).await.expect("trail");
        assert_eq!(trail.len(), winners.len());
        let sequences: Vec<u32> = trail.iter().map(|record| record.sequence).collect();
        assert_eq!(sequences, (1..=winners.len() as u32).collect::<Vec<_>>());

        let stored = store.get(id).await.expect("get").expect("exists");
        let expected_status = match winners.len() {
            1 => ApplicationStatus::PendingDepartment,
            _ => ApplicationStatus::Approved,
        };
        assert_eq!(stored.status, expected_status);
    }
}
