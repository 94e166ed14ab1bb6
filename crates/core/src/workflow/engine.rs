use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::application::{ApplicationId, ApplicationStatus};
use crate::domain::approval::{ApprovalAction, Decision, NewApprovalRecord};
use crate::domain::user::Role;
use crate::workflow::states::TransitionOutcome;

pub trait WorkflowDefinition {
    fn initial_state(&self) -> ApplicationStatus;
    fn transition(
        &self,
        current: ApplicationStatus,
        action: ApprovalAction,
    ) -> Result<TransitionOutcome, WorkflowError>;
    /// Approver tier that owns a pending stage.
    fn stage_role(&self, status: ApplicationStatus) -> Option<Role>;
}

/// Section head first, then department head. Either tier may reject.
#[derive(Clone, Copy, Debug, Default)]
pub struct TwoTierApproval;

impl WorkflowDefinition for TwoTierApproval {
    fn initial_state(&self) -> ApplicationStatus {
        ApplicationStatus::PendingSection
    }

    fn transition(
        &self,
        current: ApplicationStatus,
        action: ApprovalAction,
    ) -> Result<TransitionOutcome, WorkflowError> {
        transition_two_tier(current, action)
    }

    fn stage_role(&self, status: ApplicationStatus) -> Option<Role> {
        match status {
            ApplicationStatus::PendingSection => Some(Role::SectionHead),
            ApplicationStatus::PendingDepartment => Some(Role::DepartmentHead),
            ApplicationStatus::Approved | ApplicationStatus::Rejected => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApprovalWorkflow<F = TwoTierApproval> {
    flow: F,
}

impl<F> ApprovalWorkflow<F>
where
    F: WorkflowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> ApplicationStatus {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: ApplicationStatus,
        action: ApprovalAction,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.flow.transition(current, action)
    }

    pub fn stage_role(&self, status: ApplicationStatus) -> Option<Role> {
        self.flow.stage_role(status)
    }

    /// Validates `decision` against `current` and builds the audit entry to append.
    ///
    /// The record carries the actor's own role when known, otherwise the role owning the stage.
    pub fn decide(
        &self,
        application_id: ApplicationId,
        current: ApplicationStatus,
        decision: &Decision,
        acted_at: DateTime<Utc>,
    ) -> Result<(TransitionOutcome, NewApprovalRecord), WorkflowError> {
        let outcome = self.apply(current, decision.action)?;
        let actor_role = decision
            .actor
            .role
            .or_else(|| self.stage_role(current))
            .unwrap_or(Role::SectionHead);

        let record = NewApprovalRecord {
            application_id,
            actor_email: decision.actor.email.clone(),
            actor_name: decision.actor.name.clone(),
            actor_role,
            action: decision.action,
            comment: decision.comment.clone(),
            actor_ip: decision.actor_ip.clone(),
            acted_at,
        };

        Ok((outcome, record))
    }
}

impl Default for ApprovalWorkflow<TwoTierApproval> {
    fn default() -> Self {
        Self::new(TwoTierApproval)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("cannot {} in state {state}", .action.verb())]
    InvalidTransition { state: ApplicationStatus, action: ApprovalAction },
}

fn transition_two_tier(
    current: ApplicationStatus,
    action: ApprovalAction,
) -> Result<TransitionOutcome, WorkflowError> {
    use ApplicationStatus::{Approved, PendingDepartment, PendingSection, Rejected};

    let to = match (current, action) {
        (PendingSection, ApprovalAction::Approved) => PendingDepartment,
        (PendingDepartment, ApprovalAction::Approved) => Approved,
        (PendingSection, ApprovalAction::Rejected)
        | (PendingDepartment, ApprovalAction::Rejected) => Rejected,
        (Approved, _) | (Rejected, _) => {
            return Err(WorkflowError::InvalidTransition { state: current, action });
        }
    };

    Ok(TransitionOutcome { from: current, to, action })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::application::{ApplicationId, ApplicationStatus};
    use crate::domain::approval::{Actor, ApprovalAction, Decision};
    use crate::domain::user::Role;
    use crate::workflow::engine::{
        ApprovalWorkflow, TwoTierApproval, WorkflowDefinition, WorkflowError,
    };

    #[test]
    fn two_approvals_reach_approved() {
        let workflow = ApprovalWorkflow::default();
        let mut state = workflow.initial_state();
        assert_eq!(state, ApplicationStatus::PendingSection);

        state = workflow.apply(state, ApprovalAction::Approved).expect("section approval").to;
        assert_eq!(state, ApplicationStatus::PendingDepartment);

        let last = workflow.apply(state, ApprovalAction::Approved).expect("department approval");
        assert_eq!(last.to, ApplicationStatus::Approved);
        assert!(last.is_final());

        let error =
            workflow.apply(last.to, ApprovalAction::Approved).expect_err("approved is terminal");
        assert_eq!(
            error,
            WorkflowError::InvalidTransition {
                state: ApplicationStatus::Approved,
                action: ApprovalAction::Approved
            }
        );
    }

    #[test]
    fn either_pending_stage_can_reject() {
        let workflow = ApprovalWorkflow::new(TwoTierApproval);
        for state in [ApplicationStatus::PendingSection, ApplicationStatus::PendingDepartment] {
            let outcome = workflow.apply(state, ApprovalAction::Rejected).expect("reject");
            assert_eq!(outcome.from, state);
            assert_eq!(outcome.to, ApplicationStatus::Rejected);
        }
    }

    #[test]
    fn terminal_states_refuse_every_action() {
        let workflow = ApprovalWorkflow::default();
        for state in [ApplicationStatus::Approved, ApplicationStatus::Rejected] {
            for action in [ApprovalAction::Approved, ApprovalAction::Rejected] {
                assert!(matches!(
                    workflow.apply(state, action),
                    Err(WorkflowError::InvalidTransition { .. })
                ));
            }
        }
    }

    #[test]
    fn transition_errors_name_the_offending_state() {
        let workflow = ApprovalWorkflow::default();
        let approve = workflow
            .apply(ApplicationStatus::Rejected, ApprovalAction::Approved)
            .expect_err("rejected cannot be approved");
        assert_eq!(approve.to_string(), "cannot approve in state rejected");

        let reject = workflow
            .apply(ApplicationStatus::Approved, ApprovalAction::Rejected)
            .expect_err("approved cannot be rejected");
        assert_eq!(reject.to_string(), "cannot reject in state approved");
    }

    #[test]
    fn every_outcome_stays_within_known_states() {
        let workflow = ApprovalWorkflow::default();
        for state in ApplicationStatus::ALL {
            for action in [ApprovalAction::Approved, ApprovalAction::Rejected] {
                if let Ok(outcome) = workflow.apply(state, action) {
                    assert!(ApplicationStatus::ALL.contains(&outcome.to));
                    assert_ne!(outcome.to, ApplicationStatus::PendingSection);
                }
            }
        }
    }

    #[test]
    fn stage_roles_follow_the_pending_tier() {
        assert_eq!(
            TwoTierApproval.stage_role(ApplicationStatus::PendingSection),
            Some(Role::SectionHead)
        );
        assert_eq!(
            TwoTierApproval.stage_role(ApplicationStatus::PendingDepartment),
            Some(Role::DepartmentHead)
        );
        assert_eq!(TwoTierApproval.stage_role(ApplicationStatus::Approved), None);
    }

    #[test]
    fn decide_builds_audit_entry_with_stage_role_fallback() {
        let workflow = ApprovalWorkflow::default();
        let acted_at = Utc::now();
        let decision =
            Decision::approve(Actor::demo(), Some("ok".to_string())).with_actor_ip("10.0.0.7");

        let (outcome, record) = workflow
            .decide(ApplicationId(7), ApplicationStatus::PendingDepartment, &decision, acted_at)
            .expect("department approval");

        assert_eq!(outcome.to, ApplicationStatus::Approved);
        assert_eq!(record.application_id, ApplicationId(7));
        assert_eq!(record.actor_role, Role::DepartmentHead);
        assert_eq!(record.action, ApprovalAction::Approved);
        assert_eq!(record.comment.as_deref(), Some("ok"));
        assert_eq!(record.actor_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(record.acted_at, acted_at);
    }

    #[test]
    fn decide_keeps_explicit_actor_role() {
        let workflow = ApprovalWorkflow::default();
        let actor = Actor {
            email: "head@local".to_string(),
            name: "Dept Head".to_string(),
            role: Some(Role::DepartmentHead),
        };

        let (_, record) = workflow
            .decide(
                ApplicationId(1),
                ApplicationStatus::PendingSection,
                &Decision::reject(actor, None),
                Utc::now(),
            )
            .expect("reject from section stage");

        assert_eq!(record.actor_role, Role::DepartmentHead);
        assert_eq!(record.action, ApprovalAction::Rejected);
    }
}
