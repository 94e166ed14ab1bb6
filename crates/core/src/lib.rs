pub mod config;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use domain::application::{
    Applicant, Application, ApplicationId, ApplicationStatus, LeaveKind, NewApplication,
};
pub use domain::approval::{
    Actor, ApprovalAction, ApprovalRecord, Decision, DecisionOutcome, NewApprovalRecord,
};
pub use domain::user::{Role, UserAccount};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use workflow::{ApprovalWorkflow, TransitionOutcome, TwoTierApproval, WorkflowError};
