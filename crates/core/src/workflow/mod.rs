pub mod engine;
pub mod states;

pub use engine::{ApprovalWorkflow, TwoTierApproval, WorkflowDefinition, WorkflowError};
pub use states::TransitionOutcome;
