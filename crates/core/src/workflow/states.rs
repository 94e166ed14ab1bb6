use serde::{Deserialize, Serialize};

use crate::domain::application::ApplicationStatus;
use crate::domain::approval::ApprovalAction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub action: ApprovalAction,
}

impl TransitionOutcome {
    pub fn is_final(&self) -> bool {
        self.to.is_terminal()
    }
}
