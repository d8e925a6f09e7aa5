//! Compliance Override. Runs before anything learned; a match bypasses selection
//! entirely and never touches the Q-table.

use super::PolicyInputs;
use crate::model::{Action, InteractionStatus, LeadStatus};

/// Why outreach must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceStop {
    Declined,
    OptedOut,
}

impl ComplianceStop {
    pub fn action(self) -> Action {
        Action::Stop
    }

    pub fn reason(self) -> &'static str {
        match self {
            ComplianceStop::Declined => "lead declined",
            ComplianceStop::OptedOut => "lead opted out",
        }
    }
}

const CHECKS: &[(ComplianceStop, fn(&PolicyInputs) -> bool)] = &[
    (ComplianceStop::Declined, |p| p.lead_status == LeadStatus::Declined),
    (ComplianceStop::OptedOut, |p| {
        p.last_interaction_status == Some(InteractionStatus::OptedOut)
    }),
];

/// First matching rule, if any.
pub fn compliance_override(inputs: &PolicyInputs) -> Option<ComplianceStop> {
    CHECKS
        .iter()
        .find(|(_, hit)| hit(inputs))
        .map(|(stop, _)| *stop)
}
