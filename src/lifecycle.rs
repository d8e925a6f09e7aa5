//! Lead status derivation from the detected intent of a completed interaction.
//!
//! Acquisition statuses never regress; retention statuses are only reachable from
//! enrolled or other retention statuses.

use crate::model::{Intent, InteractionStatus, LeadStatus};

pub fn derive_status(
    current: LeadStatus,
    intent: Intent,
    interaction_status: InteractionStatus,
) -> LeadStatus {
    if interaction_status == InteractionStatus::OptedOut {
        return LeadStatus::Declined;
    }
    if current.is_retention() {
        return derive_retention(current, intent);
    }

    let hold = if current == LeadStatus::New {
        LeadStatus::Contacted
    } else {
        current
    };
    let proposed = match intent {
        Intent::Interested | Intent::Considering => LeadStatus::Interested,
        Intent::Scheduling | Intent::Attending => LeadStatus::Trial,
        Intent::RequestingInfo => LeadStatus::Contacted,
        Intent::Declining => LeadStatus::Declined,
        Intent::Objecting | Intent::NoResponse | Intent::Unclear => hold,
    };

    if proposed.is_terminal() {
        return proposed;
    }
    let current_rank = current.funnel_rank().unwrap_or(0);
    let proposed_rank = proposed.funnel_rank().unwrap_or(0);
    if proposed_rank >= current_rank {
        proposed
    } else {
        current
    }
}

fn derive_retention(current: LeadStatus, intent: Intent) -> LeadStatus {
    match intent {
        Intent::Declining => LeadStatus::Inactive,
        Intent::Interested | Intent::Scheduling | Intent::Attending => LeadStatus::Active,
        Intent::Considering | Intent::RequestingInfo if current == LeadStatus::Inactive => {
            LeadStatus::AtRisk
        }
        Intent::Objecting if current == LeadStatus::Active => LeadStatus::AtRisk,
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InteractionStatus::*;
    use LeadStatus::*;

    #[test]
    fn opt_out_always_declines() {
        for s in LeadStatus::ALL {
            assert_eq!(derive_status(*s, Intent::Interested, OptedOut), Declined);
        }
    }

    #[test]
    fn first_touch_moves_new_to_contacted() {
        assert_eq!(derive_status(New, Intent::NoResponse, NoAnswer), Contacted);
        assert_eq!(derive_status(New, Intent::Unclear, Completed), Contacted);
        assert_eq!(derive_status(New, Intent::Objecting, Completed), Contacted);
    }

    #[test]
    fn funnel_advances_but_never_regresses() {
        assert_eq!(derive_status(Contacted, Intent::Considering, Completed), Interested);
        assert_eq!(derive_status(Interested, Intent::Scheduling, Completed), Trial);
        assert_eq!(derive_status(Trial, Intent::RequestingInfo, Completed), Trial);
        assert_eq!(derive_status(Trial, Intent::Interested, Completed), Trial);
    }

    #[test]
    fn declining_in_acquisition_is_terminal() {
        assert_eq!(derive_status(Trial, Intent::Declining, Completed), Declined);
    }

    #[test]
    fn retention_transitions() {
        assert_eq!(derive_status(Enrolled, Intent::Attending, Completed), Active);
        assert_eq!(derive_status(Active, Intent::Objecting, Completed), AtRisk);
        assert_eq!(derive_status(AtRisk, Intent::Objecting, Completed), AtRisk);
        assert_eq!(derive_status(Inactive, Intent::Considering, Completed), AtRisk);
        assert_eq!(derive_status(Active, Intent::Considering, Completed), Active);
        assert_eq!(derive_status(AtRisk, Intent::Interested, Completed), Active);
        assert_eq!(derive_status(Active, Intent::Declining, Completed), Inactive);
        assert_eq!(derive_status(Active, Intent::NoResponse, NoAnswer), Active);
    }

    #[test]
    fn terminal_statuses_stay_put_on_neutral_intent() {
        assert_eq!(derive_status(Declined, Intent::Unclear, Completed), Declined);
        assert_eq!(derive_status(Unresponsive, Intent::NoResponse, NoAnswer), Unresponsive);
    }
}
