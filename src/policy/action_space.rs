//! Action-Space Filter: removes actions that cannot apply to this lead.
//! Output keeps catalog order and is never empty.

use super::PolicyInputs;
use crate::model::{Action, ConcernLevel, LeadStatus};

/// Minimum touches before the policy may give up on a lead.
pub const MIN_INTERACTIONS_FOR_STOP: u32 = 3;

/// Used when every action was filtered out.
pub const FALLBACK_ACTIONS: [Action; 2] = [Action::Wait, Action::GentleNudge];

fn allowed(action: Action, p: &PolicyInputs) -> bool {
    match action {
        Action::WelcomeOnboard => p.lead_status == LeadStatus::Enrolled,
        Action::RetentionCheckIn => {
            matches!(
                p.lead_status,
                LeadStatus::Active | LeadStatus::AtRisk | LeadStatus::Inactive
            ) && p.has_contact_method()
        }
        Action::FamilyEngage => p.has_family_signal(),
        Action::ScholarshipOutreach => p.financial_concern_level != ConcernLevel::None,
        Action::ObjectionAddress => p.has_unaddressed_objections,
        Action::SchedulingPush | Action::WarmFollowUp => p.has_contact_method(),
        Action::Stop => p.total_interactions >= MIN_INTERACTIONS_FOR_STOP,
        _ => true,
    }
}

pub fn filter_actions(inputs: &PolicyInputs) -> Vec<Action> {
    let actions: Vec<Action> = Action::CATALOG
        .iter()
        .copied()
        .filter(|a| allowed(*a, inputs))
        .collect();
    if actions.is_empty() {
        FALLBACK_ACTIONS.to_vec()
    } else {
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reachable(status: LeadStatus) -> PolicyInputs {
        let mut p = PolicyInputs::for_status(status);
        p.has_phone = true;
        p
    }

    #[test]
    fn new_lead_with_phone() {
        let acts = filter_actions(&reachable(LeadStatus::New));
        assert_eq!(
            acts,
            vec![
                Action::WarmFollowUp,
                Action::SchedulingPush,
                Action::InfoSend,
                Action::GentleNudge,
                Action::ChannelSwitch,
                Action::Wait,
            ]
        );
    }

    #[test]
    fn welcome_only_when_enrolled() {
        assert!(filter_actions(&reachable(LeadStatus::Enrolled)).contains(&Action::WelcomeOnboard));
        assert!(!filter_actions(&reachable(LeadStatus::Active)).contains(&Action::WelcomeOnboard));
    }

    #[test]
    fn retention_only_for_retention_statuses() {
        for s in [LeadStatus::Active, LeadStatus::AtRisk, LeadStatus::Inactive] {
            assert!(filter_actions(&reachable(s)).contains(&Action::RetentionCheckIn));
        }
        assert!(!filter_actions(&reachable(LeadStatus::Enrolled)).contains(&Action::RetentionCheckIn));
    }

    #[test]
    fn signal_gated_actions() {
        let mut p = reachable(LeadStatus::Interested);
        let acts = filter_actions(&p);
        assert!(!acts.contains(&Action::FamilyEngage));
        assert!(!acts.contains(&Action::ScholarshipOutreach));
        assert!(!acts.contains(&Action::ObjectionAddress));

        p.has_siblings = true;
        p.financial_concern_level = ConcernLevel::Low;
        p.has_unaddressed_objections = true;
        let acts = filter_actions(&p);
        assert!(acts.contains(&Action::FamilyEngage));
        assert!(acts.contains(&Action::ScholarshipOutreach));
        assert!(acts.contains(&Action::ObjectionAddress));
    }

    #[test]
    fn no_contact_method_drops_outreach() {
        let p = PolicyInputs::for_status(LeadStatus::Active);
        let acts = filter_actions(&p);
        assert!(!acts.contains(&Action::SchedulingPush));
        assert!(!acts.contains(&Action::WarmFollowUp));
        assert!(!acts.contains(&Action::RetentionCheckIn));
        assert!(acts.contains(&Action::GentleNudge));
    }

    #[test]
    fn stop_needs_three_touches() {
        let mut p = reachable(LeadStatus::Contacted);
        p.total_interactions = 2;
        assert!(!filter_actions(&p).contains(&Action::Stop));
        p.total_interactions = 3;
        assert_eq!(filter_actions(&p).last(), Some(&Action::Stop));
    }

    #[test]
    fn never_empty() {
        for s in LeadStatus::ALL {
            let mut p = PolicyInputs::for_status(*s);
            p.total_interactions = 10;
            assert!(!filter_actions(&p).is_empty());
        }
    }
}
