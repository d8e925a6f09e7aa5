//! Signal-driven additions to a template brief. Never applied to wait/stop.

use crate::decision::{ActionBrief, Directive};
use crate::model::{Action, Urgency};
use crate::policy::PolicyInputs;

pub fn enrich(brief: &mut ActionBrief, p: &PolicyInputs) {
    let action = brief.semantic_action;
    if action.is_passive() {
        return;
    }

    if p.financial_concern_level.is_elevated() && action != Action::ScholarshipOutreach {
        brief.content_directives.push(
            Directive::new(
                "Be mindful of cost — if pricing comes up, mention financial aid options",
                5,
            )
            .signal("financial_concern"),
        );
        brief
            .things_to_avoid
            .push("don't casually mention fees or premium options".to_string());
    }

    if p.has_siblings {
        brief.content_directives.push(
            Directive::new(
                "If conversation goes well, naturally mention sibling/family programs",
                6,
            )
            .signal("sibling_opportunity"),
        );
        brief.things_to_avoid.push(
            "don't lead with the upsell — mention siblings only if it flows naturally".to_string(),
        );
    }

    if p.has_pending_decision_makers && action != Action::FamilyEngage {
        brief.content_directives.push(
            Directive::new(
                "Ask if the other decision-maker has any questions — offer to include them",
                5,
            )
            .signal("pending_decision_maker"),
        );
    }

    if p.has_scheduling_constraints {
        brief.content_directives.push(
            Directive::new(
                "Reference their scheduling constraints — show you remember and have worked around them",
                4,
            )
            .signal("scheduling_constraints"),
        );
        brief
            .info_to_prepare
            .push("alternative schedule options that fit their constraints".to_string());
    }

    if p.has_unaddressed_objections && action != Action::ObjectionAddress {
        let topics = if p.objection_topics.is_empty() {
            "unspecified".to_string()
        } else {
            p.objection_topics.join(", ")
        };
        brief.content_directives.push(
            Directive::new(format!("Be ready to address concerns about: {topics}"), 5)
                .signal("unaddressed_objection"),
        );
    }

    for s in &p.additional_signals {
        if s.urgency < Urgency::Moderate {
            continue;
        }
        let point = s.suggestion.clone().unwrap_or_else(|| {
            format!("Address '{}' signal detected in previous conversation", s.label)
        });
        let priority = if s.urgency == Urgency::High { 4 } else { 6 };
        brief
            .content_directives
            .push(Directive::new(point, priority).signal(s.label.clone()));
    }
}
