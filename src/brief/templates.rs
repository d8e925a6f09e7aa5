//! Static per-action defaults. Enrichment and personalisation layer on top.

use crate::decision::Tone;
use crate::model::{Action, Channel};

pub struct Template {
    pub channel: Channel,
    pub tone: Tone,
    pub delay_hours: i64,
    pub timing_rationale: &'static str,
    /// (point, priority)
    pub directives: &'static [(&'static str, u8)],
    pub prepare: &'static [&'static str],
    pub avoid: &'static [&'static str],
}

pub fn template(action: Action) -> &'static Template {
    match action {
        Action::WarmFollowUp => &WARM_FOLLOW_UP,
        Action::SchedulingPush => &SCHEDULING_PUSH,
        Action::ScholarshipOutreach => &SCHOLARSHIP_OUTREACH,
        Action::InfoSend => &INFO_SEND,
        Action::GentleNudge => &GENTLE_NUDGE,
        Action::ObjectionAddress => &OBJECTION_ADDRESS,
        Action::WelcomeOnboard => &WELCOME_ONBOARD,
        Action::RetentionCheckIn => &RETENTION_CHECK_IN,
        Action::FamilyEngage => &FAMILY_ENGAGE,
        Action::ChannelSwitch => &CHANNEL_SWITCH,
        Action::Wait => &WAIT,
        Action::Stop => &STOP,
    }
}

static WARM_FOLLOW_UP: Template = Template {
    channel: Channel::Voice,
    tone: Tone::Enthusiastic,
    delay_hours: 4,
    timing_rationale: "Call during evening hours when the parent is likely available and not rushed",
    directives: &[
        ("Ask about the child by name — show you remember them", 1),
        ("Share what a first session looks like and what to expect", 2),
        ("Listen more than talk — let them express what matters to them", 3),
    ],
    prepare: &["upcoming class schedule", "coach bio and credentials"],
    avoid: &[
        "don't hard-sell or push for commitment",
        "don't rush to schedule if they're not ready",
    ],
};

static SCHEDULING_PUSH: Template = Template {
    channel: Channel::Voice,
    tone: Tone::Enthusiastic,
    delay_hours: 1,
    timing_rationale: "Act quickly while scheduling intent is fresh — strike within the hour",
    directives: &[
        ("Reference their expressed interest in scheduling", 1),
        ("Offer 2-3 specific time slots rather than 'when works for you'", 2),
        ("Confirm what the child should bring and what to expect", 3),
    ],
    prepare: &[
        "available trial/visit time slots",
        "location and parking details",
        "what to bring list",
    ],
    avoid: &[
        "don't offer too many options — decision fatigue kills conversion",
        "don't make them feel locked in",
    ],
};

static SCHOLARSHIP_OUTREACH: Template = Template {
    channel: Channel::Sms,
    tone: Tone::Empathetic,
    delay_hours: 2,
    timing_rationale:
        "Send written info so they can review financial options at their own pace before a call",
    directives: &[
        ("Share specific scholarship/financial aid options available", 1),
        ("Include concrete numbers — not vague 'affordable' language", 2),
        ("Mention application process and any deadlines", 3),
    ],
    prepare: &[
        "scholarship application link",
        "payment plan breakdown",
        "financial aid contact",
    ],
    avoid: &[
        "don't lead with full sticker price",
        "avoid implying they can't afford it",
        "no pressure about deadlines",
    ],
};

static INFO_SEND: Template = Template {
    channel: Channel::Sms,
    tone: Tone::Informational,
    delay_hours: 2,
    timing_rationale: "Send requested info promptly while the question is still top of mind",
    directives: &[
        ("Directly answer the specific questions they asked", 1),
        ("Include a clear next step (visit, call, trial class)", 2),
        ("Keep it concise — a wall of text won't get read", 3),
    ],
    prepare: &[
        "program details relevant to their child's age and sport",
        "schedule and pricing overview",
    ],
    avoid: &[
        "don't overload with information they didn't ask for",
        "don't skip their actual question to pitch",
    ],
};

static GENTLE_NUDGE: Template = Template {
    channel: Channel::Sms,
    tone: Tone::Gentle,
    delay_hours: 24,
    timing_rationale: "Wait a full day — give them space to think without feeling pressured",
    directives: &[
        ("Keep it short and friendly — one sentence plus a soft CTA", 1),
        ("Reference something specific from the last conversation to show you listened", 2),
        ("Make it easy to respond (yes/no question, not open-ended)", 3),
    ],
    prepare: &["notes from last interaction"],
    avoid: &[
        "don't repeat what you already said",
        "don't use 'just checking in' — be specific",
        "no guilt language",
    ],
};

static OBJECTION_ADDRESS: Template = Template {
    channel: Channel::Sms,
    tone: Tone::Empathetic,
    delay_hours: 12,
    timing_rationale: "Give time to prepare a thoughtful response rather than a reactive one",
    directives: &[
        ("Acknowledge their concern directly — don't brush it off", 1),
        ("Provide specific facts/evidence that address the concern", 2),
        ("Offer to discuss further if they want — don't assume one message resolves it", 3),
    ],
    prepare: &[
        "safety record and certifications",
        "testimonials from families with similar concerns",
    ],
    avoid: &[
        "don't dismiss their concern",
        "don't say 'but' after acknowledging — use 'and'",
        "don't get defensive",
    ],
};

static WELCOME_ONBOARD: Template = Template {
    channel: Channel::Sms,
    tone: Tone::Enthusiastic,
    delay_hours: 2,
    timing_rationale: "Send welcome info promptly after enrollment to reinforce their decision",
    directives: &[
        ("Congratulate them and express excitement about having the child join", 1),
        ("Share practical first-day details: schedule, location, what to bring", 2),
        ("Introduce the coach or point of contact by name", 3),
    ],
    prepare: &[
        "first session date and time",
        "what to bring checklist",
        "coach name and photo",
        "parent FAQ",
    ],
    avoid: &[
        "don't upsell additional programs yet",
        "don't overwhelm with admin details",
    ],
};

static RETENTION_CHECK_IN: Template = Template {
    channel: Channel::Voice,
    tone: Tone::Warm,
    delay_hours: 48,
    timing_rationale:
        "Don't rush — a retention call feels more genuine with a natural cadence, not reactive",
    directives: &[
        ("Ask how the child is enjoying the program — genuinely listen", 1),
        ("Share a specific positive observation about the child's progress if available", 2),
        ("Ask if there's anything the academy can do better", 3),
    ],
    prepare: &[
        "child's attendance history",
        "any coach feedback",
        "upcoming events or milestones",
    ],
    avoid: &[
        "don't make it feel like a survey",
        "don't mention payment or renewals",
        "don't ignore complaints",
    ],
};

static FAMILY_ENGAGE: Template = Template {
    channel: Channel::Voice,
    tone: Tone::Warm,
    delay_hours: 24,
    timing_rationale: "Suggest a time when the whole family can talk — evenings or weekends",
    directives: &[
        ("Acknowledge that this is a family decision, not just one parent's", 1),
        ("Offer to have the other decision-maker join the next call or visit", 2),
        ("Provide materials they can share with the other parent", 3),
    ],
    prepare: &[
        "program overview PDF suitable for sharing",
        "FAQ for skeptical family members",
    ],
    avoid: &[
        "don't pressure the current contact to 'convince' the other parent",
        "don't bypass the decision-maker",
    ],
};

static CHANNEL_SWITCH: Template = Template {
    channel: Channel::Sms,
    tone: Tone::Informational,
    delay_hours: 12,
    timing_rationale: "Previous channel hasn't worked — try a different one to break through",
    directives: &[
        ("Briefly re-introduce yourself and the academy", 1),
        ("Reference that you've tried to reach them (without guilt)", 2),
        ("Make it easy to respond on this new channel", 3),
    ],
    prepare: &["summary of previous outreach attempts"],
    avoid: &[
        "don't say 'I've been trying to reach you'",
        "don't repeat the exact same pitch",
    ],
};

static WAIT: Template = Template {
    channel: Channel::None,
    tone: Tone::None,
    delay_hours: 48,
    timing_rationale:
        "Strategically give space — sometimes silence is more effective than another touchpoint",
    directives: &[],
    prepare: &[],
    avoid: &[],
};

static STOP: Template = Template {
    channel: Channel::None,
    tone: Tone::None,
    delay_hours: 0,
    timing_rationale:
        "Cease outreach — further contact is unlikely to help and may damage the relationship",
    directives: &[],
    prepare: &[],
    avoid: &[],
};
