//! State Encoder: `"{status}:{bucket}"`.
//!
//! The bucket is the first rule that matches, in table order. Deterministic and
//! pure; the set of possible keys is status count × bucket count.

use super::PolicyInputs;
use crate::model::{ContextBucket, Intent, Sentiment};

type Rule = fn(&PolicyInputs) -> bool;

/// Ordered (bucket, predicate) table. Neutral is the fallback, not a rule.
const RULES: &[(ContextBucket, Rule)] = &[
    (ContextBucket::Unreached, |p| {
        p.last_interaction_status.is_some_and(|s| s.is_unreached())
    }),
    (ContextBucket::Negative, |p| {
        p.last_detected_intent == Some(Intent::Declining)
            && p.last_sentiment == Some(Sentiment::Negative)
    }),
    (ContextBucket::SchedulingIntent, |p| {
        p.last_detected_intent == Some(Intent::Scheduling)
    }),
    (ContextBucket::PositiveEngagement, |p| {
        p.last_detected_intent == Some(Intent::Interested)
            && p.last_sentiment == Some(Sentiment::Positive)
    }),
    (ContextBucket::FinancialConcern, |p| {
        p.financial_concern_level.is_elevated()
    }),
    (ContextBucket::HasObjections, |p| p.has_unaddressed_objections),
    (ContextBucket::FamilyContext, |p| p.has_family_signal()),
    (ContextBucket::Considering, |p| {
        p.last_detected_intent == Some(Intent::Considering)
    }),
    (ContextBucket::NovelSignal, |p| p.has_urgent_additional_signal()),
];

pub fn context_bucket(inputs: &PolicyInputs) -> ContextBucket {
    RULES
        .iter()
        .find(|(_, matches)| matches(inputs))
        .map(|(bucket, _)| *bucket)
        .unwrap_or(ContextBucket::Neutral)
}

pub fn encode_state(inputs: &PolicyInputs) -> String {
    format!("{}:{}", inputs.lead_status, context_bucket(inputs))
}
