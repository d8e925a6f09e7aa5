//! Warm-start priors for the Q-table.
//!
//! A TOML file maps state keys to `{action = value}` tables:
//!
//! ```toml
//! [priors."new:neutral"]
//! warm_follow_up = 0.5
//! info_send = 0.3
//! ```
//!
//! Seeding only fills entries nobody has touched yet; learned values are never
//! overwritten, so it is safe to run on every start.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::model::{Action, ContextBucket, LeadStatus, QEntry};
use crate::store::{Store, StoreResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QSeed {
    pub priors: BTreeMap<String, BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    /// Already present (learned or seeded earlier).
    pub skipped: usize,
    /// Unknown state key, unknown action name or non-finite value.
    pub rejected: usize,
}

impl QSeed {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing q-table seed")
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading q-table seed from {}", path.display()))?;
        Self::from_toml_str(&data)
    }
}

/// `"{status}:{bucket}"` with both halves in vocabulary.
fn valid_state(key: &str) -> bool {
    key.split_once(':').is_some_and(|(status, bucket)| {
        LeadStatus::parse(status).is_some() && ContextBucket::parse(bucket).is_some()
    })
}

pub fn seed_q_table(store: &dyn Store, seed: &QSeed, now: DateTime<Utc>) -> StoreResult<SeedReport> {
    let mut report = SeedReport::default();

    for (state, actions) in &seed.priors {
        if !valid_state(state) {
            warn!(target: "rl", state = %state, "seed: unknown state key");
            report.rejected += actions.len();
            continue;
        }
        for (name, value) in actions {
            let Some(action) = Action::parse(name) else {
                warn!(target: "rl", state = %state, action = %name, "seed: unknown action");
                report.rejected += 1;
                continue;
            };
            if !value.is_finite() {
                report.rejected += 1;
                continue;
            }

            let (before, _) = store.update_q_entry(state, action, &mut |e: &QEntry| {
                if e.updated_at.is_none() && e.visit_count == 0 {
                    QEntry {
                        value: *value,
                        updated_at: Some(now),
                        ..e.clone()
                    }
                } else {
                    e.clone()
                }
            })?;
            if before.updated_at.is_none() && before.visit_count == 0 {
                report.created += 1;
            } else {
                report.skipped += 1;
            }
        }
    }

    info!(
        target: "rl",
        created = report.created,
        skipped = report.skipped,
        rejected = report.rejected,
        "q-table seeded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const SEED: &str = r#"
        [priors."contacted:unreached"]
        channel_switch = 0.4
        gentle_nudge = 0.3
        teleport = 0.9

        [priors."limbo:neutral"]
        wait = 0.1
    "#;

    #[test]
    fn seeds_valid_rows_and_rejects_the_rest() {
        let store = MemoryStore::new();
        let seed = QSeed::from_toml_str(SEED).unwrap();
        let report = seed_q_table(&store, &seed, Utc::now()).unwrap();
        assert_eq!(
            report,
            SeedReport {
                created: 2,
                skipped: 0,
                rejected: 2
            }
        );
        let e = store
            .q_entry("contacted:unreached", Action::ChannelSwitch)
            .unwrap()
            .unwrap();
        assert_eq!(e.value, 0.4);
        assert_eq!(e.visit_count, 0);
        assert!(store.q_entries_for_state("limbo:neutral").unwrap().is_empty());
    }

    #[test]
    fn never_overwrites_learned_values() {
        let store = MemoryStore::new();
        store
            .update_q_entry("contacted:unreached", Action::GentleNudge, &mut |e: &QEntry| {
                QEntry {
                    value: -0.2,
                    visit_count: 3,
                    updated_at: Some(Utc::now()),
                    ..e.clone()
                }
            })
            .unwrap();

        let seed = QSeed::from_toml_str(SEED).unwrap();
        let first = seed_q_table(&store, &seed, Utc::now()).unwrap();
        assert_eq!((first.created, first.skipped), (1, 1));
        let again = seed_q_table(&store, &seed, Utc::now()).unwrap();
        assert_eq!((again.created, again.skipped), (0, 2));

        let e = store
            .q_entry("contacted:unreached", Action::GentleNudge)
            .unwrap()
            .unwrap();
        assert_eq!(e.value, -0.2);
        assert_eq!(e.visit_count, 3);
    }

    #[test]
    fn seeded_prior_breaks_unvisited_ties() {
        let store = MemoryStore::new();
        let seed = QSeed::from_toml_str(SEED).unwrap();
        seed_q_table(&store, &seed, Utc::now()).unwrap();
        let sel = crate::rl::select_action(
            &store,
            "contacted:unreached",
            &[Action::WarmFollowUp, Action::GentleNudge, Action::ChannelSwitch],
            &crate::rl::LearningParams::default(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(sel.action, Action::ChannelSwitch);
        assert_eq!(sel.q_value, 0.4);
    }
}
