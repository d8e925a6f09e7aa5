//! UCB1 selection over the allowed actions of one state.
//!
//! score = Q + bonus, bonus = 2c for an unvisited action, otherwise
//! c * sqrt(ln(total + 1) / visits), total summed over the candidates only.
//! Ties resolve to the earliest candidate. Never writes to the table.

use crate::model::{Action, QEntry};
use crate::store::{Store, StoreResult};

use super::LearningParams;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub action: Action,
    /// Raw Q of the chosen action (no exploration bonus).
    pub q_value: f64,
    pub score: f64,
}

pub fn exploration_bonus(visits: u32, total_visits: u64, c: f64) -> f64 {
    if visits == 0 {
        2.0 * c
    } else {
        c * (((total_visits + 1) as f64).ln() / visits as f64).sqrt()
    }
}

/// Pure UCB pick. `entries` must be in candidate order; `None` when empty.
pub fn ucb_pick(entries: &[QEntry], c: f64) -> Option<Selection> {
    let total: u64 = entries.iter().map(|e| e.visit_count as u64).sum();
    let mut best: Option<Selection> = None;
    for e in entries {
        let score = e.value + exploration_bonus(e.visit_count, total, c);
        if best.map_or(true, |b| score > b.score) {
            best = Some(Selection {
                action: e.action,
                q_value: e.value,
                score,
            });
        }
    }
    best
}

/// Loads (or zero-initialises, in memory only) the entry for each candidate and picks.
pub fn select_action(
    store: &dyn Store,
    state: &str,
    candidates: &[Action],
    params: &LearningParams,
) -> StoreResult<Option<Selection>> {
    let recorded = store.q_entries_for_state(state)?;
    let entries: Vec<QEntry> = candidates
        .iter()
        .map(|a| {
            recorded
                .iter()
                .find(|e| e.action == *a)
                .cloned()
                .unwrap_or_else(|| QEntry::empty(state, *a))
        })
        .collect();
    Ok(ucb_pick(&entries, params.ucb_c))
}
