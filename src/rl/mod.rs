//! Tabular Q-learning over `"{status}:{bucket}"` states.
//!
//! * `selector`: UCB1 over the filtered action space (read-only on the table).
//! * `reward`: transition rewards and the Bellman update.
//! * `seed`: optional warm-start priors loaded from TOML.

use serde::Deserialize;

pub mod reward;
pub mod seed;
pub mod selector;

pub use reward::{apply_reward, bellman, reward_for, RewardOutcome};
pub use seed::{seed_q_table, QSeed, SeedReport};
pub use selector::{select_action, ucb_pick, Selection};

pub const ALPHA: f64 = 0.1;
pub const GAMMA: f64 = 0.9;
pub const UCB_C: f64 = 1.0;

/// Learning rate, discount and exploration weight.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LearningParams {
    pub alpha: f64,
    pub gamma: f64,
    pub ucb_c: f64,
}

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            alpha: ALPHA,
            gamma: GAMMA,
            ucb_c: UCB_C,
        }
    }
}

impl LearningParams {
    /// Out-of-range values fall back to their defaults.
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        Self {
            alpha: if in_unit(self.alpha) && self.alpha > 0.0 {
                self.alpha
            } else {
                d.alpha
            },
            gamma: if in_unit(self.gamma) { self.gamma } else { d.gamma },
            ucb_c: if self.ucb_c.is_finite() && self.ucb_c >= 0.0 {
                self.ucb_c
            } else {
                d.ucb_c
            },
        }
    }
}
