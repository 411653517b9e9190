//! Battle core: sample combatants, resolve the outcome, commit growth and
//! history atomically.

pub mod history;
pub mod ids;
pub mod resolver;
pub mod rng;
pub mod sampler;
pub mod sharding;
pub mod transaction;

pub use history::{list as list_history, HISTORY_LIMIT};
pub use ids::new_row_id;
pub use resolver::{resolve, Outcome, Tuning};
pub use rng::Rng;
pub use sampler::sample;
pub use sharding::{entry_shard_for, NUM_SHARDS};
pub use transaction::{commit, MAX_COMMIT_ATTEMPTS};

use crate::error::Result;
use crate::store::{Database, Deadline};

/// What one battle request produced. `history_id` is present exactly when a
/// history row was committed, i.e. on a win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleReport {
    pub won: bool,
    pub history_id: Option<i64>,
}

/// Full battle flow for one request: sample at one snapshot, resolve once,
/// then commit. A loss returns without touching the store; history is
/// written only on a win, and the read path shares that policy.
pub fn execute_battle(
    db: &Database,
    tuning: &Tuning,
    character_id: i64,
    deadline: &Deadline,
    rng: &mut Rng,
) -> Result<BattleReport> {
    let (character, opponent) = sampler::sample(db, character_id, deadline, rng)?;
    let outcome = resolver::resolve(&character, &opponent, tuning, rng);
    if !outcome.won {
        return Ok(BattleReport {
            won: false,
            history_id: None,
        });
    }
    let history_id =
        transaction::commit(db, &character, &opponent, &outcome, deadline, None, rng)?;
    Ok(BattleReport {
        won: true,
        history_id: Some(history_id),
    })
}
