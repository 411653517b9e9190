//! The atomic unit: apply stat growth and record history, together or not at
//! all.

use crate::battle::ids::new_row_id;
use crate::battle::rng::Rng;
use crate::battle::sharding::entry_shard_for;
use crate::battle::resolver::Outcome;
use crate::data::rows::{Character, OpponentTemplate};
use crate::error::{Error, Result};
use crate::store::{CharacterPatch, Database, Deadline, HistoryWrite, RequestTag};

/// Total attempts per invocation, counting the first. Transient aborts within
/// the budget are retried; anything else surfaces immediately.
pub const MAX_COMMIT_ATTEMPTS: u32 = 5;

const DEFAULT_COMMIT_TAG: RequestTag =
    RequestTag::new("update&insert", "run_battle", "characters&battle_history");

/// Commits one battle: a conditional update of the character row keyed on
/// `(id, user_id)` plus exactly one history insert, in a single read-write
/// transaction stamped with one server-assigned commit timestamp.
///
/// The outcome was computed before the first attempt and is never recomputed:
/// a retry must not roll new growth values. The history id and entry shard
/// are drawn fresh per attempt; nothing from a failed attempt ever committed,
/// and reusing an id that just collided would only collide again.
///
/// Zero rows matched by the update means the character vanished or changed
/// owner concurrently. That is a consistency failure, reported as `Conflict`
/// and never retried; the history insert is abandoned with the transaction.
pub fn commit(
    db: &Database,
    character: &Character,
    opponent: &OpponentTemplate,
    outcome: &Outcome,
    deadline: &Deadline,
    tag: Option<&RequestTag>,
    rng: &mut Rng,
) -> Result<i64> {
    let tag = tag.copied().unwrap_or(DEFAULT_COMMIT_TAG);
    let patch = CharacterPatch {
        level: outcome.new_level,
        experience: outcome.new_experience,
        strength: outcome.new_strength,
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        let history_id = new_row_id();
        let entry_shard_id = entry_shard_for(character.user_id, rng);
        let result = db.run_in_transaction(deadline, |txn| {
            let matched =
                txn.update_character_stats(character.id, character.user_id, patch, Some(&tag))?;
            if matched == 0 {
                return Err(Error::Conflict("character vanished during battle commit"));
            }
            txn.insert_history(
                HistoryWrite {
                    history_id,
                    user_id: character.user_id,
                    character_id: character.id,
                    opponent_id: opponent.opponent_id,
                    result: outcome.won,
                    entry_shard_id,
                },
                Some(&tag),
            )
        });
        match result {
            Ok(_) => return Ok(history_id),
            Err(Error::TransientAbort(reason)) if attempt < MAX_COMMIT_ATTEMPTS => {
                log::debug!("battle commit attempt {attempt} aborted ({reason}), retrying");
            }
            Err(err) => return Err(err),
        }
    }
}
