//! Combatant selection: the caller's character plus one uniformly drawn
//! opponent template.

use crate::battle::rng::Rng;
use crate::data::rows::{Character, OpponentTemplate};
use crate::error::{Error, Result};
use crate::store::{Database, Deadline, RequestTag};

const CHARACTER_SELECT_TAG: RequestTag = RequestTag::new("select", "run_battle", "characters");
const OPPONENT_SELECT_TAG: RequestTag =
    RequestTag::new("select", "run_battle", "opponent_masters");

/// Fetches the character and draws an opponent inside one multi-statement
/// read-only snapshot, so both observe the database at a single logical
/// timestamp.
///
/// The character lookup is keyed; were the key ever non-unique upstream, the
/// first matching row wins, which is non-deterministic by contract. The
/// opponent is drawn with reservoir-of-1 sampling over the whole template
/// stream: the table size is unknown in advance and this keeps the draw
/// single-pass instead of sorting the table by a random key.
pub fn sample(
    db: &Database,
    character_id: i64,
    deadline: &Deadline,
    rng: &mut Rng,
) -> Result<(Character, OpponentTemplate)> {
    let snapshot = db.snapshot(deadline)?;

    let character = snapshot
        .select_character(character_id, Some(&CHARACTER_SELECT_TAG))?
        .ok_or(Error::NotFound("character"))?;

    let mut seen: u64 = 0;
    let mut pick: Option<OpponentTemplate> = None;
    snapshot.scan_opponents(Some(&OPPONENT_SELECT_TAG), |row| {
        seen += 1;
        // The i-th row replaces the candidate with probability 1/i.
        if rng.gen_range(seen) == 0 {
            pick = Some(row.clone());
        }
    })?;

    // Empty pool means missing seed data, not a bad request: callers back
    // off instead of returning a 404.
    let opponent = pick.ok_or(Error::Unavailable("opponent pool is empty"))?;
    Ok((character, opponent))
}
