//! Typed rows for the three tables the battle core touches. The store reads
//! and writes these structs directly, so columns are bound to fields by name
//! at compile time; there is no positional column zipping anywhere.

use chrono::{DateTime, Utc};

pub const CHARACTERS_TABLE: &str = "characters";
pub const OPPONENTS_TABLE: &str = "opponent_masters";
pub const BATTLE_HISTORY_TABLE: &str = "battle_history";

/// Secondary index over `battle_history (user_id, updated_at)`. History reads
/// must name this index; primary-key order is dominated by `entry_shard_id`.
pub const BATTLE_HISTORY_BY_USER_INDEX: &str = "battle_history_by_user_id";

/// A player-owned combatant. Mutated only by the battle transaction.
/// `(id, user_id)` is the conditional-update key: an update matching zero
/// rows means the character no longer exists under that owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: i64,
    pub user_id: i64,
    pub level: i64,
    pub experience: i64,
    pub strength: i64,
    pub updated_at: DateTime<Utc>,
}

/// Immutable opponent template. Master data; the core only ever reads it.
/// Templates may be deleted later without invalidating history rows that
/// reference them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpponentTemplate {
    pub opponent_id: i64,
    pub kind: String,
    pub strength: i64,
    pub experience: i64,
}

/// One battle, written exactly once at commit time and immutable after.
/// `entry_shard_id` is derived data that spreads writes across the key
/// space; it is not a business attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleHistoryRecord {
    pub history_id: i64,
    pub user_id: i64,
    pub character_id: i64,
    pub opponent_id: i64,
    pub result: bool,
    pub entry_shard_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
