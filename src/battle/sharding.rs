//! Entry-shard assignment for history rows.
//!
//! History rows are naturally ordered by write time, so a busy period would
//! otherwise land every insert in one narrow key range. Each row carries an
//! extra `entry_shard_id` in `[0, NUM_SHARDS)` mixed from the owner id, the
//! wall clock at microsecond resolution, and a fresh random draw. The value
//! only spreads writes; readers always scan the full shard range, so it never
//! affects query results.

use std::time::{SystemTime, UNIX_EPOCH};

use super::rng::Rng;

pub const NUM_SHARDS: i64 = 100;

/// Returns the shard for one history insert. Fresh draw per call: two inserts
/// for the same user in the same microsecond still land on different shards
/// with probability `1 - 1/NUM_SHARDS`.
pub fn entry_shard_for(user_id: i64, rng: &mut Rng) -> i64 {
    let now_micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);
    let mix = (user_id as u64)
        .wrapping_add(now_micros)
        .wrapping_add(rng.next_u64() >> 1);
    (mix % NUM_SHARDS as u64) as i64
}
