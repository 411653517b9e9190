//! Time-ranged history reads at bounded staleness.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::battle::sharding::NUM_SHARDS;
use crate::data::rows::BattleHistoryRecord;
use crate::error::{Error, Result};
use crate::store::{AccessPath, Database, Deadline, HistoryQuery, RequestTag};

/// Result cap regardless of how wide the requested window is.
pub const HISTORY_LIMIT: usize = 300;

const HISTORY_SELECT_TAG: RequestTag =
    RequestTag::new("select", "battle_histories", "battle_history");

/// Lists battles for `user_id` with `updated_at` in `[since, until]`
/// (epoch seconds, inclusive), newest first, at most [`HISTORY_LIMIT`] rows.
///
/// The read runs at `now - staleness` rather than at the latest commit: the
/// write path scatters rows across the key space on purpose, and serving
/// this query from the user-id index only works once replicas have applied
/// past the read timestamp. Within the staleness window "read your own
/// write" is expected to flake; that is the contract, not a bug. An empty
/// window yields an empty list, never an error.
pub fn list(
    db: &Database,
    staleness: Duration,
    user_id: i64,
    since_epoch: i64,
    until_epoch: i64,
    deadline: &Deadline,
) -> Result<Vec<BattleHistoryRecord>> {
    let since = epoch_to_datetime(since_epoch)?;
    let until = epoch_to_datetime(until_epoch)?;
    let snapshot = db.snapshot_with_staleness(staleness, deadline)?;
    snapshot.query_history(
        &HistoryQuery {
            user_id,
            since,
            until,
            // Full shard coverage: the bound steers the planner onto the
            // index without excluding any row.
            shard_min: 0,
            shard_max: NUM_SHARDS - 1,
            limit: HISTORY_LIMIT,
            access: AccessPath::UserIdIndex,
        },
        Some(&HISTORY_SELECT_TAG),
    )
}

fn epoch_to_datetime(epoch: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| Error::InvalidArgument(format!("epoch second {epoch} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_conversion_rejects_out_of_range() {
        assert!(epoch_to_datetime(0).is_ok());
        assert!(epoch_to_datetime(i64::MAX).is_err());
    }
}
