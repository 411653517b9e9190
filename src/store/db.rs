//! In-process store engine exposing the primitives the battle core consumes:
//! read-only snapshots (strong or bounded-staleness), serializable read-write
//! transactions with server-assigned commit timestamps, a secondary index on
//! `battle_history (user_id, updated_at)` with a configurable replica apply
//! lag, and partitioned bulk delete. The production deployment points the
//! same call sites at a replicated, range-partitioned SQL store; this engine
//! fills the role its emulator plays in local runs and tests.
//!
//! Writers serialize on one internal lock; commit timestamps are strictly
//! monotonic, so a snapshot's read timestamp cleanly separates rows committed
//! before it from rows committed after.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::data::rows::{BattleHistoryRecord, Character, OpponentTemplate};
use crate::error::{Error, Result};
use crate::store::pool::{PooledSession, SessionPool};
use crate::store::request::{Deadline, RequestTag};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub session_pool_size: usize,
    pub checkout_timeout: Duration,
    /// Delay before a committed row becomes readable through the secondary
    /// index, simulating replica apply lag. Zero by default.
    pub replication_lag: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            session_pool_size: 30,
            checkout_timeout: Duration::from_secs(5),
            replication_lag: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct StoredOpponent {
    commit_micros: i64,
    row: OpponentTemplate,
}

#[derive(Debug, Default)]
struct Tables {
    characters: HashMap<i64, Character>,
    opponents: BTreeMap<i64, StoredOpponent>,
    history: BTreeMap<i64, BattleHistoryRecord>,
    /// Secondary index: (user_id, updated_at micros, history_id).
    history_by_user: BTreeSet<(i64, i64, i64)>,
}

#[derive(Debug)]
struct Inner {
    tables: RwLock<Tables>,
    /// Last issued commit timestamp, in microseconds since epoch.
    commit_clock: Mutex<i64>,
    replication_lag_micros: AtomicI64,
    pending_aborts: AtomicU32,
    closed: AtomicBool,
    query_stats: Mutex<Vec<String>>,
}

/// Handle to the store. Explicitly constructed and passed to each component;
/// clones share the same engine. `close` ends the lifecycle.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<Inner>,
    pool: SessionPool,
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::UNIX_EPOCH)
}

impl Database {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                commit_clock: Mutex::new(0),
                replication_lag_micros: AtomicI64::new(config.replication_lag.as_micros() as i64),
                pending_aborts: AtomicU32::new(0),
                closed: AtomicBool::new(false),
                query_stats: Mutex::new(Vec::new()),
            }),
            pool: SessionPool::new(config.session_pool_size, config.checkout_timeout),
        }
    }

    /// Releases the handle for new work. In-flight operations finish; new
    /// snapshots and transactions fail with `Unavailable`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn session_pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Makes the next `n` commits fail with `TransientAbort`, standing in for
    /// contention on the same key range.
    pub fn inject_aborts(&self, n: u32) {
        self.inner.pending_aborts.fetch_add(n, Ordering::SeqCst);
    }

    pub fn set_replication_lag(&self, lag: Duration) {
        self.inner
            .replication_lag_micros
            .store(lag.as_micros() as i64, Ordering::SeqCst);
    }

    /// Query-stats surface: every tagged statement in arrival order.
    pub fn recorded_tags(&self) -> Vec<String> {
        self.inner.query_stats.lock().expect("stats lock").clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("database is closed"));
        }
        Ok(())
    }

    fn record_tag(&self, tag: Option<&RequestTag>) {
        if let Some(tag) = tag {
            self.inner
                .query_stats
                .lock()
                .expect("stats lock")
                .push(tag.to_string());
        }
    }

    fn next_commit_micros(&self) -> i64 {
        let mut clock = self.inner.commit_clock.lock().expect("commit clock");
        let next = now_micros().max(*clock + 1);
        *clock = next;
        next
    }

    fn last_commit_micros(&self) -> i64 {
        *self.inner.commit_clock.lock().expect("commit clock")
    }

    /// Strong read: observes everything committed before the snapshot.
    pub fn snapshot(&self, deadline: &Deadline) -> Result<Snapshot> {
        self.snapshot_with_staleness(Duration::ZERO, deadline)
    }

    /// Bounded-staleness read at `now - staleness`. Rows committed inside the
    /// staleness window are invisible; replicas only need to have caught up
    /// to the read timestamp, never to the latest commit.
    pub fn snapshot_with_staleness(
        &self,
        staleness: Duration,
        deadline: &Deadline,
    ) -> Result<Snapshot> {
        self.ensure_open()?;
        deadline.check()?;
        let session = self.pool.checkout()?;
        let read_ts_micros = if staleness.is_zero() {
            self.last_commit_micros()
        } else {
            now_micros() - staleness.as_micros() as i64
        };
        Ok(Snapshot {
            db: self.clone(),
            read_ts_micros,
            deadline: deadline.clone(),
            _session: session,
        })
    }

    /// Runs `f` inside one read-write transaction and commits its buffered
    /// mutations atomically under a single server-assigned timestamp. The
    /// closure either fully commits or leaves no trace; transient aborts are
    /// reported to the caller, who owns the retry policy.
    pub fn run_in_transaction<F>(&self, deadline: &Deadline, f: F) -> Result<DateTime<Utc>>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<()>,
    {
        self.ensure_open()?;
        deadline.check()?;
        let _session = self.pool.checkout()?;
        let mut tables = self.inner.tables.write().expect("tables lock");
        let mut txn = Transaction {
            db: self,
            tables: &*tables,
            deadline,
            ops: Vec::new(),
        };
        f(&mut txn)?;
        let ops = txn.ops;
        deadline.check()?;

        if self
            .inner
            .pending_aborts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::TransientAbort("commit aborted under contention"));
        }

        let commit_micros = self.next_commit_micros();
        let commit_ts = micros_to_datetime(commit_micros);
        for op in ops {
            match op {
                WriteOp::UpdateCharacter { id, patch } => {
                    if let Some(row) = tables.characters.get_mut(&id) {
                        row.level = patch.level;
                        row.experience = patch.experience;
                        row.strength = patch.strength;
                        row.updated_at = commit_ts;
                    }
                }
                WriteOp::InsertHistory { write } => {
                    let record = BattleHistoryRecord {
                        history_id: write.history_id,
                        user_id: write.user_id,
                        character_id: write.character_id,
                        opponent_id: write.opponent_id,
                        result: write.result,
                        entry_shard_id: write.entry_shard_id,
                        created_at: commit_ts,
                        updated_at: commit_ts,
                    };
                    tables
                        .history_by_user
                        .insert((record.user_id, commit_micros, record.history_id));
                    tables.history.insert(record.history_id, record);
                }
            }
        }
        Ok(commit_ts)
    }

    /// Keyed insert used by the master-data collaborators and seeding.
    pub fn insert_character(&self, mut row: Character) -> Result<()> {
        self.ensure_open()?;
        let _session = self.pool.checkout()?;
        let mut tables = self.inner.tables.write().expect("tables lock");
        if tables.characters.contains_key(&row.id) {
            return Err(Error::AlreadyExists("characters row"));
        }
        row.updated_at = micros_to_datetime(self.next_commit_micros());
        tables.characters.insert(row.id, row);
        Ok(())
    }

    /// Keyed insert used by the master-data collaborators and seeding.
    pub fn insert_opponent(&self, row: OpponentTemplate) -> Result<()> {
        self.ensure_open()?;
        let _session = self.pool.checkout()?;
        let mut tables = self.inner.tables.write().expect("tables lock");
        if tables.opponents.contains_key(&row.opponent_id) {
            return Err(Error::AlreadyExists("opponent_masters row"));
        }
        let commit_micros = self.next_commit_micros();
        tables.opponents.insert(
            row.opponent_id,
            StoredOpponent {
                commit_micros,
                row,
            },
        );
        Ok(())
    }

    /// Partitioned DML: wipes every history row and its index entries.
    /// Administrative reset; history rows are never deleted individually.
    pub fn partitioned_delete_history(
        &self,
        deadline: &Deadline,
        tag: Option<&RequestTag>,
    ) -> Result<u64> {
        self.ensure_open()?;
        deadline.check()?;
        self.record_tag(tag);
        let _session = self.pool.checkout()?;
        let mut tables = self.inner.tables.write().expect("tables lock");
        let deleted = tables.history.len() as u64;
        tables.history.clear();
        tables.history_by_user.clear();
        log::debug!("partitioned delete removed {deleted} history rows");
        Ok(deleted)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterPatch {
    pub level: i64,
    pub experience: i64,
    pub strength: i64,
}

/// History insert payload; created/updated timestamps are assigned by the
/// store at commit time, never by the caller.
#[derive(Debug, Clone, Copy)]
pub struct HistoryWrite {
    pub history_id: i64,
    pub user_id: i64,
    pub character_id: i64,
    pub opponent_id: i64,
    pub result: bool,
    pub entry_shard_id: i64,
}

enum WriteOp {
    UpdateCharacter { id: i64, patch: CharacterPatch },
    InsertHistory { write: HistoryWrite },
}

/// Mutation buffer handed to the `run_in_transaction` closure. Statements
/// observe the committed state current at transaction start (writers are
/// serialized, so that state cannot shift underneath).
pub struct Transaction<'a> {
    db: &'a Database,
    tables: &'a Tables,
    deadline: &'a Deadline,
    ops: Vec<WriteOp>,
}

impl Transaction<'_> {
    /// Conditional update matched on `(id, user_id)`. Returns the matched row
    /// count (0 or 1); the caller decides whether zero matches is an error.
    pub fn update_character_stats(
        &mut self,
        id: i64,
        user_id: i64,
        patch: CharacterPatch,
        tag: Option<&RequestTag>,
    ) -> Result<u64> {
        self.deadline.check()?;
        self.db.record_tag(tag);
        let matched = match self.tables.characters.get(&id) {
            Some(row) if row.user_id == user_id => 1,
            _ => 0,
        };
        if matched == 1 {
            self.ops.push(WriteOp::UpdateCharacter { id, patch });
        }
        Ok(matched)
    }

    pub fn insert_history(&mut self, write: HistoryWrite, tag: Option<&RequestTag>) -> Result<()> {
        self.deadline.check()?;
        self.db.record_tag(tag);
        let duplicate = self.tables.history.contains_key(&write.history_id)
            || self.ops.iter().any(|op| {
                matches!(op, WriteOp::InsertHistory { write: other } if other.history_id == write.history_id)
            });
        if duplicate {
            return Err(Error::AlreadyExists("battle_history row"));
        }
        self.ops.push(WriteOp::InsertHistory { write });
        Ok(())
    }
}

/// Which access path a history query uses. The reader must name the
/// secondary index; the primary path exists to make the difference
/// observable (row order there follows the sparse primary key, not time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    UserIdIndex,
    PrimaryKey,
}

#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub user_id: i64,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    /// Inclusive shard bounds. Readers pass the full `[0, NUM_SHARDS)` range;
    /// the bound forces the planner onto the index, it never restricts rows.
    pub shard_min: i64,
    pub shard_max: i64,
    pub limit: usize,
    pub access: AccessPath,
}

/// Read-only view at one logical timestamp. Multiple statements against the
/// same snapshot observe a mutually consistent state. Holds its pooled
/// session until dropped.
pub struct Snapshot {
    db: Database,
    read_ts_micros: i64,
    deadline: Deadline,
    _session: PooledSession,
}

impl Snapshot {
    fn visible(&self, commit_micros: i64) -> bool {
        commit_micros <= self.read_ts_micros
    }

    /// Visibility through the secondary index additionally trails the
    /// replica apply watermark.
    fn visible_via_index(&self, commit_micros: i64) -> bool {
        let lag = self.db.inner.replication_lag_micros.load(Ordering::SeqCst);
        self.visible(commit_micros) && commit_micros <= now_micros() - lag
    }

    pub fn select_character(
        &self,
        id: i64,
        tag: Option<&RequestTag>,
    ) -> Result<Option<Character>> {
        self.deadline.check()?;
        self.db.record_tag(tag);
        let tables = self.db.inner.tables.read().expect("tables lock");
        Ok(tables
            .characters
            .get(&id)
            .filter(|row| self.visible(row.updated_at.timestamp_micros()))
            .cloned())
    }

    /// Streams every opponent template visible at the read timestamp, in key
    /// order, without materializing the table. Sampling strategy stays with
    /// the caller.
    pub fn scan_opponents<F>(&self, tag: Option<&RequestTag>, mut f: F) -> Result<()>
    where
        F: FnMut(&OpponentTemplate),
    {
        self.deadline.check()?;
        self.db.record_tag(tag);
        let tables = self.db.inner.tables.read().expect("tables lock");
        for stored in tables.opponents.values() {
            if self.visible(stored.commit_micros) {
                f(&stored.row);
            }
        }
        Ok(())
    }

    pub fn query_history(
        &self,
        query: &HistoryQuery,
        tag: Option<&RequestTag>,
    ) -> Result<Vec<BattleHistoryRecord>> {
        self.deadline.check()?;
        self.db.record_tag(tag);
        let tables = self.db.inner.tables.read().expect("tables lock");
        let since_micros = query.since.timestamp_micros();
        let until_micros = query.until.timestamp_micros();
        let mut out = Vec::new();
        match query.access {
            AccessPath::UserIdIndex => {
                let lower = (query.user_id, since_micros, i64::MIN);
                let upper = (query.user_id, until_micros, i64::MAX);
                // Reverse index order = updated_at descending.
                for &(_, commit_micros, history_id) in
                    tables.history_by_user.range(lower..=upper).rev()
                {
                    if !self.visible_via_index(commit_micros) {
                        continue;
                    }
                    let row = tables
                        .history
                        .get(&history_id)
                        .expect("index entry has a base row");
                    if (query.shard_min..=query.shard_max).contains(&row.entry_shard_id) {
                        out.push(row.clone());
                        if out.len() >= query.limit {
                            break;
                        }
                    }
                }
            }
            AccessPath::PrimaryKey => {
                // Base-table order: sparse history_id, uncorrelated with time.
                for row in tables.history.values() {
                    let commit_micros = row.updated_at.timestamp_micros();
                    if row.user_id == query.user_id
                        && (since_micros..=until_micros).contains(&commit_micros)
                        && (query.shard_min..=query.shard_max).contains(&row.entry_shard_id)
                        && self.visible(commit_micros)
                    {
                        out.push(row.clone());
                        if out.len() >= query.limit {
                            break;
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::new(StoreConfig::default())
    }

    fn character(id: i64, user_id: i64) -> Character {
        Character {
            id,
            user_id,
            level: 1,
            experience: 0,
            strength: 1,
            updated_at: micros_to_datetime(0),
        }
    }

    #[test]
    fn insert_then_select_character() {
        let db = test_db();
        db.insert_character(character(1, 10)).expect("insert");
        let deadline = Deadline::unbounded();
        let snapshot = db.snapshot(&deadline).expect("snapshot");
        let row = snapshot.select_character(1, None).expect("select");
        assert_eq!(row.map(|r| r.user_id), Some(10));
    }

    #[test]
    fn duplicate_character_insert_conflicts() {
        let db = test_db();
        db.insert_character(character(1, 10)).expect("insert");
        let err = db.insert_character(character(1, 11)).expect_err("dup");
        assert_eq!(err, Error::AlreadyExists("characters row"));
    }

    #[test]
    fn transaction_applies_update_and_insert_together() {
        let db = test_db();
        db.insert_character(character(1, 10)).expect("insert");
        let deadline = Deadline::unbounded();
        let commit_ts = db
            .run_in_transaction(&deadline, |txn| {
                let matched = txn.update_character_stats(
                    1,
                    10,
                    CharacterPatch {
                        level: 2,
                        experience: 5,
                        strength: 3,
                    },
                    None,
                )?;
                assert_eq!(matched, 1);
                txn.insert_history(
                    HistoryWrite {
                        history_id: 99,
                        user_id: 10,
                        character_id: 1,
                        opponent_id: 7,
                        result: true,
                        entry_shard_id: 0,
                    },
                    None,
                )
            })
            .expect("commit");

        let snapshot = db.snapshot(&deadline).expect("snapshot");
        let row = snapshot
            .select_character(1, None)
            .expect("select")
            .expect("present");
        assert_eq!(row.level, 2);
        assert_eq!(row.updated_at, commit_ts);
        let rows = snapshot
            .query_history(
                &HistoryQuery {
                    user_id: 10,
                    since: micros_to_datetime(0),
                    until: Utc::now(),
                    shard_min: 0,
                    shard_max: 99,
                    limit: 10,
                    access: AccessPath::UserIdIndex,
                },
                None,
            )
            .expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].created_at, commit_ts);
        assert_eq!(rows[0].updated_at, commit_ts);
    }

    #[test]
    fn failed_closure_leaves_no_trace() {
        let db = test_db();
        db.insert_character(character(1, 10)).expect("insert");
        let deadline = Deadline::unbounded();
        let err = db
            .run_in_transaction(&deadline, |txn| {
                txn.update_character_stats(
                    1,
                    10,
                    CharacterPatch {
                        level: 9,
                        experience: 9,
                        strength: 9,
                    },
                    None,
                )?;
                Err(Error::Conflict("forced"))
            })
            .expect_err("closure failed");
        assert_eq!(err, Error::Conflict("forced"));
        let snapshot = db.snapshot(&deadline).expect("snapshot");
        let row = snapshot
            .select_character(1, None)
            .expect("select")
            .expect("present");
        assert_eq!(row.level, 1, "aborted transaction must not apply");
    }

    #[test]
    fn injected_abort_surfaces_as_transient() {
        let db = test_db();
        let deadline = Deadline::unbounded();
        db.inject_aborts(1);
        let err = db
            .run_in_transaction(&deadline, |_| Ok(()))
            .expect_err("abort injected");
        assert!(matches!(err, Error::TransientAbort(_)));
        db.run_in_transaction(&deadline, |_| Ok(()))
            .expect("second attempt commits");
    }

    #[test]
    fn closed_database_rejects_new_work() {
        let db = test_db();
        db.close();
        let deadline = Deadline::unbounded();
        assert_eq!(
            db.snapshot(&deadline).err(),
            Some(Error::Unavailable("database is closed"))
        );
    }

    #[test]
    fn commit_timestamps_strictly_increase() {
        let db = test_db();
        let deadline = Deadline::unbounded();
        let mut last = None;
        for _ in 0..50 {
            let ts = db
                .run_in_transaction(&deadline, |_| Ok(()))
                .expect("commit");
            if let Some(prev) = last {
                assert!(ts > prev);
            }
            last = Some(ts);
        }
    }

    #[test]
    fn tagged_statements_reach_query_stats() {
        let db = test_db();
        db.insert_character(character(1, 10)).expect("insert");
        let deadline = Deadline::unbounded();
        let tag = RequestTag::new("select", "test_read", "characters");
        let snapshot = db.snapshot(&deadline).expect("snapshot");
        snapshot.select_character(1, Some(&tag)).expect("select");
        assert_eq!(
            db.recorded_tags(),
            vec!["action=select,service=test_read,target=characters".to_string()]
        );
    }
}
