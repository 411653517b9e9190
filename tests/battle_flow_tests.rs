//! End-to-end battle flow: sample, resolve, commit, and the atomicity and
//! retry contracts around the commit.

use std::time::Duration;

use chrono::{DateTime, Utc};

use arena::battle::rng::Rng;
use arena::battle::{self, resolver, transaction, Tuning};
use arena::data::rows::{Character, OpponentTemplate};
use arena::error::Error;
use arena::store::{AccessPath, Database, Deadline, HistoryQuery, StoreConfig};

fn test_db() -> Database {
    Database::new(StoreConfig::default())
}

fn insert_character(db: &Database, id: i64, user_id: i64) -> Character {
    let character = Character {
        id,
        user_id,
        level: 10,
        experience: 10,
        strength: 10,
        updated_at: DateTime::UNIX_EPOCH,
    };
    db.insert_character(character.clone()).expect("insert character");
    character
}

fn insert_opponent(db: &Database, id: i64, experience: i64) {
    db.insert_opponent(OpponentTemplate {
        opponent_id: id,
        kind: "dragon".to_string(),
        strength: 500,
        experience,
    })
    .expect("insert opponent");
}

fn always_win() -> Tuning {
    Tuning {
        win_probability: 1.0,
        ..Tuning::default()
    }
}

fn history_rows(db: &Database, user_id: i64) -> Vec<arena::data::rows::BattleHistoryRecord> {
    let deadline = Deadline::unbounded();
    let snapshot = db.snapshot(&deadline).expect("snapshot");
    snapshot
        .query_history(
            &HistoryQuery {
                user_id,
                since: DateTime::UNIX_EPOCH,
                until: Utc::now() + chrono::Duration::hours(1),
                shard_min: 0,
                shard_max: 99,
                limit: 10_000,
                access: AccessPath::UserIdIndex,
            },
            None,
        )
        .expect("history query")
}

fn current_character(db: &Database, id: i64) -> Character {
    let deadline = Deadline::unbounded();
    db.snapshot(&deadline)
        .expect("snapshot")
        .select_character(id, None)
        .expect("select")
        .expect("character present")
}

#[test]
fn winning_battle_grows_stats_and_writes_one_history_row() {
    let db = test_db();
    insert_character(&db, 1, 10);
    insert_opponent(&db, 7, 100);

    let report = battle::execute_battle(
        &db,
        &always_win(),
        1,
        &Deadline::unbounded(),
        &mut Rng::new(42),
    )
    .expect("battle");
    assert!(report.won);
    let history_id = report.history_id.expect("win writes history");

    let character = current_character(&db, 1);
    assert_eq!(character.experience, 110, "experience absorbs opponent's");
    assert!((10..=11).contains(&character.level));
    assert!((10..=11).contains(&character.strength));

    let rows = history_rows(&db, 10);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.history_id, history_id);
    assert_eq!(row.character_id, 1);
    assert_eq!(row.opponent_id, 7);
    assert!(row.result);
    assert!((0..100).contains(&row.entry_shard_id));
    assert_eq!(row.created_at, row.updated_at);
    assert_eq!(
        row.updated_at, character.updated_at,
        "update and insert share one commit timestamp"
    );
}

#[test]
fn losing_battle_changes_nothing() {
    let db = test_db();
    let before = insert_character(&db, 1, 10);
    insert_opponent(&db, 7, 100);

    let tuning = Tuning {
        win_probability: 0.0,
        ..Tuning::default()
    };
    let report =
        battle::execute_battle(&db, &tuning, 1, &Deadline::unbounded(), &mut Rng::new(42))
            .expect("battle");
    assert!(!report.won);
    assert_eq!(report.history_id, None);

    let after = current_character(&db, 1);
    assert_eq!(after.level, before.level);
    assert_eq!(after.experience, before.experience);
    assert_eq!(after.strength, before.strength);
    assert!(history_rows(&db, 10).is_empty(), "a loss writes no history");
}

#[test]
fn unknown_character_is_not_found() {
    let db = test_db();
    insert_opponent(&db, 7, 100);
    let err = battle::execute_battle(
        &db,
        &always_win(),
        999,
        &Deadline::unbounded(),
        &mut Rng::new(1),
    )
    .expect_err("no such character");
    assert_eq!(err, Error::NotFound("character"));
}

#[test]
fn empty_opponent_pool_is_unavailable() {
    let db = test_db();
    insert_character(&db, 1, 10);
    let err = battle::execute_battle(
        &db,
        &always_win(),
        1,
        &Deadline::unbounded(),
        &mut Rng::new(1),
    )
    .expect_err("no opponents seeded");
    assert_eq!(err, Error::Unavailable("opponent pool is empty"));
}

#[test]
fn vanished_character_conflicts_and_writes_nothing() {
    let db = test_db();
    let character = insert_character(&db, 1, 10);
    insert_opponent(&db, 7, 100);

    // Stale view of the character under a different owner: the conditional
    // update matches zero rows.
    let stale = Character {
        user_id: 999,
        ..character
    };
    let opponent = OpponentTemplate {
        opponent_id: 7,
        kind: "dragon".to_string(),
        strength: 500,
        experience: 100,
    };
    let outcome = resolver::resolve(&stale, &opponent, &always_win(), &mut Rng::new(1));
    let err = transaction::commit(
        &db,
        &stale,
        &opponent,
        &outcome,
        &Deadline::unbounded(),
        None,
        &mut Rng::new(1),
    )
    .expect_err("owner mismatch");
    assert_eq!(err, Error::Conflict("character vanished during battle commit"));

    assert!(
        history_rows(&db, 999).is_empty() && history_rows(&db, 10).is_empty(),
        "failed update must not leave a history row"
    );
    assert_eq!(current_character(&db, 1).experience, 10);
}

#[test]
fn transient_abort_retry_commits_exactly_once() {
    let db = test_db();
    let character = insert_character(&db, 1, 10);
    insert_opponent(&db, 7, 100);

    let opponent = OpponentTemplate {
        opponent_id: 7,
        kind: "dragon".to_string(),
        strength: 500,
        experience: 100,
    };
    let mut rng = Rng::new(42);
    let outcome = resolver::resolve(&character, &opponent, &always_win(), &mut rng);

    db.inject_aborts(2);
    transaction::commit(
        &db,
        &character,
        &opponent,
        &outcome,
        &Deadline::unbounded(),
        None,
        &mut rng,
    )
    .expect("third attempt commits");

    let rows = history_rows(&db, 10);
    assert_eq!(rows.len(), 1, "retries must not duplicate history");
    let after = current_character(&db, 1);
    assert_eq!(after.experience, outcome.new_experience);
    assert_eq!(after.level, outcome.new_level);
    assert_eq!(after.strength, outcome.new_strength, "outcome held constant across retries");
}

#[test]
fn expired_deadline_aborts_before_commit() {
    let db = test_db();
    insert_character(&db, 1, 10);
    insert_opponent(&db, 7, 100);

    let deadline = Deadline::after(Duration::ZERO);
    let err = battle::execute_battle(&db, &always_win(), 1, &deadline, &mut Rng::new(1))
        .expect_err("deadline already elapsed");
    assert_eq!(err, Error::DeadlineExceeded);
    assert!(history_rows(&db, 10).is_empty());
}

#[test]
fn cancellation_propagates_and_commits_nothing() {
    let db = test_db();
    insert_character(&db, 1, 10);
    insert_opponent(&db, 7, 100);

    let deadline = Deadline::after(Duration::from_secs(30));
    deadline.cancel();
    let err = battle::execute_battle(&db, &always_win(), 1, &deadline, &mut Rng::new(1))
        .expect_err("request cancelled");
    assert_eq!(err, Error::Cancelled);
    assert!(history_rows(&db, 10).is_empty());
}
