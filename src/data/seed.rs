//! Deterministic sample data for local serving, demo commands, and tests.
//! Stands in for the master-data services (user, character and opponent
//! template CRUD) that own these tables in the real deployment.

use chrono::Utc;

use crate::battle::ids::new_row_id;
use crate::battle::rng::Rng;
use crate::data::rows::{Character, OpponentTemplate};
use crate::error::Result;
use crate::store::Database;

const OPPONENT_KINDS: [&str; 5] = ["slime", "goblin", "golem", "wyvern", "dragon"];

/// Opponent strength/experience are seeded in [1, 100_000], the range the
/// production data loader uses.
const MAX_OPPONENT_STAT: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub users: usize,
    pub characters_per_user: usize,
    pub opponents: usize,
    pub seed: u64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            users: 2,
            characters_per_user: 10,
            opponents: 10,
            seed: 1,
        }
    }
}

/// Ids of everything one seeding pass created.
#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    pub user_ids: Vec<i64>,
    pub character_ids: Vec<i64>,
    pub opponent_ids: Vec<i64>,
}

/// Populates characters and opponent templates. Deterministic for a fixed
/// `SeedConfig::seed` apart from the generated row ids themselves.
pub fn seed_database(db: &Database, config: &SeedConfig) -> Result<SeedReport> {
    let mut rng = Rng::new(config.seed);
    let mut report = SeedReport::default();

    for _ in 0..config.users {
        let user_id = new_row_id();
        report.user_ids.push(user_id);
        for _ in 0..config.characters_per_user {
            let character = Character {
                id: new_row_id(),
                user_id,
                level: 1 + rng.gen_range_inclusive(9) as i64,
                experience: rng.gen_range_inclusive(1_000) as i64,
                strength: 1 + rng.gen_range_inclusive(99) as i64,
                updated_at: Utc::now(),
            };
            report.character_ids.push(character.id);
            db.insert_character(character)?;
        }
    }

    for i in 0..config.opponents {
        let opponent = OpponentTemplate {
            opponent_id: new_row_id(),
            kind: OPPONENT_KINDS[i % OPPONENT_KINDS.len()].to_string(),
            strength: 1 + rng.gen_range(MAX_OPPONENT_STAT) as i64,
            experience: 1 + rng.gen_range(MAX_OPPONENT_STAT) as i64,
        };
        report.opponent_ids.push(opponent.opponent_id);
        db.insert_opponent(opponent)?;
    }

    Ok(report)
}
