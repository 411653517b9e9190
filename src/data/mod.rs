pub mod rows;
pub mod seed;

pub use rows::{BattleHistoryRecord, Character, OpponentTemplate};
pub use seed::{seed_database, SeedConfig, SeedReport};
