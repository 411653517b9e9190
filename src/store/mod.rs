pub mod db;
pub mod pool;
pub mod request;

pub use db::{
    AccessPath, CharacterPatch, Database, HistoryQuery, HistoryWrite, Snapshot, StoreConfig,
    Transaction,
};
pub use pool::{PooledSession, SessionPool};
pub use request::{Deadline, RequestTag};
