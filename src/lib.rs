//! Battle resolution and sharded history backend. Endpoints outside the
//! battle flow are plain keyed CRUD owned by collaborating services; this
//! crate covers the part that has to reconcile exactly-once history with a
//! write layout that avoids hot key ranges and reads that tolerate
//! replication lag.

pub mod battle;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod server;
pub mod store;

pub use error::{Error, Result};
