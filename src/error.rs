//! Error taxonomy shared by the store client and the battle core.
//! Each variant maps to a distinct caller reaction; nothing is swallowed.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A referenced row does not exist. Client-visible 404-class result.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The service cannot answer right now. Signals missing seed data or an
    /// exhausted resource, so callers should back off rather than retry hot.
    #[error("unavailable: {0}")]
    Unavailable(&'static str),

    /// A row vanished or its owner changed mid-transaction. Never retried.
    #[error("conflict: {0}")]
    Conflict(&'static str),

    /// The store aborted the commit under contention. Retried by the caller
    /// with the same already-computed inputs, up to a bounded attempt count.
    #[error("transient abort: {0}")]
    TransientAbort(&'static str),

    /// An insert hit an existing primary key. Fatal for the request; the id
    /// generator's collision odds make this a birthday-bound rarity.
    #[error("already exists: {0}")]
    AlreadyExists(&'static str),

    /// The request-scoped deadline elapsed before the statement finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller cancelled the request; in-flight statements are abandoned.
    #[error("cancelled")]
    Cancelled,

    /// A caller-supplied argument could not be interpreted (bad epoch, etc).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
