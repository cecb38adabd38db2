//! Database error types.
//!
//! Split in two, following the life of a database:
//! - [`InitError`]: errors that can only happen while opening the store
//! - [`RuntimeError`]: everything after a successful open
//!
//! The runtime taxonomy carries both engine-level failures (mapped from
//! [`lmdb::Error`]) and schema-level ones (`BlockExists`, `ParentMismatch`,
//! ...) raised by the write/read paths themselves.

//---------------------------------------------------------------------------------------------------- Import
use std::fmt::Debug;

//---------------------------------------------------------------------------------------------------- InitError
/// Errors that can occur when opening the database.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    /// The given `Config::db_directory` could not be created or opened.
    #[error("failed to create/open the database directory: {0}")]
    Io(#[from] std::io::Error),

    /// The database environment could not be initialized.
    #[error("failed to initialize the database environment: {0}")]
    Open(lmdb::Error),

    /// The store was written by a later (or otherwise unknown) version
    /// of this library. The caller must delete the store and resync.
    #[error("database version is incompatible: found v{found}, supported <= v{supported}")]
    IncompatibleVersion {
        /// The version found inside the `properties` sub-database.
        found: u32,
        /// The version this binary supports.
        supported: u32,
    },

    /// The store's record layout does not match this library's schema.
    #[error("database is corrupt or uses an unknown schema")]
    Corrupt,

    /// A database operation failed while opening the store.
    #[error("database operation failed during open: {0}")]
    Runtime(#[from] RuntimeError),
}

//---------------------------------------------------------------------------------------------------- RuntimeError
/// Errors that can occur on any database operation after a successful open.
#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    /// A block with this hash is already stored.
    #[error("block already exists in the database")]
    BlockExists,

    /// A transaction with this hash is already stored.
    #[error("transaction already exists in the database")]
    TxExists,

    /// This key image is already marked spent.
    #[error("spent key image already exists in the database")]
    KeyImageExists,

    /// The requested block does not exist.
    #[error("block does not exist in the database")]
    BlockNotFound,

    /// The requested transaction does not exist.
    #[error("transaction does not exist in the database")]
    TxNotFound,

    /// The requested output does not exist.
    #[error("output does not exist in the database")]
    OutputNotFound,

    /// A block's `prev_id` did not resolve to the current chain tip.
    #[error("new block's parent is not the chain tip")]
    ParentMismatch,

    /// Input data (or stored data) does not fit the schema.
    #[error("schema violation: {0}")]
    SchemaViolation(&'static str),

    /// A transaction could not be opened or renewed.
    #[error("failed to start a database transaction: {0}")]
    TxnStart(lmdb::Error),

    /// A write transaction failed to commit, or a forced
    /// sync failed. All in-memory state must be treated as
    /// reverted to the last committed state.
    #[error("failed to commit/sync the database: {0}")]
    Durability(lmdb::Error),

    /// A key already exists where a unique insert was expected.
    #[error("key already exists in the database")]
    KeyExists,

    /// The key does not exist in the database.
    #[error("key/value pair was not found in the database")]
    KeyNotFound,

    /// The memory map is full and must be resized before
    /// more data can be written.
    #[error("database memory map is full")]
    MapFull,

    /// All LMDB reader slots are in use.
    #[error("all database reader slots are in use")]
    ReadersFull,

    /// A stored blob failed to (de)serialize with the wire codec.
    #[error("blob (de)serialization failed: {0}")]
    Encoding(#[from] monero::consensus::encode::Error),

    /// An unexpected engine-level error.
    #[error("unexpected database error: {0}")]
    Internal(lmdb::Error),
}

//---------------------------------------------------------------------------------------------------- From
// Conversion from the engine's errors.
//
// Only errors with a sensible schema-level meaning get their
// own variant, the rest fall through to `Internal`.
impl From<lmdb::Error> for RuntimeError {
    fn from(error: lmdb::Error) -> Self {
        match error {
            lmdb::Error::KeyExist => Self::KeyExists,
            lmdb::Error::NotFound => Self::KeyNotFound,
            lmdb::Error::MapFull => Self::MapFull,
            lmdb::Error::ReadersFull => Self::ReadersFull,
            error => Self::Internal(error),
        }
    }
}

impl From<lmdb::Error> for InitError {
    fn from(error: lmdb::Error) -> Self {
        Self::Open(error)
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lmdb_error_mapping() {
        assert!(matches!(
            RuntimeError::from(lmdb::Error::NotFound),
            RuntimeError::KeyNotFound
        ));
        assert!(matches!(
            RuntimeError::from(lmdb::Error::KeyExist),
            RuntimeError::KeyExists
        ));
        assert!(matches!(
            RuntimeError::from(lmdb::Error::MapFull),
            RuntimeError::MapFull
        ));
        assert!(matches!(
            RuntimeError::from(lmdb::Error::Panic),
            RuntimeError::Internal(_)
        ));
    }
}
