//! Database disk synchronization modes.

//---------------------------------------------------------------------------------------------------- Import
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

//---------------------------------------------------------------------------------------------------- SyncMode
/// Disk synchronization mode.
///
/// This controls how/when the database syncs its data to disk.
///
/// Regardless of the variant chosen, dropping the store will always
/// cause it to fully sync to disk, and an explicit
/// [`sync()`](crate::BlockchainDb::sync) forces a durable flush.
///
/// # Sync vs Data
/// These modes are about the speed of writes against the
/// ACID-ity of those writes. Each variant is more performant
/// and less durable than the previous:
/// - [`SyncMode::Safe`]: every committed transaction is synchronously
///   flushed; a crash can only lose the in-flight transaction
/// - [`SyncMode::Async`]: flushes are handed to the OS asynchronously;
///   a system crash may lose the last transactions, the database
///   itself stays consistent
/// - [`SyncMode::Fast`]: no flushing at all outside explicit syncs;
///   a system crash during a write may corrupt the database
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd, Eq, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SyncMode {
    /// Fully synchronous writes.
    #[default]
    Safe,

    /// Asynchronous map flushes (`MDB_MAPASYNC`).
    Async,

    /// No synchronous flushing whatsoever
    /// (`MDB_NOSYNC | MDB_WRITEMAP | MDB_MAPASYNC`).
    Fast,
}

impl SyncMode {
    /// The engine flags this mode maps to.
    pub(crate) fn env_flags(self) -> lmdb::EnvironmentFlags {
        use lmdb::EnvironmentFlags as F;

        match self {
            Self::Safe => F::empty(),
            Self::Async => F::WRITE_MAP | F::MAP_ASYNC,
            Self::Fast => F::NO_SYNC | F::WRITE_MAP | F::MAP_ASYNC,
        }
    }
}
