//! The main database configuration struct.

//---------------------------------------------------------------------------------------------------- Import
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    config::{ReaderThreads, SyncMode},
    constants::DATABASE_DEFAULT_MAP_SIZE,
    resize::ResizeAlgorithm,
};

//---------------------------------------------------------------------------------------------------- Config
/// Database configuration.
///
/// This is the struct passed to [`BlockchainDb::open`](crate::BlockchainDb::open)
/// that allows the database to be configured in various ways.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// The directory all database files live in
    /// (`data.mdb` + `lock.mdb`).
    ///
    /// Created if missing (unless [`Config::read_only`]).
    pub(crate) db_directory: PathBuf,

    /// Disk synchronization mode.
    pub sync_mode: SyncMode,

    /// Database reader thread count.
    pub reader_threads: ReaderThreads,

    /// Memory map resizing algorithm.
    ///
    /// This is the default fallback; batched writes size
    /// their own increase from the estimated batch size.
    pub resize_algorithm: ResizeAlgorithm,

    /// Initial size of the memory map, in bytes.
    ///
    /// The map is set to at least this (and at least the current
    /// data file size) at open.
    pub map_size: usize,

    /// Open the store read-only.
    ///
    /// All write operations will fail, and the store
    /// refuses to open if the tables don't already exist.
    pub read_only: bool,
}

impl Config {
    /// Create a new [`Config`] with sane default settings.
    pub fn new(db_directory: PathBuf) -> Self {
        Self {
            db_directory,
            sync_mode: SyncMode::default(),
            reader_threads: ReaderThreads::OnePerThread,
            resize_algorithm: ResizeAlgorithm::default(),
            map_size: DATABASE_DEFAULT_MAP_SIZE,
            read_only: false,
        }
    }

    /// Create a [`Config`] with the highest performing,
    /// but also least durable settings.
    ///
    /// Good default for testing, and resource-available machines.
    pub fn fast(db_directory: PathBuf) -> Self {
        Self {
            sync_mode: SyncMode::Fast,
            ..Self::new(db_directory)
        }
    }

    /// Create a [`Config`] with the lowest performing,
    /// but also least resource-intensive settings.
    ///
    /// Good default for resource-limited machines, e.g. a cheap VPS.
    pub fn low_power(db_directory: PathBuf) -> Self {
        Self {
            reader_threads: ReaderThreads::One,
            ..Self::new(db_directory)
        }
    }

    /// Return the absolute [`Path`] to the database directory.
    pub fn db_directory(&self) -> &Path {
        &self.db_directory
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_map_size() {
        let config = Config::new(PathBuf::from("/tmp/db"));
        assert_eq!(config.map_size, DATABASE_DEFAULT_MAP_SIZE);
        assert!(!config.read_only);
        assert_eq!(config.sync_mode, SyncMode::Safe);
    }
}
