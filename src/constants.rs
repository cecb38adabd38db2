//! General constants used throughout `blockchain-db`.

//---------------------------------------------------------------------------------------------------- Version
/// The on-disk database version, held in the `properties` sub-database
/// under [`DATABASE_VERSION_KEY`].
///
/// A store whose stored version is greater than this refuses to open.
pub const DATABASE_VERSION: u32 = 0;

/// The `properties` key the database version is stored under.
pub const DATABASE_VERSION_KEY: &str = "version";

//---------------------------------------------------------------------------------------------------- Directory/Files
/// The data file LMDB creates inside the database directory.
///
/// ```txt
/// ~/.local/share/my_node/
/// ├─ database/
///    ├─ data.mdb # <-
///    ├─ lock.mdb
/// ```
pub const DATABASE_DATA_FILENAME: &str = "data.mdb";

/// The lock file LMDB creates inside the database directory.
pub const DATABASE_LOCK_FILENAME: &str = "lock.mdb";

//---------------------------------------------------------------------------------------------------- Environment defaults
/// Default size of the memory map, in bytes.
///
/// LMDB wants a fixed upper bound up front; the map is grown
/// on demand by the resize logic in [`crate::resize`].
pub const DATABASE_DEFAULT_MAP_SIZE: usize = 1 << 30; // 1 GiB

/// Maximum number of named sub-databases the environment can hold.
///
/// We currently declare 14 tables, this leaves a little headroom.
pub const DATABASE_MAX_DBS: u32 = 20;

/// Static string of the `crate` being used as the database backend.
pub const DATABASE_BACKEND: &str = "lmdb";

//---------------------------------------------------------------------------------------------------- Error Messages
/// Corrupt database error message.
///
/// The panic message used when the database itself
/// returns data that breaks the schema's invariants.
pub const DATABASE_CORRUPT_MSG: &str = r"The database may be corrupted.
Delete the database directory and resync from the network.";

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    /// Sanity check that our PATHs aren't empty... (will cause disaster).
    fn non_empty_path() {
        assert!(!DATABASE_DATA_FILENAME.is_empty());
        assert!(!DATABASE_LOCK_FILENAME.is_empty());
        assert!(!DATABASE_VERSION_KEY.is_empty());
    }
}
