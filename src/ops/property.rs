//! Store-wide properties.

//---------------------------------------------------------------------------------------------------- Import
use lmdb::Transaction;

use crate::{
    constants::DATABASE_VERSION_KEY, error::RuntimeError, ops::macros::doc_error,
    storable::StorableStr, tables::Tables,
};

//---------------------------------------------------------------------------------------------------- Free functions
/// Read the store's on-disk version, if one has been written yet.
#[doc = doc_error!()]
#[inline]
pub(crate) fn get_db_version<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
) -> Result<Option<u32>, RuntimeError> {
    tables
        .properties
        .get_opt(txn, &StorableStr(DATABASE_VERSION_KEY.into()))
}

/// Write the store's on-disk version.
///
/// This is one of the two legal update-in-place writes
/// (the other being hard-fork version remaps).
#[doc = doc_error!()]
#[inline]
pub(crate) fn set_db_version(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    version: u32,
) -> Result<(), RuntimeError> {
    tables
        .properties
        .put(txn, &StorableStr(DATABASE_VERSION_KEY.into()), &version)
}
