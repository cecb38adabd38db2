//! Hard-fork version metadata.

//---------------------------------------------------------------------------------------------------- Import
use lmdb::Transaction;
use tracing::debug;

use crate::{
    error::RuntimeError,
    ops::macros::doc_error,
    tables::Tables,
    types::BlockHeight,
};

//---------------------------------------------------------------------------------------------------- Free functions
/// Record the first height a hard-fork version applies at.
///
/// Versions arrive in ascending order so this appends; a re-recorded
/// version falls back to an overwrite.
#[doc = doc_error!()]
pub(crate) fn set_hard_fork_starting_height(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    version: u8,
    height: BlockHeight,
) -> Result<(), RuntimeError> {
    match tables.hf_starting_heights.append(txn, &version, &height) {
        Err(RuntimeError::KeyExists) => tables.hf_starting_heights.put(txn, &version, &height),
        result => result,
    }
}

/// The first height a hard-fork version applies at.
///
/// A version that never started returns `u64::MAX`.
#[doc = doc_error!()]
pub(crate) fn get_hard_fork_starting_height<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    version: u8,
) -> Result<BlockHeight, RuntimeError> {
    Ok(tables
        .hf_starting_heights
        .get_opt(txn, &version)?
        .unwrap_or(u64::MAX))
}

/// Record the hard-fork version in effect at a height.
///
/// Heights arrive in order so this appends; re-orged heights are
/// remapped in place (the other legal update-in-place write).
#[doc = doc_error!()]
pub(crate) fn set_hard_fork_version(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    height: BlockHeight,
    version: u8,
) -> Result<(), RuntimeError> {
    match tables.hf_versions.append(txn, &height, &version) {
        Err(RuntimeError::KeyExists) => tables.hf_versions.put(txn, &height, &version),
        result => result,
    }
}

/// The hard-fork version in effect at a height.
#[doc = doc_error!()]
pub(crate) fn get_hard_fork_version<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    height: BlockHeight,
) -> Result<u8, RuntimeError> {
    tables.hf_versions.get(txn, &height)
}

/// Clear the hard-fork tables if they disagree with the block tables.
///
/// Empty-but-present tables let startup proceed; the hard-fork logic
/// upstream repopulates them when it finds them empty.
#[doc = doc_error!()]
pub(crate) fn check_hard_fork_info(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
) -> Result<(), RuntimeError> {
    let blocks = tables.blocks.len(&*txn)?;
    let hf_versions = tables.hf_versions.len(&*txn)?;

    if blocks != hf_versions {
        debug!(
            blocks,
            hf_versions, "hard-fork tables inconsistent with block tables, clearing them",
        );
        tables.hf_starting_heights.clear(txn)?;
        tables.hf_versions.clear(txn)?;
    }

    Ok(())
}

/// Drop all hard-fork data.
#[doc = doc_error!()]
pub(crate) fn drop_hard_fork_info(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
) -> Result<(), RuntimeError> {
    tables.hf_starting_heights.clear(txn)?;
    tables.hf_versions.clear(txn)
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    // Exercised end-to-end in `crate::store`'s tests.
}
