//! Spent key images.

//---------------------------------------------------------------------------------------------------- Import
use lmdb::Transaction;

use crate::{
    error::RuntimeError,
    ops::macros::{doc_add_block_inner_invariant, doc_error},
    tables::Tables,
    types::KeyImage,
};

//---------------------------------------------------------------------------------------------------- `add_spent_key()`
/// Mark a key image as spent.
///
#[doc = doc_add_block_inner_invariant!()]
///
/// # Errors
/// [`RuntimeError::KeyImageExists`] if the key image is already marked.
#[inline]
pub(crate) fn add_spent_key(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    key_image: &KeyImage,
) -> Result<(), RuntimeError> {
    if tables.spent_keys.contains(&*txn, key_image)? {
        return Err(RuntimeError::KeyImageExists);
    }

    // Only existence matters; the value is a 1-byte marker.
    tables.spent_keys.put(txn, key_image, &0)
}

//---------------------------------------------------------------------------------------------------- `remove_spent_key()`
/// Un-mark a spent key image.
///
/// Removing a key image that is not marked is a no-op, not an error.
#[doc = doc_error!()]
#[inline]
pub(crate) fn remove_spent_key(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    key_image: &KeyImage,
) -> Result<(), RuntimeError> {
    match tables.spent_keys.delete(txn, key_image) {
        Ok(()) | Err(RuntimeError::KeyNotFound) => Ok(()),
        Err(e) => Err(e),
    }
}

//---------------------------------------------------------------------------------------------------- `has_key_image()`
/// Is this key image marked spent?
#[doc = doc_error!()]
#[inline]
pub(crate) fn has_key_image<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    key_image: &KeyImage,
) -> Result<bool, RuntimeError> {
    tables.spent_keys.contains(txn, key_image)
}

//---------------------------------------------------------------------------------------------------- `for_all_key_images()`
/// Walk every spent key image in key order.
///
/// `f` returning `false` stops the walk; the same `false` is returned.
#[doc = doc_error!()]
pub(crate) fn for_all_key_images<Tx, F>(
    txn: &Tx,
    tables: &Tables,
    mut f: F,
) -> Result<bool, RuntimeError>
where
    Tx: Transaction,
    F: FnMut(&KeyImage) -> bool,
{
    tables
        .spent_keys
        .for_each(txn, |key_image, _marker| Ok(f(&key_image)))
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    // Exercised end-to-end in `crate::store`'s tests.
}
