//! Scoped database transactions; `TxRo` & `TxRw`.
//!
//! Both wrappers hold a [`TxnPermit`] so the environment's transaction
//! gate knows how many transactions are live (the map cannot be resized
//! while any are). [`TxRw`] aborts on drop unless explicitly committed;
//! there is no exit path that leaves a write transaction dangling.

//---------------------------------------------------------------------------------------------------- Import
use std::ops::{Deref, DerefMut};

use lmdb::Transaction;

use crate::{env::TxnPermit, error::RuntimeError};

//---------------------------------------------------------------------------------------------------- TxRo
/// A read-only database transaction.
///
/// Dereferences to the engine's read transaction. Dropping it releases
/// the snapshot (and the gate permit).
pub(crate) struct TxRo<'env> {
    /// The engine transaction. Declared before the permit
    /// so it is released first on drop.
    txn: lmdb::RoTransaction<'env>,
    /// Keeps `num_active_txns` accurate.
    _permit: TxnPermit<'env>,
}

impl<'env> TxRo<'env> {
    pub(crate) fn new(txn: lmdb::RoTransaction<'env>, permit: TxnPermit<'env>) -> Self {
        Self {
            txn,
            _permit: permit,
        }
    }
}

impl<'env> Deref for TxRo<'env> {
    type Target = lmdb::RoTransaction<'env>;

    fn deref(&self) -> &Self::Target {
        &self.txn
    }
}

//---------------------------------------------------------------------------------------------------- TxRw
/// A read/write database transaction.
///
/// Aborts on drop unless [`TxRw::commit`] was called.
pub(crate) struct TxRw<'env> {
    /// `Some` until committed or aborted.
    txn: Option<lmdb::RwTransaction<'env>>,
    /// Keeps `num_active_txns` accurate.
    _permit: TxnPermit<'env>,
}

impl<'env> TxRw<'env> {
    pub(crate) fn new(txn: lmdb::RwTransaction<'env>, permit: TxnPermit<'env>) -> Self {
        Self {
            txn: Some(txn),
            _permit: permit,
        }
    }

    /// Commit all mutations made within this transaction.
    ///
    /// # Errors
    /// [`RuntimeError::Durability`]; the caller must treat
    /// everything written under this transaction as reverted.
    pub(crate) fn commit(mut self) -> Result<(), RuntimeError> {
        self.txn
            .take()
            .expect("write transaction already consumed")
            .commit()
            .map_err(RuntimeError::Durability)
    }

    /// Abort the transaction, rolling back all mutations.
    pub(crate) fn abort(mut self) {
        if let Some(txn) = self.txn.take() {
            txn.abort();
        }
    }
}

impl<'env> Deref for TxRw<'env> {
    type Target = lmdb::RwTransaction<'env>;

    fn deref(&self) -> &Self::Target {
        self.txn
            .as_ref()
            .expect("write transaction already consumed")
    }
}

impl<'env> DerefMut for TxRw<'env> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.txn
            .as_mut()
            .expect("write transaction already consumed")
    }
}

impl Drop for TxRw<'_> {
    /// Any exit path that did not explicitly
    /// commit aborts the transaction.
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            txn.abort();
        }
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    // Commit/abort-on-drop behavior is exercised
    // by the `crate::store` tests.
}
