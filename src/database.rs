//! Typed access to the environment's sub-databases; `struct Database<T>`.
//!
//! [`Database`] pairs an engine database handle with a [`Table`]'s
//! compile-time metadata, so every read decodes into `T::Value` and
//! every write encodes from `T::Key`/`T::Value`. Handles are resolved
//! once at open time and are `Copy`; they are the fixed set of
//! "cursor slots" the rest of the crate works through.
//!
//! Operations take the transaction as a parameter instead of borrowing
//! it at construction; this lets a single write transaction be threaded
//! through any number of tables without aliasing gymnastics.

//---------------------------------------------------------------------------------------------------- Import
use std::marker::PhantomData;

use lmdb::{Cursor, Transaction, WriteFlags};

use crate::{
    constants::DATABASE_CORRUPT_MSG,
    error::RuntimeError,
    storable::Storable,
    table::{DupTable, Table},
};

//---------------------------------------------------------------------------------------------------- Database
/// A typed handle to one of the environment's sub-databases.
pub(crate) struct Database<T: Table> {
    /// The engine's database handle (a `Copy`-able dbi slot).
    db: lmdb::Database,
    /// Strongly types this handle to a single [`Table`].
    _table: PhantomData<T>,
}

impl<T: Table> Clone for Database<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: Table> Copy for Database<T> {}

impl<T: Table> Database<T> {
    /// Open (or create) the sub-database belonging to `T`.
    ///
    /// `create` must be `false` when the environment is read-only.
    pub(crate) fn open(env: &lmdb::Environment, create: bool) -> Result<Self, lmdb::Error> {
        let db = if create {
            env.create_db(Some(T::NAME), T::flags())?
        } else {
            env.open_db(Some(T::NAME))?
        };

        Ok(Self {
            db,
            _table: PhantomData,
        })
    }

    /// The raw engine handle.
    pub(crate) const fn inner(&self) -> lmdb::Database {
        self.db
    }

    /// Get the value corresponding to a key.
    ///
    /// # Errors
    /// [`RuntimeError::KeyNotFound`] if `key` does not exist.
    pub(crate) fn get<Tx: Transaction>(
        &self,
        txn: &Tx,
        key: &T::Key,
    ) -> Result<T::Value, RuntimeError> {
        match txn.get(self.db, &key.as_bytes()) {
            Ok(bytes) => Ok(<T::Value as Storable>::from_bytes(bytes)),
            Err(lmdb::Error::NotFound) => Err(RuntimeError::KeyNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Same as [`Database::get`], except a missing key is `None`.
    pub(crate) fn get_opt<Tx: Transaction>(
        &self,
        txn: &Tx,
        key: &T::Key,
    ) -> Result<Option<T::Value>, RuntimeError> {
        match self.get(txn, key) {
            Ok(value) => Ok(Some(value)),
            Err(RuntimeError::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Does `key` exist?
    pub(crate) fn contains<Tx: Transaction>(
        &self,
        txn: &Tx,
        key: &T::Key,
    ) -> Result<bool, RuntimeError> {
        Ok(self.get_opt(txn, key)?.is_some())
    }

    /// Insert a key-value pair, overwriting (or, for a
    /// duplicate-sorted table, adding a duplicate).
    pub(crate) fn put(
        &self,
        txn: &mut lmdb::RwTransaction<'_>,
        key: &T::Key,
        value: &T::Value,
    ) -> Result<(), RuntimeError> {
        Ok(txn.put(self.db, &key.as_bytes(), &value.as_bytes(), WriteFlags::empty())?)
    }

    /// Insert with `MDB_APPEND`.
    ///
    /// Only valid when `key` sorts after every key already present;
    /// the dense monotone primary tables always satisfy this.
    pub(crate) fn append(
        &self,
        txn: &mut lmdb::RwTransaction<'_>,
        key: &T::Key,
        value: &T::Value,
    ) -> Result<(), RuntimeError> {
        Ok(txn.put(self.db, &key.as_bytes(), &value.as_bytes(), WriteFlags::APPEND)?)
    }

    /// Delete a key (and, for duplicate-sorted tables, all its duplicates).
    ///
    /// # Errors
    /// [`RuntimeError::KeyNotFound`] if `key` does not exist.
    pub(crate) fn delete(
        &self,
        txn: &mut lmdb::RwTransaction<'_>,
        key: &T::Key,
    ) -> Result<(), RuntimeError> {
        match txn.del(self.db, &key.as_bytes(), None) {
            Ok(()) => Ok(()),
            Err(lmdb::Error::NotFound) => Err(RuntimeError::KeyNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Return the last `(key, value)` pair, or `None` if the table is empty.
    pub(crate) fn last<Tx: Transaction>(
        &self,
        txn: &Tx,
    ) -> Result<Option<(T::Key, T::Value)>, RuntimeError> {
        let cursor = txn.open_ro_cursor(self.db)?;
        match cursor.get(None, None, lmdb_sys::MDB_LAST) {
            Ok((key, value)) => {
                let key = key.expect(DATABASE_CORRUPT_MSG);
                Ok(Some((
                    <T::Key as Storable>::from_bytes(key),
                    <T::Value as Storable>::from_bytes(value),
                )))
            }
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of entries in the table.
    ///
    /// Walks the table with a cursor; only used by tests and
    /// the hard-fork consistency check, the hot counters are
    /// derived from the dense tables' last key instead.
    pub(crate) fn len<Tx: Transaction>(&self, txn: &Tx) -> Result<u64, RuntimeError> {
        let mut len = 0;
        self.for_each(txn, |_, _| {
            len += 1;
            Ok(true)
        })?;
        Ok(len)
    }

    /// Delete every entry in the table. The table itself remains.
    pub(crate) fn clear(&self, txn: &mut lmdb::RwTransaction<'_>) -> Result<(), RuntimeError> {
        Ok(txn.clear_db(self.db)?)
    }

    /// Walk the table in key order, passing each entry to `f`.
    ///
    /// `f` returning `false` stops the walk; the same `false` is returned.
    /// For duplicate-sorted tables this visits every duplicate.
    pub(crate) fn for_each<Tx, F>(&self, txn: &Tx, mut f: F) -> Result<bool, RuntimeError>
    where
        Tx: Transaction,
        F: FnMut(T::Key, T::Value) -> Result<bool, RuntimeError>,
    {
        let cursor = txn.open_ro_cursor(self.db)?;
        let mut op = lmdb_sys::MDB_FIRST;

        loop {
            match cursor.get(None, None, op) {
                Ok((key, value)) => {
                    op = lmdb_sys::MDB_NEXT;
                    let key = key.expect(DATABASE_CORRUPT_MSG);
                    if !f(
                        <T::Key as Storable>::from_bytes(key),
                        <T::Value as Storable>::from_bytes(value),
                    )? {
                        return Ok(false);
                    }
                }
                Err(lmdb::Error::NotFound) => return Ok(true),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

//---------------------------------------------------------------------------------------------------- Database (duplicate-sorted)
impl<T: DupTable> Database<T> {
    /// Delete one exact `(key, value)` duplicate.
    ///
    /// # Errors
    /// [`RuntimeError::KeyNotFound`] if that exact duplicate does not exist.
    pub(crate) fn delete_dup(
        &self,
        txn: &mut lmdb::RwTransaction<'_>,
        key: &T::Key,
        value: &T::Value,
    ) -> Result<(), RuntimeError> {
        match txn.del(self.db, &key.as_bytes(), Some(value.as_bytes())) {
            Ok(()) => Ok(()),
            Err(lmdb::Error::NotFound) => Err(RuntimeError::KeyNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Count the duplicates stored under `key`.
    ///
    /// A missing key counts as `0`, not an error.
    ///
    /// The engine does not expose `mdb_cursor_count` so this scans the
    /// fixed-size duplicate pages; one cursor step covers a full page
    /// of values.
    pub(crate) fn dup_count<Tx: Transaction>(
        &self,
        txn: &Tx,
        key: &T::Key,
    ) -> Result<u64, RuntimeError> {
        // `DUP_FIXED` guarantees a fixed value width.
        let width =
            <T::Value as Storable>::BYTE_LENGTH.expect("dup tables hold fixed-width values") as u64;

        let cursor = txn.open_ro_cursor(self.db)?;
        match cursor.get(Some(key.as_bytes()), None, lmdb_sys::MDB_SET) {
            Ok(_) => (),
            Err(lmdb::Error::NotFound) => return Ok(0),
            Err(e) => return Err(e.into()),
        }

        let mut count = 0;
        let mut op = lmdb_sys::MDB_GET_MULTIPLE;
        loop {
            match cursor.get(None, None, op) {
                Ok((_, page)) => {
                    count += page.len() as u64 / width;
                    op = lmdb_sys::MDB_NEXT_MULTIPLE;
                }
                Err(lmdb::Error::NotFound) => return Ok(count),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    // Exercised through `crate::store` and `crate::ops` tests,
    // which cover every operation above against a real environment.
}
