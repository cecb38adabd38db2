//! Transactions.

//---------------------------------------------------------------------------------------------------- Import
use lmdb::Transaction as LmdbTransaction;
use monero::{cryptonote::hash::Hashable, Transaction, TxIn};
use tracing::debug;

use crate::{
    error::RuntimeError,
    ops::{
        key_image,
        macros::{doc_add_block_inner_invariant, doc_error},
        output,
    },
    storable::StorableVec,
    store::Counters,
    tables::Tables,
    types::{BlockHash, TxData, TxHash, TxId},
};

//---------------------------------------------------------------------------------------------------- `add_transaction()`
/// Add a full transaction: spent key images, metadata,
/// blob, outputs, and the per-transaction index pairs.
///
#[doc = doc_add_block_inner_invariant!()]
///
/// # Errors
/// [`RuntimeError::TxExists`] on a duplicate transaction hash,
/// [`RuntimeError::KeyImageExists`] on a duplicate key image.
pub(crate) fn add_transaction(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    counters: &mut Counters,
    block_hash: &BlockHash,
    tx: &Transaction,
    tx_hash: &TxHash,
) -> Result<(), RuntimeError> {
    for input in &tx.prefix.inputs {
        if let TxIn::ToKey { k_image, .. } = input {
            key_image::add_spent_key(txn, tables, &k_image.image.0)?;
        }
    }

    let tx_id = add_transaction_data(txn, tables, counters, block_hash, tx, tx_hash)?;

    let mut amount_output_indices = Vec::with_capacity(tx.prefix.outputs.len());
    let mut global_output_indices = Vec::with_capacity(tx.prefix.outputs.len());
    for (local_index, tx_output) in tx.prefix.outputs.iter().enumerate() {
        let (amount_oi, global_oi) = output::add_output(
            txn,
            tables,
            counters,
            tx_hash,
            tx_output,
            local_index as u64,
            tx.prefix.unlock_time.0,
        )?;
        amount_output_indices.push(amount_oi);
        global_output_indices.push(global_oi);
    }

    output::add_amount_and_global_output_indices(
        txn,
        tables,
        tx_id,
        &amount_output_indices,
        &global_output_indices,
    )
}

//---------------------------------------------------------------------------------------------------- `add_transaction_data()`
/// Add a transaction's metadata and blob (not its outputs).
///
/// Allocates and returns the transaction's dense id.
///
#[doc = doc_add_block_inner_invariant!()]
///
/// # Errors
/// [`RuntimeError::TxExists`] on a duplicate transaction hash.
pub(crate) fn add_transaction_data(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    counters: &mut Counters,
    _block_hash: &BlockHash,
    tx: &Transaction,
    tx_hash: &TxHash,
) -> Result<TxId, RuntimeError> {
    if tables.tx_indices.contains(&*txn, tx_hash)? {
        return Err(RuntimeError::TxExists);
    }

    let tx_id = counters.num_txs;

    tables.tx_indices.put(
        txn,
        tx_hash,
        &TxData {
            tx_id,
            unlock_time: tx.prefix.unlock_time.0,
            height: counters.height,
        },
    )?;
    tables
        .txs
        .append(txn, &tx_id, &StorableVec(monero::consensus::serialize(tx)))?;

    counters.num_txs += 1;
    Ok(tx_id)
}

//---------------------------------------------------------------------------------------------------- `remove_transaction()`
/// Remove a transaction and everything it created: spent key
/// images, outputs (in reverse), index pairs, blob, metadata.
///
/// The removed transaction is returned.
///
#[doc = doc_add_block_inner_invariant!()]
///
/// # Errors
/// [`RuntimeError::TxNotFound`] if the hash is unknown.
pub(crate) fn remove_transaction(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    counters: &mut Counters,
    tx_hash: &TxHash,
) -> Result<Transaction, RuntimeError> {
    let tx_data = match tables.tx_indices.get(&*txn, tx_hash) {
        Err(RuntimeError::KeyNotFound) => return Err(RuntimeError::TxNotFound),
        result => result?,
    };

    let tx_blob = tables.txs.get(&*txn, &tx_data.tx_id)?;
    let tx: Transaction = monero::consensus::deserialize(&tx_blob.0)?;

    for input in &tx.prefix.inputs {
        if let TxIn::ToKey { k_image, .. } = input {
            key_image::remove_spent_key(txn, tables, &k_image.image.0)?;
        }
    }

    tables.txs.delete(txn, &tx_data.tx_id)?;

    remove_tx_outputs(txn, tables, counters, tx_data.tx_id, &tx)?;

    match tables.tx_outputs.delete(txn, &tx_data.tx_id) {
        Err(RuntimeError::KeyNotFound) => debug!(tx_id = tx_data.tx_id, "tx has no outputs to remove"),
        result => result?,
    }

    // Earlier steps still look the transaction up by hash,
    // so the tx_indices entry goes last.
    tables.tx_indices.delete(txn, tx_hash)?;

    counters.num_txs -= 1;
    Ok(tx)
}

/// Remove a transaction's outputs, newest first.
#[doc = doc_add_block_inner_invariant!()]
#[doc = doc_error!()]
fn remove_tx_outputs(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    counters: &mut Counters,
    tx_id: TxId,
    tx: &Transaction,
) -> Result<(), RuntimeError> {
    // Only the global indices are needed here.
    let (_, global_output_indices) =
        output::get_amount_and_global_output_indices(&*txn, tables, tx_id)?;

    if global_output_indices.is_empty() {
        if tx.prefix.outputs.is_empty() {
            debug!(tx_id, "tx has no outputs, so no global output indices");
            return Ok(());
        }
        return Err(RuntimeError::SchemaViolation(
            "tx has outputs, but no global output indices were stored",
        ));
    }

    for i in (0..tx.prefix.outputs.len()).rev() {
        output::remove_output(
            txn,
            tables,
            counters,
            global_output_indices[i],
            tx.prefix.outputs[i].amount.0,
        )?;
    }

    Ok(())
}

//---------------------------------------------------------------------------------------------------- `get_tx_*`
/// A transaction's stored metadata, by hash.
///
/// # Errors
/// [`RuntimeError::TxNotFound`] if the hash is unknown.
#[inline]
pub(crate) fn get_tx_data<Tx: LmdbTransaction>(
    txn: &Tx,
    tables: &Tables,
    tx_hash: &TxHash,
) -> Result<TxData, RuntimeError> {
    match tables.tx_indices.get(txn, tx_hash) {
        Err(RuntimeError::KeyNotFound) => Err(RuntimeError::TxNotFound),
        result => result,
    }
}

/// A transaction's serialized blob, by hash.
///
/// # Errors
/// [`RuntimeError::TxNotFound`] if the hash is unknown.
pub(crate) fn get_tx_blob<Tx: LmdbTransaction>(
    txn: &Tx,
    tables: &Tables,
    tx_hash: &TxHash,
) -> Result<Vec<u8>, RuntimeError> {
    let tx_data = get_tx_data(txn, tables, tx_hash)?;
    Ok(tables.txs.get(txn, &tx_data.tx_id)?.0)
}

/// A parsed transaction, by hash.
///
/// # Errors
/// [`RuntimeError::TxNotFound`] if the hash is unknown.
pub(crate) fn get_tx<Tx: LmdbTransaction>(
    txn: &Tx,
    tables: &Tables,
    tx_hash: &TxHash,
) -> Result<Transaction, RuntimeError> {
    Ok(monero::consensus::deserialize(&get_tx_blob(
        txn, tables, tx_hash,
    )?)?)
}

/// Does a transaction with this hash exist?
#[doc = doc_error!()]
#[inline]
pub(crate) fn tx_exists<Tx: LmdbTransaction>(
    txn: &Tx,
    tables: &Tables,
    tx_hash: &TxHash,
) -> Result<bool, RuntimeError> {
    tables.tx_indices.contains(txn, tx_hash)
}

//---------------------------------------------------------------------------------------------------- `for_all_transactions()`
/// Walk every transaction in hash order.
///
/// `f` returning `false` stops the walk; the same `false` is returned.
#[doc = doc_error!()]
pub(crate) fn for_all_transactions<Tx, F>(
    txn: &Tx,
    tables: &Tables,
    mut f: F,
) -> Result<bool, RuntimeError>
where
    Tx: LmdbTransaction,
    F: FnMut(&TxHash, &Transaction) -> bool,
{
    tables.tx_indices.for_each(txn, |tx_hash, tx_data| {
        let tx_blob = tables.txs.get(txn, &tx_data.tx_id)?;
        let tx: Transaction = monero::consensus::deserialize(&tx_blob.0)?;
        Ok(f(&tx_hash, &tx))
    })
}

//---------------------------------------------------------------------------------------------------- Misc
/// The hash of a transaction, as the schema stores it.
#[inline]
pub(crate) fn tx_hash(tx: &Transaction) -> TxHash {
    tx.hash().0
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    // Exercised end-to-end in `crate::store`'s tests.
}
