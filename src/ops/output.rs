//! Outputs.

//---------------------------------------------------------------------------------------------------- Import
use lmdb::{Cursor, Transaction};
use monero::blockdata::transaction::TxOutTarget;
use monero::TxOut;
use tracing::{debug, warn};

use crate::{
    error::RuntimeError,
    ops::macros::{doc_add_block_inner_invariant, doc_error},
    storable::{Storable, StorableVec},
    store::Counters,
    tables::Tables,
    types::{Amount, AmountIndex, GlobalOutputIndex, OutputData, TxHash, TxId},
};

/// Width of one entry in the `output_amounts` duplicate pages.
const DUP_WIDTH: usize = std::mem::size_of::<GlobalOutputIndex>();

//---------------------------------------------------------------------------------------------------- `add_output()`
/// Add an output, updating every output index.
///
/// The new output takes the next global output index and the next
/// position in its amount's duplicate list; both are returned as
/// `(amount output index, global output index)`.
///
#[doc = doc_add_block_inner_invariant!()]
///
/// # Errors
/// [`RuntimeError::SchemaViolation`] on any output type
/// other than `txout_to_key`.
pub(crate) fn add_output(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    counters: &mut Counters,
    tx_hash: &TxHash,
    output: &TxOut,
    local_index: u64,
    unlock_time: u64,
) -> Result<(AmountIndex, GlobalOutputIndex), RuntimeError> {
    let global_oi = counters.num_outputs;
    let amount = output.amount.0;

    tables.output_txs.append(txn, &global_oi, tx_hash)?;
    tables.output_indices.append(txn, &global_oi, &local_index)?;

    // Global indices are handed out in increasing order, so the new
    // duplicate always lands at the end of the amount's dup list.
    tables.output_amounts.put(txn, &amount, &global_oi)?;
    let num_elems = tables.output_amounts.dup_count(&*txn, &amount)?;
    let amount_oi = num_elems - 1;

    match &output.target {
        TxOutTarget::ToKey { key } => {
            let mut pubkey = [0_u8; 32];
            pubkey.copy_from_slice(key.as_bytes());
            tables.output_keys.append(
                txn,
                &global_oi,
                &OutputData {
                    pubkey,
                    unlock_time,
                    height: counters.height,
                },
            )?;
        }
        _ => {
            return Err(RuntimeError::SchemaViolation(
                "wrong output type: expected txout_to_key",
            ))
        }
    }

    counters.num_outputs += 1;
    Ok((amount_oi, global_oi))
}

//---------------------------------------------------------------------------------------------------- `add_amount_and_global_output_indices()`
/// Store a transaction's `[amount output index, global output index]`
/// pairs as one flat array under its dense id.
///
#[doc = doc_add_block_inner_invariant!()]
#[doc = doc_error!()]
pub(crate) fn add_amount_and_global_output_indices(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    tx_id: TxId,
    amount_output_indices: &[u64],
    global_output_indices: &[u64],
) -> Result<(), RuntimeError> {
    let mut paired_indices = Vec::with_capacity(amount_output_indices.len() * 2);
    for (amount_oi, global_oi) in amount_output_indices.iter().zip(global_output_indices) {
        paired_indices.push(*amount_oi);
        paired_indices.push(*global_oi);
    }

    tables
        .tx_outputs
        .append(txn, &tx_id, &StorableVec(paired_indices))
}

//---------------------------------------------------------------------------------------------------- `get_amount_and_global_output_indices()`
/// The amount output indices and global output indices of a
/// transaction's outputs, in output order.
///
#[doc = doc_error!()]
pub(crate) fn get_amount_and_global_output_indices<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    tx_id: TxId,
) -> Result<(Vec<AmountIndex>, Vec<GlobalOutputIndex>), RuntimeError> {
    let Some(paired_indices) = tables.tx_outputs.get_opt(txn, &tx_id)? else {
        // Even a transaction without outputs has an (empty) entry.
        warn!(tx_id, "unexpected: no amount and global indices stored in tx_outputs");
        return Ok((Vec::new(), Vec::new()));
    };

    if paired_indices.len() % 2 != 0 {
        return Err(RuntimeError::SchemaViolation(
            "tx_outputs entry does not hold an even number of indices",
        ));
    }

    let mut amount_output_indices = Vec::with_capacity(paired_indices.len() / 2);
    let mut global_output_indices = Vec::with_capacity(paired_indices.len() / 2);
    for pair in paired_indices.chunks_exact(2) {
        amount_output_indices.push(pair[0]);
        global_output_indices.push(pair[1]);
    }

    Ok((amount_output_indices, global_output_indices))
}

/// The amount output indices of a transaction's outputs.
#[doc = doc_error!()]
#[inline]
pub(crate) fn get_tx_amount_output_indices<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    tx_id: TxId,
) -> Result<Vec<AmountIndex>, RuntimeError> {
    Ok(get_amount_and_global_output_indices(txn, tables, tx_id)?.0)
}

//---------------------------------------------------------------------------------------------------- `remove_output()`
/// Remove one output from every output index.
///
#[doc = doc_add_block_inner_invariant!()]
#[doc = doc_error!()]
pub(crate) fn remove_output(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    counters: &mut Counters,
    global_oi: GlobalOutputIndex,
    amount: Amount,
) -> Result<(), RuntimeError> {
    // Missing entries here mean an earlier partial write slipped
    // through a commit, which must not stop the unwind.
    for result in [
        tables.output_indices.delete(txn, &global_oi),
        tables.output_txs.delete(txn, &global_oi),
        tables.output_keys.delete(txn, &global_oi),
    ] {
        match result {
            Ok(()) => (),
            Err(RuntimeError::KeyNotFound) => {
                warn!(global_oi, "unexpected: global output index not found while removing");
            }
            Err(e) => return Err(e),
        }
    }

    remove_amount_output_index(txn, tables, amount, global_oi)?;

    counters.num_outputs -= 1;
    Ok(())
}

/// Remove one `(amount -> global output index)` duplicate.
///
/// Removals happen in LIFO order during block unwinds, so the engine's
/// exact-value duplicate delete lands on the newest duplicate.
///
/// # Errors
/// [`RuntimeError::OutputNotFound`] if that duplicate does not exist.
#[doc = doc_add_block_inner_invariant!()]
pub(crate) fn remove_amount_output_index(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    amount: Amount,
    global_oi: GlobalOutputIndex,
) -> Result<(), RuntimeError> {
    match tables.output_amounts.delete_dup(txn, &amount, &global_oi) {
        Err(RuntimeError::KeyNotFound) => Err(RuntimeError::OutputNotFound),
        result => result,
    }
}

//---------------------------------------------------------------------------------------------------- `get_output_*`
/// An output's key data, by global output index.
///
/// # Errors
/// [`RuntimeError::OutputNotFound`] if the output does not exist.
#[inline]
pub(crate) fn get_output_key<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    global_oi: GlobalOutputIndex,
) -> Result<OutputData, RuntimeError> {
    match tables.output_keys.get(txn, &global_oi) {
        Err(RuntimeError::KeyNotFound) => Err(RuntimeError::OutputNotFound),
        result => result,
    }
}

/// An output's owning transaction hash and local index,
/// by global output index.
///
/// # Errors
/// [`RuntimeError::OutputNotFound`] if the output does not exist.
pub(crate) fn get_output_tx_and_index_from_global<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    global_oi: GlobalOutputIndex,
) -> Result<(TxHash, u64), RuntimeError> {
    let tx_hash = match tables.output_txs.get(txn, &global_oi) {
        Err(RuntimeError::KeyNotFound) => return Err(RuntimeError::OutputNotFound),
        result => result?,
    };
    let local_index = match tables.output_indices.get(txn, &global_oi) {
        Err(RuntimeError::KeyNotFound) => return Err(RuntimeError::OutputNotFound),
        result => result?,
    };

    Ok((tx_hash, local_index))
}

/// Number of outputs carrying a given clear amount.
///
/// An amount never seen returns `0`, not an error.
#[doc = doc_error!()]
#[inline]
pub(crate) fn get_num_outputs<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    amount: Amount,
) -> Result<u64, RuntimeError> {
    tables.output_amounts.dup_count(txn, &amount)
}

//---------------------------------------------------------------------------------------------------- `get_output_global_indices()`
/// Map per-amount output offsets to global output indices.
///
/// This is the hot path for ring-signature decoy selection, so it
/// works on the duplicate pages directly. Two strategies:
///
/// - offsets all `<= 1`: seek the duplicate list and step
/// - otherwise: iterate forward a fixed-size duplicate *page* at a
///   time (`GET_MULTIPLE`/`NEXT_MULTIPLE`); when the first requested
///   offset lies past the midpoint, jump to the last page and walk
///   backward with `PREV_MULTIPLE` until the containing page is found
///
/// Offsets must be ascending for the forward iteration to amortize to
/// one pass over the pages. An offset past the end truncates the
/// result; partial results are permitted.
///
/// # Errors
/// [`RuntimeError::OutputNotFound`] if `amount` has no outputs at all.
pub(crate) fn get_output_global_indices<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    amount: Amount,
    offsets: &[u64],
) -> Result<Vec<GlobalOutputIndex>, RuntimeError> {
    let mut global_indices = Vec::with_capacity(offsets.len());
    let Some(max) = offsets.iter().copied().max() else {
        return Ok(global_indices);
    };

    let cursor = txn.open_ro_cursor(tables.output_amounts.inner())?;
    let key = amount.to_ne_bytes();
    match cursor.get(Some(&key), None, lmdb_sys::MDB_SET) {
        Ok(_) => (),
        Err(lmdb::Error::NotFound) => return Err(RuntimeError::OutputNotFound),
        Err(e) => return Err(e.into()),
    }

    let num_elems = tables.output_amounts.dup_count(txn, &amount)?;

    if max <= 1 {
        for &index in offsets {
            if index >= num_elems {
                debug!(index, num_elems, "offset past end, returning partial results");
                break;
            }

            cursor.get(None, None, lmdb_sys::MDB_FIRST_DUP)?;
            for _ in 0..index {
                cursor.get(None, None, lmdb_sys::MDB_NEXT_DUP)?;
            }

            let (_, value) = cursor.get(None, None, lmdb_sys::MDB_GET_CURRENT)?;
            global_indices.push(<u64 as Storable>::from_bytes(value));
        }
    } else {
        // `blockstart` is the first list index inside the current page,
        // `curcount` the first one past it.
        let mut curcount: u64 = 0;
        let mut blockstart: u64 = 0;
        let mut page: &[u8] = &[];

        'offsets: for &index in offsets {
            if index >= num_elems {
                debug!(index, num_elems, "offset past end, returning partial results");
                break;
            }

            if curcount == 0 && index > num_elems / 2 {
                // First offset is past the midpoint: jump to the last
                // duplicate and step back/forward once, which clears the
                // cursor's end-of-data state and lands it on a page
                // boundary near the end.
                let _ = cursor.get(None, None, lmdb_sys::MDB_LAST_DUP);
                let _ = cursor.get(None, None, lmdb_sys::MDB_PREV);
                let _ = cursor.get(None, None, lmdb_sys::MDB_NEXT);
                let (_, mut value) = cursor.get(None, None, lmdb_sys::MDB_GET_MULTIPLE)?;

                curcount = num_elems;
                loop {
                    let count = (value.len() / DUP_WIDTH) as u64;
                    curcount -= count;
                    if curcount > index {
                        value = cursor.get(None, None, lmdb_sys::MDB_PREV_MULTIPLE)?.1;
                    } else {
                        blockstart = curcount;
                        curcount += count;
                        page = value;
                        break;
                    }
                }
            } else {
                while index >= curcount {
                    let op = if curcount == 0 {
                        lmdb_sys::MDB_GET_MULTIPLE
                    } else {
                        lmdb_sys::MDB_NEXT_MULTIPLE
                    };

                    match cursor.get(None, None, op) {
                        Ok((_, value)) => {
                            blockstart = curcount;
                            curcount += (value.len() / DUP_WIDTH) as u64;
                            page = value;
                        }
                        Err(lmdb::Error::NotFound) => {
                            debug!(index, "no more pages, returning partial results");
                            break 'offsets;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            let byte_index = ((index - blockstart) as usize) * DUP_WIDTH;
            let global_oi = <u64 as Storable>::from_bytes(&page[byte_index..byte_index + DUP_WIDTH]);
            global_indices.push(global_oi);
        }
    }

    Ok(global_indices)
}

/// Singleton form of [`get_output_global_indices`].
///
/// # Errors
/// [`RuntimeError::OutputNotFound`] if `amount` has
/// fewer than `index + 1` outputs.
pub(crate) fn get_output_global_index<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    amount: Amount,
    index: AmountIndex,
) -> Result<GlobalOutputIndex, RuntimeError> {
    let global_indices = get_output_global_indices(txn, tables, amount, &[index])?;
    global_indices
        .first()
        .copied()
        .ok_or(RuntimeError::OutputNotFound)
}

/// Bulk form of [`get_output_key`] by `(amount, offset)` pairs.
///
/// Truncates like [`get_output_global_indices`] does.
#[doc = doc_error!()]
pub(crate) fn get_output_keys<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
    amount: Amount,
    offsets: &[u64],
) -> Result<Vec<OutputData>, RuntimeError> {
    get_output_global_indices(txn, tables, amount, offsets)?
        .into_iter()
        .map(|global_oi| get_output_key(txn, tables, global_oi))
        .collect()
}

//---------------------------------------------------------------------------------------------------- `for_all_outputs()`
/// Walk every output in `(amount, global output index)` order.
///
/// `f` receives `(amount, owning tx hash, local output index)`;
/// returning `false` stops the walk and the same `false` is returned.
#[doc = doc_error!()]
pub(crate) fn for_all_outputs<Tx, F>(
    txn: &Tx,
    tables: &Tables,
    mut f: F,
) -> Result<bool, RuntimeError>
where
    Tx: Transaction,
    F: FnMut(Amount, &TxHash, u64) -> bool,
{
    // The per-output `(tx hash, local index)` fetch dominates the cost
    // of this walk; a joined layout would change the on-disk format.
    tables.output_amounts.for_each(txn, |amount, global_oi| {
        let (tx_hash, local_index) = get_output_tx_and_index_from_global(txn, tables, global_oi)?;
        Ok(f(amount, &tx_hash, local_index))
    })
}
