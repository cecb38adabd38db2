//! Chain-wide functions.

//---------------------------------------------------------------------------------------------------- Import
use lmdb::Transaction;

use crate::{error::RuntimeError, ops::macros::doc_error, store::Counters, tables::Tables};

//---------------------------------------------------------------------------------------------------- Free functions
/// Re-derive the in-memory counters from the store.
///
/// The dense primary tables (`blocks`, `txs`, `output_indices`) share
/// their key sets with the hash-keyed ones, so last-key + 1 equals the
/// entry counts the counters cache.
#[doc = doc_error!()]
pub(crate) fn counters_from_tables<Tx: Transaction>(
    txn: &Tx,
    tables: &Tables,
) -> Result<Counters, RuntimeError> {
    let height = tables.blocks.last(txn)?.map_or(0, |(height, _)| height + 1);
    let num_txs = tables.txs.last(txn)?.map_or(0, |(tx_id, _)| tx_id + 1);
    let num_outputs = tables
        .output_indices
        .last(txn)?
        .map_or(0, |(global_oi, _)| global_oi + 1);

    Ok(Counters {
        height,
        num_txs,
        num_outputs,
    })
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    // Exercised end-to-end in `crate::store`'s tests.
}
