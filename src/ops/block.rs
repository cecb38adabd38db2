//! Blocks.

//---------------------------------------------------------------------------------------------------- Import
use lmdb::Transaction as LmdbTransaction;
use monero::{Block, Transaction};

use crate::{
    error::RuntimeError,
    ops::{
        macros::{doc_add_block_inner_invariant, doc_error},
        tx,
    },
    storable::StorableVec,
    store::Counters,
    tables::Tables,
    types::{BlockHash, BlockHeight, BlockInfo},
};

//---------------------------------------------------------------------------------------------------- `add_block()`
/// Append a block and everything in it to the database.
///
/// `txs` are the non-miner transactions, in the block's
/// `tx_hashes` order; the miner transaction is taken from
/// the block itself and inserted first.
///
#[doc = doc_add_block_inner_invariant!()]
///
/// # Errors
/// - [`RuntimeError::BlockExists`] on a duplicate block hash
/// - [`RuntimeError::ParentMismatch`] when `block.prev_id` does not
///   resolve to `height - 1`
/// - [`RuntimeError::SchemaViolation`] when `txs` does not match the
///   block's transaction hash list
#[allow(clippy::too_many_arguments)]
pub(crate) fn add_block(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    counters: &mut Counters,
    block: &Block,
    block_size: u64,
    cumulative_difficulty: u64,
    generated_coins: u64,
    block_hash: &BlockHash,
    txs: &[Transaction],
) -> Result<(), RuntimeError> {
    if tables.block_heights.contains(&*txn, block_hash)? {
        return Err(RuntimeError::BlockExists);
    }

    // The parent must be the current chain tip.
    if counters.height > 0 {
        match tables.block_heights.get_opt(&*txn, &block.header.prev_id.0)? {
            Some(parent_height) if parent_height == counters.height - 1 => (),
            _ => return Err(RuntimeError::ParentMismatch),
        }
    }

    if txs.len() != block.tx_hashes.len() {
        return Err(RuntimeError::SchemaViolation(
            "transaction count does not match the block's tx hash list",
        ));
    }

    let height = counters.height;

    // The primary tables take dense monotone keys, so append-mode
    // inserts apply; the hash index takes a plain put.
    tables.blocks.append(
        txn,
        &height,
        &StorableVec(monero::consensus::serialize(block)),
    )?;
    tables.block_infos.append(
        txn,
        &height,
        &BlockInfo {
            timestamp: block.header.timestamp.0,
            cumulative_generated_coins: generated_coins,
            size: block_size,
            cumulative_difficulty,
            block_hash: *block_hash,
        },
    )?;
    tables.block_heights.put(txn, block_hash, &height)?;

    // Miner transaction first, then the rest in block order.
    let miner_tx_hash = tx::tx_hash(&block.miner_tx);
    tx::add_transaction(txn, tables, counters, block_hash, &block.miner_tx, &miner_tx_hash)?;

    for transaction in txs {
        let tx_hash = tx::tx_hash(transaction);
        tx::add_transaction(txn, tables, counters, block_hash, transaction, &tx_hash)?;
    }

    counters.height += 1;
    Ok(())
}

//---------------------------------------------------------------------------------------------------- `remove_block()`
/// Remove the top block's entries from the block tables.
///
/// Returns the removed height and its metadata record; the caller
/// unwinds the block's transactions with the returned data.
///
#[doc = doc_add_block_inner_invariant!()]
///
/// # Errors
/// [`RuntimeError::BlockNotFound`] when the chain is empty.
pub(crate) fn remove_block(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    counters: &Counters,
) -> Result<(BlockHeight, BlockInfo), RuntimeError> {
    if counters.height == 0 {
        return Err(RuntimeError::BlockNotFound);
    }

    let height = counters.height - 1;
    let block_info = match tables.block_infos.get(&*txn, &height) {
        Err(RuntimeError::KeyNotFound) => return Err(RuntimeError::BlockNotFound),
        result => result?,
    };

    tables.block_heights.delete(txn, &block_info.block_hash)?;
    tables.blocks.delete(txn, &height)?;
    tables.block_infos.delete(txn, &height)?;

    Ok((height, block_info))
}

//---------------------------------------------------------------------------------------------------- `get_block_*`
/// A block's serialized blob, by height.
///
/// # Errors
/// [`RuntimeError::BlockNotFound`] if the height is past the tip.
pub(crate) fn get_block_blob_from_height<Tx: LmdbTransaction>(
    txn: &Tx,
    tables: &Tables,
    height: BlockHeight,
) -> Result<Vec<u8>, RuntimeError> {
    match tables.blocks.get(txn, &height) {
        Err(RuntimeError::KeyNotFound) => Err(RuntimeError::BlockNotFound),
        result => Ok(result?.0),
    }
}

/// A parsed block, by height.
///
/// # Errors
/// [`RuntimeError::BlockNotFound`] if the height is past the tip.
pub(crate) fn get_block_from_height<Tx: LmdbTransaction>(
    txn: &Tx,
    tables: &Tables,
    height: BlockHeight,
) -> Result<Block, RuntimeError> {
    Ok(monero::consensus::deserialize(&get_block_blob_from_height(
        txn, tables, height,
    )?)?)
}

/// A block's metadata record, by height.
///
/// # Errors
/// [`RuntimeError::BlockNotFound`] if the height is past the tip.
pub(crate) fn get_block_info<Tx: LmdbTransaction>(
    txn: &Tx,
    tables: &Tables,
    height: BlockHeight,
) -> Result<BlockInfo, RuntimeError> {
    match tables.block_infos.get(txn, &height) {
        Err(RuntimeError::KeyNotFound) => Err(RuntimeError::BlockNotFound),
        result => result,
    }
}

/// A block's height, by hash.
///
/// # Errors
/// [`RuntimeError::BlockNotFound`] if the hash is unknown.
#[inline]
pub(crate) fn get_block_height<Tx: LmdbTransaction>(
    txn: &Tx,
    tables: &Tables,
    block_hash: &BlockHash,
) -> Result<BlockHeight, RuntimeError> {
    match tables.block_heights.get(txn, block_hash) {
        Err(RuntimeError::KeyNotFound) => Err(RuntimeError::BlockNotFound),
        result => result,
    }
}

/// Does a block with this hash exist?
#[doc = doc_error!()]
#[inline]
pub(crate) fn block_exists<Tx: LmdbTransaction>(
    txn: &Tx,
    tables: &Tables,
    block_hash: &BlockHash,
) -> Result<bool, RuntimeError> {
    tables.block_heights.contains(txn, block_hash)
}

//---------------------------------------------------------------------------------------------------- `for_all_blocks()`
/// Walk every block in height order.
///
/// `f` receives `(height, block hash, block)`; returning `false`
/// stops the walk and the same `false` is returned.
#[doc = doc_error!()]
pub(crate) fn for_all_blocks<Tx, F>(txn: &Tx, tables: &Tables, mut f: F) -> Result<bool, RuntimeError>
where
    Tx: LmdbTransaction,
    F: FnMut(BlockHeight, &BlockHash, &Block) -> bool,
{
    tables.blocks.for_each(txn, |height, block_blob| {
        let block_info = tables.block_infos.get(txn, &height)?;
        let block: Block = monero::consensus::deserialize(&block_blob.0)?;
        Ok(f(height, &block_info.block_hash, &block))
    })
}
