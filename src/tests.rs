//! Utilities for `blockchain-db` testing.
//!
//! These types/fn's are only:
//! - enabled on `#[cfg(test)]`
//! - used internally

//---------------------------------------------------------------------------------------------------- Import
use monero::{
    blockdata::transaction::{RawExtraField, TxOutTarget},
    cryptonote::hash::Hashable,
    util::ringct::RctSig,
    Block, BlockHeader, Hash, PublicKey, Transaction, TransactionPrefix, TxIn, TxOut, VarInt,
};

use crate::{config::Config, store::BlockchainDb};

//---------------------------------------------------------------------------------------------------- Helper functions
/// Create a [`BlockchainDb`] in a temporary directory.
/// The directory is automatically removed after the `TempDir` is dropped.
pub(crate) fn tmp_blockchain_db() -> (BlockchainDb, tempfile::TempDir) {
    let tempdir = tempfile::tempdir().unwrap();
    let db = BlockchainDb::open(Config::new(tempdir.path().into())).unwrap();
    (db, tempdir)
}

/// Same as [`tmp_blockchain_db`] with a tweaked [`Config`].
pub(crate) fn tmp_blockchain_db_config(
    config_fn: impl FnOnce(&mut Config),
) -> (BlockchainDb, tempfile::TempDir) {
    let tempdir = tempfile::tempdir().unwrap();
    let mut config = Config::new(tempdir.path().into());
    config_fn(&mut config);
    let db = BlockchainDb::open(config).unwrap();
    (db, tempdir)
}

/// A deterministic output public key.
pub(crate) fn dummy_pubkey(seed: u8, index: u8) -> PublicKey {
    let mut bytes = [seed; 32];
    bytes[0] = index;
    bytes[31] = seed.wrapping_add(index);
    PublicKey::from_slice(&bytes).unwrap()
}

/// A v1 transaction with a coinbase-style input and
/// one `txout_to_key` output per entry in `amounts`.
///
/// `gen_height` keeps hashes unique across blocks,
/// `seed` across transactions of one block.
pub(crate) fn dummy_tx(gen_height: u64, amounts: &[u64], unlock_time: u64, seed: u8) -> Transaction {
    Transaction {
        prefix: TransactionPrefix {
            version: VarInt(1),
            unlock_time: VarInt(unlock_time),
            inputs: vec![TxIn::Gen {
                height: VarInt(gen_height),
            }],
            outputs: amounts
                .iter()
                .enumerate()
                .map(|(i, &amount)| TxOut {
                    amount: VarInt(amount),
                    target: TxOutTarget::ToKey {
                        key: dummy_pubkey(seed, i as u8).to_bytes(),
                    },
                })
                .collect(),
            extra: RawExtraField(vec![seed]),
        },
        signatures: vec![],
        rct_signatures: RctSig { sig: None, p: None },
    }
}

/// The fabricated hash the store is told block `height` has.
///
/// The store treats block hashes as opaque 32-byte values computed by
/// the validator, so tests can use a recognizable pattern.
pub(crate) fn dummy_block_hash(height: u64) -> Hash {
    let mut bytes = [0xBB_u8; 32];
    bytes[..8].copy_from_slice(&height.to_le_bytes());
    Hash(bytes)
}

/// A block at `height` with a miner transaction carrying
/// `miner_amounts` and the given non-miner transactions.
///
/// Returns the block and its (fabricated) hash.
pub(crate) fn dummy_block(
    height: u64,
    prev_id: Hash,
    miner_amounts: &[u64],
    txs: &[Transaction],
) -> (Block, Hash) {
    let block = Block {
        header: BlockHeader {
            major_version: VarInt(1),
            minor_version: VarInt(0),
            timestamp: VarInt(1_500_000_000 + height),
            prev_id,
            nonce: height as u32,
        },
        miner_tx: dummy_tx(height, miner_amounts, 0, 255),
        tx_hashes: txs.iter().map(Hashable::hash).collect(),
    };

    (block, dummy_block_hash(height))
}

/// Add `count` empty-ish blocks on top of the current tip, each with
/// `txs_per_block` transactions of `outputs_per_tx` outputs of `amount`.
pub(crate) fn push_blocks(
    db: &BlockchainDb,
    count: u64,
    txs_per_block: u64,
    outputs_per_tx: usize,
    amount: u64,
) {
    for _ in 0..count {
        let height = db.height();
        let prev_id = if height == 0 {
            Hash([0; 32])
        } else {
            db.top_block_hash().unwrap()
        };

        let txs: Vec<Transaction> = (0..txs_per_block)
            .map(|i| {
                dummy_tx(
                    height,
                    &vec![amount; outputs_per_tx],
                    0,
                    i as u8 + 1,
                )
            })
            .collect();

        let (block, block_hash) = dummy_block(height, prev_id, &[], &txs);
        let block_size = monero::consensus::serialize(&block).len() as u64;

        db.add_block(
            &block,
            block_size,
            (height + 1) * 2,
            1_000 * (height + 1),
            &block_hash,
            &txs,
        )
        .unwrap();
    }
}

//---------------------------------------------------------------------------------------------------- AssertTableLen
/// Expected entry count of every table; [`AssertTableLen::assert`]
/// compares them all at once for better failure output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct AssertTableLen {
    pub(crate) blocks: u64,
    pub(crate) block_info: u64,
    pub(crate) block_heights: u64,
    pub(crate) txs: u64,
    pub(crate) tx_indices: u64,
    pub(crate) tx_outputs: u64,
    pub(crate) output_txs: u64,
    pub(crate) output_indices: u64,
    pub(crate) output_keys: u64,
    pub(crate) output_amounts: u64,
    pub(crate) spent_keys: u64,
    pub(crate) hf_starting_heights: u64,
    pub(crate) hf_versions: u64,
    pub(crate) properties: u64,
}

impl AssertTableLen {
    /// Assert the store's table lengths all match `self`.
    pub(crate) fn assert(self, db: &BlockchainDb) {
        let other = db.table_lens().unwrap();
        pretty_assertions::assert_eq!(self, other);
    }

    /// The table lengths currently in `db`.
    pub(crate) fn current(db: &BlockchainDb) -> Self {
        db.table_lens().unwrap()
    }
}
