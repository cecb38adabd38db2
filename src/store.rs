//! The blockchain store; `BlockchainDb` & `BatchWriter`.
//!
//! [`BlockchainDb`] owns the environment, the table handles, and the
//! cached global counters, and exposes the full read/write surface:
//! block append/pop, transaction/output/key-image lookup, hard-fork
//! metadata, and the batched write path.
//!
//! # Scheduling model
//! Single writer, many concurrent readers. Readers take `&self` and a
//! snapshot read transaction per top-level call; writers serialize on
//! an internal lock (the engine serializes cross-process writers on
//! its own). A [`BatchWriter`] holds the writer lock for its whole
//! lifetime, so batched and non-batched writes cannot interleave.
//!
//! # Counters
//! `height`/`num_txs`/`num_outputs` are cached in memory and re-derived
//! from the store at open. Write paths work on a private copy and
//! publish it only after a successful commit: readers never observe
//! mid-write values, and every error path trivially leaves the
//! published counters at the last committed state.

//---------------------------------------------------------------------------------------------------- Import
use std::{
    num::NonZeroUsize,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};

use lmdb::Transaction as LmdbTransaction;
use monero::{blockdata::transaction::KeyImage, Block, BlockHeader, Hash, Transaction};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    constants::{
        DATABASE_DATA_FILENAME, DATABASE_LOCK_FILENAME, DATABASE_VERSION,
    },
    env::Env,
    error::{InitError, RuntimeError},
    ops,
    tables::Tables,
    transaction::TxRw,
    types::{Amount, AmountIndex, BlockHeight, GlobalOutputIndex, OutputData, TxId},
};

//---------------------------------------------------------------------------------------------------- Constants
/// How often (in blocks) the non-batch write path runs
/// the percentage-based resize check.
const RESIZE_CHECK_INTERVAL: u64 = 1000;

/// Minimum map increase for a batch resize.
///
/// Avoids frequent resizes when the batch
/// is a very small number of blocks.
const BATCH_MIN_INCREASE_SIZE: usize = 512 * (1 << 20);

/// Margin multiplied onto the per-block estimate; batches
/// tend to contain "reasonable" block size increases.
const BATCH_SAFETY_FACTOR: f64 = 1.7;

/// Estimate of a stored block expanded from its raw blob,
/// including denormalization across the index tables and
/// engine overhead. This does not grow linearly with block size.
const BATCH_DB_EXPAND_FACTOR: f64 = 4.5;

/// Bigger safety margin on smaller batch sizes.
const BATCH_MIN_FUDGE_FACTOR: f64 = 5000.0;

/// How many recent blocks feed the average-block-size estimate.
const BATCH_NUM_PREV_BLOCKS: u64 = 500;

/// Floor for the average block size used in batch estimation.
const BATCH_MIN_BLOCK_SIZE: u64 = 4 * 1024;

//---------------------------------------------------------------------------------------------------- Counters
/// The in-memory global counters.
///
/// Derived caches of the dense tables' entry counts;
/// see the module docs for the publish discipline.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    /// Number of blocks (== entries in `blocks`).
    pub(crate) height: u64,
    /// Number of transactions (== entries in `tx_indices`).
    pub(crate) num_txs: u64,
    /// Number of outputs (== entries in `output_indices`).
    pub(crate) num_outputs: u64,
}

//---------------------------------------------------------------------------------------------------- BlockchainDb
/// The persistent block-and-transaction store.
///
/// See the [module docs](self) for the concurrency model.
pub struct BlockchainDb {
    /// The database environment (map, gate, config).
    env: Env,
    /// The opened sub-database handles.
    tables: Tables,

    /// Cached chain height. Readers may use this
    /// directly; it tracks committed state only.
    height: AtomicU64,
    /// Cached transaction count.
    num_txs: AtomicU64,
    /// Cached output count.
    num_outputs: AtomicU64,

    /// Bytes of blocks added since the last batch estimate.
    cum_size: AtomicU64,
    /// Blocks added since the last batch estimate.
    cum_count: AtomicU64,

    /// Serializes in-process writers.
    write_lock: Mutex<()>,
}

//---------------------------------------------------------------------------------------------------- Lifecycle
impl BlockchainDb {
    /// Open (or create) the store under `config.db_directory`.
    ///
    /// # Errors
    /// - [`InitError::IncompatibleVersion`] when the stored version
    ///   exceeds [`DATABASE_VERSION`]; delete the store and resync
    /// - [`InitError::Corrupt`] when stored records don't
    ///   match this library's schema
    /// - [`InitError::Io`]/[`InitError::Open`] on environment failures
    pub fn open(config: Config) -> Result<Self, InitError> {
        let read_only = config.read_only;

        let env = Env::open(config)?;
        let tables = Tables::open(env.inner(), !read_only)?;

        // Grow the map right away if it is already nearly full.
        if !read_only && matches!(env.need_resize(0), Ok(true)) {
            info!("memory map needs a resize at open, doing that now");
            if let Err(e) = env.resize_map(None) {
                warn!(error = %e, "resize at open failed, continuing");
            }
        }

        let (counters, version) = {
            let tx_ro = env.tx_ro()?;
            let counters = ops::blockchain::counters_from_tables(&*tx_ro, &tables)?;
            let version = ops::property::get_db_version(&*tx_ro, &tables)?;

            // A store from a different schema revision stores
            // differently-sized output records; refuse it instead
            // of misreading it.
            if counters.num_outputs > 0 {
                let raw = tx_ro
                    .get(tables.output_keys.inner(), &0_u64.to_ne_bytes())
                    .map_err(|_| InitError::Corrupt)?;
                if raw.len() != std::mem::size_of::<OutputData>() {
                    return Err(InitError::Corrupt);
                }
            }

            (counters, version)
        };

        if let Some(found) = version {
            if found > DATABASE_VERSION {
                return Err(InitError::IncompatibleVersion {
                    found,
                    supported: DATABASE_VERSION,
                });
            }
        }

        // Only write the version on an empty store.
        if !read_only && counters.height == 0 {
            let mut tx_rw = env.tx_rw()?;
            ops::property::set_db_version(&mut tx_rw, &tables, DATABASE_VERSION)?;
            tx_rw.commit()?;
        }

        info!(
            height = counters.height,
            num_txs = counters.num_txs,
            num_outputs = counters.num_outputs,
            "opened blockchain store",
        );

        Ok(Self {
            env,
            tables,
            height: AtomicU64::new(counters.height),
            num_txs: AtomicU64::new(counters.num_txs),
            num_outputs: AtomicU64::new(counters.num_outputs),
            cum_size: AtomicU64::new(0),
            cum_count: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        })
    }

    /// Close the store, syncing it to disk.
    ///
    /// Dropping the store does the same; a live [`BatchWriter`]
    /// borrows the store and must be committed or aborted first.
    pub fn close(self) {
        drop(self);
    }

    /// Force a durable flush to disk, even when the store was
    /// opened with deferred-sync flags.
    ///
    /// # Errors
    /// [`RuntimeError::Durability`] when the flush fails.
    pub fn sync(&self) -> Result<(), RuntimeError> {
        self.env.sync()
    }

    /// Drop all data from every sub-database,
    /// leaving an empty (versioned) store.
    #[doc = include_str!("../doc/write_errors.md")]
    pub fn reset(&self) -> Result<(), RuntimeError> {
        let _guard = self.lock_writer();

        let mut tx_rw = self.env.tx_rw()?;
        self.tables.clear_all(&mut tx_rw)?;
        ops::property::set_db_version(&mut tx_rw, &self.tables, DATABASE_VERSION)?;
        tx_rw.commit()?;

        self.publish_counters(Counters::default());
        self.cum_size.store(0, Ordering::Relaxed);
        self.cum_count.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Was the store opened read-only?
    pub fn is_read_only(&self) -> bool {
        self.env.config().read_only
    }

    /// The files backing this store (data file, lock file).
    pub fn get_filenames(&self) -> Vec<PathBuf> {
        let dir = self.env.config().db_directory();
        vec![
            dir.join(DATABASE_DATA_FILENAME),
            dir.join(DATABASE_LOCK_FILENAME),
        ]
    }

    /// The current size of the memory map, in bytes.
    ///
    /// # Errors
    /// Engine errors only.
    pub fn map_size(&self) -> Result<usize, RuntimeError> {
        self.env.current_map_size()
    }
}

impl Drop for BlockchainDb {
    fn drop(&mut self) {
        if !self.is_read_only() {
            if let Err(e) = self.env.sync() {
                warn!(error = %e, "failed to sync the database on close");
            }
        }
    }
}

//---------------------------------------------------------------------------------------------------- Internal helpers
impl BlockchainDb {
    /// Take the in-process writer lock.
    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        // A poisoned lock means a writer panicked mid-path with the
        // transaction already aborted; the published counters are
        // still the committed ones, so continuing is sound.
        match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Snapshot the published counters.
    fn load_counters(&self) -> Counters {
        Counters {
            height: self.height.load(Ordering::Relaxed),
            num_txs: self.num_txs.load(Ordering::Relaxed),
            num_outputs: self.num_outputs.load(Ordering::Relaxed),
        }
    }

    /// Publish counters after a successful commit.
    fn publish_counters(&self, counters: Counters) {
        self.height.store(counters.height, Ordering::Relaxed);
        self.num_txs.store(counters.num_txs, Ordering::Relaxed);
        self.num_outputs
            .store(counters.num_outputs, Ordering::Relaxed);
    }

    /// The estimated on-disk cost of the next `batch_num_blocks` blocks.
    ///
    /// Prefers the sizes accumulated since the last estimate (consuming
    /// them), falling back to the last [`BATCH_NUM_PREV_BLOCKS`] stored
    /// block sizes, floored at [`BATCH_MIN_BLOCK_SIZE`].
    fn get_estimated_batch_size(&self, batch_num_blocks: u64) -> Result<u64, RuntimeError> {
        let mut batch_fudge_factor = BATCH_SAFETY_FACTOR * batch_num_blocks as f64;

        let height = self.height.load(Ordering::Relaxed);
        let cum_count = self.cum_count.load(Ordering::Relaxed);

        let avg_block_size = if height == 0 {
            debug!("no existing blocks to check for average block size");
            0
        } else if cum_count > 0 {
            let cum_size = self.cum_size.swap(0, Ordering::Relaxed);
            self.cum_count.store(0, Ordering::Relaxed);
            debug!(cum_count, "averaging block size across recent batch blocks");
            cum_size / cum_count
        } else {
            let block_stop = height - 1;
            let block_start = block_stop.saturating_sub(BATCH_NUM_PREV_BLOCKS - 1);

            let tx_ro = self.env.tx_ro()?;
            let mut total_block_size = 0;
            let mut num_blocks_used = 0;
            for block_num in block_start..=block_stop {
                total_block_size +=
                    ops::block::get_block_info(&*tx_ro, &self.tables, block_num)?.size;
                num_blocks_used += 1;
            }
            debug!(num_blocks_used, "averaging block size across recent stored blocks");
            total_block_size / num_blocks_used
        };

        let avg_block_size = avg_block_size.max(BATCH_MIN_BLOCK_SIZE);

        if batch_fudge_factor < BATCH_MIN_FUDGE_FACTOR {
            batch_fudge_factor = BATCH_MIN_FUDGE_FACTOR;
        }

        Ok((avg_block_size as f64 * BATCH_DB_EXPAND_FACTOR * batch_fudge_factor) as u64)
    }

    /// Size-based resize check, run before a batch transaction begins.
    fn check_and_resize_for_batch(&self, batch_num_blocks: u64) -> Result<(), RuntimeError> {
        let mut threshold_size = 0;
        let mut increase_size = 0;

        if batch_num_blocks > 0 {
            threshold_size = self.get_estimated_batch_size(batch_num_blocks)?;
            debug!(threshold_size, "calculated batch size");

            // The greater of the estimate and a fixed minimum, so tiny
            // batches don't cause a resize per batch.
            increase_size = usize::try_from(threshold_size)
                .unwrap_or(usize::MAX)
                .max(BATCH_MIN_INCREASE_SIZE);
            debug!(increase_size, "batch resize increase");
        }

        // `threshold_size == 0` falls back to the
        // percentage-based trigger.
        if self.env.need_resize(threshold_size)? {
            info!("memory map resize needed before batch");
            self.env.resize_map(NonZeroUsize::new(increase_size))?;
        }

        Ok(())
    }
}

//---------------------------------------------------------------------------------------------------- Write path
impl BlockchainDb {
    /// Append a block to the chain.
    ///
    /// `txs` are the block's non-miner transactions in `tx_hashes`
    /// order; the miner transaction comes from the block itself.
    /// Transaction hashes and key images are extracted here, the
    /// block hash is the caller's (it is not recomputed).
    ///
    /// Returns the height the block was stored at.
    ///
    /// Every [`RESIZE_CHECK_INTERVAL`] blocks, the percentage-based
    /// resize check runs before the write transaction opens.
    #[doc = include_str!("../doc/write_errors.md")]
    ///
    /// # Errors (schema)
    /// - [`RuntimeError::BlockExists`]: duplicate block hash
    /// - [`RuntimeError::ParentMismatch`]: `prev_id` is not the tip
    /// - [`RuntimeError::TxExists`] / [`RuntimeError::KeyImageExists`]
    /// - [`RuntimeError::SchemaViolation`]: non-`txout_to_key` output,
    ///   or `txs` not matching the block's hash list
    pub fn add_block(
        &self,
        block: &Block,
        block_size: u64,
        cumulative_difficulty: u64,
        generated_coins: u64,
        block_hash: &Hash,
        txs: &[Transaction],
    ) -> Result<BlockHeight, RuntimeError> {
        let _guard = self.lock_writer();
        let mut counters = self.load_counters();

        // For batch mode, the resize check runs
        // at the start of the batch instead.
        if counters.height % RESIZE_CHECK_INTERVAL == 0 && self.env.need_resize(0)? {
            info!("memory map needs a resize, doing that now");
            self.env.resize_map(None)?;
        }

        let mut tx_rw = self.env.tx_rw()?;
        ops::block::add_block(
            &mut tx_rw,
            &self.tables,
            &mut counters,
            block,
            block_size,
            cumulative_difficulty,
            generated_coins,
            &block_hash.0,
            txs,
        )?;
        tx_rw.commit()?;

        self.publish_counters(counters);
        self.cum_size.fetch_add(block_size, Ordering::Relaxed);
        self.cum_count.fetch_add(1, Ordering::Relaxed);

        Ok(counters.height - 1)
    }

    /// Pop the top block off the chain, unwinding everything it
    /// created in reverse schema order.
    ///
    /// Returns the popped block and its non-miner transactions
    /// in block order.
    #[doc = include_str!("../doc/write_errors.md")]
    ///
    /// # Errors (schema)
    /// [`RuntimeError::BlockNotFound`] when the chain is empty.
    pub fn pop_block(&self) -> Result<(Block, Vec<Transaction>), RuntimeError> {
        let _guard = self.lock_writer();
        let mut counters = self.load_counters();

        let mut tx_rw = self.env.tx_rw()?;
        let popped = pop_block_inner(&mut tx_rw, &self.tables, &mut counters)?;
        tx_rw.commit()?;

        self.publish_counters(counters);
        Ok(popped)
    }

    /// Mark a key image as spent, outside of any block.
    #[doc = include_str!("../doc/write_errors.md")]
    ///
    /// # Errors (schema)
    /// [`RuntimeError::KeyImageExists`] when already marked.
    pub fn add_spent_key(&self, key_image: &KeyImage) -> Result<(), RuntimeError> {
        let _guard = self.lock_writer();
        let mut tx_rw = self.env.tx_rw()?;
        ops::key_image::add_spent_key(&mut tx_rw, &self.tables, &key_image.image.0)?;
        tx_rw.commit()
    }

    /// Un-mark a spent key image. Removing an
    /// unmarked image is a no-op, not an error.
    #[doc = include_str!("../doc/write_errors.md")]
    pub fn remove_spent_key(&self, key_image: &KeyImage) -> Result<(), RuntimeError> {
        let _guard = self.lock_writer();
        let mut tx_rw = self.env.tx_rw()?;
        ops::key_image::remove_spent_key(&mut tx_rw, &self.tables, &key_image.image.0)?;
        tx_rw.commit()
    }

    /// Record the first height a hard-fork version applies at.
    #[doc = include_str!("../doc/write_errors.md")]
    pub fn set_hard_fork_starting_height(
        &self,
        version: u8,
        height: BlockHeight,
    ) -> Result<(), RuntimeError> {
        let _guard = self.lock_writer();
        let mut tx_rw = self.env.tx_rw()?;
        ops::hard_fork::set_hard_fork_starting_height(&mut tx_rw, &self.tables, version, height)?;
        tx_rw.commit()
    }

    /// Record (or remap) the hard-fork version in effect at a height.
    #[doc = include_str!("../doc/write_errors.md")]
    pub fn set_hard_fork_version(
        &self,
        height: BlockHeight,
        version: u8,
    ) -> Result<(), RuntimeError> {
        let _guard = self.lock_writer();
        let mut tx_rw = self.env.tx_rw()?;
        ops::hard_fork::set_hard_fork_version(&mut tx_rw, &self.tables, height, version)?;
        tx_rw.commit()
    }

    /// Clear the hard-fork tables if they disagree with the block
    /// tables, letting the upstream hard-fork logic repopulate them.
    #[doc = include_str!("../doc/write_errors.md")]
    pub fn check_hard_fork_info(&self) -> Result<(), RuntimeError> {
        let _guard = self.lock_writer();
        let mut tx_rw = self.env.tx_rw()?;
        ops::hard_fork::check_hard_fork_info(&mut tx_rw, &self.tables)?;
        tx_rw.commit()
    }

    /// Drop all hard-fork data.
    #[doc = include_str!("../doc/write_errors.md")]
    pub fn drop_hard_fork_info(&self) -> Result<(), RuntimeError> {
        let _guard = self.lock_writer();
        let mut tx_rw = self.env.tx_rw()?;
        ops::hard_fork::drop_hard_fork_info(&mut tx_rw, &self.tables)?;
        tx_rw.commit()
    }

    /// Start a batched write: one long-lived write transaction
    /// amortizing commit cost across many blocks.
    ///
    /// The memory map is pre-sized for `batch_num_blocks` upcoming
    /// blocks *before* the transaction opens (a resize is unsafe
    /// while any transaction is live).
    ///
    /// The returned [`BatchWriter`] holds the writer lock; drop,
    /// [`commit`](BatchWriter::commit) or [`abort`](BatchWriter::abort)
    /// it to release.
    ///
    /// # Errors
    /// [`RuntimeError::TxnStart`] and engine errors from the resize check.
    pub fn batch_start(&self, batch_num_blocks: u64) -> Result<BatchWriter<'_>, RuntimeError> {
        let guard = self.lock_writer();

        self.check_and_resize_for_batch(batch_num_blocks)?;

        let txn = self.env.tx_rw()?;
        debug!(batch_num_blocks, "batch transaction: begin");

        Ok(BatchWriter {
            db: self,
            counters: self.load_counters(),
            txn: Some(txn),
            _write_guard: guard,
        })
    }
}

//---------------------------------------------------------------------------------------------------- Read path
impl BlockchainDb {
    /// The chain height (number of blocks).
    ///
    /// Served from the cached counter; tracks committed state.
    pub fn height(&self) -> BlockHeight {
        self.height.load(Ordering::Relaxed)
    }

    /// Total number of transactions stored.
    pub fn get_tx_count(&self) -> u64 {
        self.num_txs.load(Ordering::Relaxed)
    }

    /// Does a block with this hash exist?
    ///
    /// # Errors
    /// Engine errors only; a miss is `Ok(false)`.
    pub fn block_exists(&self, block_hash: &Hash) -> Result<bool, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::block::block_exists(&*tx_ro, &self.tables, &block_hash.0)
    }

    /// A block's height, by hash.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_height(&self, block_hash: &Hash) -> Result<BlockHeight, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::block::get_block_height(&*tx_ro, &self.tables, &block_hash.0)
    }

    /// A parsed block, by hash.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block(&self, block_hash: &Hash) -> Result<Block, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        let height = ops::block::get_block_height(&*tx_ro, &self.tables, &block_hash.0)?;
        ops::block::get_block_from_height(&*tx_ro, &self.tables, height)
    }

    /// A parsed block, by height.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_from_height(&self, height: BlockHeight) -> Result<Block, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::block::get_block_from_height(&*tx_ro, &self.tables, height)
    }

    /// A block's serialized blob, by hash.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_blob(&self, block_hash: &Hash) -> Result<Vec<u8>, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        let height = ops::block::get_block_height(&*tx_ro, &self.tables, &block_hash.0)?;
        ops::block::get_block_blob_from_height(&*tx_ro, &self.tables, height)
    }

    /// A block's serialized blob, by height.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_blob_from_height(&self, height: BlockHeight) -> Result<Vec<u8>, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::block::get_block_blob_from_height(&*tx_ro, &self.tables, height)
    }

    /// A block's header, by hash.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_header(&self, block_hash: &Hash) -> Result<BlockHeader, RuntimeError> {
        Ok(self.get_block(block_hash)?.header)
    }

    /// A block's timestamp, by height.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_timestamp(&self, height: BlockHeight) -> Result<u64, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        Ok(ops::block::get_block_info(&*tx_ro, &self.tables, height)?.timestamp)
    }

    /// The top block's timestamp.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] when the chain is empty.
    pub fn get_top_block_timestamp(&self) -> Result<u64, RuntimeError> {
        match self.height() {
            0 => Err(RuntimeError::BlockNotFound),
            height => self.get_block_timestamp(height - 1),
        }
    }

    /// A block's size in bytes, by height.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_size(&self, height: BlockHeight) -> Result<u64, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        Ok(ops::block::get_block_info(&*tx_ro, &self.tables, height)?.size)
    }

    /// The chain's cumulative difficulty at a height.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_cumulative_difficulty(
        &self,
        height: BlockHeight,
    ) -> Result<u64, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        Ok(ops::block::get_block_info(&*tx_ro, &self.tables, height)?.cumulative_difficulty)
    }

    /// A single block's difficulty: the cumulative difficulty at its
    /// height minus the one below it (or itself, at height 0).
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_difficulty(&self, height: BlockHeight) -> Result<u64, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        let cumulative =
            ops::block::get_block_info(&*tx_ro, &self.tables, height)?.cumulative_difficulty;
        let previous = if height == 0 {
            0
        } else {
            ops::block::get_block_info(&*tx_ro, &self.tables, height - 1)?.cumulative_difficulty
        };
        Ok(cumulative - previous)
    }

    /// The total coins generated as of a height.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_already_generated_coins(
        &self,
        height: BlockHeight,
    ) -> Result<u64, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        Ok(ops::block::get_block_info(&*tx_ro, &self.tables, height)?.cumulative_generated_coins)
    }

    /// A block's hash, by height.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] on a miss.
    pub fn get_block_hash_from_height(&self, height: BlockHeight) -> Result<Hash, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        Ok(Hash(
            ops::block::get_block_info(&*tx_ro, &self.tables, height)?.block_hash,
        ))
    }

    /// The blocks in heights `[start, end]`, inclusive.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] if any height in the range misses.
    pub fn get_blocks_range(
        &self,
        start: BlockHeight,
        end: BlockHeight,
    ) -> Result<Vec<Block>, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        (start..=end)
            .map(|height| ops::block::get_block_from_height(&*tx_ro, &self.tables, height))
            .collect()
    }

    /// The block hashes in heights `[start, end]`, inclusive.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] if any height in the range misses.
    pub fn get_hashes_range(
        &self,
        start: BlockHeight,
        end: BlockHeight,
    ) -> Result<Vec<Hash>, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        (start..=end)
            .map(|height| {
                Ok(Hash(
                    ops::block::get_block_info(&*tx_ro, &self.tables, height)?.block_hash,
                ))
            })
            .collect()
    }

    /// The top block's hash.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] when the chain is empty.
    pub fn top_block_hash(&self) -> Result<Hash, RuntimeError> {
        match self.height() {
            0 => Err(RuntimeError::BlockNotFound),
            height => self.get_block_hash_from_height(height - 1),
        }
    }

    /// The top block.
    ///
    /// # Errors
    /// [`RuntimeError::BlockNotFound`] when the chain is empty.
    pub fn get_top_block(&self) -> Result<Block, RuntimeError> {
        match self.height() {
            0 => Err(RuntimeError::BlockNotFound),
            height => self.get_block_from_height(height - 1),
        }
    }

    /// Does a transaction with this hash exist?
    ///
    /// # Errors
    /// Engine errors only; a miss is `Ok(false)`.
    pub fn tx_exists(&self, tx_hash: &Hash) -> Result<bool, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::tx::tx_exists(&*tx_ro, &self.tables, &tx_hash.0)
    }

    /// A transaction's dense id, by hash.
    ///
    /// # Errors
    /// [`RuntimeError::TxNotFound`] on a miss.
    pub fn get_tx_index(&self, tx_hash: &Hash) -> Result<TxId, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        Ok(ops::tx::get_tx_data(&*tx_ro, &self.tables, &tx_hash.0)?.tx_id)
    }

    /// A parsed transaction, by hash.
    ///
    /// # Errors
    /// [`RuntimeError::TxNotFound`] on a miss.
    pub fn get_tx(&self, tx_hash: &Hash) -> Result<Transaction, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::tx::get_tx(&*tx_ro, &self.tables, &tx_hash.0)
    }

    /// A transaction's serialized blob, by hash.
    ///
    /// # Errors
    /// [`RuntimeError::TxNotFound`] on a miss.
    pub fn get_tx_blob(&self, tx_hash: &Hash) -> Result<Vec<u8>, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::tx::get_tx_blob(&*tx_ro, &self.tables, &tx_hash.0)
    }

    /// A transaction's unlock time (height), by hash.
    ///
    /// # Errors
    /// [`RuntimeError::TxNotFound`] on a miss.
    pub fn get_tx_unlock_time(&self, tx_hash: &Hash) -> Result<u64, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        Ok(ops::tx::get_tx_data(&*tx_ro, &self.tables, &tx_hash.0)?.unlock_time)
    }

    /// The height of the block holding a transaction, by hash.
    ///
    /// # Errors
    /// [`RuntimeError::TxNotFound`] on a miss.
    pub fn get_tx_block_height(&self, tx_hash: &Hash) -> Result<BlockHeight, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        Ok(ops::tx::get_tx_data(&*tx_ro, &self.tables, &tx_hash.0)?.height)
    }

    /// The transactions for all of `tx_hashes`.
    ///
    /// # Errors
    /// [`RuntimeError::TxNotFound`] if any hash misses.
    pub fn get_tx_list(&self, tx_hashes: &[Hash]) -> Result<Vec<Transaction>, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        tx_hashes
            .iter()
            .map(|tx_hash| ops::tx::get_tx(&*tx_ro, &self.tables, &tx_hash.0))
            .collect()
    }

    /// Number of outputs carrying a clear amount.
    /// An amount never seen returns `0`.
    ///
    /// # Errors
    /// Engine errors only.
    pub fn get_num_outputs(&self, amount: Amount) -> Result<u64, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::output::get_num_outputs(&*tx_ro, &self.tables, amount)
    }

    /// An output's key data, by `(amount, amount output index)`.
    ///
    /// # Errors
    /// [`RuntimeError::OutputNotFound`] on a miss.
    pub fn get_output_key(
        &self,
        amount: Amount,
        index: AmountIndex,
    ) -> Result<OutputData, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        let global_oi = ops::output::get_output_global_index(&*tx_ro, &self.tables, amount, index)?;
        ops::output::get_output_key(&*tx_ro, &self.tables, global_oi)
    }

    /// An output's key data, by global output index.
    ///
    /// # Errors
    /// [`RuntimeError::OutputNotFound`] on a miss.
    pub fn get_output_key_from_global(
        &self,
        global_oi: GlobalOutputIndex,
    ) -> Result<OutputData, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::output::get_output_key(&*tx_ro, &self.tables, global_oi)
    }

    /// Bulk [`BlockchainDb::get_output_key`] over
    /// ascending per-amount offsets. Truncates like
    /// [`BlockchainDb::get_output_global_indices`].
    ///
    /// # Errors
    /// [`RuntimeError::OutputNotFound`] if `amount` has no outputs.
    pub fn get_output_keys(
        &self,
        amount: Amount,
        offsets: &[u64],
    ) -> Result<Vec<OutputData>, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::output::get_output_keys(&*tx_ro, &self.tables, amount, offsets)
    }

    /// An output's owning transaction hash and local index,
    /// by global output index.
    ///
    /// # Errors
    /// [`RuntimeError::OutputNotFound`] on a miss.
    pub fn get_output_tx_and_index_from_global(
        &self,
        global_oi: GlobalOutputIndex,
    ) -> Result<(Hash, u64), RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        let (tx_hash, local_index) =
            ops::output::get_output_tx_and_index_from_global(&*tx_ro, &self.tables, global_oi)?;
        Ok((Hash(tx_hash), local_index))
    }

    /// An output's owning transaction hash and local index,
    /// by `(amount, amount output index)`.
    ///
    /// # Errors
    /// [`RuntimeError::OutputNotFound`] on a miss.
    pub fn get_output_tx_and_index(
        &self,
        amount: Amount,
        index: AmountIndex,
    ) -> Result<(Hash, u64), RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        let global_oi = ops::output::get_output_global_index(&*tx_ro, &self.tables, amount, index)?;
        let (tx_hash, local_index) =
            ops::output::get_output_tx_and_index_from_global(&*tx_ro, &self.tables, global_oi)?;
        Ok((Hash(tx_hash), local_index))
    }

    /// A transaction's amount output indices, by dense id.
    ///
    /// # Errors
    /// Engine errors only; a transaction without outputs yields an
    /// empty list.
    pub fn get_tx_amount_output_indices(&self, tx_id: TxId) -> Result<Vec<u64>, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::output::get_tx_amount_output_indices(&*tx_ro, &self.tables, tx_id)
    }

    /// A transaction's amount and global output indices, by dense id.
    ///
    /// # Errors
    /// Engine errors only.
    pub fn get_amount_and_global_output_indices(
        &self,
        tx_id: TxId,
    ) -> Result<(Vec<u64>, Vec<u64>), RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::output::get_amount_and_global_output_indices(&*tx_ro, &self.tables, tx_id)
    }

    /// Map ascending per-amount offsets to global output indices.
    ///
    /// This is the ring-signature decoy selection hot path; see the
    /// strategy notes on the underlying scan in [`crate::ops::output`].
    /// Offsets past the end truncate the result.
    ///
    /// # Errors
    /// [`RuntimeError::OutputNotFound`] if `amount` has no outputs.
    pub fn get_output_global_indices(
        &self,
        amount: Amount,
        offsets: &[u64],
    ) -> Result<Vec<GlobalOutputIndex>, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::output::get_output_global_indices(&*tx_ro, &self.tables, amount, offsets)
    }

    /// Singleton form of [`BlockchainDb::get_output_global_indices`].
    ///
    /// # Errors
    /// [`RuntimeError::OutputNotFound`] on a miss.
    pub fn get_output_global_index(
        &self,
        amount: Amount,
        index: AmountIndex,
    ) -> Result<GlobalOutputIndex, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::output::get_output_global_index(&*tx_ro, &self.tables, amount, index)
    }

    /// Is this key image marked spent?
    ///
    /// # Errors
    /// Engine errors only; a miss is `Ok(false)`.
    pub fn has_key_image(&self, key_image: &KeyImage) -> Result<bool, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::key_image::has_key_image(&*tx_ro, &self.tables, &key_image.image.0)
    }

    /// The first height a hard-fork version applies at,
    /// or `u64::MAX` if it never started.
    ///
    /// # Errors
    /// Engine errors only.
    pub fn get_hard_fork_starting_height(&self, version: u8) -> Result<u64, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::hard_fork::get_hard_fork_starting_height(&*tx_ro, &self.tables, version)
    }

    /// The hard-fork version in effect at a height.
    ///
    /// # Errors
    /// [`RuntimeError::KeyNotFound`] when the height has no record.
    pub fn get_hard_fork_version(&self, height: BlockHeight) -> Result<u8, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        ops::hard_fork::get_hard_fork_version(&*tx_ro, &self.tables, height)
    }
}

//---------------------------------------------------------------------------------------------------- Enumerators
impl BlockchainDb {
    /// Walk every spent key image in key order.
    ///
    /// `f` returning `false` stops the walk; the same `false` is returned.
    ///
    /// # Errors
    /// Engine errors only.
    pub fn for_all_key_images<F>(&self, mut f: F) -> Result<bool, RuntimeError>
    where
        F: FnMut(&KeyImage) -> bool,
    {
        let tx_ro = self.env.tx_ro()?;
        ops::key_image::for_all_key_images(&*tx_ro, &self.tables, |key_image| {
            f(&KeyImage {
                image: Hash(*key_image),
            })
        })
    }

    /// Walk every block in height order, as
    /// `(height, block hash, block)`.
    ///
    /// `f` returning `false` stops the walk; the same `false` is returned.
    ///
    /// # Errors
    /// Engine errors; [`RuntimeError::Encoding`] on a corrupt blob.
    pub fn for_all_blocks<F>(&self, mut f: F) -> Result<bool, RuntimeError>
    where
        F: FnMut(BlockHeight, &Hash, &Block) -> bool,
    {
        let tx_ro = self.env.tx_ro()?;
        ops::block::for_all_blocks(&*tx_ro, &self.tables, |height, block_hash, block| {
            f(height, &Hash(*block_hash), block)
        })
    }

    /// Walk every transaction in hash order, as `(tx hash, tx)`.
    ///
    /// `f` returning `false` stops the walk; the same `false` is returned.
    ///
    /// # Errors
    /// Engine errors; [`RuntimeError::Encoding`] on a corrupt blob.
    pub fn for_all_transactions<F>(&self, mut f: F) -> Result<bool, RuntimeError>
    where
        F: FnMut(&Hash, &Transaction) -> bool,
    {
        let tx_ro = self.env.tx_ro()?;
        ops::tx::for_all_transactions(&*tx_ro, &self.tables, |tx_hash, tx| {
            f(&Hash(*tx_hash), tx)
        })
    }

    /// Walk every output in `(amount, global index)` order, as
    /// `(amount, owning tx hash, local output index)`.
    ///
    /// `f` returning `false` stops the walk; the same `false` is returned.
    ///
    /// # Errors
    /// Engine errors only.
    pub fn for_all_outputs<F>(&self, mut f: F) -> Result<bool, RuntimeError>
    where
        F: FnMut(Amount, &Hash, u64) -> bool,
    {
        let tx_ro = self.env.tx_ro()?;
        ops::output::for_all_outputs(&*tx_ro, &self.tables, |amount, tx_hash, local_index| {
            f(amount, &Hash(*tx_hash), local_index)
        })
    }
}

//---------------------------------------------------------------------------------------------------- BatchWriter
/// A batched write: one long-lived write transaction
/// held across many block inserts.
///
/// Obtained from [`BlockchainDb::batch_start`], which is the only way
/// to enter batch mode. Per-block writes go straight into the batch
/// transaction; nothing is durable until [`BatchWriter::commit`].
///
/// Committing consumes the writer: a finished batch cannot be resumed,
/// start a new one for further batched writes. Dropping the writer
/// (or [`BatchWriter::abort`]) rolls everything back.
///
/// A failed per-block write leaves that block's partial mutations in
/// the (uncommitted) transaction; the caller should abort the batch
/// rather than commit after an error.
pub struct BatchWriter<'db> {
    /// The owning store.
    db: &'db BlockchainDb,
    /// Working copy of the counters; published on commit.
    counters: Counters,
    /// The batch transaction. `Some` until commit/abort.
    txn: Option<TxRw<'db>>,
    /// Holds out other writers for the batch's lifetime.
    _write_guard: MutexGuard<'db, ()>,
}

impl BatchWriter<'_> {
    /// Append a block to the chain, within the batch transaction.
    ///
    /// Same contract as [`BlockchainDb::add_block`], minus the resize
    /// check (the map was pre-sized when the batch started).
    ///
    /// # Errors
    /// As [`BlockchainDb::add_block`]; on error the in-memory counters
    /// are restored, the batch transaction is left to the caller.
    pub fn add_block(
        &mut self,
        block: &Block,
        block_size: u64,
        cumulative_difficulty: u64,
        generated_coins: u64,
        block_hash: &Hash,
        txs: &[Transaction],
    ) -> Result<BlockHeight, RuntimeError> {
        let snapshot = self.counters;
        let txn = self.txn.as_mut().expect("batch transaction already consumed");

        match ops::block::add_block(
            txn,
            &self.db.tables,
            &mut self.counters,
            block,
            block_size,
            cumulative_difficulty,
            generated_coins,
            &block_hash.0,
            txs,
        ) {
            Ok(()) => {
                self.db.cum_size.fetch_add(block_size, Ordering::Relaxed);
                self.db.cum_count.fetch_add(1, Ordering::Relaxed);
                Ok(self.counters.height - 1)
            }
            Err(e) => {
                self.counters = snapshot;
                Err(e)
            }
        }
    }

    /// Pop the top block, within the batch transaction.
    ///
    /// Same contract as [`BlockchainDb::pop_block`].
    ///
    /// # Errors
    /// As [`BlockchainDb::pop_block`]; on error the in-memory counters
    /// are restored, the batch transaction is left to the caller.
    pub fn pop_block(&mut self) -> Result<(Block, Vec<Transaction>), RuntimeError> {
        let snapshot = self.counters;
        let txn = self.txn.as_mut().expect("batch transaction already consumed");

        match pop_block_inner(txn, &self.db.tables, &mut self.counters) {
            Ok(popped) => Ok(popped),
            Err(e) => {
                self.counters = snapshot;
                Err(e)
            }
        }
    }

    /// The height the next [`BatchWriter::add_block`] will store at.
    pub fn height(&self) -> BlockHeight {
        self.counters.height
    }

    /// Commit the batch, making every write durable and
    /// publishing the counters.
    ///
    /// # Errors
    /// [`RuntimeError::Durability`]; nothing was published, all
    /// batched writes are rolled back.
    pub fn commit(mut self) -> Result<(), RuntimeError> {
        let txn = self
            .txn
            .take()
            .expect("batch transaction already consumed");

        debug!("batch transaction: committing");
        txn.commit()?;

        self.db.publish_counters(self.counters);
        debug!("batch transaction: committed");
        Ok(())
    }

    /// Abort the batch, rolling back every batched write.
    ///
    /// Dropping the writer does the same.
    pub fn abort(mut self) {
        if let Some(txn) = self.txn.take() {
            txn.abort();
        }
        debug!("batch transaction: aborted");
    }
}

//---------------------------------------------------------------------------------------------------- Free functions
/// Unwind the top block under an open write transaction.
///
/// Reverse schema order: each non-miner transaction (newest first),
/// then the miner transaction, each removing its outputs newest-first;
/// the block tables are cleared up front while the block is in hand.
fn pop_block_inner(
    txn: &mut lmdb::RwTransaction<'_>,
    tables: &Tables,
    counters: &mut Counters,
) -> Result<(Block, Vec<Transaction>), RuntimeError> {
    if counters.height == 0 {
        return Err(RuntimeError::BlockNotFound);
    }
    let height = counters.height - 1;

    let block = ops::block::get_block_from_height(&*txn, tables, height)?;
    ops::block::remove_block(txn, tables, counters)?;

    let mut txs = Vec::with_capacity(block.tx_hashes.len());
    for tx_hash in block.tx_hashes.iter().rev() {
        txs.push(ops::tx::remove_transaction(
            txn, tables, counters, &tx_hash.0,
        )?);
    }
    ops::tx::remove_transaction(txn, tables, counters, &ops::tx::tx_hash(&block.miner_tx))?;

    counters.height -= 1;

    // Removal walked the transactions newest-first;
    // hand them back in block order.
    txs.reverse();
    Ok((block, txs))
}

//---------------------------------------------------------------------------------------------------- Test helpers
#[cfg(test)]
impl BlockchainDb {
    /// The entry count of every table, for test assertions.
    pub(crate) fn table_lens(&self) -> Result<crate::tests::AssertTableLen, RuntimeError> {
        let tx_ro = self.env.tx_ro()?;
        let t = &self.tables;
        Ok(crate::tests::AssertTableLen {
            blocks: t.blocks.len(&*tx_ro)?,
            block_info: t.block_infos.len(&*tx_ro)?,
            block_heights: t.block_heights.len(&*tx_ro)?,
            txs: t.txs.len(&*tx_ro)?,
            tx_indices: t.tx_indices.len(&*tx_ro)?,
            tx_outputs: t.tx_outputs.len(&*tx_ro)?,
            output_txs: t.output_txs.len(&*tx_ro)?,
            output_indices: t.output_indices.len(&*tx_ro)?,
            output_keys: t.output_keys.len(&*tx_ro)?,
            output_amounts: t.output_amounts.len(&*tx_ro)?,
            spent_keys: t.spent_keys.len(&*tx_ro)?,
            hf_starting_heights: t.hf_starting_heights.len(&*tx_ro)?,
            hf_versions: t.hf_versions.len(&*tx_ro)?,
            properties: t.properties.len(&*tx_ro)?,
        })
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
#[allow(clippy::too_many_lines)]
mod test {
    use lmdb::Transaction as _;
    use monero::Hash;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::Config,
        tests::{
            dummy_block, dummy_block_hash, dummy_tx, push_blocks, tmp_blockchain_db,
            tmp_blockchain_db_config, AssertTableLen,
        },
    };

    /// A `KeyImage` from a byte pattern.
    fn key_image(byte: u8) -> KeyImage {
        KeyImage {
            image: Hash([byte; 32]),
        }
    }

    #[test]
    fn open_empty_store() {
        let (db, _tmp) = tmp_blockchain_db();

        assert_eq!(db.height(), 0);
        assert_eq!(db.get_tx_count(), 0);
        assert!(!db.is_read_only());
        assert_eq!(db.get_filenames().len(), 2);

        // An amount never inserted is 0, not an error.
        assert_eq!(db.get_num_outputs(10).unwrap(), 0);

        assert!(matches!(
            db.top_block_hash(),
            Err(RuntimeError::BlockNotFound)
        ));
        assert!(matches!(db.pop_block(), Err(RuntimeError::BlockNotFound)));

        // Only the version property exists.
        AssertTableLen {
            properties: 1,
            ..Default::default()
        }
        .assert(&db);

        db.sync().unwrap();
    }

    /// Insert genesis with one coinbase output of amount 10;
    /// everything must be reachable through every index.
    #[test]
    fn genesis_block() {
        let (db, _tmp) = tmp_blockchain_db();

        let (block, block_hash) = dummy_block(0, Hash([0; 32]), &[10], &[]);
        let blob = monero::consensus::serialize(&block);

        let height = db
            .add_block(&block, blob.len() as u64, 2, 1_000, &block_hash, &[])
            .unwrap();
        assert_eq!(height, 0);
        assert_eq!(db.height(), 1);
        assert_eq!(db.get_tx_count(), 1);

        AssertTableLen {
            blocks: 1,
            block_info: 1,
            block_heights: 1,
            txs: 1,
            tx_indices: 1,
            tx_outputs: 1,
            output_txs: 1,
            output_indices: 1,
            output_keys: 1,
            output_amounts: 1,
            properties: 1,
            ..Default::default()
        }
        .assert(&db);

        // Block reads, by height and by hash.
        assert!(db.block_exists(&block_hash).unwrap());
        assert_eq!(db.get_block_height(&block_hash).unwrap(), 0);
        assert_eq!(db.get_block_from_height(0).unwrap(), block);
        assert_eq!(db.get_block(&block_hash).unwrap(), block);
        assert_eq!(db.get_block_blob_from_height(0).unwrap(), blob);
        assert_eq!(db.get_block_blob(&block_hash).unwrap(), blob);
        assert_eq!(db.get_block_header(&block_hash).unwrap(), block.header);
        assert_eq!(db.get_block_hash_from_height(0).unwrap(), block_hash);
        assert_eq!(db.top_block_hash().unwrap(), block_hash);
        assert_eq!(db.get_top_block().unwrap(), block);
        assert_eq!(db.get_block_timestamp(0).unwrap(), 1_500_000_000);
        assert_eq!(db.get_top_block_timestamp().unwrap(), 1_500_000_000);
        assert_eq!(db.get_block_size(0).unwrap(), blob.len() as u64);
        assert_eq!(db.get_block_cumulative_difficulty(0).unwrap(), 2);
        assert_eq!(db.get_block_difficulty(0).unwrap(), 2);
        assert_eq!(db.get_block_already_generated_coins(0).unwrap(), 1_000);
        assert_eq!(db.get_blocks_range(0, 0).unwrap(), vec![block.clone()]);
        assert_eq!(db.get_hashes_range(0, 0).unwrap(), vec![block_hash]);

        // Transaction reads.
        let miner_tx_hash = ops::tx::tx_hash(&block.miner_tx);
        let miner_tx_hash = Hash(miner_tx_hash);
        assert!(db.tx_exists(&miner_tx_hash).unwrap());
        assert_eq!(db.get_tx(&miner_tx_hash).unwrap(), block.miner_tx);
        assert_eq!(
            db.get_tx_blob(&miner_tx_hash).unwrap(),
            monero::consensus::serialize(&block.miner_tx),
        );
        assert_eq!(db.get_tx_block_height(&miner_tx_hash).unwrap(), 0);
        assert_eq!(db.get_tx_unlock_time(&miner_tx_hash).unwrap(), 0);
        assert_eq!(db.get_tx_index(&miner_tx_hash).unwrap(), 0);
        assert_eq!(
            db.get_tx_list(&[miner_tx_hash]).unwrap(),
            vec![block.miner_tx.clone()],
        );
        assert!(matches!(
            db.get_tx(&Hash([0xFE; 32])),
            Err(RuntimeError::TxNotFound)
        ));

        // Output reads.
        assert_eq!(db.get_num_outputs(10).unwrap(), 1);
        assert_eq!(db.get_output_global_index(10, 0).unwrap(), 0);
        assert_eq!(db.get_output_tx_and_index(10, 0).unwrap(), (miner_tx_hash, 0));
        assert_eq!(
            db.get_output_tx_and_index_from_global(0).unwrap(),
            (miner_tx_hash, 0),
        );
        assert_eq!(db.get_tx_amount_output_indices(0).unwrap(), vec![0]);
        assert_eq!(
            db.get_amount_and_global_output_indices(0).unwrap(),
            (vec![0], vec![0]),
        );

        let output_data = db.get_output_key(10, 0).unwrap();
        assert_eq!(output_data, db.get_output_key_from_global(0).unwrap());
        assert_eq!(output_data.height, 0);
        assert_eq!(output_data.unlock_time, 0);
        assert_eq!(
            db.get_output_keys(10, &[0]).unwrap(),
            vec![output_data],
        );
    }

    /// `add_block` then `pop_block` must leave the store
    /// exactly at its pre-insert state.
    #[test]
    fn add_pop_roundtrip() {
        let (db, _tmp) = tmp_blockchain_db();
        push_blocks(&db, 1, 1, 2, 7);

        let before = AssertTableLen::current(&db);
        let height_before = db.height();
        let tx_count_before = db.get_tx_count();

        let height = db.height();
        let txs = vec![dummy_tx(height, &[7, 7, 9], 0, 1)];
        let (block, block_hash) = dummy_block(height, db.top_block_hash().unwrap(), &[3], &txs);
        let blob = monero::consensus::serialize(&block);

        db.add_block(&block, blob.len() as u64, 4, 2_000, &block_hash, &txs)
            .unwrap();
        assert_eq!(db.height(), height_before + 1);
        assert_ne!(before, AssertTableLen::current(&db));

        let (popped_block, popped_txs) = db.pop_block().unwrap();
        assert_eq!(popped_block, block);
        assert_eq!(popped_txs, txs);

        assert_eq!(db.height(), height_before);
        assert_eq!(db.get_tx_count(), tx_count_before);
        before.assert(&db);
        assert!(!db.block_exists(&block_hash).unwrap());
    }

    /// A duplicate block hash is rejected with zero net mutation.
    #[test]
    fn duplicate_block_rejected() {
        let (db, _tmp) = tmp_blockchain_db();
        push_blocks(&db, 1, 0, 0, 0);

        let before = AssertTableLen::current(&db);

        // Same hash, claiming to sit on the tip.
        let (mut block, block_hash) = dummy_block(0, Hash([0; 32]), &[], &[]);
        block.header.prev_id = dummy_block_hash(0);
        assert!(matches!(
            db.add_block(&block, 100, 4, 0, &block_hash, &[]),
            Err(RuntimeError::BlockExists)
        ));

        assert_eq!(db.height(), 1);
        before.assert(&db);
    }

    /// A block whose `prev_id` is not the tip is rejected
    /// with zero net mutation.
    #[test]
    fn parent_mismatch_rejected() {
        let (db, _tmp) = tmp_blockchain_db();
        push_blocks(&db, 2, 0, 0, 0);

        let before = AssertTableLen::current(&db);

        // Parent exists but is not the tip.
        let (block, block_hash) = dummy_block(2, dummy_block_hash(0), &[], &[]);
        assert!(matches!(
            db.add_block(&block, 100, 6, 0, &block_hash, &[]),
            Err(RuntimeError::ParentMismatch)
        ));

        // Parent does not exist at all.
        let (block, block_hash) = dummy_block(2, Hash([0xAB; 32]), &[], &[]);
        assert!(matches!(
            db.add_block(&block, 100, 6, 0, &block_hash, &[]),
            Err(RuntimeError::ParentMismatch)
        ));

        assert_eq!(db.height(), 2);
        before.assert(&db);
    }

    /// A duplicate transaction inside a new block aborts the
    /// whole block insert with zero net mutation.
    #[test]
    fn duplicate_tx_rejected() {
        let (db, _tmp) = tmp_blockchain_db();

        let txs = vec![dummy_tx(0, &[5], 0, 1)];
        let (block, block_hash) = dummy_block(0, Hash([0; 32]), &[], &txs);
        db.add_block(&block, 100, 2, 0, &block_hash, &txs).unwrap();

        let before = AssertTableLen::current(&db);

        // Same transaction again in the next block.
        let dup_txs = vec![dummy_tx(0, &[5], 0, 1)];
        let (block2, block2_hash) = dummy_block(1, block_hash, &[], &dup_txs);
        assert!(matches!(
            db.add_block(&block2, 100, 4, 0, &block2_hash, &dup_txs),
            Err(RuntimeError::TxExists)
        ));

        assert_eq!(db.height(), 1);
        assert_eq!(db.get_tx_count(), 2);
        before.assert(&db);
    }

    /// Spent key images: strict existence set with
    /// no-op removal of missing entries.
    #[test]
    fn spent_key_images() {
        let (db, _tmp) = tmp_blockchain_db();
        let k = key_image(0x11);

        assert!(!db.has_key_image(&k).unwrap());
        db.add_spent_key(&k).unwrap();
        assert!(db.has_key_image(&k).unwrap());

        // Double-add is an error.
        assert!(matches!(
            db.add_spent_key(&k),
            Err(RuntimeError::KeyImageExists)
        ));

        db.remove_spent_key(&k).unwrap();
        assert!(!db.has_key_image(&k).unwrap());

        // Removing again is a no-op, not an error.
        db.remove_spent_key(&k).unwrap();

        // Enumeration, in key order, with early stop.
        db.add_spent_key(&key_image(0x22)).unwrap();
        db.add_spent_key(&key_image(0x33)).unwrap();

        let mut seen = Vec::new();
        assert!(db
            .for_all_key_images(|ki| {
                seen.push(ki.image.0[0]);
                true
            })
            .unwrap());
        assert_eq!(seen, vec![0x22, 0x33]);

        let mut count = 0;
        assert!(!db
            .for_all_key_images(|_| {
                count += 1;
                false
            })
            .unwrap());
        assert_eq!(count, 1);
    }

    /// Batch-insert 500 blocks with 2 txs of 3 outputs (amount 1)
    /// each, then exercise the bulk amount-output scan on all of its
    /// strategies (step, forward pages, backward jump, truncation).
    #[test]
    fn batch_500_blocks_and_bulk_scan() {
        let (db, _tmp) = tmp_blockchain_db();

        {
            let mut batch = db.batch_start(500).unwrap();
            let mut prev_id = Hash([0; 32]);
            for height in 0..500 {
                let txs: Vec<Transaction> = (1..=2)
                    .map(|i| dummy_tx(height, &[1, 1, 1], 0, i))
                    .collect();
                let (block, block_hash) = dummy_block(height, prev_id, &[], &txs);
                let blob_len = monero::consensus::serialize(&block).len() as u64;

                assert_eq!(batch.height(), height);
                let stored = batch
                    .add_block(&block, blob_len, (height + 1) * 2, 0, &block_hash, &txs)
                    .unwrap();
                assert_eq!(stored, height);

                prev_id = block_hash;
            }

            // Nothing is visible before the batch commits.
            assert_eq!(db.height(), 0);
            batch.commit().unwrap();
        }

        assert_eq!(db.height(), 500);
        assert_eq!(db.get_tx_count(), 1500); // 500 miner + 1000
        assert_eq!(db.get_num_outputs(1).unwrap(), 3000);

        // All outputs share one amount, so global index == amount index.
        assert_eq!(
            db.get_output_global_indices(1, &[0, 1, 2999]).unwrap(),
            vec![0, 1, 2999],
        );

        // Small-offset strategy.
        assert_eq!(db.get_output_global_indices(1, &[0, 1]).unwrap(), vec![0, 1]);

        // Backward jump: first offset past the midpoint.
        assert_eq!(db.get_output_global_indices(1, &[2999]).unwrap(), vec![2999]);
        assert_eq!(db.get_output_global_indices(1, &[1501]).unwrap(), vec![1501]);

        // Forward pages across the whole list.
        let all: Vec<u64> = (0..3000).collect();
        assert_eq!(db.get_output_global_indices(1, &all).unwrap(), all);

        // Out-of-range offsets truncate.
        assert_eq!(
            db.get_output_global_indices(1, &[2998, 5000]).unwrap(),
            vec![2998],
        );
        assert_eq!(db.get_output_global_indices(1, &[]).unwrap(), vec![]);

        // Unknown amounts error on the bulk path...
        assert!(matches!(
            db.get_output_global_indices(123, &[0]),
            Err(RuntimeError::OutputNotFound)
        ));
        // ...but count as zero.
        assert_eq!(db.get_num_outputs(123).unwrap(), 0);

        // Difficulty is the delta of cumulative difficulties.
        assert_eq!(db.get_block_difficulty(0).unwrap(), 2);
        assert_eq!(db.get_block_difficulty(499).unwrap(), 2);
        assert_eq!(db.get_block_cumulative_difficulty(499).unwrap(), 1000);

        // Range reads.
        assert_eq!(db.get_blocks_range(0, 499).unwrap().len(), 500);
        let hashes = db.get_hashes_range(498, 499).unwrap();
        assert_eq!(hashes, vec![dummy_block_hash(498), dummy_block_hash(499)]);

        // Bulk output keys follow the same index mapping.
        let keys = db.get_output_keys(1, &[0, 2999]).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], db.get_output_key(1, 0).unwrap());
        assert_eq!(keys[1], db.get_output_key(1, 2999).unwrap());

        // Enumerators.
        let mut output_count = 0;
        assert!(db
            .for_all_outputs(|amount, _tx_hash, _local_index| {
                assert_eq!(amount, 1);
                output_count += 1;
                true
            })
            .unwrap());
        assert_eq!(output_count, 3000);

        let mut block_count = 0;
        assert!(!db
            .for_all_blocks(|height, hash, _block| {
                assert_eq!(*hash, dummy_block_hash(height));
                block_count += 1;
                block_count < 10
            })
            .unwrap());
        assert_eq!(block_count, 10);

        let mut tx_count = 0;
        assert!(db
            .for_all_transactions(|hash, tx| {
                assert_eq!(*hash, Hash(ops::tx::tx_hash(tx)));
                tx_count += 1;
                true
            })
            .unwrap());
        assert_eq!(tx_count, 1500);

        // Popping one block unwinds exactly 6 outputs.
        db.pop_block().unwrap();
        assert_eq!(db.height(), 499);
        assert_eq!(db.get_tx_count(), 1497);
        assert_eq!(db.get_num_outputs(1).unwrap(), 2994);
    }

    /// An aborted (or dropped) batch leaves no trace.
    #[test]
    fn batch_abort_discards_everything() {
        let (db, _tmp) = tmp_blockchain_db();

        {
            let mut batch = db.batch_start(10).unwrap();
            let mut prev_id = Hash([0; 32]);
            for height in 0..3 {
                let (block, block_hash) = dummy_block(height, prev_id, &[2], &[]);
                batch
                    .add_block(&block, 100, height + 1, 0, &block_hash, &[])
                    .unwrap();
                prev_id = block_hash;
            }
            batch.abort();
        }
        assert_eq!(db.height(), 0);

        {
            let mut batch = db.batch_start(10).unwrap();
            let (block, block_hash) = dummy_block(0, Hash([0; 32]), &[2], &[]);
            batch.add_block(&block, 100, 1, 0, &block_hash, &[]).unwrap();
            // Dropped without commit.
        }
        assert_eq!(db.height(), 0);
        assert_eq!(db.get_tx_count(), 0);

        AssertTableLen {
            properties: 1,
            ..Default::default()
        }
        .assert(&db);
    }

    /// A failed insert inside a batch restores the working counters;
    /// the batch itself stays usable for the caller to abort.
    #[test]
    fn batch_error_restores_counters() {
        let (db, _tmp) = tmp_blockchain_db();

        let mut batch = db.batch_start(10).unwrap();
        let (block, block_hash) = dummy_block(0, Hash([0; 32]), &[2], &[]);
        batch.add_block(&block, 100, 1, 0, &block_hash, &[]).unwrap();
        assert_eq!(batch.height(), 1);

        // Duplicate hash.
        let (mut block2, _) = dummy_block(0, Hash([0; 32]), &[3], &[]);
        block2.header.prev_id = block_hash;
        assert!(matches!(
            batch.add_block(&block2, 100, 2, 0, &block_hash, &[]),
            Err(RuntimeError::BlockExists)
        ));
        assert_eq!(batch.height(), 1);

        batch.abort();
        assert_eq!(db.height(), 0);
    }

    /// Starting a batch with the map nearly full grows
    /// it by at least the 512 MiB minimum.
    #[test]
    fn batch_resizes_nearly_full_map() {
        let (db, _tmp) = tmp_blockchain_db_config(|config| {
            config.map_size = 8 * (1 << 20);
        });

        let before = db.map_size().unwrap();
        assert!(before < 512 * (1 << 20));

        let batch = db.batch_start(1000).unwrap();
        batch.abort();

        let after = db.map_size().unwrap();
        assert!(
            after - before >= 512 * (1 << 20),
            "map only grew from {before} to {after}",
        );
    }

    /// A store stamped with a future version refuses to open.
    #[test]
    fn incompatible_version_refuses_to_open() {
        let tempdir = tempfile::tempdir().unwrap();
        let config = Config::new(tempdir.path().into());

        // Create a store, then stamp it with a future version.
        drop(BlockchainDb::open(config.clone()).unwrap());
        {
            let env = lmdb::Environment::new()
                .set_max_dbs(20)
                .open(tempdir.path())
                .unwrap();
            let properties = env.open_db(Some("properties")).unwrap();
            let mut txn = env.begin_rw_txn().unwrap();
            txn.put(
                properties,
                &"version".as_bytes(),
                &(DATABASE_VERSION + 1).to_ne_bytes(),
                lmdb::WriteFlags::empty(),
            )
            .unwrap();
            txn.commit().unwrap();
        }

        assert!(matches!(
            BlockchainDb::open(config.clone()),
            Err(InitError::IncompatibleVersion { found, supported })
                if found == DATABASE_VERSION + 1 && supported == DATABASE_VERSION
        ));

        // Stamping the supported version back makes it open again.
        {
            let env = lmdb::Environment::new()
                .set_max_dbs(20)
                .open(tempdir.path())
                .unwrap();
            let properties = env.open_db(Some("properties")).unwrap();
            let mut txn = env.begin_rw_txn().unwrap();
            txn.put(
                properties,
                &"version".as_bytes(),
                &DATABASE_VERSION.to_ne_bytes(),
                lmdb::WriteFlags::empty(),
            )
            .unwrap();
            txn.commit().unwrap();
        }
        drop(BlockchainDb::open(config).unwrap());
    }

    /// `reset` drops every entry and re-stamps the version.
    #[test]
    fn reset_clears_all_tables() {
        let (db, _tmp) = tmp_blockchain_db();
        push_blocks(&db, 3, 1, 2, 4);
        db.add_spent_key(&key_image(0x44)).unwrap();

        db.reset().unwrap();

        assert_eq!(db.height(), 0);
        assert_eq!(db.get_tx_count(), 0);
        assert!(!db.block_exists(&dummy_block_hash(0)).unwrap());
        assert!(!db.has_key_image(&key_image(0x44)).unwrap());
        AssertTableLen {
            properties: 1,
            ..Default::default()
        }
        .assert(&db);

        // The store is still writable after a reset.
        push_blocks(&db, 1, 0, 0, 0);
        assert_eq!(db.height(), 1);
    }

    /// Hard-fork metadata: starting heights, versions, remaps,
    /// and the consistency check.
    #[test]
    fn hard_fork_metadata() {
        let (db, _tmp) = tmp_blockchain_db();

        db.set_hard_fork_starting_height(1, 0).unwrap();
        db.set_hard_fork_starting_height(2, 100).unwrap();
        assert_eq!(db.get_hard_fork_starting_height(1).unwrap(), 0);
        assert_eq!(db.get_hard_fork_starting_height(2).unwrap(), 100);
        assert_eq!(db.get_hard_fork_starting_height(9).unwrap(), u64::MAX);

        for height in 0..5 {
            db.set_hard_fork_version(height, 1).unwrap();
        }
        assert_eq!(db.get_hard_fork_version(4).unwrap(), 1);

        // Remap in place (re-org).
        db.set_hard_fork_version(4, 2).unwrap();
        assert_eq!(db.get_hard_fork_version(4).unwrap(), 2);

        // No blocks are stored, so the consistency
        // check must clear the hard-fork tables.
        db.check_hard_fork_info().unwrap();
        assert_eq!(db.get_hard_fork_starting_height(1).unwrap(), u64::MAX);
        assert!(matches!(
            db.get_hard_fork_version(4),
            Err(RuntimeError::KeyNotFound)
        ));

        db.set_hard_fork_starting_height(1, 0).unwrap();
        db.drop_hard_fork_info().unwrap();
        assert_eq!(db.get_hard_fork_starting_height(1).unwrap(), u64::MAX);
    }

    /// A read-only reopen serves every read and refuses writes.
    #[test]
    fn read_only_reopen() {
        let tempdir = tempfile::tempdir().unwrap();
        let (block, block_hash, blob_len) = {
            let db = BlockchainDb::open(Config::new(tempdir.path().into())).unwrap();
            let (block, block_hash) = dummy_block(0, Hash([0; 32]), &[10], &[]);
            let blob_len = monero::consensus::serialize(&block).len() as u64;
            db.add_block(&block, blob_len, 2, 1_000, &block_hash, &[])
                .unwrap();
            (block, block_hash, blob_len)
        };

        let mut config = Config::new(tempdir.path().into());
        config.read_only = true;
        let db = BlockchainDb::open(config).unwrap();

        assert!(db.is_read_only());
        assert_eq!(db.height(), 1);
        assert_eq!(db.get_block_from_height(0).unwrap(), block);
        assert_eq!(db.get_block_size(0).unwrap(), blob_len);
        assert_eq!(db.get_num_outputs(10).unwrap(), 1);

        let (block1, block1_hash) = dummy_block(1, block_hash, &[], &[]);
        assert!(matches!(
            db.add_block(&block1, 100, 4, 0, &block1_hash, &[]),
            Err(RuntimeError::TxnStart(_))
        ));
    }

    /// Transactions with non-zero unlock times keep them.
    #[test]
    fn unlock_times_round_trip() {
        let (db, _tmp) = tmp_blockchain_db();

        let txs = vec![dummy_tx(0, &[5], 1234, 1)];
        let (block, block_hash) = dummy_block(0, Hash([0; 32]), &[], &txs);
        db.add_block(&block, 100, 2, 0, &block_hash, &txs).unwrap();

        let tx_hash = Hash(ops::tx::tx_hash(&txs[0]));
        assert_eq!(db.get_tx_unlock_time(&tx_hash).unwrap(), 1234);

        let output = db.get_output_key(5, 0).unwrap();
        assert_eq!(output.unlock_time, 1234);
    }
}
