//! The database environment; owns the memory map.
//!
//! [`Env`] wraps the engine environment with:
//! - the transaction gate ([`TxnGate`]) counting live transactions
//! - the online resize protocol (gate new transactions, wait for the
//!   active count to reach zero, grow the map, reopen the gate)
//! - the resize triggers (size-based for batches, randomized
//!   percentage-based otherwise)

//---------------------------------------------------------------------------------------------------- Import
use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use rand::Rng;
use tracing::{debug, info};

use crate::{
    config::Config,
    constants::{DATABASE_DATA_FILENAME, DATABASE_MAX_DBS},
    error::{InitError, RuntimeError},
    transaction::{TxRo, TxRw},
};

//---------------------------------------------------------------------------------------------------- Constants
/// The percentage-based resize trigger is drawn uniformly from this range
/// per check. The randomness decorrelates resize events across a fleet of
/// nodes that would otherwise all hit a fixed threshold at the same block.
const RESIZE_PERCENT_RANGE: std::ops::Range<f64> = 0.6..0.9;

//---------------------------------------------------------------------------------------------------- TxnGate
/// Process-wide transaction accounting.
///
/// Growing the memory map is only safe while no transaction is live, so
/// every transaction holds a [`TxnPermit`] and resizes:
/// 1. close the gate (a single test-and-set flag)
/// 2. spin until the active count reaches zero
/// 3. grow the map
/// 4. reopen the gate
///
/// The spin is acceptable: resizes are rare and the
/// critical section is a single `mdb_env_set_mapsize`.
pub(crate) struct TxnGate {
    /// When set, no new transactions may start.
    creation_gate: AtomicBool,
    /// Number of live transactions.
    num_active_txns: AtomicUsize,
}

impl TxnGate {
    pub(crate) const fn new() -> Self {
        Self {
            creation_gate: AtomicBool::new(false),
            num_active_txns: AtomicUsize::new(0),
        }
    }

    /// Register a new transaction, waiting out any in-progress resize.
    pub(crate) fn enter(&self) -> TxnPermit<'_> {
        loop {
            while self.creation_gate.load(Ordering::Acquire) {
                std::hint::spin_loop();
            }

            self.num_active_txns.fetch_add(1, Ordering::AcqRel);

            // The resizer may have closed the gate between the check and
            // the increment; back out and retry so it sees a zero count.
            if self.creation_gate.load(Ordering::Acquire) {
                self.num_active_txns.fetch_sub(1, Ordering::AcqRel);
                continue;
            }

            return TxnPermit { gate: self };
        }
    }

    /// Stop new transactions from starting.
    pub(crate) fn prevent_new_txns(&self) {
        self.creation_gate.store(true, Ordering::Release);
    }

    /// Spin until every live transaction has finished.
    pub(crate) fn wait_no_active_txns(&self) {
        while self.num_active_txns.load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
        }
    }

    /// Let new transactions start again.
    pub(crate) fn allow_new_txns(&self) {
        self.creation_gate.store(false, Ordering::Release);
    }
}

/// Decrements the active-transaction count on drop.
pub(crate) struct TxnPermit<'env> {
    gate: &'env TxnGate,
}

impl Drop for TxnPermit<'_> {
    fn drop(&mut self) {
        self.gate.num_active_txns.fetch_sub(1, Ordering::AcqRel);
    }
}

//---------------------------------------------------------------------------------------------------- Env
/// The opened database environment.
pub(crate) struct Env {
    /// The memory-mapped environment itself.
    env: lmdb::Environment,
    /// Live transaction accounting for the resize protocol.
    gate: TxnGate,
    /// The configuration we were opened with (and in current use).
    config: Config,
}

impl Env {
    /// Open (or create) the environment under `config.db_directory`.
    pub(crate) fn open(config: Config) -> Result<Self, InitError> {
        if !config.read_only {
            std::fs::create_dir_all(&config.db_directory)?;
        }

        // Set the memory map size to at least the configured
        // size, and at least the current data file size.
        let mut map_size = config.map_size;
        let data_file = config.db_directory.join(DATABASE_DATA_FILENAME);
        if let Ok(metadata) = std::fs::metadata(&data_file) {
            // The file is always a page multiple, so this stays one.
            map_size = map_size.max(metadata.len() as usize);
        }

        let mut flags = config.sync_mode.env_flags();
        if config.read_only {
            flags |= lmdb::EnvironmentFlags::READ_ONLY;
        }

        let env = lmdb::Environment::new()
            .set_max_dbs(DATABASE_MAX_DBS)
            .set_max_readers(config.reader_threads.max_readers())
            .set_map_size(map_size)
            .set_flags(flags)
            .open(&config.db_directory)?;

        info!(
            path = %config.db_directory.display(),
            map_size,
            read_only = config.read_only,
            "opened database environment",
        );

        Ok(Self {
            env,
            gate: TxnGate::new(),
            config,
        })
    }

    /// The raw engine environment, for sub-database opens at startup.
    pub(crate) const fn inner(&self) -> &lmdb::Environment {
        &self.env
    }

    /// The configuration this environment was opened with.
    pub(crate) const fn config(&self) -> &Config {
        &self.config
    }

    /// Start a read-only transaction.
    ///
    /// # Errors
    /// [`RuntimeError::TxnStart`] if the engine cannot open a view.
    pub(crate) fn tx_ro(&self) -> Result<TxRo<'_>, RuntimeError> {
        let permit = self.gate.enter();
        match self.env.begin_ro_txn() {
            Ok(txn) => Ok(TxRo::new(txn, permit)),
            Err(e) => Err(RuntimeError::TxnStart(e)),
        }
    }

    /// Start a read/write transaction.
    ///
    /// # Errors
    /// [`RuntimeError::TxnStart`] if the engine cannot open one
    /// (including when the environment is read-only).
    pub(crate) fn tx_rw(&self) -> Result<TxRw<'_>, RuntimeError> {
        let permit = self.gate.enter();
        match self.env.begin_rw_txn() {
            Ok(txn) => Ok(TxRw::new(txn, permit)),
            Err(e) => Err(RuntimeError::TxnStart(e)),
        }
    }

    /// Force a durable flush, even under deferred-sync flags.
    pub(crate) fn sync(&self) -> Result<(), RuntimeError> {
        self.env.sync(true).map_err(RuntimeError::Durability)
    }

    /// The current size of the memory map, in bytes.
    pub(crate) fn current_map_size(&self) -> Result<usize, RuntimeError> {
        Ok(self.env.info()?.map_size())
    }

    /// Should the map be grown before more data is written?
    ///
    /// With a non-zero `threshold_size` (the batch path) this is a plain
    /// remaining-space check. With zero, the used fraction is compared
    /// against a per-call random threshold in `[0.6, 0.9)`.
    pub(crate) fn need_resize(&self, threshold_size: u64) -> Result<bool, RuntimeError> {
        let info = self.env.info()?;
        let stat = self.env.stat()?;

        let map_size = info.map_size() as u64;
        // Used space excludes data yet to be committed, which is why
        // batches estimate their size up front and pass it in here.
        let size_used = u64::from(stat.page_size()) * info.last_pgno() as u64;

        debug!(
            map_size,
            size_used,
            remaining = map_size - size_used,
            threshold_size,
            "checking if the memory map needs a resize",
        );

        if threshold_size > 0 {
            return Ok(map_size - size_used < threshold_size);
        }

        let resize_percent = rand::thread_rng().gen_range(RESIZE_PERCENT_RANGE);
        Ok(size_used as f64 / map_size as f64 > resize_percent)
    }

    /// Grow the memory map.
    ///
    /// `increase_size`, if given, is added to the current map size
    /// (the batch path); otherwise the configured [`crate::resize::ResizeAlgorithm`]
    /// picks the new size.
    ///
    /// # Invariant
    /// The caller must not hold a write transaction; the store's write
    /// paths only call this between transactions.
    pub(crate) fn resize_map(
        &self,
        increase_size: Option<NonZeroUsize>,
    ) -> Result<(), RuntimeError> {
        let old_size = self.current_map_size()?;

        let new_size = match increase_size {
            Some(increase) => crate::resize::fixed_bytes(old_size, increase.get()),
            None => self.config.resize_algorithm.resize(old_size),
        };

        self.gate.prevent_new_txns();
        self.gate.wait_no_active_txns();

        let result = self.env.set_map_size(new_size.get());

        self.gate.allow_new_txns();
        result?;

        info!(
            old_mib = old_size / (1024 * 1024),
            new_mib = new_size.get() / (1024 * 1024),
            "memory map size increased",
        );

        Ok(())
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gate_permits_count() {
        let gate = TxnGate::new();
        let p1 = gate.enter();
        let p2 = gate.enter();
        assert_eq!(gate.num_active_txns.load(Ordering::Acquire), 2);
        drop(p1);
        drop(p2);
        assert_eq!(gate.num_active_txns.load(Ordering::Acquire), 0);

        // With the gate closed and no active txns,
        // the resize path would proceed immediately.
        gate.prevent_new_txns();
        gate.wait_no_active_txns();
        gate.allow_new_txns();
        drop(gate.enter());
    }
}
