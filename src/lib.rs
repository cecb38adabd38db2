//! Persistent, crash-safe block & transaction store for a
//! Cryptonote-family blockchain, backed by LMDB.
//!
//! This crate provides the canonical durable state a node needs:
//! append-only block history, transaction lookup by hash, per-amount
//! output indexing for ring-signature input selection, spent-key-image
//! tracking, and hard-fork version metadata.
//!
//! The entry point is [`BlockchainDb`]; batched inserts go through
//! [`BatchWriter`]. Chain validation, the wire codec and the P2P/RPC
//! surfaces live in the crates above this one; the store trusts its
//! caller and persists.
//!
//! ```rust,no_run
//! use blockchain_db::{config::Config, BlockchainDb};
//!
//! let db = BlockchainDb::open(Config::new("/tmp/chain".into()))?;
//! assert_eq!(db.height(), 0);
//! # Ok::<(), blockchain_db::InitError>(())
//! ```

//---------------------------------------------------------------------------------------------------- Lints
#![forbid(unsafe_code)]
#![deny(nonstandard_style, deprecated, unused_mut)]
#![allow(clippy::module_name_repetitions)]

// The on-disk format stores host-endian integers and assumes
// `usize as u64` holds; only 64-bit little-endian targets keep
// that format stable.
#[cfg(not(target_pointer_width = "64"))]
compile_error!("blockchain-db is only compatible with 64-bit CPUs");
#[cfg(target_endian = "big")]
compile_error!("blockchain-db is only compatible with little-endian CPUs");

//---------------------------------------------------------------------------------------------------- Public API
// Import private modules, export public types.
//
// Documentation for each module is
// located in the respective file.

pub mod config;
pub mod constants;
pub mod resize;
pub mod tables;
pub mod types;

mod database;
mod env;
mod error;
mod ops;
mod storable;
mod store;
mod table;
mod transaction;

pub use constants::{DATABASE_BACKEND, DATABASE_VERSION};
pub use error::{InitError, RuntimeError};
pub use storable::{Storable, StorableStr, StorableVec};
pub use store::{BatchWriter, BlockchainDb};
pub use table::{DupTable, Table};

//---------------------------------------------------------------------------------------------------- Private
#[cfg(test)]
pub(crate) mod tests;
