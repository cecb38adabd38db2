//! Database [table](crate::tables) types.
//!
//! This module contains all types stored inside the database tables,
//! and aliases for common chain types that share the same primitive
//! representation.
//!
//! All multi-byte integers are stored host-endian; the crate only
//! builds on 64-bit little-endian targets (see `lib.rs`), which pins
//! the on-disk layout.

/*
 * We use `bytemuck` to (de)serialize the fixed-width record types.
 * We are SAFELY casting bytes, but to do so the types here must
 * uphold some invariants: only `bytemuck`'s derive macros are to
 * be used, they fail at COMPILE time if a type has padding or
 * otherwise cannot be a `Pod`.
 */

//---------------------------------------------------------------------------------------------------- Import
use bytemuck::{Pod, Zeroable};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::storable::StorableVec;

//---------------------------------------------------------------------------------------------------- Aliases
// These type aliases exist as many chain-related types are the exact
// same primitive. For clarity, they're given aliases as to not confuse them.

/// An output's clear amount, in atomic units.
pub type Amount = u64;

/// The index of an output within the duplicate
/// list of outputs of a single [`Amount`].
pub type AmountIndex = u64;

/// The index of an output within *all* outputs of the chain,
/// assigned densely in insertion order.
pub type GlobalOutputIndex = u64;

/// A serialized block.
pub type BlockBlob = StorableVec<u8>;

/// A block's hash.
pub type BlockHash = [u8; 32];

/// A block's height.
pub type BlockHeight = u64;

/// A key image.
pub type KeyImage = [u8; 32];

/// A serialized transaction.
pub type TxBlob = StorableVec<u8>;

/// A transaction's dense internal identifier, assigned in insertion order.
pub type TxId = u64;

/// A transaction's hash.
pub type TxHash = [u8; 32];

/// The unlock time (height) of a transaction's outputs.
pub type UnlockTime = u64;

/// A flat array of `[amount output index, global output index]` pairs,
/// two entries per output, in output order.
pub type OutputIndexPairs = StorableVec<u64>;

//---------------------------------------------------------------------------------------------------- BlockInfo
/// Block metadata.
///
/// This is the value in the [`BlockInfos`](crate::tables::BlockInfos) table.
///
/// The field order is part of the on-disk format:
/// `{timestamp, coins, size, cumulative difficulty, hash}`.
///
/// ```rust
/// # use blockchain_db::{*, types::*};
/// // Assert Storable is correct.
/// let a = BlockInfo {
///     timestamp: 1,
///     cumulative_generated_coins: 123,
///     size: 321,
///     cumulative_difficulty: 112,
///     block_hash: [54; 32],
/// };
/// let b = Storable::as_bytes(&a);
/// let c: BlockInfo = Storable::from_bytes(b);
/// assert_eq!(a, c);
/// ```
///
/// # Size & Alignment
/// ```rust
/// # use blockchain_db::types::*;
/// # use std::mem::*;
/// assert_eq!(size_of::<BlockInfo>(), 64);
/// assert_eq!(align_of::<BlockInfo>(), 8);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct BlockInfo {
    /// The UNIX time at which the block was mined.
    pub timestamp: u64,
    /// The total amount of coins generated in all blocks so far,
    /// including this block's.
    pub cumulative_generated_coins: u64,
    /// The block's size, in bytes.
    pub size: u64,
    /// The cumulative difficulty of the chain up to and including this block.
    pub cumulative_difficulty: u64,
    /// The block's hash.
    pub block_hash: [u8; 32],
}

//---------------------------------------------------------------------------------------------------- TxData
/// Transaction metadata.
///
/// This is the value in the [`TxIndices`](crate::tables::TxIndices) table,
/// keyed by transaction hash.
///
/// ```rust
/// # use blockchain_db::{*, types::*};
/// // Assert Storable is correct.
/// let a = TxData {
///     tx_id: 3,
///     unlock_time: 23,
///     height: 123,
/// };
/// let b = Storable::as_bytes(&a);
/// let c: TxData = Storable::from_bytes(b);
/// assert_eq!(a, c);
/// ```
///
/// # Size & Alignment
/// ```rust
/// # use blockchain_db::types::*;
/// # use std::mem::*;
/// assert_eq!(size_of::<TxData>(), 24);
/// assert_eq!(align_of::<TxData>(), 8);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct TxData {
    /// The transaction's dense identifier; the key
    /// into [`Txs`](crate::tables::Txs).
    pub tx_id: TxId,
    /// The transaction's unlock time (a height, not a timestamp).
    pub unlock_time: UnlockTime,
    /// The height of the block this transaction belongs to.
    pub height: BlockHeight,
}

//---------------------------------------------------------------------------------------------------- OutputData
/// A `txout_to_key` output's data.
///
/// This is the value in the [`OutputKeys`](crate::tables::OutputKeys) table,
/// keyed by global output index.
///
/// ```rust
/// # use blockchain_db::{*, types::*};
/// // Assert Storable is correct.
/// let a = OutputData {
///     pubkey: [1; 32],
///     unlock_time: 23,
///     height: 123,
/// };
/// let b = Storable::as_bytes(&a);
/// let c: OutputData = Storable::from_bytes(b);
/// assert_eq!(a, c);
/// ```
///
/// # Size & Alignment
/// ```rust
/// # use blockchain_db::types::*;
/// # use std::mem::*;
/// assert_eq!(size_of::<OutputData>(), 48);
/// assert_eq!(align_of::<OutputData>(), 8);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct OutputData {
    /// The output's public key (for spend verification).
    pub pubkey: [u8; 32],
    /// The output's unlock time (a height, not a timestamp).
    pub unlock_time: UnlockTime,
    /// The height of the block which created this output.
    pub height: BlockHeight,
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    // use super::*;
}
