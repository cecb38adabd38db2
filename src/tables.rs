//! Database tables.
//!
//! # Table marker structs
//! This module contains all the table definitions used by `blockchain-db`.
//!
//! The zero-sized structs here represent the table type; they all are
//! essentially marker types that implement [`Table`].
//!
//! Table structs are `CamelCase` and plural (to avoid clashing with the
//! value types in [`crate::types`]); the on-disk names are given
//! explicitly and are the singular, `snake_case` names the original
//! Cryptonote schema uses.
//!
//! # Handles
//! [`Tables`] is the full set of opened sub-database handles, resolved
//! once at environment open. It is the compile-time enumerated set of
//! table slots every operation goes through.

//---------------------------------------------------------------------------------------------------- Import
use crate::{
    database::Database,
    error::RuntimeError,
    storable::StorableStr,
    table::{DupTable, Table},
    types::{
        Amount, BlockBlob, BlockHash, BlockHeight, BlockInfo, GlobalOutputIndex, KeyImage,
        OutputData, OutputIndexPairs, TxBlob, TxData, TxHash, TxId,
    },
};

//---------------------------------------------------------------------------------------------------- Sealed
/// Private module, should not be accessible outside this crate.
///
/// Used to block outsiders implementing [`Table`].
/// All [`Table`] types must also implement [`Sealed`].
pub(crate) mod private {
    /// Private sealed trait.
    ///
    /// Cannot be implemented outside this crate.
    pub trait Sealed {}
}

//---------------------------------------------------------------------------------------------------- Table macro
/// Create all tables, should be used _once_.
///
/// Generating this macro once and using `$()*` is probably
/// faster for compile times than calling the macro _per_ table.
///
/// All tables are zero-sized table structs, and implement the `Table` trait.
///
/// The on-disk table name is given explicitly (2nd argument), the
/// engine flags as a `|`-separated list of `DatabaseFlags` idents.
macro_rules! tables {
    (
        $(
            $(#[$attr:meta])* // Documentation and any `derive`'s.
            $table:ident => $name:literal, // Table struct + on-disk name.
            [$($flag:ident)|*],            // `lmdb::DatabaseFlags` idents.
            $key:ty => $value:ty           // Key and value types.
        ),* $(,)?
    ) => {
        paste::paste! {
            $(
                // Table struct.
                $(#[$attr])*
                #[doc = concat!("- Key: [`", stringify!($key), "`]")]
                #[doc = concat!("- Value: [`", stringify!($value), "`]")]
                #[doc = concat!("- On-disk name: `", $name, "`")]
                #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
                #[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash)]
                pub struct $table;

                // Implement the `Sealed` in this file.
                // Required by `Table`.
                impl private::Sealed for $table {}

                // Table trait impl.
                impl Table for $table {
                    const NAME: &'static str = $name;
                    type Key = $key;
                    type Value = $value;

                    fn flags() -> lmdb::DatabaseFlags {
                        lmdb::DatabaseFlags::empty() $(| lmdb::DatabaseFlags::$flag)*
                    }
                }
            )*

            /// Every opened sub-database handle.
            ///
            /// Handles are `Copy`-able dbi slots; this struct is resolved
            /// once when the environment opens and shared from then on.
            #[derive(Copy, Clone)]
            pub(crate) struct Tables {
                $(
                    #[doc = concat!("Handle for [`", stringify!($table), "`].")]
                    pub(crate) [<$table:snake>]: Database<$table>,
                )*
            }

            impl Tables {
                /// Open (or create, when `create` is set) every sub-database.
                pub(crate) fn open(
                    env: &lmdb::Environment,
                    create: bool,
                ) -> Result<Self, lmdb::Error> {
                    Ok(Self {
                        $(
                            [<$table:snake>]: Database::open(env, create)?,
                        )*
                    })
                }

                /// Delete every entry in every sub-database.
                pub(crate) fn clear_all(
                    &self,
                    txn: &mut lmdb::RwTransaction<'_>,
                ) -> Result<(), RuntimeError> {
                    $(
                        self.[<$table:snake>].clear(txn)?;
                    )*
                    Ok(())
                }
            }
        }
    };
}

//---------------------------------------------------------------------------------------------------- Tables
// Notes:
// - The on-disk names and flags are the original Cryptonote LMDB schema's
// - `INTEGER_KEY`/`INTEGER_DUP` give numeric ordering via the engine's
//   native integer comparators; hash-keyed tables use plain byte order
tables! {
    /// Serialized block blobs.
    ///
    /// Append-only primary; the key is dense from 0.
    Blocks => "blocks",
    [INTEGER_KEY],
    BlockHeight => BlockBlob,

    /// Block metadata.
    ///
    /// Fixed-size record, same key set as `blocks`.
    BlockInfos => "block_info",
    [INTEGER_KEY],
    BlockHeight => BlockInfo,

    /// Block heights by hash.
    ///
    /// The reverse index of `blocks`/`block_info`.
    BlockHeights => "block_heights",
    [],
    BlockHash => BlockHeight,

    /// Serialized transaction blobs.
    ///
    /// Append-only primary; the key is dense from 0.
    Txs => "txs",
    [INTEGER_KEY],
    TxId => TxBlob,

    /// Transaction metadata by hash.
    ///
    /// The reverse index of `txs`, plus unlock time and height.
    TxIndices => "tx_indices",
    [],
    TxHash => TxData,

    /// Per-transaction output index pairs.
    ///
    /// A flat `[amount output index, global output index]` array,
    /// one pair per output of the transaction.
    TxOutputs => "tx_outputs",
    [INTEGER_KEY],
    TxId => OutputIndexPairs,

    /// Owning transaction hash, by global output index.
    OutputTxs => "output_txs",
    [INTEGER_KEY],
    GlobalOutputIndex => TxHash,

    /// Local (within-transaction) output index, by global output index.
    OutputIndices => "output_indices",
    [INTEGER_KEY],
    GlobalOutputIndex => u64,

    /// Output public key data, by global output index.
    ///
    /// Only `txout_to_key` outputs have an entry here.
    OutputKeys => "output_keys",
    [INTEGER_KEY],
    GlobalOutputIndex => OutputData,

    /// Global output indices by amount.
    ///
    /// The hot ring-selection index: a duplicate-sorted list of all
    /// global output indices carrying a given clear amount, in
    /// insertion (= numeric) order. Fixed-size duplicates so the
    /// multi-value page cursor ops apply.
    OutputAmounts => "output_amounts",
    [INTEGER_KEY | DUP_SORT | DUP_FIXED | INTEGER_DUP],
    Amount => GlobalOutputIndex,

    /// The set of spent key images.
    ///
    /// The value is a one-byte `0` marker; only existence matters.
    SpentKeys => "spent_keys",
    [],
    KeyImage => u8,

    /// First height of each hard-fork version.
    HfStartingHeights => "hf_starting_heights",
    [],
    u8 => BlockHeight,

    /// Hard-fork version in effect at each height.
    HfVersions => "hf_versions",
    [INTEGER_KEY],
    BlockHeight => u8,

    /// Store-wide properties.
    ///
    /// Holds `"version"` -> [`u32`].
    Properties => "properties",
    [],
    StorableStr => u32,
}

//---------------------------------------------------------------------------------------------------- DupTable
impl DupTable for OutputAmounts {}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    use super::*;

    /// The on-disk names must never change; they are the schema.
    #[test]
    fn table_names() {
        assert_eq!(Blocks::NAME, "blocks");
        assert_eq!(BlockInfos::NAME, "block_info");
        assert_eq!(BlockHeights::NAME, "block_heights");
        assert_eq!(Txs::NAME, "txs");
        assert_eq!(TxIndices::NAME, "tx_indices");
        assert_eq!(TxOutputs::NAME, "tx_outputs");
        assert_eq!(OutputTxs::NAME, "output_txs");
        assert_eq!(OutputIndices::NAME, "output_indices");
        assert_eq!(OutputKeys::NAME, "output_keys");
        assert_eq!(OutputAmounts::NAME, "output_amounts");
        assert_eq!(SpentKeys::NAME, "spent_keys");
        assert_eq!(HfStartingHeights::NAME, "hf_starting_heights");
        assert_eq!(HfVersions::NAME, "hf_versions");
        assert_eq!(Properties::NAME, "properties");
    }

    /// The duplicate-sorted index must keep the page-scan flags.
    #[test]
    fn output_amounts_flags() {
        let flags = OutputAmounts::flags();
        assert!(flags.contains(lmdb::DatabaseFlags::DUP_SORT));
        assert!(flags.contains(lmdb::DatabaseFlags::DUP_FIXED));
        assert!(flags.contains(lmdb::DatabaseFlags::INTEGER_DUP));
        assert!(flags.contains(lmdb::DatabaseFlags::INTEGER_KEY));
    }
}
