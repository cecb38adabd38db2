//! Database operations.
//!
//! Free functions implementing the schema's write and read paths, one
//! module per concern. They operate on an already-opened transaction
//! plus the [`Tables`](crate::tables::Tables) handle set; transaction
//! lifecycle, counter publication and locking live in
//! [`crate::store::BlockchainDb`].

pub(crate) mod block;
pub(crate) mod blockchain;
pub(crate) mod hard_fork;
pub(crate) mod key_image;
pub(crate) mod macros;
pub(crate) mod output;
pub(crate) mod property;
pub(crate) mod tx;
