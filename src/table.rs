//! Database table abstraction; `trait Table`.

//---------------------------------------------------------------------------------------------------- Import
use crate::storable::Storable;

//---------------------------------------------------------------------------------------------------- Table
/// Database table metadata.
///
/// Purely compile time information for database tables.
///
/// ## Sealed
/// This trait is [`Sealed`](https://rust-lang.github.io/api-guidelines/future-proofing.html#sealed-traits-protect-against-downstream-implementations-c-sealed).
///
/// It is, and can only be, implemented on the types inside [`tables`][crate::tables].
pub trait Table: crate::tables::private::Sealed + 'static {
    /// Name of the database table, as stored on disk.
    const NAME: &'static str;

    /// Primary key type.
    type Key: Storable + 'static;

    /// Value type.
    type Value: Storable + 'static;

    /// The engine flags this table is created with.
    ///
    /// Integer-keyed tables carry `INTEGER_KEY` so the engine's
    /// native integer comparator orders them numerically; the
    /// duplicate-sorted table additionally carries
    /// `DUP_SORT | DUP_FIXED | INTEGER_DUP`.
    fn flags() -> lmdb::DatabaseFlags;
}

//---------------------------------------------------------------------------------------------------- DupTable
/// A [`Table`] that holds multiple sorted values per key.
///
/// The value type is fixed-width ([`Storable::BYTE_LENGTH`] is `Some`)
/// so the engine packs the duplicate list into contiguous pages and
/// the multi-value page cursor operations are usable on it.
pub trait DupTable: Table {}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod test {
    // use super::*;
}
