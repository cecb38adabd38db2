//! Memory map resizing algorithms.
//!
//! The backing map has a fixed size and must be grown explicitly when
//! it fills ([`crate::RuntimeError::MapFull`]). [`ResizeAlgorithm`]
//! picks the new size for the non-batch growth path; batched inserts
//! compute their own estimate and pass an explicit increase.
//!
//! All results are rounded up to the OS page size, the engine
//! rejects map sizes that are not a page multiple.

//---------------------------------------------------------------------------------------------------- Import
use std::num::NonZeroUsize;

//---------------------------------------------------------------------------------------------------- ResizeAlgorithm
/// The function/algorithm used when resizing the memory map.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResizeAlgorithm {
    /// Grow by `1 GiB` per resize, the fixed step
    /// the original Cryptonote daemon uses.
    Monero,

    /// Grow by a fixed amount of bytes per resize.
    FixedBytes(NonZeroUsize),

    /// Grow by a percentage of the current map size,
    /// e.g. `1.5` turns a 1 GiB map into a 1.5 GiB one.
    Percent(f32),
}

impl ResizeAlgorithm {
    /// Returns [`Self::Monero`].
    pub const fn new() -> Self {
        Self::Monero
    }

    /// Maps `self` to the new size the map should be grown to.
    pub fn resize(&self, current_size_bytes: usize) -> NonZeroUsize {
        match self {
            Self::Monero => monero(current_size_bytes),
            Self::FixedBytes(bytes) => fixed_bytes(current_size_bytes, bytes.get()),
            Self::Percent(p) => percent(current_size_bytes, *p),
        }
    }
}

impl Default for ResizeAlgorithm {
    /// ```rust
    /// # use blockchain_db::resize::*;
    /// assert_eq!(ResizeAlgorithm::new(), ResizeAlgorithm::default());
    /// ```
    fn default() -> Self {
        Self::new()
    }
}

//---------------------------------------------------------------------------------------------------- Free functions
// `page_size` itself caches the result, so we don't need to,
// this function is cheap after the 1st call: <https://docs.rs/page_size>.
pub use page_size::get as page_size;

/// Memory map resize closely matching `monerod`.
///
/// Increases `current_size_bytes` by `1 << 30` exactly, then
/// rounds up to the nearest multiple of the OS page size.
///
/// ```rust
/// # use blockchain_db::resize::*;
/// // The value this function will increment by
/// // (assuming page multiple of 4096).
/// const N: usize = 1_073_741_824;
///
/// // 0 returns the minimum value.
/// assert_eq!(monero(0).get(), N);
/// // Rounds up to the nearest OS page size.
/// assert_eq!(monero(1).get(), N + page_size());
/// ```
pub fn monero(current_size_bytes: usize) -> NonZeroUsize {
    /// The exact amount `monerod` adds per resize.
    const ADD_SIZE: usize = 1_usize << 30;
    fixed_bytes(current_size_bytes, ADD_SIZE)
}

/// Memory map resize by a fixed amount of bytes.
///
/// Increases `current_size_bytes` by `add_bytes`, rounded
/// up to the nearest multiple of the OS page size.
///
/// ```rust
/// # use blockchain_db::resize::*;
/// assert_eq!(fixed_bytes(0, 4096).get(), 4096);
/// assert_eq!(fixed_bytes(4096, 1).get(), 4096 + page_size());
/// ```
pub fn fixed_bytes(current_size_bytes: usize, add_bytes: usize) -> NonZeroUsize {
    // If this overflows we should definitely panic;
    // `usize::MAX` bytes is ~18 million terabytes.
    let new_size_bytes = current_size_bytes + add_bytes;
    let page_size = page_size();

    // Round up to the nearest page size multiple,
    // the engine rejects anything else.
    let remainder = new_size_bytes % page_size;
    let new_size_bytes = if remainder == 0 {
        new_size_bytes
    } else {
        (new_size_bytes + page_size) - remainder
    };

    // Minimum is always at least `add_bytes` rounded up a page.
    NonZeroUsize::new(new_size_bytes).expect("resize must grow the map")
}

/// Memory map resize by a percentage of the current size.
///
/// Multiplies `current_size_bytes` by `percent`, rounded
/// up to the nearest multiple of the OS page size.
///
/// A `percent` at or under `1.0` (or a non-normal float)
/// still grows the map by at least one page.
///
/// ```rust
/// # use blockchain_db::resize::*;
/// let page = page_size();
/// assert_eq!(percent(page * 2, 1.5).get(), page * 3);
/// assert_eq!(percent(page, 1.0).get(), page * 2);
/// ```
pub fn percent(current_size_bytes: usize, percent: f32) -> NonZeroUsize {
    let page_size = page_size();

    let new_size_bytes = if percent.is_normal() && percent > 1.0 {
        // 64-bit only target, `usize` fits losslessly into `f64`.
        (current_size_bytes as f64 * f64::from(percent)) as usize
    } else {
        current_size_bytes
    };

    // Never return a map that did not grow.
    let new_size_bytes = new_size_bytes.max(current_size_bytes + page_size);

    let remainder = new_size_bytes % page_size;
    let new_size_bytes = if remainder == 0 {
        new_size_bytes
    } else {
        (new_size_bytes + page_size) - remainder
    };

    NonZeroUsize::new(new_size_bytes).expect("resize must grow the map")
}
