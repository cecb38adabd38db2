//! Macros.
//!
//! These generate repetitive documentation
//! for all the functions defined in `ops/`.

//---------------------------------------------------------------------------------------------------- Documentation macros
/// Generate documentation for the required `# Error` section.
macro_rules! doc_error {
    () => {
        r#"# Errors
This function returns [`RuntimeError::KeyNotFound`] if the input doesn't exist or other `RuntimeError`'s on database errors."#
    };
}
pub(crate) use doc_error;

/// Generate `# Invariant` documentation for internal `fn`'s
/// called inside the block write path.
macro_rules! doc_add_block_inner_invariant {
    () => {
        r#"# ⚠️ Invariant ⚠️
This function mutates tables that must stay cross-consistent; it assumes
the caller runs it inside the block write path under a single write
transaction, and aborts that transaction on any error."#
    };
}
pub(crate) use doc_add_block_inner_invariant;
