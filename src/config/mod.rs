//! Database environment configuration.
//!
//! This module contains the main [`Config`]uration struct
//! for the database environment, and data structures related
//! to any configuration setting.
//!
//! These configurations are processed at runtime, meaning
//! the environment can/will dynamically adjust its behavior
//! based on these values.

mod config;
pub use config::Config;

mod reader_threads;
pub use reader_threads::ReaderThreads;

mod sync_mode;
pub use sync_mode::SyncMode;
