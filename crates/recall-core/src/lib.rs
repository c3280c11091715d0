//! Core error definitions for the Recall memory engine.
//!
//! # Main types
//!
//! - [`RecallError`]: Unified error enum for the store, index and embedding layers.
//! - [`RecallResult`]: Convenience alias for `Result<T, RecallError>`.

/// Error types shared by all Recall crates.
pub mod error;

pub use error::{RecallError, RecallResult};
