//! Shared test utilities for tic-stream.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with good error messages and `#[track_caller]`
//! - [`mock`] - Fake discovery, fake frame sources and recording listeners
//! - [`fixtures`] - TIC frames and port descriptors
//! - [`wait`] - Polling waits for asynchronous delivery
//! - [`prelude`] - Convenience re-exports
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! tic-test-helpers = { path = "crates/tic-test-helpers" }
//! ```
//!
//! ```rust,ignore
//! use tic_test_helpers::prelude::*;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod fixtures;
pub mod mock;
pub mod must;
pub mod prelude;
pub mod wait;

pub use must::*;
