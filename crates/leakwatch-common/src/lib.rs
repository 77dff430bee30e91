//! Leakwatch Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the leakwatch workspace.
//!
//! - **Error Handling**: [`LeakwatchError`] and the [`Result`] alias
//! - **Checksums**: SHA-256 digests used to identify attachments
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use leakwatch_common::checksum;
//! use leakwatch_common::Result;
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let digest = checksum::sha256_file(path)?;
//!     tracing::info!(%digest, "attachment fingerprint");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{LeakwatchError, Result};
