//! Lakeload Common Library
//!
//! Shared utilities and error handling for the lakeload workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Checksums**: SHA-256 helpers and order-sensitive token digests used
//!   to fingerprint dataset content
//! - **Logging**: Centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use lakeload_common::checksum::TokenDigest;
//!
//! let mut digest = TokenDigest::new();
//! digest.push_token("order-1");
//! digest.push_token("order-2");
//! println!("keys hash: {}", digest.finish());
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
