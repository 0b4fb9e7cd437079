//! Block-level delta synchronization
//!
//! A client and server agree on the minimal bytes needed to turn an old
//! version of a file into a new one:
//!
//! 1. The server cuts the stored version into blocks and publishes a
//!    [`delta::Signature`] (weak rolling checksum + strong hash per block).
//! 2. The client slides a window over its new file and emits a
//!    [`delta::Delta`] of block copies and literal bytes.
//! 3. The server applies the delta to the stored bytes, verifies the
//!    whole-file checksum and records a new version.
//!
//! The `delta` module is pure and synchronous. `service` wraps it for
//! async callers and talks to storage through the traits in `store`.

pub mod compress;
pub mod config;
pub mod delta;
pub mod error;
pub mod integrity;
pub mod service;
pub mod store;

pub use error::{DeltaError, Result};
