//! Workspace facade crate.
//!
//! Re-exports the member crates so hosts can depend on
//! `media-import-workspace` alone. The `service` feature (on by default)
//! adds the bootstrap façade from `core-service`.

pub use core_library as library;
pub use core_runtime as runtime;
pub use core_sync as sync;

#[cfg(feature = "service")]
pub use core_service as service;
