//! # Media Import Synchronisation
//!
//! Reconciles items reported by an external source into the local library.
//!
//! ## Overview
//!
//! - [`matcher`] pairs incoming items with previously imported local items
//! - [`changeset`] classifies a matched pair as unchanged or changed
//! - [`hierarchy`] resolves shows and movie sets for their children
//! - [`handlers`] implement add/update/remove/cleanup per media type
//! - [`registry`] maps media types to handlers
//! - [`coordinator`] drives a whole run inside a scoped transaction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{HandlerRegistry, SyncCoordinator};
//!
//! let registry = HandlerRegistry::with_defaults(repository.clone());
//! let coordinator = SyncCoordinator::new(repository, registry, event_bus);
//!
//! let report = coordinator.try_synchronise(&mut import, items).await?;
//! println!("{} added, {} updated", report.added, report.updated);
//! ```

pub mod changeset;
pub mod context;
pub mod coordinator;
pub mod enrichment;
pub mod error;
pub mod handlers;
pub mod hierarchy;
pub mod matcher;
pub mod registry;
pub mod transaction;

pub use changeset::{classify, ChangesetType, ClassifyOptions};
pub use context::SyncContext;
pub use coordinator::{ChangesetItem, SyncConfig, SyncCoordinator, SyncReport};
pub use enrichment::DetailsLoader;
pub use error::{Result, SyncError};
pub use handlers::{CleanupStats, ImportHandler};
pub use registry::HandlerRegistry;
pub use transaction::ScopedTransaction;
