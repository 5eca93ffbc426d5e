use core_library::{LibraryError, MediaType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("No import handler registered for media type {0}")]
    HandlerMissing(MediaType),

    #[error("Import {import} lacks media type {missing} required by {media_type}")]
    IncompleteImport {
        import: String,
        media_type: MediaType,
        missing: MediaType,
    },

    #[error("Failed to create {parent} for {child}: {reason}")]
    ParentCreation {
        parent: MediaType,
        child: String,
        reason: String,
    },

    #[error("Unresolved {parent} for {child}: {reason}")]
    ParentUnresolved {
        parent: MediaType,
        child: String,
        reason: String,
    },

    #[error("Invalid item {label}: {reason}")]
    InvalidItem { label: String, reason: String },

    #[error("Failed to load details of {label}: {reason}")]
    Enrichment { label: String, reason: String },

    #[error("Synchronisation of {0} cancelled")]
    Cancelled(String),
}

impl SyncError {
    /// Failures that abort the whole run and roll it back.
    ///
    /// Everything else only costs the item being processed.
    pub fn is_structural(&self) -> bool {
        match self {
            SyncError::RepositoryUnavailable(_)
            | SyncError::Transaction(_)
            | SyncError::HandlerMissing(_)
            | SyncError::IncompleteImport { .. }
            | SyncError::ParentCreation { .. }
            | SyncError::Cancelled(_) => true,
            SyncError::Library(LibraryError::Unavailable(_)) => true,
            SyncError::Library(_)
            | SyncError::ParentUnresolved { .. }
            | SyncError::InvalidItem { .. }
            | SyncError::Enrichment { .. } => false,
        }
    }

    pub(crate) fn invalid_item(label: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::InvalidItem {
            label: label.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
