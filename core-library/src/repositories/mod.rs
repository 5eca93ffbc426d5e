//! # Repository Pattern Implementation
//!
//! The [`MediaRepository`] trait is the persistence boundary of the import
//! engine: typed item CRUD, provenance links between items and the imports
//! that produced them, playback state of backing files, and transaction
//! control.
//!
//! ## Implementations
//!
//! - [`InMemoryMediaRepository`] - snapshot-based store for tests and embedders
//! - [`SqliteMediaRepository`] - sqlx-backed store on a dedicated pooled connection
//!
//! ## Filtering
//!
//! Callers never write queries. They describe the logical predicate with an
//! [`ItemFilter`] and the repository translates it:
//!
//! ```rust,ignore
//! let filter = ItemFilter::new(MediaType::Episode)
//!     .imported_from(&import)
//!     .show_id(show.id)
//!     .season(1);
//! let episodes = repository.get_items(&filter).await?;
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::import::{ImportId, MediaImport};
use crate::models::{MediaItem, MediaType, PlaybackState};

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryMediaRepository;
pub use sqlite::SqliteMediaRepository;

/// Logical predicate over items of one media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFilter {
    pub media_type: MediaType,
    /// Only items linked to this import
    pub import: Option<ImportId>,
    /// Only items linked to any import
    pub imported_only: bool,
    /// Only items whose import link is enabled
    pub enabled_only: bool,
    pub show_id: Option<i64>,
    pub season_id: Option<i64>,
    pub season: Option<i32>,
    pub set_id: Option<i64>,
    pub title: Option<String>,
}

impl ItemFilter {
    pub fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            import: None,
            imported_only: false,
            enabled_only: false,
            show_id: None,
            season_id: None,
            season: None,
            set_id: None,
            title: None,
        }
    }

    pub fn imported_from(mut self, import: &MediaImport) -> Self {
        self.import = Some(import.id());
        self.imported_only = true;
        self
    }

    pub fn imported_only(mut self) -> Self {
        self.imported_only = true;
        self
    }

    pub fn enabled_only(mut self) -> Self {
        self.enabled_only = true;
        self
    }

    pub fn show_id(mut self, show_id: i64) -> Self {
        self.show_id = Some(show_id);
        self
    }

    pub fn season_id(mut self, season_id: i64) -> Self {
        self.season_id = Some(season_id);
        self
    }

    pub fn season(mut self, season: i32) -> Self {
        self.season = Some(season);
        self
    }

    pub fn set_id(mut self, set_id: i64) -> Self {
        self.set_id = Some(set_id);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Child counts of a parent entity, read in one consistent query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChildCounts {
    /// Every child, local or imported from any source
    pub total: u64,
    /// Children linked to the import the count was requested for
    pub imported: u64,
}

impl ChildCounts {
    /// Children that do not stem from the requesting import.
    pub fn others(&self) -> u64 {
        self.total.saturating_sub(self.imported)
    }
}

/// Persistence boundary of the import engine
///
/// Item identities are strictly positive once persisted. Every method runs
/// inside the currently open transaction, if any.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// Acquire the underlying connection. Calls nest; each `open` must be
    /// paired with a `close`.
    ///
    /// # Errors
    /// Returns error if the store is unavailable
    async fn open(&self) -> Result<()>;

    /// Release one `open`. The connection is returned once the last opener
    /// closes and no transaction is pending.
    async fn close(&self) -> Result<()>;

    /// Start a transaction on the open connection
    ///
    /// # Errors
    /// Returns error if a transaction is already active or the store is unavailable
    async fn begin_transaction(&self) -> Result<()>;

    /// Commit the active transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the active transaction, restoring the state at `begin_transaction`
    async fn rollback(&self) -> Result<()>;

    /// List items matching `filter`
    async fn get_items(&self, filter: &ItemFilter) -> Result<Vec<MediaItem>>;

    /// Count items matching `filter`
    async fn count_items(&self, filter: &ItemFilter) -> Result<u64>;

    /// Find an item by identity
    ///
    /// # Returns
    /// - `Ok(Some(item))` if found
    /// - `Ok(None)` if not found
    async fn get_item(&self, media_type: MediaType, id: i64) -> Result<Option<MediaItem>>;

    /// Insert (`id <= 0`) or update the details of an item
    ///
    /// # Returns
    /// The identity of the stored row
    async fn save_item(&self, item: &MediaItem) -> Result<i64>;

    /// Delete an item together with its provenance links.
    ///
    /// Deleting a show deletes its seasons and episodes, deleting a season
    /// deletes its episodes, deleting a set detaches its movies.
    async fn delete_item(&self, media_type: MediaType, id: i64) -> Result<()>;

    /// Register a folder path, returning its identity (idempotent)
    async fn add_path(&self, path: &str) -> Result<i64>;

    /// Register a playable file, returning its identity (idempotent)
    async fn add_file(&self, path: &str) -> Result<i64>;

    /// Delete a file record and its playback state
    async fn delete_file(&self, file_id: i64) -> Result<()>;

    /// Store playcount, last played and resume point of a file.
    ///
    /// With `reset` the stored resume point is cleared before the new state
    /// is applied.
    async fn set_playback_state(
        &self,
        file_id: i64,
        state: &PlaybackState,
        reset: bool,
    ) -> Result<()>;

    /// Playback state stored for a file
    async fn get_playback_state(&self, file_id: i64) -> Result<Option<PlaybackState>>;

    /// Count the children (episodes of a show or season, movies of a set) of
    /// a parent entity, distinguishing those imported by `import`
    async fn count_children(
        &self,
        parent_type: MediaType,
        parent_id: i64,
        import: &MediaImport,
    ) -> Result<ChildCounts>;

    /// Link an item to the import that produced it, remembering the item
    /// location for this import
    async fn set_import_for_item(
        &self,
        media_type: MediaType,
        id: i64,
        import: &MediaImport,
        path: &str,
    ) -> Result<()>;

    /// Remove the link between an item and an import
    async fn remove_import_from_item(
        &self,
        media_type: MediaType,
        id: i64,
        import: &MediaImport,
    ) -> Result<()>;

    /// Delete every item of `media_type` linked to `import`
    ///
    /// # Returns
    /// Number of deleted items
    async fn delete_items_from_import(
        &self,
        import: &MediaImport,
        media_type: MediaType,
    ) -> Result<u64>;

    /// Location recorded when the item was linked to `import`
    async fn path_for_imported_item(
        &self,
        media_type: MediaType,
        id: i64,
        import: &MediaImport,
    ) -> Result<Option<String>>;

    /// Enable or disable the links of `import` for one media type
    async fn set_import_items_enabled(
        &self,
        enable: bool,
        media_type: MediaType,
        import: &MediaImport,
    ) -> Result<()>;

    /// Attach an additional location to a show
    async fn add_path_to_tvshow(&self, show_id: i64, path: &str) -> Result<()>;

    /// Detach a location from a show
    async fn remove_path_from_tvshow(&self, show_id: i64, path: &str) -> Result<()>;

    /// All locations of a show
    async fn tvshow_paths(&self, show_id: i64) -> Result<Vec<String>>;
}
